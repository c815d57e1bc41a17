#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::{AsAttachment, AsBindTarget, BindTarget};
use js_sys::{Error, Object, Uint16Array, Uint8Array};
use std::marker::PhantomData;
use web_sys::{
    HtmlImageElement, HtmlVideoElement, WebGl2RenderingContext as Context, WebGlTexture,
};

pub trait Boolean {
    const VALUE: bool;
}

pub struct True;
pub struct False;

impl Boolean for True {
    const VALUE: bool = true;
}
impl Boolean for False {
    const VALUE: bool = false;
}

pub trait RenderTarget {}

pub struct Color;

impl RenderTarget for Color {}

/// Number of mip levels of a full chain for the given dimensions.
pub fn mip_levels(cols: usize, rows: usize) -> usize {
    let largest = cols.max(rows).max(1);

    (usize::BITS - largest.leading_zeros()) as usize
}

#[derive(Debug)]
pub struct Texture<T> {
    gl: Context,

    handle: Option<WebGlTexture>,
    layout: (usize, usize, usize),
    format: PhantomData<T>,
}

impl<T> Texture<T> {
    pub fn new(gl: Context) -> Self {
        Self {
            gl,
            handle: None,
            layout: (0, 0, 0),
            format: PhantomData,
        }
    }

    pub fn cols(&self) -> usize {
        self.layout.0
    }

    pub fn rows(&self) -> usize {
        self.layout.1
    }

    pub fn levels(&self) -> usize {
        self.layout.2
    }

    pub fn handle(&self) -> Option<&WebGlTexture> {
        self.handle.as_ref()
    }

    /// Forgets the handle without deleting it, after a context loss.
    pub fn invalidate(&mut self) {
        self.layout = (0, 0, 0);
        self.handle = None;
    }

    pub fn reset(&mut self) {
        if let Some(texture_handle) = &self.handle {
            self.gl.delete_texture(Some(texture_handle));
        }

        self.invalidate();
    }

    pub fn is_invalid(&self) -> bool {
        self.handle.is_none()
    }

    fn create_texture(&mut self, cols: usize, rows: usize, levels: usize) -> bool {
        assert!(cols > 0 && rows > 0, "invalid texture layout requested");

        if self.layout != (cols, rows, levels) || self.handle.is_none() {
            if let Some(texture_handle) = &self.handle {
                self.gl.delete_texture(Some(texture_handle));
            }

            self.handle = self.gl.create_texture();
            self.layout = (cols, rows, levels);

            false
        } else {
            true
        }
    }
}

impl<T: TextureFormat> Texture<T> {
    fn filter_mode_for_format(&self, mipmapped: bool) -> (i32, i32) {
        match (T::Filterable::VALUE, mipmapped) {
            (true, true) => (Context::LINEAR as i32, Context::LINEAR_MIPMAP_LINEAR as i32),
            (true, false) => (Context::LINEAR as i32, Context::LINEAR as i32),
            (false, _) => (Context::NEAREST as i32, Context::NEAREST as i32),
        }
    }

    fn set_texture_parameters(&mut self) {
        let (mag, min) = self.filter_mode_for_format(self.levels() > 1);

        self.gl
            .tex_parameteri(Context::TEXTURE_2D, Context::TEXTURE_MAG_FILTER, mag);
        self.gl
            .tex_parameteri(Context::TEXTURE_2D, Context::TEXTURE_MIN_FILTER, min);

        // equirectangular maps wrap horizontally but not across the poles
        self.gl.tex_parameteri(
            Context::TEXTURE_2D,
            Context::TEXTURE_WRAP_S,
            Context::REPEAT as i32,
        );

        self.gl.tex_parameteri(
            Context::TEXTURE_2D,
            Context::TEXTURE_WRAP_T,
            Context::CLAMP_TO_EDGE as i32,
        );
    }

    /// Allocates immutable storage with `levels` mip levels.
    pub fn create(&mut self, cols: usize, rows: usize, levels: usize) {
        if self.create_texture(cols, rows, levels.max(1)) {
            return; // texture already created
        }

        self.gl
            .bind_texture(Context::TEXTURE_2D, self.handle.as_ref());

        self.gl.tex_storage_2d(
            Context::TEXTURE_2D,
            self.levels() as i32,
            T::GL_INTERNAL_FORMAT,
            cols as i32,
            rows as i32,
        );

        self.set_texture_parameters();
    }

    /// Uploads the base level.
    pub fn upload(&mut self, cols: usize, rows: usize, data: &[T::Data]) -> Result<(), Error> {
        self.create(cols, rows, 1);

        self.gl
            .bind_texture(Context::TEXTURE_2D, self.handle.as_ref());

        self.gl
            .tex_sub_image_2d_with_i32_and_i32_and_u32_and_type_and_opt_array_buffer_view(
                Context::TEXTURE_2D,
                0,
                0,
                0,
                cols as i32,
                rows as i32,
                T::GL_FORMAT,
                T::GL_TYPE,
                Some(&T::into_texture_source_data(cols, rows, data)),
            )
            .map_err(|_| Error::new("failed to upload texture data"))
    }
}

impl Texture<RGBA8> {
    /// Copies the current frame of a video element.
    pub fn upload_video(&mut self, video: &HtmlVideoElement) -> Result<(), Error> {
        let (cols, rows) = (video.video_width() as usize, video.video_height() as usize);

        if cols == 0 || rows == 0 {
            return Ok(()); // no frame decoded yet
        }

        self.create(cols, rows, 1);

        self.gl
            .bind_texture(Context::TEXTURE_2D, self.handle.as_ref());

        self.gl
            .tex_sub_image_2d_with_u32_and_u32_and_html_video_element(
                Context::TEXTURE_2D,
                0,
                0,
                0,
                RGBA8::GL_FORMAT,
                RGBA8::GL_TYPE,
                video,
            )
            .map_err(|_| Error::new("failed to upload video frame"))
    }

    pub fn upload_image(&mut self, image: &HtmlImageElement) -> Result<(), Error> {
        let (cols, rows) = (image.natural_width() as usize, image.natural_height() as usize);

        if cols == 0 || rows == 0 {
            return Ok(()); // image not decoded yet
        }

        self.create(cols, rows, 1);

        self.gl
            .bind_texture(Context::TEXTURE_2D, self.handle.as_ref());

        self.gl
            .tex_sub_image_2d_with_u32_and_u32_and_html_image_element(
                Context::TEXTURE_2D,
                0,
                0,
                0,
                RGBA8::GL_FORMAT,
                RGBA8::GL_TYPE,
                image,
            )
            .map_err(|_| Error::new("failed to upload image"))
    }
}

impl<T: TextureFormat> AsAttachment for Texture<T> {
    type Target = T::Renderable;

    fn as_attachment(&self) -> Option<&WebGlTexture> {
        self.handle.as_ref()
    }

    fn attachment_dimensions(&self, level: usize) -> (usize, usize) {
        ((self.cols() >> level).max(1), (self.rows() >> level).max(1))
    }
}

impl<T: TextureFormat> AsBindTarget for Texture<T> {
    fn bind_target(&self) -> BindTarget {
        BindTarget::Texture(self.handle.as_ref())
    }
}

impl<T> Drop for Texture<T> {
    fn drop(&mut self) {
        if let Some(texture_handle) = &self.handle {
            self.gl.delete_texture(Some(texture_handle));
        }
    }
}

pub trait TextureFormat {
    type Data;

    type Filterable: Boolean;
    type Renderable: RenderTarget;

    const GL_INTERNAL_FORMAT: u32;
    const GL_FORMAT: u32;
    const GL_TYPE: u32;

    fn into_texture_source_data(cols: usize, rows: usize, layer: &[Self::Data]) -> Object;
}

#[derive(Debug)]
pub struct RGBA8;
#[derive(Debug)]
pub struct RGBA16F;

impl TextureFormat for RGBA8 {
    type Data = u8;

    type Filterable = True;
    type Renderable = Color;

    const GL_INTERNAL_FORMAT: u32 = Context::RGBA8;
    const GL_FORMAT: u32 = Context::RGBA;
    const GL_TYPE: u32 = Context::UNSIGNED_BYTE;

    fn into_texture_source_data(cols: usize, rows: usize, layer: &[Self::Data]) -> Object {
        assert!(layer.len() == cols * rows * 4);

        Uint8Array::from(layer).into()
    }
}

impl TextureFormat for RGBA16F {
    type Data = u16;

    type Filterable = True;
    type Renderable = Color;

    const GL_INTERNAL_FORMAT: u32 = Context::RGBA16F;
    const GL_FORMAT: u32 = Context::RGBA;
    const GL_TYPE: u32 = Context::HALF_FLOAT;

    fn into_texture_source_data(cols: usize, rows: usize, layer: &[Self::Data]) -> Object {
        assert!(layer.len() == cols * rows * 4);

        Uint16Array::from(layer).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_chain_length() {
        assert_eq!(mip_levels(1, 1), 1);
        assert_eq!(mip_levels(2, 1), 2);
        assert_eq!(mip_levels(1024, 512), 11);
        assert_eq!(mip_levels(1000, 500), 10);
    }
}
