#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::{BackendError, Color, RenderTarget};
use web_sys::{WebGl2RenderingContext as Context, WebGlFramebuffer, WebGlTexture};

pub trait AsAttachment {
    type Target: RenderTarget;

    fn as_attachment(&self) -> Option<&WebGlTexture>;

    fn attachment_dimensions(&self, level: usize) -> (usize, usize);
}

#[derive(Debug)]
pub struct Framebuffer {
    gl: Context,
    handle: Option<WebGlFramebuffer>,
}

impl Framebuffer {
    pub fn new(gl: Context) -> Self {
        Self { gl, handle: None }
    }

    pub fn handle(&self) -> Option<&WebGlFramebuffer> {
        self.handle.as_ref()
    }

    pub fn invalidate(&mut self) {
        self.handle = None;
    }

    /// Points the framebuffer at one mip level of a colour texture.
    pub fn attach(
        &mut self,
        attachment: &dyn AsAttachment<Target = Color>,
        level: usize,
    ) -> Result<(), BackendError> {
        if let Err(_) | Ok(None) = self.gl.get_extension("EXT_color_buffer_float") {
            return Err(BackendError::MissingExtension("EXT_color_buffer_float"));
        }

        if self.handle.is_none() {
            self.handle = self.gl.create_framebuffer();
        }

        self.gl
            .bind_framebuffer(Context::DRAW_FRAMEBUFFER, self.handle.as_ref());

        self.gl.framebuffer_texture_2d(
            Context::DRAW_FRAMEBUFFER,
            Context::COLOR_ATTACHMENT0,
            Context::TEXTURE_2D,
            attachment.as_attachment(),
            level as i32,
        );

        match self.gl.check_framebuffer_status(Context::DRAW_FRAMEBUFFER) {
            Context::FRAMEBUFFER_COMPLETE => Ok(()),
            status => Err(BackendError::Other(format!(
                "incomplete framebuffer (status {:#x})",
                status
            ))),
        }
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        if let Some(framebuffer_handle) = &self.handle {
            self.gl.delete_framebuffer(Some(framebuffer_handle));
        }
    }
}
