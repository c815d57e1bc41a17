#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::{
    mip_levels, AsAttachment, Backend, BackendError, EnvironmentBinding, EquirectImage,
    Framebuffer, GridSettings, Lighting, MediaSource, PointLight, PostProcess, PostProcessData,
    Rotation, ScreenShading, Shader, StructureShading, SurfaceId, Texture, UniformBuffer,
    WebMedia, FS_BACKGROUND, FS_PREFILTER, RGBA16F, RGBA8, VS_FULLSCREEN,
};
use serde::Serialize;
use std::collections::BTreeMap;
use web_sys::{WebGl2RenderingContext as Context, WebGlTexture};
use zerocopy::{AsBytes, FromBytes};

/// Samples taken per texel when prefiltering rough mip levels.
pub const PREFILTER_SAMPLES: u32 = 32;
/// Width of the base level of prefiltered environment maps.
pub const MAX_FILTERED_COLS: usize = 1024;

#[repr(align(16), C)]
#[derive(AsBytes, FromBytes, Debug, Default)]
pub struct PrefilterData {
    rotation: [[f32; 4]; 3],
    roughness: f32,
    padding: [f32; 3],
}

#[repr(align(16), C)]
#[derive(AsBytes, FromBytes, Debug, Default)]
pub struct BackgroundData {
    inverse_view_projection: [[f32; 4]; 4],
    intensity: f32,
    blur_lod: f32,
    padding: [f32; 2],
}

/// Programs and targets reused by every prefilter pass.
#[derive(Debug)]
pub struct WebGlPrefilter {
    shader: Shader,
    framebuffer: Framebuffer,
    uniforms: UniformBuffer<PrefilterData>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentFrame {
    pub intensity: f32,
    pub show_as_background: bool,
    pub background_blur: f32,
    pub levels: usize,
}

/// Scene state the host applies to its scene graph each frame.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageFrame {
    pub environment: Option<EnvironmentFrame>,
    pub screens: BTreeMap<SurfaceId, ScreenShading>,
    pub structures: BTreeMap<SurfaceId, StructureShading>,
    pub point_lights: Vec<PointLight>,
    pub lighting: Option<Lighting>,
    pub grid: Option<GridSettings>,
    pub post_process: Option<PostProcess>,
}

#[derive(Debug)]
struct BoundEnvironment {
    map: WebGlTexture,
    frame: EnvironmentFrame,
}

/// Renderer context backed by a WebGL2 canvas.
///
/// Environment maps and the media texture live on the GPU here; per-surface
/// materials and lights are collected into a `StageFrame` for the host's
/// scene graph.
#[derive(Debug)]
pub struct WebGlBackend {
    gl: Context,
    max_texture_size: usize,

    environment: Option<BoundEnvironment>,
    media: Texture<RGBA8>,

    background: Shader,
    background_data: UniformBuffer<BackgroundData>,
    display_data: UniformBuffer<PostProcessData>,

    frame: StageFrame,
}

impl WebGlBackend {
    pub fn new(gl: Context) -> Result<Self, BackendError> {
        if let Err(_) | Ok(None) = gl.get_extension("EXT_color_buffer_float") {
            return Err(BackendError::MissingExtension("EXT_color_buffer_float"));
        }

        let max_texture_size = gl
            .get_parameter(Context::MAX_TEXTURE_SIZE)
            .ok()
            .and_then(|value| value.as_f64())
            .map_or(4096, |value| value as usize);

        info!("WebGL2 context ready, max texture size {}", max_texture_size);

        Ok(Self {
            max_texture_size,
            environment: None,
            media: Texture::new(gl.clone()),
            background: Shader::new(gl.clone(), &VS_FULLSCREEN, &FS_BACKGROUND),
            background_data: UniformBuffer::new(gl.clone()),
            display_data: UniformBuffer::new(gl.clone()),
            frame: StageFrame::default(),
            gl,
        })
    }

    pub fn context(&self) -> &Context {
        &self.gl
    }

    pub fn frame(&self) -> &StageFrame {
        &self.frame
    }

    /// Texture holding the latest media frame, sampled by screen materials.
    pub fn media_texture(&self) -> Option<&WebGlTexture> {
        self.media.handle()
    }

    /// Prefiltered environment map sampled by lit materials.
    pub fn environment_texture(&self) -> Option<&WebGlTexture> {
        self.environment.as_ref().map(|bound| &bound.map)
    }

    /// Draws the environment background, or clears to black when the
    /// environment is absent or hidden.
    pub fn render_background(
        &mut self,
        cols: usize,
        rows: usize,
        inverse_view_projection: [[f32; 4]; 4],
    ) -> Result<(), BackendError> {
        self.check_context()?;

        let bound = match &self.environment {
            Some(bound) if bound.frame.show_as_background => bound,
            _ => {
                self.gl.bind_framebuffer(Context::DRAW_FRAMEBUFFER, None);
                self.gl.clear_color(0.0, 0.0, 0.0, 1.0);
                self.gl.clear(Context::COLOR_BUFFER_BIT);

                return Ok(());
            }
        };

        self.background.rebuild()?;

        self.background_data.write(&BackgroundData {
            inverse_view_projection,
            intensity: bound.frame.intensity,
            blur_lod: bound.frame.background_blur * (bound.frame.levels.max(1) - 1) as f32,
            ..BackgroundData::default()
        })?;

        let post = self.frame.post_process.unwrap_or_default();
        self.display_data.write(&post.data())?;

        let command = self.background.begin_draw();

        command.set_canvas_framebuffer();
        command.set_viewport(0, 0, cols as i32, rows as i32);
        command.bind(&bound.map, "environment");
        command.bind(&self.background_data, "Background");
        command.bind(&self.display_data, "Display");
        command.draw_fullscreen();

        Ok(())
    }

    /// Forgets every GPU handle after the context was lost. Owned textures
    /// held elsewhere must be invalidated by their owners.
    pub fn context_lost(&mut self) {
        warn!("WebGL context lost");

        self.environment = None;
        self.media.invalidate();
        self.background.invalidate();
        self.background_data.invalidate();
        self.display_data.invalidate();
        self.frame.environment = None;
    }

    fn check_context(&self) -> Result<(), BackendError> {
        if self.gl.is_context_lost() {
            Err(BackendError::ContextLost)
        } else {
            Ok(())
        }
    }
}

fn rotation_rows(rotation: Rotation) -> [[f32; 4]; 3] {
    let matrix = rotation.matrix();

    [
        [matrix.x.x, matrix.x.y, matrix.x.z, 0.0],
        [matrix.y.x, matrix.y.y, matrix.y.z, 0.0],
        [matrix.z.x, matrix.z.y, matrix.z.z, 0.0],
    ]
}

impl Backend for WebGlBackend {
    type Texture = Texture<RGBA16F>;
    type Prefilter = WebGlPrefilter;
    type Media = WebMedia;

    fn upload_equirect(&mut self, image: &EquirectImage) -> Result<Texture<RGBA16F>, BackendError> {
        self.check_context()?;

        let (cols, rows) = (image.cols(), image.rows());

        if cols > self.max_texture_size || rows > self.max_texture_size {
            return Err(BackendError::TextureTooLarge {
                cols,
                rows,
                limit: self.max_texture_size,
            });
        }

        let mut texture = Texture::new(self.gl.clone());

        texture
            .upload(cols, rows, image.texels())
            .map_err(|err| BackendError::Other(String::from(err.message())))?;

        Ok(texture)
    }

    fn create_prefilter(&mut self) -> Result<WebGlPrefilter, BackendError> {
        self.check_context()?;

        let mut shader = Shader::new(self.gl.clone(), &VS_FULLSCREEN, &FS_PREFILTER);
        shader.set_define("SAMPLES", PREFILTER_SAMPLES);
        shader.rebuild()?;

        debug!("created environment prefilter");

        Ok(WebGlPrefilter {
            shader,
            framebuffer: Framebuffer::new(self.gl.clone()),
            uniforms: UniformBuffer::new(self.gl.clone()),
        })
    }

    fn prefilter(
        &mut self,
        prefilter: &mut WebGlPrefilter,
        source: &Texture<RGBA16F>,
        rotation: Rotation,
    ) -> Result<Texture<RGBA16F>, BackendError> {
        self.check_context()?;

        let cols = source.cols().min(MAX_FILTERED_COLS).max(2);
        let rows = (cols / 2).max(1);
        let levels = mip_levels(cols, rows);

        let mut filtered = Texture::new(self.gl.clone());
        filtered.create(cols, rows, levels);

        for level in 0..levels {
            prefilter.framebuffer.attach(&filtered, level)?;

            prefilter.uniforms.write(&PrefilterData {
                rotation: rotation_rows(rotation),
                roughness: level as f32 / (levels.max(2) - 1) as f32,
                ..PrefilterData::default()
            })?;

            let (level_cols, level_rows) = filtered.attachment_dimensions(level);
            let command = prefilter.shader.begin_draw();

            command.set_framebuffer(&prefilter.framebuffer);
            command.set_viewport(0, 0, level_cols as i32, level_rows as i32);
            command.bind(source, "source");
            command.bind(&prefilter.uniforms, "Prefilter");
            command.draw_fullscreen();
        }

        Ok(filtered)
    }

    fn delete_texture(&mut self, mut texture: Texture<RGBA16F>) {
        texture.reset();
    }

    fn delete_prefilter(&mut self, prefilter: WebGlPrefilter) {
        drop(prefilter);
    }

    fn bind_environment(&mut self, binding: Option<EnvironmentBinding<'_, Texture<RGBA16F>>>) {
        self.environment = binding.and_then(|binding| {
            let map = binding.map.handle()?.clone();

            Some(BoundEnvironment {
                map,
                frame: EnvironmentFrame {
                    intensity: binding.presentation.intensity,
                    show_as_background: binding.presentation.show_as_background,
                    background_blur: binding.presentation.background_blur,
                    levels: binding.map.levels(),
                },
            })
        });

        self.frame.environment = self.environment.as_ref().map(|bound| bound.frame);
    }

    fn upload_media_frame(&mut self, media: &WebMedia) -> Result<(), BackendError> {
        self.check_context()?;

        let result = match media.source() {
            MediaSource::Video(video) => self.media.upload_video(video),
            MediaSource::Image(image) => self.media.upload_image(image),
        };

        result.map_err(|err| BackendError::Other(String::from(err.message())))
    }

    fn release_media_frame(&mut self) {
        self.media.reset();
    }

    fn set_screen_material(&mut self, surface: SurfaceId, shading: &ScreenShading) {
        self.frame.screens.insert(surface, *shading);
    }

    fn set_structure_material(&mut self, surface: SurfaceId, shading: &StructureShading) {
        self.frame.structures.insert(surface, *shading);
    }

    fn clear_stage_materials(&mut self) {
        self.frame.screens.clear();
        self.frame.structures.clear();
    }

    fn set_point_lights(&mut self, lights: &[PointLight]) {
        self.frame.point_lights = lights.to_vec();
    }

    fn set_lighting(&mut self, lighting: &Lighting) {
        self.frame.lighting = Some(*lighting);
    }

    fn set_grid(&mut self, grid: &GridSettings) {
        self.frame.grid = Some(*grid);
    }

    fn set_post_process(&mut self, post: &PostProcess) {
        self.frame.post_process = Some(*post);
    }
}
