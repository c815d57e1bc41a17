use crate::{
    EquirectImage, GridSettings, Lighting, MediaElement, PointLight, PostProcess, Presentation,
    Rotation, ScreenShading, StructureShading, SurfaceId,
};
use std::fmt::Debug;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum BackendError {
    #[error("graphics context lost")]
    ContextLost,
    #[error("extension `{0}' missing")]
    MissingExtension(&'static str),
    #[error("{cols}x{rows} texture exceeds the device limit of {limit}")]
    TextureTooLarge { cols: usize, rows: usize, limit: usize },
    #[error("shader build failed: {0}")]
    Shader(String),
    #[error("{0}")]
    Other(String),
}

/// An environment map bound to scene lighting and to the background.
#[derive(Debug)]
pub struct EnvironmentBinding<'a, T> {
    pub map: &'a T,
    pub presentation: Presentation,
}

/// Renderer context consumed by the stage managers.
///
/// Textures and prefilter facilities are owned handles: the managers hand
/// them back through the `delete_*` methods exactly once, which is what lets
/// resource lifetimes be audited against any implementation.
pub trait Backend {
    type Texture: Debug;
    type Prefilter: Debug;
    type Media: MediaElement;

    /// Uploads a decoded equirectangular image.
    fn upload_equirect(&mut self, image: &EquirectImage) -> Result<Self::Texture, BackendError>;

    /// Creates the reusable equirectangular to environment map converter.
    fn create_prefilter(&mut self) -> Result<Self::Prefilter, BackendError>;

    /// Renders a new prefiltered environment map from `source`, sampling it
    /// through `rotation`.
    fn prefilter(
        &mut self,
        prefilter: &mut Self::Prefilter,
        source: &Self::Texture,
        rotation: Rotation,
    ) -> Result<Self::Texture, BackendError>;

    fn delete_texture(&mut self, texture: Self::Texture);

    fn delete_prefilter(&mut self, prefilter: Self::Prefilter);

    /// Binds (or with `None`, clears) environment lighting and background in
    /// a single step so they can never disagree.
    fn bind_environment(&mut self, binding: Option<EnvironmentBinding<'_, Self::Texture>>);

    /// Copies the current frame of `media` into the screen texture.
    fn upload_media_frame(&mut self, media: &Self::Media) -> Result<(), BackendError>;

    /// Releases the screen texture.
    fn release_media_frame(&mut self);

    fn set_screen_material(&mut self, surface: SurfaceId, shading: &ScreenShading);

    fn set_structure_material(&mut self, surface: SurfaceId, shading: &StructureShading);

    /// Forgets every per-surface material of the previous stage model.
    fn clear_stage_materials(&mut self);

    fn set_point_lights(&mut self, lights: &[PointLight]);

    fn set_lighting(&mut self, lighting: &Lighting);

    fn set_grid(&mut self, grid: &GridSettings);

    fn set_post_process(&mut self, post: &PostProcess);
}
