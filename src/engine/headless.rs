#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::{
    Backend, BackendError, EnvironmentBinding, EquirectImage, GridSettings, Lighting,
    MediaElement, PointLight, PostProcess, Presentation, Rotation, ScreenShading,
    StructureShading, SurfaceId,
};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

/// Largest texture dimension accepted by the headless device.
pub const HEADLESS_MAX_TEXTURE_SIZE: usize = 16384;

/// Owned handle to a texture living in a `HeadlessBackend`.
#[derive(Debug, PartialEq, Eq)]
pub struct HeadlessTexture {
    id: u64,
}

impl HeadlessTexture {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct HeadlessPrefilter {
    id: u64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TextureInfo {
    Equirect { cols: usize, rows: usize },
    Prefiltered { source: u64, rotation: Rotation },
}

/// What the scene currently samples for environment lighting and background.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundEnvironment {
    pub map: u64,
    pub source: u64,
    pub source_dimensions: (usize, usize),
    pub rotation: Rotation,
    pub presentation: Presentation,
}

/// A renderer that keeps every GPU-side object in memory.
///
/// It renders nothing but records each allocation, deletion and scene write,
/// which makes it the reference for resource accounting and the device used
/// when no WebGL context exists.
pub struct HeadlessBackend<M> {
    next_id: u64,
    live: BTreeMap<u64, TextureInfo>,
    allocations: u64,
    deletions: u64,

    prefilters_live: usize,
    prefilters_created: u64,
    prefilter_passes: u64,

    bound: Option<BoundEnvironment>,
    environment_binds: u64,

    media_uploads: u64,
    media_resident: bool,

    screens: BTreeMap<SurfaceId, ScreenShading>,
    structures: BTreeMap<SurfaceId, StructureShading>,
    lights: Vec<PointLight>,
    lighting: Option<Lighting>,
    grid: Option<GridSettings>,
    post: Option<PostProcess>,

    fail_next_upload: Option<BackendError>,
    fail_next_prefilter: Option<BackendError>,

    media: PhantomData<M>,
}

impl<M> HeadlessBackend<M> {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            live: BTreeMap::new(),
            allocations: 0,
            deletions: 0,
            prefilters_live: 0,
            prefilters_created: 0,
            prefilter_passes: 0,
            bound: None,
            environment_binds: 0,
            media_uploads: 0,
            media_resident: false,
            screens: BTreeMap::new(),
            structures: BTreeMap::new(),
            lights: Vec::new(),
            lighting: None,
            grid: None,
            post: None,
            fail_next_upload: None,
            fail_next_prefilter: None,
            media: PhantomData,
        }
    }

    /// Number of textures currently allocated.
    pub fn live_textures(&self) -> usize {
        self.live.len()
    }

    pub fn texture_info(&self, id: u64) -> Option<TextureInfo> {
        self.live.get(&id).copied()
    }

    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    pub fn deletions(&self) -> u64 {
        self.deletions
    }

    pub fn live_prefilters(&self) -> usize {
        self.prefilters_live
    }

    pub fn prefilters_created(&self) -> u64 {
        self.prefilters_created
    }

    pub fn prefilter_passes(&self) -> u64 {
        self.prefilter_passes
    }

    pub fn bound_environment(&self) -> Option<&BoundEnvironment> {
        self.bound.as_ref()
    }

    pub fn environment_binds(&self) -> u64 {
        self.environment_binds
    }

    pub fn media_uploads(&self) -> u64 {
        self.media_uploads
    }

    pub fn media_resident(&self) -> bool {
        self.media_resident
    }

    pub fn screen_material(&self, surface: SurfaceId) -> Option<&ScreenShading> {
        self.screens.get(&surface)
    }

    pub fn structure_material(&self, surface: SurfaceId) -> Option<&StructureShading> {
        self.structures.get(&surface)
    }

    pub fn point_lights(&self) -> &[PointLight] {
        &self.lights
    }

    pub fn lighting(&self) -> Option<&Lighting> {
        self.lighting.as_ref()
    }

    pub fn grid(&self) -> Option<&GridSettings> {
        self.grid.as_ref()
    }

    pub fn post_process(&self) -> Option<&PostProcess> {
        self.post.as_ref()
    }

    /// Makes the next equirectangular upload fail with `error`.
    pub fn fail_next_upload(&mut self, error: BackendError) {
        self.fail_next_upload = Some(error);
    }

    /// Makes the next prefilter pass fail with `error`.
    pub fn fail_next_prefilter(&mut self, error: BackendError) {
        self.fail_next_prefilter = Some(error);
    }

    fn allocate(&mut self, info: TextureInfo) -> HeadlessTexture {
        let id = self.next_id;
        self.next_id += 1;

        self.live.insert(id, info);
        self.allocations += 1;

        HeadlessTexture { id }
    }
}

impl<M> Default for HeadlessBackend<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for HeadlessBackend<M> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "HeadlessBackend {{ {} live textures, {} prefilters }}",
            self.live.len(),
            self.prefilters_live
        )
    }
}

impl<M: MediaElement> Backend for HeadlessBackend<M> {
    type Texture = HeadlessTexture;
    type Prefilter = HeadlessPrefilter;
    type Media = M;

    fn upload_equirect(&mut self, image: &EquirectImage) -> Result<HeadlessTexture, BackendError> {
        if let Some(error) = self.fail_next_upload.take() {
            return Err(error);
        }

        let (cols, rows) = (image.cols(), image.rows());

        if cols > HEADLESS_MAX_TEXTURE_SIZE || rows > HEADLESS_MAX_TEXTURE_SIZE {
            return Err(BackendError::TextureTooLarge {
                cols,
                rows,
                limit: HEADLESS_MAX_TEXTURE_SIZE,
            });
        }

        Ok(self.allocate(TextureInfo::Equirect { cols, rows }))
    }

    fn create_prefilter(&mut self) -> Result<HeadlessPrefilter, BackendError> {
        self.prefilters_created += 1;
        self.prefilters_live += 1;

        Ok(HeadlessPrefilter {
            id: self.prefilters_created,
        })
    }

    fn prefilter(
        &mut self,
        _prefilter: &mut HeadlessPrefilter,
        source: &HeadlessTexture,
        rotation: Rotation,
    ) -> Result<HeadlessTexture, BackendError> {
        if let Some(error) = self.fail_next_prefilter.take() {
            return Err(error);
        }

        if let Some(TextureInfo::Equirect { .. }) = self.live.get(&source.id) {
            self.prefilter_passes += 1;
        } else {
            return Err(BackendError::Other(format!(
                "texture {} is not an equirectangular source",
                source.id
            )));
        }

        Ok(self.allocate(TextureInfo::Prefiltered {
            source: source.id,
            rotation,
        }))
    }

    fn delete_texture(&mut self, texture: HeadlessTexture) {
        if self.bound.map_or(false, |bound| bound.map == texture.id) {
            warn!("deleting texture {} while it is bound", texture.id);
        }

        if self.live.remove(&texture.id).is_some() {
            self.deletions += 1;
        } else {
            warn!("texture {} deleted twice", texture.id);
        }
    }

    fn delete_prefilter(&mut self, _prefilter: HeadlessPrefilter) {
        self.prefilters_live -= 1;
    }

    fn bind_environment(&mut self, binding: Option<EnvironmentBinding<'_, HeadlessTexture>>) {
        self.environment_binds += 1;

        self.bound = binding.and_then(|binding| match self.live.get(&binding.map.id) {
            Some(&TextureInfo::Prefiltered { source, rotation }) => {
                let source_dimensions = match self.live.get(&source) {
                    Some(&TextureInfo::Equirect { cols, rows }) => (cols, rows),
                    _ => (0, 0),
                };

                Some(BoundEnvironment {
                    map: binding.map.id,
                    source,
                    source_dimensions,
                    rotation,
                    presentation: binding.presentation,
                })
            }
            _ => {
                warn!("binding texture {} which is not an environment map", binding.map.id);
                None
            }
        });
    }

    fn upload_media_frame(&mut self, media: &M) -> Result<(), BackendError> {
        if !media.has_frame() {
            return Ok(());
        }

        self.media_uploads += 1;
        self.media_resident = true;

        Ok(())
    }

    fn release_media_frame(&mut self) {
        self.media_resident = false;
    }

    fn set_screen_material(&mut self, surface: SurfaceId, shading: &ScreenShading) {
        self.screens.insert(surface, *shading);
    }

    fn set_structure_material(&mut self, surface: SurfaceId, shading: &StructureShading) {
        self.structures.insert(surface, *shading);
    }

    fn clear_stage_materials(&mut self) {
        self.screens.clear();
        self.structures.clear();
    }

    fn set_point_lights(&mut self, lights: &[PointLight]) {
        self.lights = lights.to_vec();
    }

    fn set_lighting(&mut self, lighting: &Lighting) {
        self.lighting = Some(*lighting);
    }

    fn set_grid(&mut self, grid: &GridSettings) {
        self.grid = Some(*grid);
    }

    fn set_post_process(&mut self, post: &PostProcess) {
        self.post = Some(*post);
    }
}
