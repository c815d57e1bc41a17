#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::{clamp, Backend, FeedId, Rgb, ScreenCrop, StageModel, SurfaceId, UvTransform};
use cgmath::{InnerSpace, Vector3};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Emissive strength reached by glowing screens once faded in.
pub const GLOW_TARGET: f32 = 1.5;
/// Time taken by a glowing screen to ramp up after a feed change.
pub const FADE_DURATION: Duration = Duration::from_millis(500);

/// Distance of a screen light in front of its surface, in metres.
pub const SCREEN_LIGHT_OFFSET: f32 = 0.5;
/// Point light intensity per unit of light level.
pub const SCREEN_LIGHT_GAIN: f32 = 2.0;

const ROUGHNESS_RANGE: (f32, f32) = (0.15, 0.9);
const MAX_METALNESS: f32 = 0.6;
const REFLECTION_FACTOR: f32 = 0.6;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenMode {
    /// Unlit and untouched by tone mapping; pixel-exact.
    Protected,
    /// Emissive, lit by the environment and feeding bloom.
    Glow,
}

impl ScreenMode {
    pub fn from_protection(protect_led: bool) -> Self {
        if protect_led {
            Self::Protected
        } else {
            Self::Glow
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FadeState {
    Dark,
    /// Time elapsed since the fade started.
    FadingIn(Duration),
    Steady,
}

/// Material state of a single screen surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenMaterial {
    mode: ScreenMode,
    fade: FadeState,
}

impl ScreenMaterial {
    pub fn new(mode: ScreenMode) -> Self {
        Self {
            mode,
            fade: FadeState::Dark,
        }
    }

    pub fn mode(&self) -> ScreenMode {
        self.mode
    }

    pub fn fade_state(&self) -> FadeState {
        self.fade
    }

    /// Fade progress in `[0, 1]`.
    pub fn fade_progress(&self) -> f32 {
        match self.fade {
            FadeState::Dark => 0.0,
            FadeState::FadingIn(elapsed) => {
                clamp(elapsed.as_secs_f32() / FADE_DURATION.as_secs_f32(), 0.0, 1.0)
            }
            FadeState::Steady => 1.0,
        }
    }

    /// Current emissive multiplier; protected screens emit nothing.
    pub fn emissive_strength(&self) -> f32 {
        match self.mode {
            ScreenMode::Protected => 0.0,
            ScreenMode::Glow => GLOW_TARGET * self.fade_progress(),
        }
    }

    /// Restarts the fade, as happens whenever the bound feed changes.
    pub fn reset(&mut self) {
        self.fade = FadeState::Dark;
    }

    /// Returns whether the emissive strength changed.
    pub fn advance(&mut self, dt: Duration) -> bool {
        if self.mode == ScreenMode::Protected {
            return false;
        }

        let elapsed = match self.fade {
            FadeState::Dark => dt,
            FadeState::FadingIn(elapsed) => elapsed + dt,
            FadeState::Steady => return false,
        };

        self.fade = if elapsed >= FADE_DURATION {
            FadeState::Steady
        } else {
            FadeState::FadingIn(elapsed)
        };

        true
    }

    /// Visible colour of the surface for a feed texel.
    ///
    /// Glowing screens are scaled down by the glow target so that only the
    /// bloom, never the surface itself, exceeds the protected output.
    pub fn shade(&self, texel: [f32; 3]) -> [f32; 3] {
        match self.mode {
            ScreenMode::Protected => texel,
            ScreenMode::Glow => scale(texel, self.emissive_strength() / GLOW_TARGET),
        }
    }

    /// Radiance the surface contributes to the bloom pass.
    pub fn bloom_input(&self, texel: [f32; 3]) -> [f32; 3] {
        match self.mode {
            ScreenMode::Protected => texel,
            ScreenMode::Glow => scale(texel, self.emissive_strength()),
        }
    }
}

fn scale(texel: [f32; 3], factor: f32) -> [f32; 3] {
    let [r, g, b] = texel;

    [r * factor, g * factor, b * factor]
}

/// Material parameters written to a screen surface.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenShading {
    pub mode: ScreenMode,
    pub feed: Option<FeedId>,
    pub uv: UvTransform,
    pub emissive_strength: f32,
    pub lit: bool,
    pub tone_mapped: bool,
}

/// Material parameters written to a non-screen stage surface.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureShading {
    pub roughness: f32,
    pub metalness: f32,
    pub reflection: f32,
}

impl StructureShading {
    pub fn new(roughness: f32, metalness: f32, env_intensity: f32) -> Self {
        Self {
            roughness: clamp(roughness, ROUGHNESS_RANGE.0, ROUGHNESS_RANGE.1),
            metalness: clamp(metalness, 0.0, MAX_METALNESS),
            reflection: REFLECTION_FACTOR * env_intensity,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PointLight {
    pub surface: SurfaceId,
    pub position: [f32; 3],
    pub color: Rgb,
    pub intensity: f32,
}

#[derive(Clone, Debug)]
struct Screen {
    surface: SurfaceId,
    light_position: [f32; 3],
    material: ScreenMaterial,
}

#[derive(Clone, Debug)]
struct Structure {
    surface: SurfaceId,
    roughness: f32,
    metalness: f32,
}

/// Drives the materials of the screen and structure surfaces of the stage.
#[derive(Debug)]
pub struct LedController {
    screens: Vec<Screen>,
    structures: Vec<Structure>,
    feed: Option<FeedId>,
    mode: ScreenMode,
    env_intensity: f32,
    crop: ScreenCrop,
    lights: Vec<PointLight>,
}

impl Default for LedController {
    fn default() -> Self {
        Self::new()
    }
}

impl LedController {
    pub fn new() -> Self {
        Self {
            screens: Vec::new(),
            structures: Vec::new(),
            feed: None,
            mode: ScreenMode::Protected,
            env_intensity: 1.0,
            crop: ScreenCrop::default(),
            lights: Vec::new(),
        }
    }

    /// Indexes the surfaces of a freshly loaded stage and writes every
    /// material. The index is not rebuilt until the next stage load.
    pub fn apply_to_stage<B: Backend>(
        &mut self,
        backend: &mut B,
        stage: &StageModel,
        feed: Option<FeedId>,
        mode: ScreenMode,
        env_intensity: f32,
    ) {
        self.clear(backend);

        self.feed = feed;
        self.mode = mode;
        self.env_intensity = env_intensity;

        for (surface, info) in stage.surfaces() {
            if info.is_screen() {
                let center = Vector3::from(info.center);
                let normal = Vector3::from(info.normal);

                let normal = if normal.magnitude2() > 0.0 {
                    normal.normalize()
                } else {
                    Vector3::unit_z()
                };

                self.screens.push(Screen {
                    surface,
                    light_position: (center + normal * SCREEN_LIGHT_OFFSET).into(),
                    material: ScreenMaterial::new(mode),
                });
            } else {
                self.structures.push(Structure {
                    surface,
                    roughness: info.roughness,
                    metalness: info.metalness,
                });
            }
        }

        if self.screens.is_empty() {
            warn!("stage `{}' has no LED screen surfaces", stage.url);
        } else {
            info!("stage `{}' has {} LED screens", stage.url, self.screens.len());
        }

        self.push_screens(backend);
        self.push_structures(backend);
    }

    /// Forgets the indexed stage, clearing its materials and lights.
    pub fn clear<B: Backend>(&mut self, backend: &mut B) {
        if !self.screens.is_empty() || !self.structures.is_empty() {
            backend.clear_stage_materials();
        }

        if !self.lights.is_empty() {
            self.lights.clear();
            backend.set_point_lights(&[]);
        }

        self.screens.clear();
        self.structures.clear();
    }

    pub fn screens_found(&self) -> bool {
        !self.screens.is_empty()
    }

    pub fn screens(&self) -> impl Iterator<Item = (SurfaceId, &ScreenMaterial)> {
        self.screens
            .iter()
            .map(|screen| (screen.surface, &screen.material))
    }

    pub fn mode(&self) -> ScreenMode {
        self.mode
    }

    pub fn set_feed<B: Backend>(&mut self, backend: &mut B, feed: Option<FeedId>) {
        if self.feed == feed {
            return;
        }

        self.feed = feed;

        for screen in &mut self.screens {
            screen.material.reset();
        }

        self.push_screens(backend);
    }

    pub fn set_mode<B: Backend>(&mut self, backend: &mut B, mode: ScreenMode) {
        if self.mode == mode {
            return;
        }

        debug!("switching screens to {:?}", mode);

        self.mode = mode;

        for screen in &mut self.screens {
            screen.material = ScreenMaterial::new(mode);
        }

        self.push_screens(backend);
    }

    pub fn set_env_intensity<B: Backend>(&mut self, backend: &mut B, env_intensity: f32) {
        if self.env_intensity == env_intensity {
            return;
        }

        self.env_intensity = env_intensity;
        self.push_structures(backend);
    }

    pub fn set_crop<B: Backend>(&mut self, backend: &mut B, crop: ScreenCrop) {
        let crop = crop.normalized();

        if self.crop == crop {
            return;
        }

        self.crop = crop;
        self.push_screens(backend);
    }

    /// Advances the emissive fades. Screens without a feed stay dark.
    pub fn advance<B: Backend>(&mut self, backend: &mut B, dt: Duration) {
        if self.feed.is_none() {
            return;
        }

        let mut changed = false;

        for screen in &mut self.screens {
            changed |= screen.material.advance(dt);
        }

        if changed {
            self.push_screens(backend);
        }
    }

    /// Places one light in front of every screen; a zero light level
    /// removes them all.
    pub fn update_point_lights<B: Backend>(&mut self, backend: &mut B, color: Rgb, light_level: f32) {
        let lights: Vec<PointLight> = if light_level > 0.0 {
            self.screens
                .iter()
                .map(|screen| PointLight {
                    surface: screen.surface,
                    position: screen.light_position,
                    color,
                    intensity: SCREEN_LIGHT_GAIN * light_level,
                })
                .collect()
        } else {
            Vec::new()
        };

        if lights != self.lights {
            backend.set_point_lights(&lights);
            self.lights = lights;
        }
    }

    pub fn point_lights(&self) -> &[PointLight] {
        &self.lights
    }

    fn push_screens<B: Backend>(&self, backend: &mut B) {
        let uv = self.crop.uv_transform();

        for screen in &self.screens {
            let material = &screen.material;
            let glow = material.mode() == ScreenMode::Glow;

            backend.set_screen_material(
                screen.surface,
                &ScreenShading {
                    mode: material.mode(),
                    feed: self.feed,
                    uv,
                    emissive_strength: material.emissive_strength(),
                    lit: glow,
                    tone_mapped: glow,
                },
            );
        }
    }

    fn push_structures<B: Backend>(&self, backend: &mut B) {
        for structure in &self.structures {
            backend.set_structure_material(
                structure.surface,
                &StructureShading::new(structure.roughness, structure.metalness, self.env_intensity),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXELS: [[f32; 3]; 4] = [
        [1.0, 1.0, 1.0],
        [0.25, 0.5, 0.75],
        [0.0, 0.0, 0.0],
        [0.9, 0.1, 0.4],
    ];

    #[test]
    fn protected_output_is_exact() {
        let material = ScreenMaterial::new(ScreenMode::Protected);

        for texel in &TEXELS {
            assert_eq!(material.shade(*texel), *texel);
            assert_eq!(material.bloom_input(*texel), *texel);
        }

        assert_eq!(material.emissive_strength(), 0.0);
    }

    #[test]
    fn glow_never_outshines_protected_while_fading() {
        let protected = ScreenMaterial::new(ScreenMode::Protected);
        let mut glow = ScreenMaterial::new(ScreenMode::Glow);

        for _ in 0..40 {
            for texel in &TEXELS {
                let lit = glow.shade(*texel);
                let exact = protected.shade(*texel);

                for channel in 0..3 {
                    assert!(lit[channel] <= exact[channel]);
                }
            }

            glow.advance(Duration::from_millis(16));
        }

        assert_eq!(glow.fade_state(), FadeState::Steady);
        assert_eq!(glow.emissive_strength(), GLOW_TARGET);
        assert_eq!(glow.bloom_input([1.0, 0.5, 0.0]), [1.5, 0.75, 0.0]);
    }

    #[test]
    fn fade_walks_dark_fading_steady() {
        let mut glow = ScreenMaterial::new(ScreenMode::Glow);
        assert_eq!(glow.fade_state(), FadeState::Dark);

        assert!(glow.advance(Duration::from_millis(250)));
        assert_eq!(glow.fade_state(), FadeState::FadingIn(Duration::from_millis(250)));
        assert!((glow.emissive_strength() - 0.75).abs() < 1e-6);

        assert!(glow.advance(Duration::from_millis(250)));
        assert_eq!(glow.fade_state(), FadeState::Steady);
        assert!(!glow.advance(Duration::from_millis(250)));

        glow.reset();
        assert_eq!(glow.fade_state(), FadeState::Dark);
    }

    #[test]
    fn protected_screens_do_not_fade() {
        let mut material = ScreenMaterial::new(ScreenMode::Protected);

        assert!(!material.advance(Duration::from_secs(1)));
        assert_eq!(material.fade_state(), FadeState::Dark);
    }

    #[test]
    fn structure_materials_are_clamped() {
        let shading = StructureShading::new(0.01, 0.95, 2.0);

        assert_eq!(shading.roughness, 0.15);
        assert_eq!(shading.metalness, 0.6);
        assert!((shading.reflection - 1.2).abs() < 1e-6);

        assert_eq!(StructureShading::new(1.0, -1.0, 0.0).roughness, 0.9);
    }
}
