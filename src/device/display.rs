use crate::{SceneConfig, GLOW_TARGET};
use serde::Serialize;
use zerocopy::{AsBytes, FromBytes};

/// Ambient light level relative to the sun intensity.
pub const AMBIENT_FACTOR: f32 = 0.3;
/// Major grid lines are drawn every this many cells.
pub const GRID_SECTION_CELLS: f32 = 5.0;

/// Filmic tone mapping with an exposure multiplier.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ToneMapping {
    pub exposure: f32,
}

impl Default for ToneMapping {
    fn default() -> Self {
        Self { exposure: 1.0 }
    }
}

impl ToneMapping {
    /// CPU reference of the tone curve `background.frag` applies to the
    /// exposed radiance.
    pub fn apply(&self, color: [f32; 3]) -> [f32; 3] {
        let mut out = color;

        for channel in out.iter_mut() {
            *channel = aces_filmic(*channel * self.exposure);
        }

        out
    }
}

/// Narkowicz's fit of the ACES reference rendering transform.
pub fn aces_filmic(x: f32) -> f32 {
    let x = x.max(0.0);

    ((x * (2.51 * x + 0.03)) / (x * (2.43 * x + 0.59) + 0.14)).min(1.0)
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Bloom {
    pub strength: f32,
    /// Luminance above which pixels contribute to bloom.
    pub threshold: f32,
}

impl Bloom {
    /// CPU reference of the bright pass fed by the `bloom_threshold` and
    /// `bloom_strength` uniforms.
    pub fn contribution(&self, luminance: f32) -> f32 {
        (luminance - self.threshold).max(0.0) * self.strength
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PostProcess {
    pub tone_mapping: ToneMapping,
    pub bloom: Bloom,
}

impl PostProcess {
    /// While screens are protected the bloom threshold never drops below the
    /// glow target, so unlit screen pixels cannot bloom.
    pub fn from_config(config: &SceneConfig) -> Self {
        let threshold = if config.protect_led {
            config.bloom_threshold.max(GLOW_TARGET)
        } else {
            config.bloom_threshold
        };

        Self {
            tone_mapping: ToneMapping::default(),
            bloom: Bloom {
                strength: config.bloom_strength,
                threshold,
            },
        }
    }

    pub(crate) fn data(&self) -> PostProcessData {
        PostProcessData {
            exposure: self.tone_mapping.exposure,
            bloom_strength: self.bloom.strength,
            bloom_threshold: self.bloom.threshold,
            padding: 0.0,
        }
    }
}

impl Default for PostProcess {
    fn default() -> Self {
        Self::from_config(&SceneConfig::default())
    }
}

#[repr(align(16), C)]
#[derive(AsBytes, FromBytes, Debug, Default)]
pub struct PostProcessData {
    exposure: f32,
    bloom_strength: f32,
    bloom_threshold: f32,
    padding: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Lighting {
    pub sun_position: [f32; 3],
    pub sun_direction: [f32; 3],
    pub sun_intensity: f32,
    pub ambient_intensity: f32,
}

impl Lighting {
    pub fn from_config(config: &SceneConfig) -> Self {
        let ambient_intensity = if config.ambient_follows_sun {
            AMBIENT_FACTOR * config.sun_intensity
        } else {
            AMBIENT_FACTOR
        };

        Self {
            sun_position: config.sun_position(),
            sun_direction: config.sun_direction().into(),
            sun_intensity: config.sun_intensity,
            ambient_intensity,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GridSettings {
    pub cell_size: f32,
    pub section_size: f32,
    pub floor_reflection: bool,
}

impl GridSettings {
    pub fn from_config(config: &SceneConfig) -> Self {
        Self {
            cell_size: config.grid_cell_size,
            section_size: config.grid_cell_size * GRID_SECTION_CELLS,
            floor_reflection: config.floor_reflection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protected_screens_raise_bloom_threshold() {
        let mut config = SceneConfig {
            bloom_threshold: 0.8,
            ..SceneConfig::default()
        };

        assert_eq!(PostProcess::from_config(&config).bloom.threshold, 1.5);

        config.bloom_threshold = 2.5;
        assert_eq!(PostProcess::from_config(&config).bloom.threshold, 2.5);

        config.bloom_threshold = 0.8;
        config.protect_led = false;
        assert_eq!(PostProcess::from_config(&config).bloom.threshold, 0.8);
    }

    #[test]
    fn ambient_follows_sun_when_coupled() {
        let mut config = SceneConfig {
            sun_intensity: 2.0,
            ..SceneConfig::default()
        };

        assert!((Lighting::from_config(&config).ambient_intensity - 0.6).abs() < 1e-6);

        config.ambient_follows_sun = false;
        assert!((Lighting::from_config(&config).ambient_intensity - 0.3).abs() < 1e-6);
    }

    #[test]
    fn sun_is_placed_along_its_direction() {
        let config = SceneConfig {
            sun_azimuth: 0.0,
            sun_elevation: std::f32::consts::FRAC_PI_2,
            ..SceneConfig::default()
        };

        let lighting = Lighting::from_config(&config);
        assert!((lighting.sun_position[1] - 15.0).abs() < 1e-4);
        assert!(lighting.sun_position[0].abs() < 1e-4);
    }

    #[test]
    fn grid_sections_span_five_cells() {
        let config = SceneConfig {
            grid_cell_size: 0.5,
            ..SceneConfig::default()
        };

        assert_eq!(GridSettings::from_config(&config).section_size, 2.5);
    }

    #[test]
    fn tone_mapping_is_monotonic_and_bounded() {
        let mut previous = 0.0;

        for step in 0..100 {
            let value = aces_filmic(step as f32 * 0.25);
            assert!(value >= previous && value <= 1.0);
            previous = value;
        }

        assert_eq!(aces_filmic(-1.0), 0.0);
    }

    #[test]
    fn exposure_scales_before_the_curve() {
        let tone_mapping = ToneMapping { exposure: 2.0 };
        let [r, g, _] = tone_mapping.apply([0.25, 0.5, 0.0]);

        assert!((r - aces_filmic(0.5)).abs() < 1e-6);
        assert!((g - aces_filmic(1.0)).abs() < 1e-6);
    }

    #[test]
    fn only_light_above_the_threshold_blooms() {
        let bloom = PostProcess::default().bloom;

        assert_eq!(bloom.contribution(1.0), 0.0);
        assert!((bloom.contribution(2.5) - 0.3).abs() < 1e-6);
    }
}
