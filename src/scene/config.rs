#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::{clamp, EnvironmentRequest, SourceFormat, MAX_ENVIRONMENT_INTENSITY};
use cgmath::{InnerSpace, Vector3};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};
use thiserror::Error;

/// Schema version written by this crate.
///
/// Version 1 records stored the sun as a world-space `sunPosition` vector.
pub const SCENE_CONFIG_VERSION: u32 = 2;

/// Distance at which the sun light is placed from the stage origin.
pub const SUN_DISTANCE: f32 = 15.0;

pub const NO_HDRI_PRESET: &str = "none";
pub const CUSTOM_HDRI_PRESET: &str = "custom";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HDRI listing rejected: {0}")]
    Listing(String),
}

/// Flat, persisted scene configuration.
///
/// Every field is optional on read; missing fields take the defaults below so
/// records written by older versions stay loadable.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, SmartDefault)]
#[serde(default, rename_all = "camelCase")]
pub struct SceneConfig {
    #[default(SCENE_CONFIG_VERSION)]
    pub version: u32,

    #[default(FRAC_PI_4)]
    pub sun_azimuth: f32,
    #[default(FRAC_PI_4)]
    pub sun_elevation: f32,
    #[default(1.0)]
    pub sun_intensity: f32,

    #[default(1.0)]
    pub grid_cell_size: f32,

    #[default(String::from(NO_HDRI_PRESET))]
    pub hdri_preset: String,
    #[default(None)]
    pub custom_hdri_url: Option<String>,
    #[default(None)]
    pub custom_hdri_format: Option<SourceFormat>,
    #[default(0.0)]
    pub hdri_rotation_x: f32,
    #[default(0.0)]
    pub hdri_rotation_y: f32,
    #[default(1.0)]
    pub env_intensity: f32,
    #[default(0.0)]
    pub bg_blur: f32,
    #[default(false)]
    pub show_hdri_background: bool,

    #[default(0.3)]
    pub bloom_strength: f32,
    #[default(1.2)]
    pub bloom_threshold: f32,

    #[default(true)]
    pub protect_led: bool,
    #[default(true)]
    pub ambient_follows_sun: bool,
    #[default(true)]
    pub floor_reflection: bool,

    /// Legacy world-space sun position, folded into the angles on read.
    #[serde(skip_serializing)]
    #[default(None)]
    pub sun_position: Option<[f32; 3]>,
}

impl SceneConfig {
    /// Parses a persisted configuration, upgrading and clamping it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;

        Ok(config.normalized())
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Upgrades legacy fields and clamps every value into its valid range.
    pub fn normalized(mut self) -> Self {
        if let Some(position) = self.sun_position.take() {
            let position = Vector3::from(position);

            if position.magnitude2() > 0.0 && position.magnitude2().is_finite() {
                let direction = position.normalize();

                self.sun_elevation = direction.y.asin();
                self.sun_azimuth = direction.x.atan2(direction.z);
            } else {
                warn!("ignoring degenerate legacy sun position {:?}", position);
            }
        }

        self.version = SCENE_CONFIG_VERSION;

        self.sun_azimuth = finite_or(self.sun_azimuth, FRAC_PI_4);
        self.sun_elevation = clamp(finite_or(self.sun_elevation, FRAC_PI_4), -FRAC_PI_2, FRAC_PI_2);
        self.sun_intensity = clamp(self.sun_intensity, 0.0, 3.0);
        self.grid_cell_size = clamp(finite_or(self.grid_cell_size, 1.0), 0.01, 100.0);
        self.hdri_rotation_x = finite_or(self.hdri_rotation_x, 0.0);
        self.hdri_rotation_y = finite_or(self.hdri_rotation_y, 0.0);
        self.env_intensity = clamp(self.env_intensity, 0.0, MAX_ENVIRONMENT_INTENSITY);
        self.bg_blur = clamp(self.bg_blur, 0.0, 1.0);
        self.bloom_strength = clamp(self.bloom_strength, 0.0, 3.0);
        self.bloom_threshold = clamp(self.bloom_threshold, 0.0, 10.0);

        if self.hdri_preset.trim().is_empty() {
            self.hdri_preset = String::from(NO_HDRI_PRESET);
        }

        self
    }

    /// Unit vector pointing from the stage origin towards the sun.
    pub fn sun_direction(&self) -> Vector3<f32> {
        let (az, el) = (self.sun_azimuth, self.sun_elevation);

        Vector3::new(el.cos() * az.sin(), el.sin(), el.cos() * az.cos())
    }

    pub fn sun_position(&self) -> [f32; 3] {
        (self.sun_direction() * SUN_DISTANCE).into()
    }

    /// Derives the environment request for the current HDRI selection.
    ///
    /// Unknown preset ids resolve to no environment.
    pub fn environment_request(&self, catalog: &HdriCatalog) -> EnvironmentRequest {
        let (source_url, source_format) = match self.hdri_preset.as_str() {
            NO_HDRI_PRESET => (None, None),
            CUSTOM_HDRI_PRESET => (self.custom_hdri_url.clone(), self.custom_hdri_format),
            id => match catalog.get(id) {
                Some(preset) => (preset.url.clone(), None),
                None => {
                    warn!("unknown HDRI preset `{}', disabling environment", id);
                    (None, None)
                }
            },
        };

        EnvironmentRequest {
            source_url,
            source_format,
            rotation_x: self.hdri_rotation_x,
            rotation_y: self.hdri_rotation_y,
            show_as_background: self.show_hdri_background,
            background_blur: self.bg_blur,
            intensity: self.env_intensity,
        }
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct HdriPreset {
    pub id: String,
    pub label: String,
    pub url: Option<String>,
}

/// Selectable environment presets.
///
/// The builtin `none` preset always comes first.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HdriCatalog {
    presets: Vec<HdriPreset>,
}

#[derive(Deserialize)]
struct HdriListing {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    hdris: Option<Vec<ListedHdri>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ListedHdri {
    #[serde(default)]
    name: Option<String>,
    filename: String,
    url: String,
}

impl HdriCatalog {
    pub fn builtin() -> Self {
        Self {
            presets: vec![HdriPreset {
                id: String::from(NO_HDRI_PRESET),
                label: String::from("Off"),
                url: None,
            }],
        }
    }

    /// Builds a catalog from a remote HDRI listing response.
    pub fn from_listing(json: &str) -> Result<Self, ConfigError> {
        let listing: HdriListing = serde_json::from_str(json)?;

        let hdris = match (listing.success, listing.hdris) {
            (true, Some(hdris)) => hdris,
            _ => {
                return Err(ConfigError::Listing(
                    listing.error.unwrap_or_else(|| String::from("invalid response")),
                ))
            }
        };

        let mut catalog = Self::builtin();

        for hdri in hdris {
            let name = hdri.name.filter(|name| !name.is_empty());
            let filename = &hdri.filename;

            let label = name.clone().unwrap_or_else(|| match filename.rsplit_once('.') {
                Some((stem, _)) => stem.to_owned(),
                None => filename.clone(),
            });

            let id = name.unwrap_or_else(|| filename.clone());

            if catalog.get(&id).is_some() {
                warn!("duplicate HDRI preset `{}' in listing, skipping", id);
                continue;
            }

            catalog.presets.push(HdriPreset {
                id,
                label,
                url: Some(hdri.url),
            });
        }

        info!("HDRI catalog holds {} presets", catalog.presets.len());

        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Option<&HdriPreset> {
        self.presets.iter().find(|preset| preset.id == id)
    }

    pub fn presets(&self) -> &[HdriPreset] {
        &self.presets
    }
}

impl Default for HdriCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_record_takes_documented_defaults() {
        let config = SceneConfig::from_json("{}").unwrap();

        assert_eq!(config, SceneConfig::default());
        assert_eq!(config.hdri_preset, "none");
        assert_eq!(config.bloom_threshold, 1.2);
        assert!(config.protect_led);
    }

    #[test]
    fn round_trips_through_json() {
        let config = SceneConfig {
            hdri_preset: String::from(CUSTOM_HDRI_PRESET),
            custom_hdri_url: Some(String::from("https://cdn.io/p/environment.exr")),
            hdri_rotation_y: 1.25,
            env_intensity: 2.0,
            bg_blur: 0.4,
            show_hdri_background: true,
            protect_led: false,
            ..SceneConfig::default()
        };

        let json = config.to_json().unwrap();
        assert_eq!(SceneConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn upgrades_legacy_sun_position() {
        let json = r#"{ "sunPosition": [0.0, 15.0, 0.0], "envIntensity": 9.0 }"#;
        let config = SceneConfig::from_json(json).unwrap();

        assert!((config.sun_elevation - FRAC_PI_2).abs() < 1e-4);
        assert_eq!(config.env_intensity, MAX_ENVIRONMENT_INTENSITY);
        assert_eq!(config.version, SCENE_CONFIG_VERSION);
        assert!(!config.to_json().unwrap().contains("sunPosition"));
    }

    #[test]
    fn sun_position_matches_angles() {
        let config = SceneConfig::default();
        let [x, y, z] = config.sun_position();

        // 45° azimuth and elevation put the sun at equal x/z offsets
        assert!((x - z).abs() < 1e-4);
        assert!((y - SUN_DISTANCE * FRAC_PI_4.sin()).abs() < 1e-4);
    }

    #[test]
    fn resolves_presets_against_catalog() {
        let catalog = HdriCatalog::from_listing(
            r#"{ "success": true, "hdris": [
                { "name": "Studio", "filename": "studio.hdr", "url": "https://nas/studio.hdr" },
                { "filename": "dusk_4k.exr", "url": "https://nas/dusk_4k.exr" }
            ] }"#,
        )
        .unwrap();

        assert_eq!(catalog.presets().len(), 3);
        assert_eq!(catalog.get("dusk_4k.exr").unwrap().label, "dusk_4k");

        let mut config = SceneConfig {
            hdri_preset: String::from("Studio"),
            ..SceneConfig::default()
        };

        let request = config.environment_request(&catalog);
        assert_eq!(request.source_url.as_deref(), Some("https://nas/studio.hdr"));

        config.hdri_preset = String::from("missing");
        assert_eq!(config.environment_request(&catalog).source_url, None);
    }

    #[test]
    fn rejects_failed_listing() {
        let error = HdriCatalog::from_listing(r#"{ "success": false, "error": "offline" }"#);

        assert!(matches!(error, Err(ConfigError::Listing(reason)) if reason == "offline"));
    }
}
