use cgmath::{Matrix3, Rad};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use std::f32::consts::PI;
use thiserror::Error;

/// Maximum environment intensity accepted by the renderer.
pub const MAX_ENVIRONMENT_INTENSITY: f32 = 3.0;

/// Pixel encoding of an equirectangular environment image.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Hdr,
    Exr,
}

impl SourceFormat {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "hdr" | "rgbe" | "pic" => Some(Self::Hdr),
            "exr" => Some(Self::Exr),
            _ => None,
        }
    }

    /// Resolves a format from the path extension of a remote URL.
    ///
    /// Local preview handles (`blob:` and `data:` references) carry no
    /// meaningful extension and never resolve.
    pub fn sniff(url: &str) -> Option<Self> {
        if url.starts_with("blob:") || url.starts_with("data:") {
            return None;
        }

        let path = url.split(|c| c == '?' || c == '#').next()?;
        let file_name = path.rsplit('/').next()?;
        let (_, extension) = file_name.rsplit_once('.')?;

        Self::from_extension(extension)
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Hdr => "hdr",
            Self::Exr => "exr",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum SourceError {
    #[error("environment source reference is empty")]
    Empty,
    #[error("malformed environment source reference `{0}'")]
    Malformed(String),
    #[error("cannot tell whether `{0}' is an HDR or EXR image; specify a format")]
    UnknownFormat(String),
}

/// Identifies the data that produced a decoded environment texture.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SourceKey {
    pub url: String,
    pub format: SourceFormat,
}

/// Horizontal and vertical rotation of an environment map, in radians.
///
/// Both angles are wrapped into `[0, 2π)` on construction so equivalent
/// rotations compare equal.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rotation {
    x: f32,
    y: f32,
}

impl Rotation {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x: wrap_angle(x),
            y: wrap_angle(y),
        }
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }

    /// Returns the matrix rotating a world direction into source image space.
    ///
    /// Yaw is applied about +Y first, then pitch about +X.
    pub fn matrix(&self) -> Matrix3<f32> {
        Matrix3::from_angle_x(Rad(self.x)) * Matrix3::from_angle_y(Rad(self.y))
    }
}

fn wrap_angle(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }

    let wrapped = angle.rem_euclid(2.0 * PI);

    // rem_euclid can round up to exactly 2π for tiny negative inputs
    if wrapped >= 2.0 * PI {
        0.0
    } else {
        wrapped
    }
}

/// Scene-graph properties of an applied environment that can change without
/// regenerating any texture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Presentation {
    pub intensity: f32,
    pub show_as_background: bool,
    pub background_blur: f32,
}

impl Default for Presentation {
    fn default() -> Self {
        Self {
            intensity: 1.0,
            show_as_background: false,
            background_blur: 0.0,
        }
    }
}

/// Desired environment state, supplied on every reconciliation.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, SmartDefault)]
#[serde(default, rename_all = "camelCase")]
pub struct EnvironmentRequest {
    #[default(None)]
    pub source_url: Option<String>,
    #[default(None)]
    pub source_format: Option<SourceFormat>,
    #[default(0.0)]
    pub rotation_x: f32,
    #[default(0.0)]
    pub rotation_y: f32,
    #[default(false)]
    pub show_as_background: bool,
    #[default(0.0)]
    pub background_blur: f32,
    #[default(1.0)]
    pub intensity: f32,
}

impl EnvironmentRequest {
    /// A request clearing any applied environment.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_source(url: impl Into<String>, format: Option<SourceFormat>) -> Self {
        Self {
            source_url: Some(url.into()),
            source_format: format,
            ..Self::default()
        }
    }

    pub fn rotation(&self) -> Rotation {
        Rotation::new(self.rotation_x, self.rotation_y)
    }

    pub fn presentation(&self) -> Presentation {
        Presentation {
            intensity: clamp(self.intensity, 0.0, MAX_ENVIRONMENT_INTENSITY),
            show_as_background: self.show_as_background,
            background_blur: clamp(self.background_blur, 0.0, 1.0),
        }
    }

    /// Validates the source reference and resolves its format.
    ///
    /// Returns `Ok(None)` when no environment is requested. An explicit
    /// `source_format` always wins over the URL extension.
    pub fn source_key(&self) -> Result<Option<SourceKey>, SourceError> {
        let url = match &self.source_url {
            Some(url) => url.trim(),
            None => return Ok(None),
        };

        if url.is_empty() {
            return Err(SourceError::Empty);
        }

        if !is_well_formed(url) {
            return Err(SourceError::Malformed(url.to_owned()));
        }

        let format = self
            .source_format
            .or_else(|| SourceFormat::sniff(url))
            .ok_or_else(|| SourceError::UnknownFormat(url.to_owned()))?;

        Ok(Some(SourceKey {
            url: url.to_owned(),
            format,
        }))
    }
}

fn is_well_formed(url: &str) -> bool {
    if url.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return false;
    }

    for scheme in &["https://", "http://"] {
        if let Some(rest) = url.strip_prefix(scheme) {
            return rest.split('/').next().map_or(false, |host| !host.is_empty());
        }
    }

    for scheme in &["blob:", "data:"] {
        if let Some(rest) = url.strip_prefix(scheme) {
            return !rest.is_empty();
        }
    }

    // relative references may not carry any other scheme
    let head = url.split(|c| c == '/' || c == '?' || c == '#').next().unwrap_or(url);
    !head.contains(':')
}

pub(crate) fn clamp(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        min
    } else {
        value.max(min).min(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_format_from_path_extension() {
        assert_eq!(
            SourceFormat::sniff("https://cdn.example.com/hdri/studio.HDR?v=3"),
            Some(SourceFormat::Hdr)
        );
        assert_eq!(
            SourceFormat::sniff("https://cdn.example.com/a.exr#frag"),
            Some(SourceFormat::Exr)
        );
        assert_eq!(SourceFormat::sniff("https://cdn.example.com/noext"), None);
        assert_eq!(
            SourceFormat::sniff("blob:https://app.example.com/7f1c-hdr"),
            None
        );
    }

    #[test]
    fn local_preview_handles_need_an_explicit_format() {
        let mut request = EnvironmentRequest::from_source("blob:https://app/1234", None);

        assert_eq!(
            request.source_key(),
            Err(SourceError::UnknownFormat("blob:https://app/1234".into()))
        );

        request.source_format = Some(SourceFormat::Exr);

        let key = request.source_key().unwrap().unwrap();
        assert_eq!(key.format, SourceFormat::Exr);
    }

    #[test]
    fn explicit_format_overrides_extension() {
        let request =
            EnvironmentRequest::from_source("https://x.io/file.hdr", Some(SourceFormat::Exr));

        assert_eq!(
            request.source_key().unwrap().unwrap().format,
            SourceFormat::Exr
        );
    }

    #[test]
    fn rejects_malformed_references() {
        for url in &["   ", "ftp://x/a.hdr", "https:///a.hdr", "hdri a.hdr", "blob:"] {
            let request = EnvironmentRequest::from_source(*url, Some(SourceFormat::Hdr));
            assert!(request.source_key().is_err(), "accepted {:?}", url);
        }

        assert_eq!(EnvironmentRequest::none().source_key(), Ok(None));
    }

    #[test]
    fn accepts_relative_references() {
        for url in &["hdri-a.hdr", "/hdri/studio.exr", "../env/a.hdr?v=2"] {
            let request = EnvironmentRequest::from_source(*url, None);
            assert!(request.source_key().is_ok(), "rejected {:?}", url);
        }
    }

    #[test]
    fn rotation_wraps_at_two_pi() {
        let a = Rotation::new(2.0 * PI + 0.5, -0.25);

        assert!((a.x() - 0.5).abs() < 1e-5);
        assert!((a.y() - (2.0 * PI - 0.25)).abs() < 1e-5);
        assert_eq!(Rotation::new(f32::NAN, f32::INFINITY), Rotation::default());
    }

    #[test]
    fn presentation_is_clamped() {
        let request = EnvironmentRequest {
            intensity: 7.0,
            background_blur: -1.0,
            ..EnvironmentRequest::from_source("/a.hdr", None)
        };

        let presentation = request.presentation();
        assert_eq!(presentation.intensity, MAX_ENVIRONMENT_INTENSITY);
        assert_eq!(presentation.background_blur, 0.0);
    }
}
