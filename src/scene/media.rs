use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    /// Classifies an uploaded file by its MIME type.
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("image/") {
            Self::Image
        } else {
            Self::Video
        }
    }
}

/// A playlist entry; `external` clips are already hosted and never uploaded.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct MediaClip {
    pub id: u64,
    pub name: String,
    pub url: String,
    pub kind: MediaKind,
    #[serde(default)]
    pub external: bool,
}

/// Linear RGB colour with components in `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Rgb(pub [f32; 3]);

impl Rgb {
    pub const BLACK: Self = Self([0.0; 3]);
    pub const WHITE: Self = Self([1.0; 3]);

    /// Rec. 709 luma.
    pub fn luma(&self) -> f32 {
        let [r, g, b] = self.0;

        r.mul_add(0.2126, g.mul_add(0.7152, b * 0.0722))
    }

    /// Pushes each channel away from the luma by `factor`, clamping.
    pub fn saturated(&self, factor: f32) -> Self {
        let luma = self.luma();
        let mut out = self.0;

        for channel in out.iter_mut() {
            *channel = (luma + (*channel - luma) * factor).max(0.0).min(1.0);
        }

        Self(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uploads_are_classified_by_mime_type() {
        assert_eq!(MediaKind::from_mime("image/png"), MediaKind::Image);
        assert_eq!(MediaKind::from_mime("video/mp4"), MediaKind::Video);
        assert_eq!(MediaKind::from_mime(""), MediaKind::Video);
    }

    #[test]
    fn saturation_preserves_greys() {
        let grey = Rgb([0.4; 3]);
        let out = grey.saturated(1.6);

        for channel in &out.0 {
            assert!((channel - 0.4).abs() < 1e-5);
        }

        assert_eq!(Rgb([1.0, 0.0, 0.0]).saturated(3.0).0[1], 0.0);
    }
}
