use crate::clamp;
use serde::{Deserialize, Serialize};

/// Realtime channel carrying crop updates from the editor to viewers.
pub const CROP_CHANNEL: &str = "screen-crop-sync";
pub const CROP_EVENT: &str = "crop_update";

/// Narrowest visible extent kept on either axis.
const MIN_VISIBLE_EXTENT: f32 = 0.01;

/// Fraction of the media frame hidden on each side of the LED screens.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ScreenCrop {
    pub top: f32,
    pub bottom: f32,
    pub left: f32,
    pub right: f32,
}

/// Texture coordinate transform applied to screen materials.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct UvTransform {
    pub offset: [f32; 2],
    pub scale: [f32; 2],
}

impl Default for UvTransform {
    fn default() -> Self {
        Self {
            offset: [0.0, 0.0],
            scale: [1.0, 1.0],
        }
    }
}

impl ScreenCrop {
    /// Clamps each side into `[0, 1)` and keeps opposite sides apart.
    pub fn normalized(self) -> Self {
        let (left, right) = clamp_pair(self.left, self.right);
        let (top, bottom) = clamp_pair(self.top, self.bottom);

        Self {
            top,
            bottom,
            left,
            right,
        }
    }

    /// Texture coordinates are flipped vertically, so `top` maps to the
    /// high end of the v axis.
    pub fn uv_transform(&self) -> UvTransform {
        let crop = self.normalized();

        UvTransform {
            offset: [crop.left, crop.bottom],
            scale: [
                1.0 - crop.left - crop.right,
                1.0 - crop.top - crop.bottom,
            ],
        }
    }

    pub fn apply(&mut self, update: &CropUpdate) {
        if let Some(top) = update.crop_top {
            self.top = top;
        }

        if let Some(bottom) = update.crop_bottom {
            self.bottom = bottom;
        }

        if let Some(left) = update.crop_left {
            self.left = left;
        }

        if let Some(right) = update.crop_right {
            self.right = right;
        }

        *self = self.normalized();
    }
}

fn clamp_pair(a: f32, b: f32) -> (f32, f32) {
    let a = clamp(a, 0.0, 1.0 - MIN_VISIBLE_EXTENT);
    let b = clamp(b, 0.0, 1.0 - MIN_VISIBLE_EXTENT - a);

    (a, b)
}

/// Broadcast payload; absent sides are left untouched by receivers.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CropUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_top: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_bottom: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_left: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_right: Option<f32>,
}

impl From<ScreenCrop> for CropUpdate {
    fn from(crop: ScreenCrop) -> Self {
        Self {
            crop_top: Some(crop.top),
            crop_bottom: Some(crop.bottom),
            crop_left: Some(crop.left),
            crop_right: Some(crop.right),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_update_keeps_other_sides() {
        let mut crop = ScreenCrop {
            top: 0.1,
            bottom: 0.2,
            left: 0.0,
            right: 0.0,
        };

        let update: CropUpdate = serde_json::from_str(r#"{ "cropLeft": 0.25 }"#).unwrap();
        crop.apply(&update);

        assert_eq!(crop.top, 0.1);
        assert_eq!(crop.bottom, 0.2);
        assert_eq!(crop.left, 0.25);
    }

    #[test]
    fn opposite_sides_never_overlap() {
        let crop = ScreenCrop {
            left: 0.7,
            right: 0.7,
            ..ScreenCrop::default()
        }
        .normalized();

        assert!(crop.left + crop.right < 1.0);

        let uv = crop.uv_transform();
        assert!(uv.scale[0] > 0.0);
    }

    #[test]
    fn uncropped_screen_uses_identity_transform() {
        assert_eq!(ScreenCrop::default().uv_transform(), UvTransform::default());
    }
}
