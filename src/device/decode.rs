#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::SourceFormat;
use half::f16;
use image::ImageFormat;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("not a valid {} image: {reason}", .format.extension())]
    Invalid { format: SourceFormat, reason: String },
    #[error("environment map has unusable dimensions {cols}x{rows}")]
    Dimensions { cols: usize, rows: usize },
}

/// A decoded equirectangular image stored as RGBA16F texels.
#[derive(Clone, PartialEq)]
pub struct EquirectImage {
    cols: usize,
    rows: usize,
    texels: Vec<u16>,
}

impl EquirectImage {
    /// Decodes an HDR or EXR file.
    ///
    /// The decoder is chosen from `format` alone; the bytes are never
    /// sniffed, so a mislabelled file fails instead of being guessed at.
    pub fn decode(bytes: &[u8], format: SourceFormat) -> Result<Self, DecodeError> {
        let image_format = match format {
            SourceFormat::Hdr => ImageFormat::Hdr,
            SourceFormat::Exr => ImageFormat::OpenExr,
        };

        let image = image::load_from_memory_with_format(bytes, image_format).map_err(|err| {
            DecodeError::Invalid {
                format,
                reason: err.to_string(),
            }
        })?;

        let pixels = image.to_rgba32f();
        let (cols, rows) = (pixels.width() as usize, pixels.height() as usize);

        Self::from_rgba32f(cols, rows, pixels.as_raw())
    }

    /// Packs linear RGBA32F pixels, clamping values half floats can't hold.
    pub fn from_rgba32f(cols: usize, rows: usize, pixels: &[f32]) -> Result<Self, DecodeError> {
        if cols == 0 || rows == 0 || cols < rows || pixels.len() != cols * rows * 4 {
            return Err(DecodeError::Dimensions { cols, rows });
        }

        if cols != 2 * rows {
            warn!("environment map is {}x{}, expected a 2:1 panorama", cols, rows);
        }

        let max = f16::MAX.to_f32();

        let texels = pixels
            .chunks_exact(4)
            .flat_map(|pixel| {
                let mut out = [0u16; 4];

                for (i, value) in pixel[..3].iter().enumerate() {
                    let value = if value.is_finite() { value.max(0.0).min(max) } else { 0.0 };
                    out[i] = f16::from_f32(value).to_bits();
                }

                out[3] = f16::from_f32(1.0).to_bits();
                out
            })
            .collect();

        Ok(Self { cols, rows, texels })
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Row-major RGBA16F texel data, ready for upload.
    pub fn texels(&self) -> &[u16] {
        &self.texels
    }

    pub fn texel(&self, x: usize, y: usize) -> [f32; 4] {
        let offset = 4 * (y * self.cols + x);
        let mut out = [0.0; 4];

        for (i, bits) in self.texels[offset..offset + 4].iter().enumerate() {
            out[i] = f16::from_bits(*bits).to_f32();
        }

        out
    }
}

impl std::fmt::Debug for EquirectImage {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "EquirectImage {{ {}x{} }}", self.cols, self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal flat (non run-length encoded) Radiance file.
    fn radiance(cols: usize, rows: usize, rgbe: [u8; 4]) -> Vec<u8> {
        let mut bytes = format!(
            "#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n-Y {} +X {}\n",
            rows, cols
        )
        .into_bytes();

        for _ in 0..cols * rows {
            bytes.extend_from_slice(&rgbe);
        }

        bytes
    }

    #[test]
    fn decodes_radiance_hdr() {
        let image = EquirectImage::decode(&radiance(4, 2, [128, 64, 32, 129]), SourceFormat::Hdr)
            .expect("valid radiance file");

        assert_eq!((image.cols(), image.rows()), (4, 2));

        let [r, g, b, a] = image.texel(3, 1);
        assert!((r - 1.0).abs() < 0.02, "r = {}", r);
        assert!((g - 0.5).abs() < 0.02, "g = {}", g);
        assert!((b - 0.25).abs() < 0.02, "b = {}", b);
        assert_eq!(a, 1.0);
    }

    #[test]
    fn decoder_follows_declared_format() {
        let hdr = radiance(4, 2, [128, 64, 32, 129]);

        assert!(matches!(
            EquirectImage::decode(&hdr, SourceFormat::Exr),
            Err(DecodeError::Invalid {
                format: SourceFormat::Exr,
                ..
            })
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(EquirectImage::decode(b"<html>404</html>", SourceFormat::Hdr).is_err());
        assert!(EquirectImage::decode(&[], SourceFormat::Exr).is_err());
    }

    #[test]
    fn clamps_unrepresentable_values() {
        let pixels = [1e9, f32::NAN, -4.0, 0.0, 0.5, 0.5, 0.5, 0.0];
        let image = EquirectImage::from_rgba32f(2, 1, &pixels).unwrap();

        let [r, g, b, _] = image.texel(0, 0);
        assert_eq!(r, f16::MAX.to_f32());
        assert_eq!(g, 0.0);
        assert_eq!(b, 0.0);
    }

    #[test]
    fn rejects_portrait_and_mismatched_buffers() {
        assert_eq!(
            EquirectImage::from_rgba32f(1, 2, &[0.0; 8]),
            Err(DecodeError::Dimensions { cols: 1, rows: 2 })
        );
        assert!(EquirectImage::from_rgba32f(2, 1, &[0.0; 4]).is_err());
    }
}
