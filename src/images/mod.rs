//! Image re-encoding
//!
//! Downloaded images can be re-encoded at a lower quality to shrink the
//! mirror. The transform is pure: bytes in, bytes out. Anything that cannot
//! be decoded, or that would not get smaller, is returned unchanged.

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, ImageFormat};

/// Transform applied to downloaded image bodies
pub trait ImageRecoder: Send + Sync {
    /// Re-encodes `data` at `quality` (1..=100); quality 0 is never passed
    fn recode(&self, data: &[u8], quality: u8) -> Vec<u8>;
}

/// Re-encodes JPEG images with a configurable quality
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegRecoder;

impl ImageRecoder for JpegRecoder {
    fn recode(&self, data: &[u8], quality: u8) -> Vec<u8> {
        match image::guess_format(data) {
            Ok(ImageFormat::Jpeg) => {}
            _ => return data.to_vec(),
        }

        let decoded = match image::load_from_memory_with_format(data, ImageFormat::Jpeg) {
            Ok(img) => img,
            Err(e) => {
                tracing::debug!("Skipping undecodable JPEG: {}", e);
                return data.to_vec();
            }
        };

        let rgb = decoded.to_rgb8();
        let mut encoded = Vec::new();
        let result = JpegEncoder::new_with_quality(&mut encoded, quality.clamp(1, 100)).encode(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            ColorType::Rgb8,
        );
        if let Err(e) = result {
            tracing::warn!("Re-encoding JPEG failed: {}", e);
            return data.to_vec();
        }

        if encoded.len() < data.len() {
            tracing::debug!(
                "Recoded JPEG from {} to {} bytes (quality {})",
                data.len(),
                encoded.len(),
                quality
            );
            encoded
        } else {
            data.to_vec()
        }
    }
}
