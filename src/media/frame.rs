use base64::prelude::*;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use super::MediaError;

/// One RGB24 camera frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> Result<Self, MediaError> {
        let expected = Self::byte_len(width, height);
        if rgb.len() != expected {
            return Err(MediaError::FrameSize {
                expected,
                actual: rgb.len(),
            });
        }
        Ok(Self { width, height, rgb })
    }

    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }

    /// Pixel at (x, y) packed as 0x00RRGGBB.
    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        ((self.rgb[i] as u32) << 16) | ((self.rgb[i + 1] as u32) << 8) | self.rgb[i + 2] as u32
    }

    /// Lossy JPEG at `quality` (0.0–1.0) wrapped as a `data:` URL, the form the
    /// server expects on `video_frame`.
    pub fn to_jpeg_data_url(&self, quality: f32) -> Result<String, MediaError> {
        let bytes = self.encode_jpeg(quality)?;
        Ok(format!("data:image/jpeg;base64,{}", BASE64_STANDARD.encode(bytes)))
    }

    pub fn encode_jpeg(&self, quality: f32) -> Result<Vec<u8>, MediaError> {
        let image = RgbImage::from_raw(self.width, self.height, self.rgb.clone()).ok_or(
            MediaError::FrameSize {
                expected: Self::byte_len(self.width, self.height),
                actual: self.rgb.len(),
            },
        )?;
        let mut bytes = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, jpeg_quality(quality));
        encoder
            .encode_image(&image)
            .map_err(|e| MediaError::Encode(e.to_string()))?;
        Ok(bytes)
    }
}

/// Map a 0.0–1.0 quality factor onto the encoder's 1–100 scale.
pub fn jpeg_quality(quality: f32) -> u8 {
    let q = if quality.is_finite() { quality.clamp(0.0, 1.0) } else { 0.5 };
    ((q * 100.0).round() as u8).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> Frame {
        let mut rgb = Vec::with_capacity(Frame::byte_len(width, height));
        for y in 0..height {
            for x in 0..width {
                rgb.extend_from_slice(&[(x * 4) as u8, (y * 4) as u8, 128]);
            }
        }
        Frame::new(width, height, rgb).unwrap()
    }

    #[test]
    fn rejects_short_buffer() {
        let err = Frame::new(4, 4, vec![0; 10]).unwrap_err();
        assert!(matches!(err, MediaError::FrameSize { expected: 48, actual: 10 }));
    }

    #[test]
    fn data_url_carries_a_jpeg() {
        let url = gradient(32, 24).to_jpeg_data_url(0.5).unwrap();
        let (header, payload) = url.split_once(',').unwrap();
        assert_eq!(header, "data:image/jpeg;base64");
        let bytes = BASE64_STANDARD.decode(payload).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]); // SOI marker
    }

    #[test]
    fn lower_quality_gives_smaller_output() {
        let frame = gradient(64, 48);
        let low = frame.encode_jpeg(0.1).unwrap();
        let high = frame.encode_jpeg(1.0).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn quality_factor_is_clamped() {
        assert_eq!(jpeg_quality(0.5), 50);
        assert_eq!(jpeg_quality(7.0), 100);
        assert_eq!(jpeg_quality(-1.0), 1);
        assert_eq!(jpeg_quality(f32::NAN), 50);
    }

    #[test]
    fn pixel_packs_rgb() {
        let frame = Frame::new(1, 1, vec![0x12, 0x34, 0x56]).unwrap();
        assert_eq!(frame.pixel(0, 0), 0x123456);
    }
}
