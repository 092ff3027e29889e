//! Pixel buffer types shared by every processing stage.
//!
//! A [`PixelBuffer`] is an owned `height × width × 3` array of 8-bit
//! RGB samples. Stages take buffers by value and hand back new ones, so
//! a buffer is never aliased between the accumulator, the engines and
//! the notifier.

use image::{ImageBuffer, Rgb, RgbImage};

use crate::error::CaptureError;

/// Samples per pixel.
pub const CHANNELS: usize = 3;

// ── PixelBuffer ──────────────────────────────────────────────────

/// A tightly packed RGB8 image.
#[derive(Clone, PartialEq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

/// Number of samples in a `width × height` RGB image. Dimensions come
/// off the wire and from disk, so the product is checked.
pub fn sample_count(width: u32, height: u32) -> Result<usize, CaptureError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(CHANNELS))
        .ok_or_else(|| CaptureError::Encoding(format!("{width}x{height} image is too large")))
}

impl PixelBuffer {
    /// Wrap `data` as a `width × height` RGB image.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, CaptureError> {
        let expected = sample_count(width, height)?;
        if data.len() != expected {
            return Err(CaptureError::InvalidArrayLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A buffer with every sample set to `value`.
    pub fn filled(width: u32, height: u32, value: u8) -> Result<Self, CaptureError> {
        let len = sample_count(width, height)?;
        Ok(Self {
            width,
            height,
            data: vec![value; len],
        })
    }

    /// Decode a compressed (JPEG/PNG) capture.
    pub fn decode(encoded: &[u8]) -> Result<Self, CaptureError> {
        let img = image::load_from_memory(encoded)?.into_rgb8();
        Ok(Self::from(img))
    }

    /// Encode as JPEG at the given quality (1-100).
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, CaptureError> {
        let mut out = Vec::new();
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
        self.as_image_ref()?.write_with_encoder(encoder)?;
        Ok(out)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`.
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of pixels (not samples).
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// The three samples at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; CHANNELS] {
        let offset = (y as usize * self.width as usize + x as usize) * CHANNELS;
        [
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ]
    }

    /// Samples as `f32` in the unit range.
    pub fn to_unit_f32(&self) -> Vec<f32> {
        self.data.iter().map(|&v| v as f32 / 255.0).collect()
    }

    /// Samples as `f32` in the 0-255 range.
    pub fn to_f32(&self) -> Vec<f32> {
        self.data.iter().map(|&v| v as f32).collect()
    }

    /// Quantise `samples` (already scaled to 0-255) by clamping to the
    /// 8-bit range and truncating. NaN maps to zero.
    pub fn from_f32(width: u32, height: u32, samples: &[f32]) -> Result<Self, CaptureError> {
        let data = samples
            .iter()
            .map(|&v| if v.is_nan() { 0 } else { v.clamp(0.0, 255.0) as u8 })
            .collect();
        Self::new(width, height, data)
    }

    /// Grey level per pixel (ITU-R BT.601 luma), unit range.
    pub fn to_gray_f32(&self) -> Vec<f32> {
        self.data
            .chunks_exact(CHANNELS)
            .map(|p| (0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32) / 255.0)
            .collect()
    }

    fn as_image_ref(&self) -> Result<ImageBuffer<Rgb<u8>, &[u8]>, CaptureError> {
        ImageBuffer::from_raw(self.width, self.height, self.data.as_slice())
            .ok_or(CaptureError::Other("pixel buffer does not match its dimensions".into()))
    }

    /// Convert into an owned `image` buffer for filtering.
    pub fn into_image(self) -> RgbImage {
        // Dimensions are validated at construction.
        RgbImage::from_raw(self.width, self.height, self.data).unwrap_or_default()
    }
}

impl From<RgbImage> for PixelBuffer {
    fn from(img: RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: img.into_raw(),
        }
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}
