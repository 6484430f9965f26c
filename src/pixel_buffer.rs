use crate::errors::{FilterError, Result};
use image::{DynamicImage, RgbImage};

/// Bytes per pixel; channels are interleaved as B, G, R.
pub const CHANNELS: usize = 3;

/// A decoded image stored as tightly packed BGR rows.
///
/// The byte length always equals `height * stride`. Callers only ever get a
/// slice of the data, so the buffer cannot be resized in place; a new image
/// means a new buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// A black image. Zero dimensions are allowed and give an empty buffer.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let len = byte_len(width, height)?;
        Ok(Self { width, height, data: vec![0; len] })
    }

    pub fn from_bgr(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = byte_len(width, height)?;
        if data.len() != expected {
            return Err(FilterError::InvalidBuffer {
                message: format!(
                    "{}x{} BGR image needs {} bytes, got {}",
                    width,
                    height,
                    expected,
                    data.len()
                ),
            });
        }
        Ok(Self { width, height, data })
    }

    /// Fill every pixel with the same BGR triplet.
    pub fn filled(width: u32, height: u32, bgr: [u8; 3]) -> Result<Self> {
        let mut buffer = Self::new(width, height)?;
        for pixel in buffer.data.chunks_exact_mut(CHANNELS) {
            pixel.copy_from_slice(&bgr);
        }
        Ok(buffer)
    }

    pub fn from_rgb_image(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let mut data = image.as_raw().clone();
        swap_red_blue(&mut data);
        Self { width, height, data }
    }

    pub fn from_dynamic(image: &DynamicImage) -> Self {
        Self::from_rgb_image(&image.to_rgb8())
    }

    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        let mut data = self.data.clone();
        swap_red_blue(&mut data);
        RgbImage::from_raw(self.width, self.height, data).ok_or_else(|| FilterError::InvalidBuffer {
            message: format!("cannot build a {}x{} RGB image", self.width, self.height),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.width as usize * CHANNELS
    }

    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let stride = self.stride();
        let start = y as usize * stride;
        Some(&self.data[start..start + stride])
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width {
            return None;
        }
        let row = self.row(y)?;
        let i = x as usize * CHANNELS;
        Some([row[i], row[i + 1], row[i + 2]])
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, bgr: [u8; 3]) {
        assert!(x < self.width && y < self.height, "pixel ({x}, {y}) out of bounds");
        let i = y as usize * self.stride() + x as usize * CHANNELS;
        self.data[i..i + CHANNELS].copy_from_slice(&bgr);
    }

    /// Checks the length invariant; only fails if it was broken through unsafe code.
    pub(crate) fn is_consistent(&self) -> bool {
        byte_len(self.width, self.height).map(|len| len == self.data.len()).unwrap_or(false)
    }
}

fn byte_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(CHANNELS))
        .ok_or_else(|| FilterError::InvalidBuffer {
            message: format!("{}x{} image does not fit in memory", width, height),
        })
}

// RGB <-> BGR is the same swap in both directions
fn swap_red_blue(data: &mut [u8]) {
    for pixel in data.chunks_exact_mut(CHANNELS) {
        pixel.swap(0, 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_has_stride_times_height_bytes() {
        let buffer = PixelBuffer::new(5, 3).unwrap();
        assert_eq!(buffer.stride(), 15);
        assert_eq!(buffer.data().len(), 45);
        assert_eq!(buffer.pixel_count(), 15);
        assert!(buffer.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn zero_sized_buffers_are_empty() {
        let buffer = PixelBuffer::new(0, 10).unwrap();
        assert!(buffer.is_empty());
        assert_eq!(buffer.row(0).map(<[u8]>::len), Some(0));
    }

    #[test]
    fn from_bgr_rejects_wrong_length() {
        let err = PixelBuffer::from_bgr(2, 2, vec![0; 11]).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_BUFFER");
        assert!(PixelBuffer::from_bgr(2, 2, vec![0; 12]).is_ok());
    }

    #[test]
    fn rgb_image_is_stored_as_bgr() {
        let image = RgbImage::from_pixel(2, 1, image::Rgb([10, 20, 30]));
        let buffer = PixelBuffer::from_rgb_image(&image);
        assert_eq!(buffer.pixel(0, 0), Some([30, 20, 10]));
        assert_eq!(buffer.pixel(1, 0), Some([30, 20, 10]));

        let back = buffer.to_rgb_image().unwrap();
        assert_eq!(back.get_pixel(1, 0).0, [10, 20, 30]);
    }

    #[test]
    fn rows_and_pixels() {
        let mut buffer = PixelBuffer::new(3, 2).unwrap();
        buffer.set_pixel(2, 1, [1, 2, 3]);
        assert_eq!(buffer.row(1).unwrap(), &[0, 0, 0, 0, 0, 0, 1, 2, 3]);
        assert_eq!(buffer.pixel(2, 1), Some([1, 2, 3]));
        assert_eq!(buffer.pixel(3, 1), None);
        assert_eq!(buffer.row(2), None);
        assert!(buffer.is_consistent());
    }

    #[test]
    fn filled_sets_every_pixel() {
        let buffer = PixelBuffer::filled(4, 4, [7, 8, 9]).unwrap();
        assert!(buffer.data().chunks_exact(CHANNELS).all(|p| p == [7, 8, 9]));
    }
}
