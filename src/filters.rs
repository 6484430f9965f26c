//! Row-range filters shipped with the crate, plus an adapter for filters
//! implemented in native code behind a C-style function pointer.

use serde::{Deserialize, Serialize};

use crate::dispatcher::{BandView, RowRangeOp};
use crate::errors::BandError;
use crate::pixel_buffer::CHANNELS;

const RADIUS: isize = 2;
const SIZE: usize = 5;

#[rustfmt::skip]
const BOX_KERNEL: [u32; SIZE * SIZE] = [
    1, 1, 1, 1, 1,
    1, 1, 1, 1, 1,
    1, 1, 1, 1, 1,
    1, 1, 1, 1, 1,
    1, 1, 1, 1, 1,
];

// Outer product of the binomial row 1 4 6 4 1
#[rustfmt::skip]
const GAUSSIAN_KERNEL: [u32; SIZE * SIZE] = [
    1,  4,  6,  4, 1,
    4, 16, 24, 16, 4,
    6, 24, 36, 24, 6,
    4, 16, 24, 16, 4,
    1,  4,  6,  4, 1,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FilterKind {
    /// Leaves pixels unchanged
    Identity,
    /// 5x5 mean
    #[default]
    BoxBlur,
    /// 5x5 binomial approximation of a Gaussian
    Gaussian,
}

impl FilterKind {
    pub fn name(&self) -> &'static str {
        match self {
            FilterKind::Identity => "identity",
            FilterKind::BoxBlur => "box-blur",
            FilterKind::Gaussian => "gaussian",
        }
    }
}

impl RowRangeOp for FilterKind {
    fn apply(&self, band: BandView<'_>) -> Result<(), BandError> {
        match self {
            FilterKind::Identity => Ok(()),
            FilterKind::BoxBlur => convolve_5x5(band, &BOX_KERNEL),
            FilterKind::Gaussian => convolve_5x5(band, &GAUSSIAN_KERNEL),
        }
    }
}

/// Convolve the band with a 5x5 kernel.
///
/// The window is clamped at the band's first and last rows as well as at the
/// image's left and right edges: rows of neighboring bands are never read.
/// A copy of the band's own rows is the convolution source.
fn convolve_5x5(mut band: BandView<'_>, kernel: &[u32; SIZE * SIZE]) -> Result<(), BandError> {
    let width = band.width() as isize;
    let rows = band.row_count() as isize;
    let stride = band.stride();
    if width == 0 || rows == 0 {
        return Ok(());
    }

    let weight_sum: u32 = kernel.iter().sum();
    let source = band.rows().to_vec();
    let target = band.rows_mut();

    for y in 0..rows {
        for x in 0..width {
            let mut acc = [0u32; CHANNELS];
            for ky in 0..SIZE {
                let sy = (y + ky as isize - RADIUS).clamp(0, rows - 1) as usize;
                let line = &source[sy * stride..(sy + 1) * stride];
                for kx in 0..SIZE {
                    let sx = (x + kx as isize - RADIUS).clamp(0, width - 1) as usize;
                    let weight = kernel[ky * SIZE + kx];
                    let px = &line[sx * CHANNELS..sx * CHANNELS + CHANNELS];
                    for c in 0..CHANNELS {
                        acc[c] += weight * u32::from(px[c]);
                    }
                }
            }

            let out = y as usize * stride + x as usize * CHANNELS;
            for c in 0..CHANNELS {
                target[out + c] = ((acc[c] + weight_sum / 2) / weight_sum) as u8;
            }
        }
    }

    Ok(())
}

/// Signature of a native row-range filter:
/// `(pixel_data, width, start_row, end_row, image_height) -> status`, where a
/// status of zero means success.
pub type RawRowRangeFn = unsafe extern "system" fn(*mut u8, i32, i32, i32, i32) -> i32;

/// Runs a native filter on each band.
///
/// The native code receives a pointer to the band's first row and sees the
/// band as a standalone image (`start_row = 0`, `end_row = image_height =`
/// rows in the band), so it cannot reach memory owned by another worker.
#[derive(Debug, Clone, Copy)]
pub struct NativeRowFilter {
    func: RawRowRangeFn,
}

impl NativeRowFilter {
    /// # Safety
    ///
    /// `func` must only access `image_height * width * 3` bytes starting at
    /// the pointer it is given, and must be safe to call from several threads
    /// at once on distinct buffers.
    pub unsafe fn new(func: RawRowRangeFn) -> Self {
        Self { func }
    }
}

impl RowRangeOp for NativeRowFilter {
    fn apply(&self, mut band: BandView<'_>) -> Result<(), BandError> {
        let width = i32::try_from(band.width())
            .map_err(|_| BandError::Failed(format!("width {} exceeds i32", band.width())))?;
        let rows = i32::try_from(band.row_count())
            .map_err(|_| BandError::Failed(format!("band of {} rows exceeds i32", band.row_count())))?;

        let data = band.rows_mut();
        // SAFETY: `data` is exactly `rows * width * 3` bytes and exclusively
        // borrowed for the duration of the call; `new` requires the callee to
        // stay within that range.
        let status = unsafe { (self.func)(data.as_mut_ptr(), width, 0, rows, rows) };

        match status {
            0 => Ok(()),
            code => Err(BandError::Status(code)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::apply;
    use crate::pixel_buffer::PixelBuffer;

    unsafe extern "system" fn invert(data: *mut u8, width: i32, start: i32, end: i32, _height: i32) -> i32 {
        let len = ((end - start) * width * 3) as usize;
        let pixels = std::slice::from_raw_parts_mut(data, len);
        for b in pixels {
            *b = 255 - *b;
        }
        0
    }

    unsafe extern "system" fn always_fails(_: *mut u8, _: i32, _: i32, _: i32, _: i32) -> i32 {
        7
    }

    #[test]
    fn identity_is_a_no_op() {
        let mut buffer = PixelBuffer::from_bgr(2, 2, (0..12).collect()).unwrap();
        let before = buffer.clone();
        apply(&mut buffer, 2, &FilterKind::Identity).unwrap();
        assert_eq!(buffer, before);
    }

    #[test]
    fn blurs_keep_uniform_images_uniform() {
        for kind in [FilterKind::BoxBlur, FilterKind::Gaussian] {
            let mut buffer = PixelBuffer::filled(9, 7, [40, 120, 200]).unwrap();
            let before = buffer.clone();
            let result = apply(&mut buffer, 3, &kind).unwrap();
            assert!(result.is_complete());
            assert_eq!(buffer, before, "{}", kind.name());
        }
    }

    #[test]
    fn box_blur_spreads_a_single_bright_pixel() {
        let mut buffer = PixelBuffer::new(9, 9).unwrap();
        buffer.set_pixel(4, 4, [250, 250, 250]);

        apply(&mut buffer, 1, &FilterKind::BoxBlur).unwrap();

        assert_eq!(buffer.pixel(4, 4), Some([10, 10, 10]));
        assert_eq!(buffer.pixel(2, 2), Some([10, 10, 10]));
        assert_eq!(buffer.pixel(1, 1), Some([0, 0, 0]));
    }

    #[test]
    fn gaussian_weights_the_center_most() {
        let mut buffer = PixelBuffer::new(5, 5).unwrap();
        buffer.set_pixel(2, 2, [255, 0, 0]);

        apply(&mut buffer, 1, &FilterKind::Gaussian).unwrap();

        // 255 * 36 / 256, rounded
        assert_eq!(buffer.pixel(2, 2), Some([36, 0, 0]));
        assert_eq!(buffer.pixel(0, 0), Some([1, 0, 0]));
    }

    #[test]
    fn band_edges_do_not_see_neighbor_rows() {
        // Rows 0..2 are dark, rows 2..4 bright; with two bands each band is uniform
        let mut buffer = PixelBuffer::new(4, 4).unwrap();
        for y in 2..4 {
            for x in 0..4 {
                buffer.set_pixel(x, y, [200, 200, 200]);
            }
        }
        let before = buffer.clone();

        apply(&mut buffer, 2, &FilterKind::BoxBlur).unwrap();
        assert_eq!(buffer, before);

        apply(&mut buffer, 1, &FilterKind::BoxBlur).unwrap();
        assert_ne!(buffer, before);
    }

    #[test]
    fn native_filter_runs_on_every_band() {
        let mut buffer = PixelBuffer::filled(3, 10, [0, 100, 255]).unwrap();
        let filter = unsafe { NativeRowFilter::new(invert) };

        let result = apply(&mut buffer, 4, &filter).unwrap();

        assert_eq!(result.bands_completed, 4);
        assert!(buffer.data().chunks_exact(3).all(|p| p == [255, 155, 0]));
    }

    #[test]
    fn native_status_becomes_band_failure() {
        let mut buffer = PixelBuffer::new(2, 3).unwrap();
        let filter = unsafe { NativeRowFilter::new(always_fails) };

        let result = apply(&mut buffer, 3, &filter).unwrap();

        assert_eq!(result.bands_completed, 0);
        assert_eq!(result.failures.len(), 3);
        assert!(result.failures.iter().all(|f| f.error == BandError::Status(7)));
    }

    #[test]
    fn filter_kind_names_match_serde() {
        for kind in [FilterKind::Identity, FilterKind::BoxBlur, FilterKind::Gaussian] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.name()));
        }
    }
}
