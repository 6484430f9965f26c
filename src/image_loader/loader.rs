use crate::errors::{FilterError, Result};
use crate::pixel_buffer::PixelBuffer;
use image::{DynamicImage, ImageDecoder, ImageReader};
use std::io::{BufRead, Cursor, Seek};
use std::path::Path;

/// Files above this size are decoded from a memory map instead of being read
/// into RAM first.
const MMAP_THRESHOLD: u64 = 50 * 1024 * 1024;

/// Extensions accepted when loading.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Ceilings checked before and after decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadLimits {
    pub max_file_size_mb: u64,
    pub max_megapixels: u64,
}

impl Default for LoadLimits {
    fn default() -> Self {
        Self { max_file_size_mb: 100, max_megapixels: 100 }
    }
}

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Decode an image file into a BGR [`PixelBuffer`].
///
/// The file size is checked against the ceiling before any decoding happens,
/// and the pixel count is checked from the header before pixels are
/// allocated. The decoder is chosen from the file content, so a PNG named
/// `.jpg` still loads.
pub fn load_image(path: &Path, limits: &LoadLimits) -> Result<PixelBuffer> {
    if !path.exists() {
        return Err(FilterError::FileNotFound { path: path.to_path_buf() });
    }

    if !is_supported_image(path) {
        let format = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "(none)".to_string());
        return Err(FilterError::UnsupportedFormat { format });
    }

    let file_size = std::fs::metadata(path)?.len();
    if file_size > limits.max_file_size_mb.saturating_mul(1024 * 1024) {
        log::warn!("Rejecting {:?}: {} bytes exceeds {}MB", path, file_size, limits.max_file_size_mb);
        return Err(FilterError::FileTooLarge {
            path: path.to_path_buf(),
            size_mb: file_size / (1024 * 1024),
            limit_mb: limits.max_file_size_mb,
        });
    }

    log::debug!("Decoding {:?} ({} bytes)", path, file_size);
    let image = if file_size > MMAP_THRESHOLD {
        load_image_memory_mapped(path, limits)?
    } else {
        let reader = ImageReader::open(path)?;
        decode_checked(reader, path, limits)?
    };

    let buffer = PixelBuffer::from_dynamic(&image);
    log::info!(
        "Image loaded: {}x{}, {} bytes of pixels",
        buffer.width(),
        buffer.height(),
        buffer.data().len()
    );
    Ok(buffer)
}

/// Allocation ceiling handed to the decoder: enough for the largest accepted
/// image at 16-bit RGBA.
fn decoder_limits(limits: &LoadLimits) -> image::Limits {
    let mut decoder_limits = image::Limits::default();
    decoder_limits.max_alloc = Some(limits.max_megapixels.saturating_add(1).saturating_mul(8_000_000));
    decoder_limits
}

fn decode_checked<R: BufRead + Seek>(reader: ImageReader<R>, path: &Path, limits: &LoadLimits) -> Result<DynamicImage> {
    let decoding_error = |e: image::ImageError| FilterError::DecodingError {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let mut reader = reader.with_guessed_format()?;
    reader.limits(decoder_limits(limits));
    let decoder = reader.into_decoder().map_err(decoding_error)?;

    let (width, height) = decoder.dimensions();
    let megapixels = (width as u64 * height as u64) / 1_000_000;
    if megapixels > limits.max_megapixels {
        return Err(FilterError::ImageTooLarge {
            path: path.to_path_buf(),
            megapixels,
            limit: limits.max_megapixels,
        });
    }

    DynamicImage::from_decoder(decoder).map_err(decoding_error)
}

fn load_image_memory_mapped(path: &Path, limits: &LoadLimits) -> Result<DynamicImage> {
    use memmap2::Mmap;
    use std::fs::File;

    let file = File::open(path)?;

    // SAFETY: the map is read-only and dropped before this function returns
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| FilterError::DecodingError {
        path: path.to_path_buf(),
        message: format!("Memory mapping failed: {}", e),
    })?;

    let format = image::guess_format(&mmap).map_err(|e| FilterError::DecodingError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let reader = ImageReader::with_format(Cursor::new(&mmap[..]), format);
    decode_checked(reader, path, limits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn loads_png_as_bgr() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.png");
        RgbImage::from_pixel(3, 2, Rgb([1, 2, 3])).save(&path).unwrap();

        let buffer = load_image(&path, &LoadLimits::default()).unwrap();

        assert_eq!((buffer.width(), buffer.height()), (3, 2));
        assert_eq!(buffer.pixel(2, 1), Some([3, 2, 1]));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_image(Path::new("/definitely/not/here.png"), &LoadLimits::default()).unwrap_err();
        assert_eq!(err.error_code(), "FILE_NOT_FOUND");
    }

    #[test]
    fn oversized_file_is_rejected_before_decoding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.png");
        // Not a valid PNG: a decode attempt would fail with a different error
        std::fs::write(&path, vec![0u8; 2 * 1024 * 1024]).unwrap();

        let limits = LoadLimits { max_file_size_mb: 1, ..LoadLimits::default() };
        let err = load_image(&path, &limits).unwrap_err();

        assert!(matches!(err, FilterError::FileTooLarge { size_mb: 2, limit_mb: 1, .. }));
    }

    #[test]
    fn corrupt_file_is_a_decoding_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not really a jpeg").unwrap();

        let err = load_image(&path, &LoadLimits::default()).unwrap_err();
        assert_eq!(err.error_code(), "DECODING_ERROR");
    }

    #[test]
    fn format_is_detected_from_content() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("real.png");
        RgbImage::from_pixel(2, 2, Rgb([10, 20, 30])).save(&png).unwrap();
        let misnamed = dir.path().join("photo.jpg");
        std::fs::rename(&png, &misnamed).unwrap();

        let buffer = load_image(&misnamed, &LoadLimits::default()).unwrap();

        assert_eq!(buffer.pixel(1, 1), Some([30, 20, 10]));
    }

    #[test]
    fn megapixel_ceiling_is_checked_from_the_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.png");
        RgbImage::new(2000, 1000).save(&path).unwrap();

        let limits = LoadLimits { max_megapixels: 1, ..LoadLimits::default() };
        let err = load_image(&path, &limits).unwrap_err();

        assert!(matches!(err, FilterError::ImageTooLarge { megapixels: 2, limit: 1, .. }));
        assert!(load_image(&path, &LoadLimits::default()).is_ok());
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        let err = load_image(&path, &LoadLimits::default()).unwrap_err();
        assert!(matches!(err, FilterError::UnsupportedFormat { ref format } if format == "txt"));
    }

    #[test]
    fn extension_check_ignores_case() {
        assert!(is_supported_image(Path::new("a/b/Photo.JPG")));
        assert!(is_supported_image(Path::new("scan.bmp")));
        assert!(!is_supported_image(Path::new("scan.tiff")));
        assert!(!is_supported_image(Path::new("noext")));
    }
}
