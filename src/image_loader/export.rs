use crate::errors::{FilterError, Result};
use crate::pixel_buffer::PixelBuffer;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    Bmp,
    Jpeg,
    Png,
}

impl ExportFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
        match ext.as_str() {
            "bmp" => Ok(ExportFormat::Bmp),
            "jpg" | "jpeg" => Ok(ExportFormat::Jpeg),
            "png" => Ok(ExportFormat::Png),
            _ => Err(FilterError::UnsupportedFormat {
                format: if ext.is_empty() { "(none)".to_string() } else { ext },
            }),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Bmp => "bmp",
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Png => "png",
        }
    }
}

/// Encode a buffer into the bytes of an image file.
pub fn encode(buffer: &PixelBuffer, format: ExportFormat, quality: u8) -> std::result::Result<Vec<u8>, String> {
    let mut bytes = Vec::new();
    match format {
        ExportFormat::Jpeg => {
            let width = u16::try_from(buffer.width()).map_err(|_| "JPEG width exceeds 65535".to_string())?;
            let height = u16::try_from(buffer.height()).map_err(|_| "JPEG height exceeds 65535".to_string())?;
            let encoder = jpeg_encoder::Encoder::new(&mut bytes, quality.clamp(1, 100));
            encoder
                .encode(buffer.data(), width, height, jpeg_encoder::ColorType::Bgr)
                .map_err(|e| e.to_string())?;
        }
        ExportFormat::Png | ExportFormat::Bmp => {
            let image_format = if format == ExportFormat::Png {
                image::ImageFormat::Png
            } else {
                image::ImageFormat::Bmp
            };
            let rgb = buffer.to_rgb_image().map_err(|e| e.to_string())?;
            rgb.write_to(&mut Cursor::new(&mut bytes), image_format).map_err(|e| e.to_string())?;
        }
    }
    Ok(bytes)
}

/// Write `buffer` to `output_path`, picking the encoder from the extension.
///
/// Refuses to write over `source`. Both paths are resolved first, so `./`,
/// `..` and relative spellings of the source are caught, and the comparison
/// ignores case for case-insensitive file systems.
pub fn save_image(buffer: &PixelBuffer, output_path: &Path, source: Option<&Path>, quality: u8) -> Result<()> {
    if let Some(source) = source {
        if is_same_file(source, output_path) {
            return Err(FilterError::OverwriteSource { path: output_path.to_path_buf() });
        }
    }

    let format = ExportFormat::from_path(output_path)?;
    let bytes = encode(buffer, format, quality).map_err(|message| FilterError::EncodeError {
        path: output_path.to_path_buf(),
        message,
    })?;

    std::fs::write(output_path, bytes).map_err(|e| FilterError::EncodeError {
        path: output_path.to_path_buf(),
        message: e.to_string(),
    })?;

    log::info!("Saved {:?} as {:?}", output_path, format);
    Ok(())
}

/// `<dir>/<stem><suffix>.<ext>` next to the source image.
pub fn default_output_path(source: &Path, suffix: &str, format: ExportFormat) -> PathBuf {
    let stem = source.file_stem().unwrap_or_default().to_string_lossy();
    let name = format!("{}{}.{}", stem, suffix, format.extension());
    match source.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

fn is_same_file(source: &Path, output: &Path) -> bool {
    let source = source.canonicalize().unwrap_or_else(|_| source.to_path_buf());
    let output = resolve_output(output).unwrap_or_else(|| output.to_path_buf());
    source.to_string_lossy().to_lowercase() == output.to_string_lossy().to_lowercase()
}

/// Canonical form of a path that may not exist yet: its parent directory is
/// resolved and the file name joined back on.
fn resolve_output(path: &Path) -> Option<PathBuf> {
    if let Ok(resolved) = path.canonicalize() {
        return Some(resolved);
    }
    let name = path.file_name()?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    parent.canonicalize().ok().map(|dir| dir.join(name))
}
