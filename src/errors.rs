use std::path::PathBuf;
use thiserror::Error;

use crate::partition::Band;

/// Broad families of failure, used by the CLI to pick an exit status and by
/// the session to decide what state survives an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Decode,
    DispatchRejected,
    BandFailure,
    Encode,
    Internal,
}

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("No image loaded")]
    NoImageLoaded,

    #[error("No filter has been applied yet")]
    FilterNotApplied,

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("File '{path}' is too large: {size_mb}MB (max {limit_mb}MB)")]
    FileTooLarge { path: PathBuf, size_mb: u64, limit_mb: u64 },

    #[error("Unsupported image format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Refusing to overwrite the source image '{path}'")]
    OverwriteSource { path: PathBuf },

    #[error("Invalid pixel buffer: {message}")]
    InvalidBuffer { message: String },

    #[error("Image decoding error for '{path}': {message}")]
    DecodingError { path: PathBuf, message: String },

    #[error("Image '{path}' is too large: {megapixels}MP (max {limit}MP)")]
    ImageTooLarge { path: PathBuf, megapixels: u64, limit: u64 },

    #[error("Filter dispatch rejected: {reason}")]
    DispatchRejected { reason: String },

    #[error("Filter failed for rows {start_row}..{end_row}: {reason}")]
    BandFailure { start_row: u32, end_row: u32, reason: String },

    #[error("Export error for '{path}': {message}")]
    EncodeError { path: PathBuf, message: String },

    #[error("Settings error: {message}")]
    SettingsError { message: String },

    #[error("IO error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {source}")]
    JsonError {
        #[from]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, FilterError>;

impl FilterError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            FilterError::NoImageLoaded
            | FilterError::FilterNotApplied
            | FilterError::FileNotFound { .. }
            | FilterError::FileTooLarge { .. }
            | FilterError::UnsupportedFormat { .. }
            | FilterError::OverwriteSource { .. }
            | FilterError::InvalidBuffer { .. } => ErrorCategory::Input,
            FilterError::DecodingError { .. } | FilterError::ImageTooLarge { .. } => ErrorCategory::Decode,
            FilterError::DispatchRejected { .. } => ErrorCategory::DispatchRejected,
            FilterError::BandFailure { .. } => ErrorCategory::BandFailure,
            FilterError::EncodeError { .. } => ErrorCategory::Encode,
            FilterError::SettingsError { .. } | FilterError::IoError { .. } | FilterError::JsonError { .. } => {
                ErrorCategory::Internal
            }
        }
    }

    /// Returns a user-friendly error message with recovery suggestions
    pub fn user_message(&self) -> String {
        let base_message = self.to_string();
        let suggestion = match self {
            FilterError::NoImageLoaded => "Select and load an image first.",
            FilterError::FilterNotApplied => "Apply a filter before saving or inspecting the processed image.",
            FilterError::FileNotFound { .. } => "Check if the file exists and you have permission to access it.",
            FilterError::FileTooLarge { .. } => "Pick a smaller file or raise max_file_size_mb in the settings.",
            FilterError::UnsupportedFormat { .. } => "Use one of the supported formats: BMP, JPEG or PNG.",
            FilterError::OverwriteSource { .. } => "Choose a different output path; the source image is still in use.",
            FilterError::InvalidBuffer { .. } => "The pixel data does not match the image dimensions.",
            FilterError::DecodingError { .. } => "The image file may be corrupted. Try opening it in another viewer.",
            FilterError::ImageTooLarge { .. } => "Downscale the image or raise max_megapixels in the settings.",
            FilterError::DispatchRejected { .. } => "Check the worker count and reload the image, then try again.",
            FilterError::BandFailure { .. } => "Part of the image was left unprocessed. Re-apply the filter to retry.",
            FilterError::EncodeError { .. } => "Export failed. Check if you have write permissions in the target directory.",
            FilterError::SettingsError { .. } | FilterError::JsonError { .. } => {
                "The settings file could not be used. Fix or delete it to fall back to defaults."
            }
            FilterError::IoError { .. } => "File system error occurred. Check disk space and permissions.",
        };

        format!("{}\n\n{}", base_message, suggestion)
    }

    /// Returns an error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            FilterError::NoImageLoaded => "NO_IMAGE_LOADED",
            FilterError::FilterNotApplied => "FILTER_NOT_APPLIED",
            FilterError::FileNotFound { .. } => "FILE_NOT_FOUND",
            FilterError::FileTooLarge { .. } => "FILE_TOO_LARGE",
            FilterError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            FilterError::OverwriteSource { .. } => "OVERWRITE_SOURCE",
            FilterError::InvalidBuffer { .. } => "INVALID_BUFFER",
            FilterError::DecodingError { .. } => "DECODING_ERROR",
            FilterError::ImageTooLarge { .. } => "IMAGE_TOO_LARGE",
            FilterError::DispatchRejected { .. } => "DISPATCH_REJECTED",
            FilterError::BandFailure { .. } => "BAND_FAILURE",
            FilterError::EncodeError { .. } => "ENCODE_ERROR",
            FilterError::SettingsError { .. } => "SETTINGS_ERROR",
            FilterError::IoError { .. } => "IO_ERROR",
            FilterError::JsonError { .. } => "JSON_ERROR",
        }
    }

    pub(crate) fn rejected(reason: impl Into<String>) -> Self {
        FilterError::DispatchRejected { reason: reason.into() }
    }

    pub(crate) fn band_failure(band: Band, error: &BandError) -> Self {
        FilterError::BandFailure {
            start_row: band.start_row,
            end_row: band.end_row,
            reason: error.to_string(),
        }
    }
}

/// Failure reported by a single band's row-range operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BandError {
    #[error("filter returned status {0}")]
    Status(i32),

    #[error("filter panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Failed(String),
}
