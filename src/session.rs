use std::path::{Path, PathBuf};

use crate::dispatcher::{self, DispatchResult, RowRangeOp};
use crate::errors::{FilterError, Result};
use crate::histogram::Histogram;
use crate::image_loader::{self, ExportFormat};
use crate::pixel_buffer::PixelBuffer;
use crate::profiler::with_profiler;
use crate::settings::Settings;

struct LoadedImage {
    path: PathBuf,
    original: PixelBuffer,
}

/// One image being worked on: the decoded source, the last filtered result,
/// and the settings that drive loading, dispatch and export.
pub struct Session {
    settings: Settings,
    source: Option<LoadedImage>,
    filtered: Option<PixelBuffer>,
    last_dispatch: Option<DispatchResult>,
}

impl Session {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            source: None,
            filtered: None,
            last_dispatch: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Decode `path` and make it the current image. Any previous image and
    /// filtered result are dropped; on error the session is left as it was.
    pub fn load(&mut self, path: &Path) -> Result<&PixelBuffer> {
        with_profiler(|p| p.start_timer("image_load"));
        let loaded = image_loader::load_image(path, &self.settings.load_limits());
        with_profiler(|p| p.end_timer("image_load"));

        let original = loaded?;
        self.filtered = None;
        self.last_dispatch = None;
        let source = self.source.insert(LoadedImage { path: path.to_path_buf(), original });
        Ok(&source.original)
    }

    /// Use an already decoded buffer as the current image.
    pub fn load_buffer(&mut self, path: PathBuf, original: PixelBuffer) {
        self.filtered = None;
        self.last_dispatch = None;
        self.source = Some(LoadedImage { path, original });
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source.as_ref().map(|s| s.path.as_path())
    }

    pub fn original(&self) -> Result<&PixelBuffer> {
        self.source.as_ref().map(|s| &s.original).ok_or(FilterError::NoImageLoaded)
    }

    pub fn filtered(&self) -> Result<&PixelBuffer> {
        if self.source.is_none() {
            return Err(FilterError::NoImageLoaded);
        }
        self.filtered.as_ref().ok_or(FilterError::FilterNotApplied)
    }

    pub fn last_dispatch(&self) -> Option<&DispatchResult> {
        self.last_dispatch.as_ref()
    }

    pub fn histogram_before(&self) -> Result<Histogram> {
        let buffer = self.original()?;
        Ok(self.timed_histogram(buffer))
    }

    pub fn histogram_after(&self) -> Result<Histogram> {
        let buffer = self.filtered()?;
        Ok(self.timed_histogram(buffer))
    }

    fn timed_histogram(&self, buffer: &PixelBuffer) -> Histogram {
        with_profiler(|p| p.start_timer("histogram"));
        let histogram = Histogram::compute_parallel(buffer, self.settings.worker_count());
        with_profiler(|p| p.end_timer("histogram"));
        histogram
    }

    /// Run `op` over a fresh copy of the loaded image, so applying twice does
    /// not compound. Band failures do not fail the call: the partially
    /// filtered image is kept and the failures are in the returned result.
    pub fn apply_filter<O>(&mut self, op: &O) -> Result<&DispatchResult>
    where
        O: RowRangeOp + ?Sized,
    {
        let mut working = self.original()?.clone();
        let workers = self.settings.worker_count();

        with_profiler(|p| p.start_timer("filter_dispatch"));
        let dispatched = dispatcher::apply(&mut working, workers, op);
        with_profiler(|p| p.end_timer("filter_dispatch"));
        let result = dispatched?;

        with_profiler(|p| {
            p.increment_counter("filters_applied");
            for _ in &result.failures {
                p.increment_counter("band_failures");
            }
        });
        if !result.is_complete() {
            tracing::warn!(
                failed = result.failures.len(),
                bands = result.bands.len(),
                "filter left some bands unprocessed"
            );
        }

        self.filtered = Some(working);
        let stored = self.last_dispatch.insert(result);
        Ok(&*stored)
    }

    /// Save the filtered image. The source file itself is never overwritten.
    pub fn save(&self, output_path: &Path) -> Result<()> {
        let filtered = self.filtered()?;
        with_profiler(|p| p.start_timer("image_save"));
        let saved = image_loader::save_image(filtered, output_path, self.source_path(), self.settings.jpeg_quality);
        with_profiler(|p| p.end_timer("image_save"));
        saved
    }

    /// `<stem><suffix>.<ext>` next to the source, keeping the source's format
    /// when it is one we can write.
    pub fn default_output_path(&self) -> Result<PathBuf> {
        let source = self.source_path().ok_or(FilterError::NoImageLoaded)?;
        let format = ExportFormat::from_path(source).unwrap_or(ExportFormat::Png);
        Ok(image_loader::default_output_path(source, &self.settings.output_suffix, format))
    }
}
