//! Band-parallel execution of a row-range filter over a [`PixelBuffer`].
//!
//! Each band of rows gets its own `&mut` slice of the buffer, so workers can
//! never write outside their rows. A filter that wants to look past the edge
//! of its band (a 5x5 window near a band boundary) simply cannot: it only
//! sees its own rows and has to clamp. There are no halo rows and no staging
//! copy of the input.

use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use rayon::ThreadPoolBuilder;

use crate::errors::{BandError, FilterError, Result};
use crate::partition::{partition, Band};
use crate::pixel_buffer::{PixelBuffer, CHANNELS};

/// The rows of one band, lent mutably to a single worker.
#[derive(Debug)]
pub struct BandView<'a> {
    band: Band,
    width: u32,
    image_height: u32,
    rows: &'a mut [u8],
}

impl<'a> BandView<'a> {
    pub fn band(&self) -> Band {
        self.band
    }

    pub fn start_row(&self) -> u32 {
        self.band.start_row
    }

    pub fn end_row(&self) -> u32 {
        self.band.end_row
    }

    pub fn row_count(&self) -> u32 {
        self.band.len()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height of the whole image, not of this band.
    pub fn image_height(&self) -> u32 {
        self.image_height
    }

    pub fn stride(&self) -> usize {
        self.width as usize * CHANNELS
    }

    /// All bytes of this band, first row first.
    pub fn rows(&self) -> &[u8] {
        &*self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [u8] {
        &mut *self.rows
    }

    /// Row `y` in image coordinates, if it belongs to this band.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        let range = self.local_range(y)?;
        Some(&self.rows[range])
    }

    pub fn row_mut(&mut self, y: u32) -> Option<&mut [u8]> {
        let range = self.local_range(y)?;
        Some(&mut self.rows[range])
    }

    fn local_range(&self, y: u32) -> Option<std::ops::Range<usize>> {
        if !self.band.contains(y) {
            return None;
        }
        let stride = self.stride();
        let start = (y - self.band.start_row) as usize * stride;
        Some(start..start + stride)
    }
}

/// A filter applied in place to one band of rows.
///
/// One value is shared by every worker, hence `Sync`. Returning an error marks
/// only that band as failed; the other bands still run.
pub trait RowRangeOp: Sync {
    fn apply(&self, band: BandView<'_>) -> std::result::Result<(), BandError>;
}

impl<F> RowRangeOp for F
where
    F: Fn(BandView<'_>) -> std::result::Result<(), BandError> + Sync,
{
    fn apply(&self, band: BandView<'_>) -> std::result::Result<(), BandError> {
        self(band)
    }
}

/// Types a closure as a [`RowRangeOp`] so its argument and error type are
/// inferred at the call site.
pub fn from_fn<F>(f: F) -> F
where
    F: Fn(BandView<'_>) -> std::result::Result<(), BandError> + Sync,
{
    f
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandFailure {
    pub band: Band,
    pub error: BandError,
}

impl BandFailure {
    pub fn to_error(&self) -> FilterError {
        FilterError::band_failure(self.band, &self.error)
    }
}

/// Outcome of one [`apply`] call, available once every band has returned.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    /// Wall-clock time of the parallel section only.
    pub elapsed: Duration,
    pub bands: Vec<Band>,
    pub bands_completed: u32,
    /// In band order, regardless of completion order.
    pub failures: Vec<BandFailure>,
}

impl DispatchResult {
    pub fn bands_attempted(&self) -> usize {
        self.bands_completed as usize + self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn errors(&self) -> Vec<FilterError> {
        self.failures.iter().map(BandFailure::to_error).collect()
    }
}

/// Run `op` over `buffer`, one band per worker on a pool of exactly
/// `worker_count` threads, and block until all bands have returned.
///
/// The call is rejected before any work starts if the buffer has a zero
/// dimension or `worker_count` is zero; the buffer is then left untouched.
pub fn apply<O>(buffer: &mut PixelBuffer, worker_count: u32, op: &O) -> Result<DispatchResult>
where
    O: RowRangeOp + ?Sized,
{
    let width = buffer.width();
    let height = buffer.height();

    if width == 0 || height == 0 {
        return Err(FilterError::rejected(format!("image has zero size ({}x{})", width, height)));
    }
    if !buffer.is_consistent() {
        return Err(FilterError::rejected("pixel data length does not match dimensions"));
    }
    if worker_count == 0 {
        return Err(FilterError::rejected("worker count must be at least 1"));
    }

    let pool = ThreadPoolBuilder::new()
        .num_threads(worker_count as usize)
        .thread_name(|i| format!("band-worker-{}", i))
        .build()
        .map_err(|e| FilterError::rejected(format!("could not start {} workers: {}", worker_count, e)))?;

    let bands = partition(height, worker_count);
    let views = split_into_views(buffer, &bands);
    let mut outcomes: Vec<Option<std::result::Result<(), BandError>>> = vec![None; bands.len()];

    tracing::debug!(width, height, workers = worker_count, bands = bands.len(), "dispatching filter");

    let start = Instant::now();
    pool.scope(|scope| {
        for (view, slot) in views.into_iter().zip(outcomes.iter_mut()) {
            scope.spawn(move |_| {
                *slot = Some(run_band(op, view));
            });
        }
    });
    let elapsed = start.elapsed();

    let mut bands_completed = 0;
    let mut failures = Vec::new();
    for (band, outcome) in bands.iter().zip(outcomes) {
        match outcome {
            Some(Ok(())) => bands_completed += 1,
            Some(Err(error)) => {
                tracing::warn!(band = %band, %error, "band failed");
                failures.push(BandFailure { band: *band, error });
            }
            None => failures.push(BandFailure {
                band: *band,
                error: BandError::Failed("worker did not report".to_string()),
            }),
        }
    }

    tracing::info!(
        elapsed_ms = elapsed.as_millis() as u64,
        bands = bands.len(),
        completed = bands_completed,
        failed = failures.len(),
        "filter dispatch finished"
    );

    Ok(DispatchResult { elapsed, bands, bands_completed, failures })
}

fn split_into_views<'a>(buffer: &'a mut PixelBuffer, bands: &[Band]) -> Vec<BandView<'a>> {
    let width = buffer.width();
    let image_height = buffer.height();
    let stride = buffer.stride();

    let mut rest = buffer.data_mut();
    let mut views = Vec::with_capacity(bands.len());
    for band in bands {
        let (rows, tail) = std::mem::take(&mut rest).split_at_mut(band.len() as usize * stride);
        views.push(BandView { band: *band, width, image_height, rows });
        rest = tail;
    }
    debug_assert!(rest.is_empty());
    views
}

fn run_band<O>(op: &O, view: BandView<'_>) -> std::result::Result<(), BandError>
where
    O: RowRangeOp + ?Sized,
{
    let band = view.band();
    let started = Instant::now();
    let result = match panic::catch_unwind(AssertUnwindSafe(|| op.apply(view))) {
        Ok(result) => result,
        Err(payload) => Err(BandError::Panicked(panic_message(payload.as_ref()))),
    };
    tracing::debug!(band = %band, elapsed_us = started.elapsed().as_micros() as u64, ok = result.is_ok(), "band done");
    result
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
