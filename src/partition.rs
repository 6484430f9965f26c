//! Splitting an image's rows into contiguous bands, one per worker.

use serde::Serialize;

/// Half-open row range `[start_row, end_row)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Band {
    pub start_row: u32,
    pub end_row: u32,
}

impl Band {
    pub fn new(start_row: u32, end_row: u32) -> Self {
        debug_assert!(start_row <= end_row);
        Self { start_row, end_row }
    }

    pub fn len(&self) -> u32 {
        self.end_row - self.start_row
    }

    pub fn is_empty(&self) -> bool {
        self.start_row == self.end_row
    }

    pub fn contains(&self, row: u32) -> bool {
        row >= self.start_row && row < self.end_row
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start_row, self.end_row)
    }
}

/// Divide `height` rows into at most `worker_count` bands.
///
/// The first `height % worker_count` bands receive one extra row, so any two
/// bands differ in size by at most one row. When there are more workers than
/// rows every band is a single row and fewer than `worker_count` bands come
/// back; callers must use the returned length, not the requested count.
///
/// A `worker_count` of zero is treated as one. A `height` of zero produces no
/// bands.
pub fn partition(height: u32, worker_count: u32) -> Vec<Band> {
    let workers = worker_count.max(1).min(height);
    if workers == 0 {
        return Vec::new();
    }

    let base = height / workers;
    let remainder = height % workers;

    let mut bands = Vec::with_capacity(workers as usize);
    let mut start = 0;
    for i in 0..workers {
        let rows = base + u32::from(i < remainder);
        bands.push(Band::new(start, start + rows));
        start += rows;
    }

    debug_assert_eq!(start, height);
    bands
}
