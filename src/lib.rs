//! Band-parallel image filtering.
//!
//! An image is decoded into a BGR [`PixelBuffer`], its rows are split into
//! disjoint bands with [`partition`], and a [`RowRangeOp`] runs on every band
//! concurrently through [`dispatcher::apply`]. [`Histogram`] counts the
//! channel intensities before and after.

pub mod dispatcher;
pub mod errors;
pub mod filters;
pub mod histogram;
pub mod image_loader;
pub mod logging;
pub mod partition;
pub mod pixel_buffer;
pub mod profiler;
pub mod session;
pub mod settings;

#[cfg(test)]
mod tests;

pub use dispatcher::{BandView, DispatchResult, RowRangeOp};
pub use errors::{BandError, FilterError, Result};
pub use filters::{FilterKind, NativeRowFilter};
pub use histogram::{Channel, Histogram};
pub use partition::{partition, Band};
pub use pixel_buffer::PixelBuffer;
pub use session::Session;
pub use settings::Settings;
