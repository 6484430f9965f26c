use image::{Rgb, RgbImage};
use rayon::prelude::*;
use serde::Serialize;

use crate::partition::partition;
use crate::pixel_buffer::{PixelBuffer, CHANNELS};

pub const LEVELS: usize = 256;

/// Channel index into a [`Histogram`], in buffer byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Blue = 0,
    Green = 1,
    Red = 2,
}

impl Channel {
    pub const ALL: [Channel; CHANNELS] = [Channel::Blue, Channel::Green, Channel::Red];

    pub fn name(&self) -> &'static str {
        match self {
            Channel::Blue => "blue",
            Channel::Green => "green",
            Channel::Red => "red",
        }
    }

    fn bar_color(&self) -> Rgb<u8> {
        match self {
            Channel::Blue => Rgb([0, 0, 255]),
            Channel::Green => Rgb([0, 128, 0]),
            Channel::Red => Rgb([255, 0, 0]),
        }
    }
}

/// Per-channel intensity counts of a BGR buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    counts: [[u64; LEVELS]; CHANNELS],
}

impl Default for Histogram {
    fn default() -> Self {
        Self { counts: [[0; LEVELS]; CHANNELS] }
    }
}

impl Histogram {
    /// Count every pixel in a single pass.
    pub fn compute(buffer: &PixelBuffer) -> Self {
        let mut histogram = Self::default();
        histogram.accumulate(buffer.data());
        histogram
    }

    /// Same counts as [`Histogram::compute`], with rows split into bands and
    /// counted on the rayon pool.
    pub fn compute_parallel(buffer: &PixelBuffer, worker_count: u32) -> Self {
        let stride = buffer.stride();
        let data = buffer.data();

        partition(buffer.height(), worker_count)
            .par_iter()
            .map(|band| {
                let mut local = Self::default();
                let start = band.start_row as usize * stride;
                let end = band.end_row as usize * stride;
                local.accumulate(&data[start..end]);
                local
            })
            .reduce(Self::default, |mut a, b| {
                a.merge(&b);
                a
            })
    }

    fn accumulate(&mut self, bytes: &[u8]) {
        let [blue, green, red] = &mut self.counts;
        for pixel in bytes.chunks_exact(CHANNELS) {
            blue[pixel[0] as usize] += 1;
            green[pixel[1] as usize] += 1;
            red[pixel[2] as usize] += 1;
        }
    }

    pub fn merge(&mut self, other: &Histogram) {
        for (mine, theirs) in self.counts.iter_mut().zip(other.counts.iter()) {
            for (a, b) in mine.iter_mut().zip(theirs.iter()) {
                *a += b;
            }
        }
    }

    pub fn channel(&self, channel: Channel) -> &[u64; LEVELS] {
        &self.counts[channel as usize]
    }

    pub fn count(&self, channel: Channel, level: u8) -> u64 {
        self.counts[channel as usize][level as usize]
    }

    /// Number of pixels counted; identical for every channel.
    pub fn total(&self, channel: Channel) -> u64 {
        self.channel(channel).iter().sum()
    }

    pub fn max_count(&self) -> u64 {
        self.counts.iter().flat_map(|c| c.iter()).copied().max().unwrap_or(0)
    }

    pub fn mean(&self, channel: Channel) -> Option<f64> {
        let total = self.total(channel);
        if total == 0 {
            return None;
        }
        let weighted: u64 = self.channel(channel).iter().enumerate().map(|(level, &n)| level as u64 * n).sum();
        Some(weighted as f64 / total as f64)
    }

    /// Draw interleaved blue/green/red bars, one column per channel per level,
    /// scaled so the largest count fills `height`.
    pub fn render(&self, height: u32) -> RgbImage {
        let width = (LEVELS * CHANNELS) as u32;
        let mut image = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));

        let max = self.max_count();
        if max == 0 || height == 0 {
            return image;
        }

        for level in 0..LEVELS {
            for channel in Channel::ALL {
                let count = self.counts[channel as usize][level];
                let bar = ((count as f64 / max as f64) * height as f64).round() as u32;
                let x = (level * CHANNELS + channel as usize) as u32;
                for y in height - bar.min(height)..height {
                    image.put_pixel(x, y, channel.bar_color());
                }
            }
        }

        image
    }

    pub fn report(&self) -> HistogramReport<'_> {
        HistogramReport {
            pixels: self.total(Channel::Blue),
            blue: self.channel(Channel::Blue),
            green: self.channel(Channel::Green),
            red: self.channel(Channel::Red),
        }
    }
}

/// Serializable view of a histogram.
#[derive(Debug, Serialize)]
pub struct HistogramReport<'a> {
    pub pixels: u64,
    pub blue: &'a [u64],
    pub green: &'a [u64],
    pub red: &'a [u64],
}
