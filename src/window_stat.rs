//! Rolling statistics over a fixed window of samples.
//!
//! The storage engine records the hit count of every evicted slot into one of
//! these windows so that operators can judge whether evicted items were ever
//! sampled before being dropped.
use serde::{Deserialize, Serialize};

/// A fixed-size rolling sample.
///
/// Holds the last `window_size` pushed values in a ring and summarizes them
/// on demand. Older values are overwritten once the window is full.
#[derive(Debug, Clone)]
pub struct WindowStat {
    name: String,
    window_size: usize,
    window: Vec<f64>,
    idx: usize,
    count: u64,
}

/// Summary of the values currently retained in a [`WindowStat`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSummary {
    /// Total number of values pushed over the window's lifetime.
    pub count: u64,

    /// Mean of the retained values.
    pub mean: f64,

    /// Population standard deviation of the retained values.
    pub std: f64,

    /// `[min, p10, p50, p90, max]` of the retained values.
    pub quantiles: [f64; 5],
}

impl WindowStat {
    /// Creates an empty window.
    ///
    /// # Arguments
    ///
    /// * `name` - Label used when reporting the summary.
    /// * `window_size` - Number of most recent values to retain.
    pub fn new(name: impl Into<String>, window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            name: name.into(),
            window_size,
            window: Vec::with_capacity(window_size),
            idx: 0,
            count: 0,
        }
    }

    /// Label of this window.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total number of values pushed over the window's lifetime.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Pushes a value, overwriting the oldest retained value once the
    /// window is full.
    pub fn push(&mut self, value: f64) {
        if self.window.len() < self.window_size {
            self.window.push(value);
        } else {
            self.window[self.idx] = value;
        }
        self.idx = (self.idx + 1) % self.window_size;
        self.count += 1;
    }

    /// Summarizes the retained values, or `None` if nothing has been pushed.
    pub fn summary(&self) -> Option<WindowSummary> {
        if self.window.is_empty() {
            return None;
        }
        let n = self.window.len() as f64;
        let mean = self.window.iter().sum::<f64>() / n;
        let var = self.window.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;

        let mut sorted = self.window.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).expect("NaN pushed into window"));
        let quantiles = [
            percentile(&sorted, 0.0),
            percentile(&sorted, 0.1),
            percentile(&sorted, 0.5),
            percentile(&sorted, 0.9),
            percentile(&sorted, 1.0),
        ];

        Some(WindowSummary {
            count: self.count,
            mean,
            std: var.sqrt(),
            quantiles,
        })
    }
}

/// Linearly interpolated percentile of an ascending-sorted slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (pos - lo as f64) * (sorted[hi] - sorted[lo])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_has_no_summary() {
        let stat = WindowStat::new("empty", 10);
        assert!(stat.summary().is_none());
    }

    #[test]
    fn summary_of_known_values() {
        let mut stat = WindowStat::new("hits", 10);
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0].iter() {
            stat.push(*v);
        }
        let s = stat.summary().unwrap();
        assert_eq!(s.count, 8);
        assert!((s.mean - 5.0).abs() < 1e-12);
        assert!((s.std - 2.0).abs() < 1e-12);
        assert_eq!(s.quantiles[0], 2.0);
        assert_eq!(s.quantiles[2], 4.5);
        assert_eq!(s.quantiles[4], 9.0);
    }

    #[test]
    fn window_drops_oldest_values() {
        let mut stat = WindowStat::new("w", 3);
        for v in 0..10 {
            stat.push(v as f64);
        }
        let s = stat.summary().unwrap();
        // Only 7, 8, 9 are retained.
        assert_eq!(s.count, 10);
        assert!((s.mean - 8.0).abs() < 1e-12);
        assert_eq!(s.quantiles[0], 7.0);
        assert_eq!(s.quantiles[4], 9.0);
    }
}
