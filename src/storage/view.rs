//! Read-only windowed projections over a storage.
use super::base::StorageRead;
use crate::error::StorageError;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A slice specification over logical indices.
///
/// Semantics mirror conventional sequence slicing: negative `start`/`stop`
/// count from the end, omitted bounds default per the sign of `step` (for
/// `step > 0`: the full range ascending; for `step < 0`: from the last item
/// down to and including the first), and out-of-range bounds are clamped.
///
/// ```
/// use replay_storage::SliceSpec;
///
/// let spec = SliceSpec::new(Some(2), Some(8), 2);
/// assert_eq!(spec.resolve(10).unwrap(), vec![2, 4, 6]);
///
/// let rev = SliceSpec::reversed();
/// assert_eq!(rev.resolve(3).unwrap(), vec![2, 1, 0]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceSpec {
    /// First index of the slice, or the step-dependent default.
    pub start: Option<i64>,

    /// Exclusive end of the slice, or the step-dependent default.
    pub stop: Option<i64>,

    /// Stride between selected indices; must be nonzero.
    pub step: i64,
}

impl Default for SliceSpec {
    fn default() -> Self {
        Self::full()
    }
}

impl SliceSpec {
    /// Creates a slice specification.
    pub fn new(start: Option<i64>, stop: Option<i64>, step: i64) -> Self {
        Self { start, stop, step }
    }

    /// The full range in logical order.
    pub fn full() -> Self {
        Self {
            start: None,
            stop: None,
            step: 1,
        }
    }

    /// The full range in reverse order, newest first.
    pub fn reversed() -> Self {
        Self {
            start: None,
            stop: None,
            step: -1,
        }
    }

    /// Materializes the logical-index list this specification selects from a
    /// sequence of length `len`.
    ///
    /// # Errors
    ///
    /// [`StorageError::ZeroStep`] if `step == 0`.
    pub fn resolve(&self, len: usize) -> Result<Vec<usize>, StorageError> {
        if self.step == 0 {
            return Err(StorageError::ZeroStep);
        }
        let len = len as i64;
        let step = self.step;

        // Bounds default and clamp exactly as slice.indices(): for negative
        // steps the lower sentinel sits one before index 0 so that an
        // omitted stop terminates after the first item, not before it.
        let (lo, hi) = if step > 0 { (0, len) } else { (-1, len - 1) };
        let start = match self.start {
            None => {
                if step > 0 {
                    0
                } else {
                    len - 1
                }
            }
            Some(s) => clamp_index(s, len, lo, hi),
        };
        let stop = match self.stop {
            None => {
                if step > 0 {
                    len
                } else {
                    -1
                }
            }
            Some(s) => clamp_index(s, len, lo, hi),
        };

        let mut indices = Vec::new();
        let mut i = start;
        while (step > 0 && i < stop) || (step < 0 && i > stop) {
            indices.push(i as usize);
            i += step;
        }
        Ok(indices)
    }
}

/// Normalizes a possibly negative bound against `len` and clamps it to
/// `[lo, hi]`.
fn clamp_index(i: i64, len: i64, lo: i64, hi: i64) -> i64 {
    let i = if i < 0 { i + len } else { i };
    i.max(lo).min(hi)
}

/// A read-only view of a storage (or of another view).
///
/// The view holds an explicit ordered list of parent logical indices,
/// materialized when the view is constructed; `len` and `get` are O(1)
/// afterwards. A view exposes no mutating or snapshot operations: it is
/// permanently read-only and stateless, and it never outlives its parent.
pub struct StorageView<'a, P: StorageRead> {
    parent: &'a mut P,
    indices: Vec<usize>,
}

impl<'a, P: StorageRead> StorageView<'a, P> {
    /// Creates a view of `parent` selecting the indices of `spec`.
    pub fn new(parent: &'a mut P, spec: SliceSpec) -> Result<Self> {
        let indices = spec.resolve(parent.len())?;
        Ok(Self { parent, indices })
    }

    /// The parent logical indices this view projects, in view order.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

impl<'a, P: StorageRead> StorageRead for StorageView<'a, P> {
    type Item = P::Item;

    fn len(&self) -> usize {
        self.indices.len()
    }

    fn get(&mut self, i: usize) -> Result<P::Item> {
        let idx = *self.indices.get(i).ok_or(StorageError::OutOfRange {
            index: i,
            len: self.indices.len(),
        })?;
        self.parent.get(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(start: Option<i64>, stop: Option<i64>, step: i64, len: usize) -> Vec<usize> {
        SliceSpec::new(start, stop, step).resolve(len).unwrap()
    }

    #[test]
    fn positive_step_defaults() {
        assert_eq!(resolve(None, None, 1, 5), vec![0, 1, 2, 3, 4]);
        assert_eq!(resolve(Some(2), Some(8), 2, 10), vec![2, 4, 6]);
        assert_eq!(resolve(None, None, 3, 10), vec![0, 3, 6, 9]);
    }

    #[test]
    fn negative_step_defaults_cover_the_whole_range() {
        // The classical off-by-one hazard: an omitted stop with a negative
        // step must terminate after index 0, not one element early.
        assert_eq!(
            resolve(None, None, -1, 10),
            vec![9, 8, 7, 6, 5, 4, 3, 2, 1, 0]
        );
        assert_eq!(resolve(None, None, -2, 5), vec![4, 2, 0]);
        assert_eq!(resolve(Some(3), None, -1, 5), vec![3, 2, 1, 0]);
    }

    #[test]
    fn negative_bounds_count_from_the_end() {
        assert_eq!(resolve(Some(-3), None, 1, 10), vec![7, 8, 9]);
        assert_eq!(resolve(None, Some(-1), 1, 5), vec![0, 1, 2, 3]);
        assert_eq!(resolve(Some(-1), Some(-4), -1, 10), vec![9, 8, 7]);
    }

    #[test]
    fn out_of_range_bounds_are_clamped() {
        assert_eq!(resolve(Some(3), Some(100), 1, 5), vec![3, 4]);
        assert_eq!(resolve(Some(100), None, -1, 3), vec![2, 1, 0]);
        assert_eq!(resolve(Some(-100), None, 1, 3), vec![0, 1, 2]);
        assert!(resolve(Some(5), Some(2), 1, 10).is_empty());
    }

    #[test]
    fn empty_parent_yields_empty_view() {
        assert!(resolve(None, None, 1, 0).is_empty());
        assert!(resolve(None, None, -1, 0).is_empty());
    }

    #[test]
    fn zero_step_is_rejected() {
        assert!(matches!(
            SliceSpec::new(None, None, 0).resolve(5),
            Err(StorageError::ZeroStep)
        ));
    }
}
