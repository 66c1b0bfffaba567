//! Row partitioning across the worker fleet
//!
//! Every worker but the last gets the same share; the last one absorbs
//! whatever is left over so the shares always add up to the grid height.

use crate::error::{HaloError, HaloResult};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Per-worker row counts for one grid height
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    sizes: Vec<usize>,
    offsets: Vec<usize>,
}

/// Split `height` rows across `workers` strips
///
/// `base = ceil(height / workers)`, lowered by one when the naive split would
/// leave a whole share unused. The last slot is corrected by the surplus or
/// deficit. When the surplus would empty the last slot, every slot takes
/// `floor(height / workers)` and the last one takes the remainder instead.
/// Fails only for zero workers or more workers than rows.
pub fn strip_sizes(height: usize, workers: usize) -> HaloResult<Vec<usize>> {
    if workers == 0 || workers > height {
        return Err(HaloError::InvalidPartition { height, workers });
    }

    let mut base = height.div_ceil(workers);
    if base * workers - height == base {
        base -= 1;
    }

    let mut sizes = vec![base; workers];
    let sum = base * workers;
    let last = workers - 1;

    if sum > height {
        let surplus = sum - height;
        if surplus >= sizes[last] {
            let base = height / workers;
            sizes.fill(base);
            sizes[last] = height - base * last;
        } else {
            sizes[last] -= surplus;
        }
    } else if sum < height {
        sizes[last] += height - sum;
    }

    Ok(sizes)
}

impl Partition {
    /// Partition `height` rows across `workers`
    pub fn new(height: usize, workers: usize) -> HaloResult<Self> {
        let sizes = strip_sizes(height, workers)?;
        let offsets = sizes
            .iter()
            .scan(0, |acc, &size| {
                let offset = *acc;
                *acc += size;
                Some(offset)
            })
            .collect();
        Ok(Self { sizes, offsets })
    }

    /// Number of strips
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    /// Always false for a constructed partition
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Row counts in worker order
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Rows owned by worker `index`
    pub fn size(&self, index: usize) -> usize {
        self.sizes[index]
    }

    /// First grid row owned by worker `index`
    pub fn offset(&self, index: usize) -> usize {
        self.offsets[index]
    }

    /// Owned rows of worker `index`, without halo
    pub fn range(&self, index: usize) -> Range<usize> {
        let start = self.offsets[index];
        start..start + self.sizes[index]
    }

    /// Total rows covered
    pub fn height(&self) -> usize {
        self.sizes.iter().sum()
    }
}
