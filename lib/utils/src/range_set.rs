use alloc::vec::Vec;
use core::{cmp::max, fmt::Debug, ops::Range, slice::Iter};

/// Sorted set of disjoint, non-empty ranges.
///
/// Used as a free-list: [SortedRangeSet::take] carves numbers out of the lowest free range and
/// [SortedRangeSet::add] gives them back, merging neighbours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedRangeSet {
    inner: Vec<Range<usize>>,
}

impl SortedRangeSet {
    pub const fn new() -> SortedRangeSet {
        SortedRangeSet { inner: Vec::new() }
    }

    pub fn from_range(range: Range<usize>) -> SortedRangeSet {
        let mut res = SortedRangeSet::new();
        res.add(range);
        res
    }

    pub fn iter(&self) -> Iter<'_, Range<usize>> {
        self.inner.iter()
    }

    /// Total count of numbers in the set.
    pub fn len(&self) -> usize {
        self.inner.iter().map(|x| x.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn contains(&self, value: usize) -> bool {
        self.inner.iter().any(|x| x.contains(&value))
    }

    fn combine(&mut self) {
        self.inner.retain(|x| !x.is_empty());
        let mut merged: Vec<Range<usize>> = Vec::with_capacity(self.inner.len());
        for current in self.inner.drain(..) {
            if let Some(last) = merged.last_mut()
                && last.end >= current.start
            {
                last.end = max(last.end, current.end);
                continue;
            }
            merged.push(current);
        }
        self.inner = merged;
    }

    pub fn add(&mut self, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let pos = self.inner.partition_point(|x| x.start <= range.start);
        self.inner.insert(pos, range);
        self.combine();
    }

    pub fn sub(&mut self, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let mut res = Vec::with_capacity(self.inner.len() + 1);
        for current in self.inner.drain(..) {
            if current.end <= range.start || current.start >= range.end {
                res.push(current);
                continue;
            }
            //  [      ]
            //    [  ]
            if current.start < range.start {
                res.push(current.start..range.start);
            }
            //  [      ]
            //      [     ]
            if current.end > range.end {
                res.push(range.end..current.end);
            }
        }
        self.inner = res;
        self.combine();
    }

    /// Remove `count` consecutive numbers from the lowest range that can hold them.
    ///
    /// Return the first number taken, or `None` if no range is large enough.
    pub fn take(&mut self, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }
        let found = self.inner.iter().find(|x| x.len() >= count)?.start;
        self.sub(found..found + count);
        Some(found)
    }
}

impl Default for SortedRangeSet {
    fn default() -> Self {
        Self::new()
    }
}
