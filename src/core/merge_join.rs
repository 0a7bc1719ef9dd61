//! Two-pointer merge of two streams sorted by [`LocusKey`].
//!
//! On equal keys the primary stream's record is emitted first. Both inputs
//! are checked for sortedness as they are consumed; a stream that goes
//! backwards is an error because the merged output would silently lose its
//! order.

use crate::{core::chrom::LocusKey, error::VcfCleanError, utils::util::Result};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Side {
    Primary,
    Secondary,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MergeCounts {
    pub primary: u64,
    pub secondary: u64,
}

impl MergeCounts {
    pub fn total(&self) -> u64 {
        self.primary + self.secondary
    }
}

struct SortedInput<I, T> {
    name: &'static str,
    iter: I,
    head: Option<(LocusKey, T)>,
    last_key: Option<LocusKey>,
    exhausted: bool,
}

impl<I, T> SortedInput<I, T>
where
    I: Iterator<Item = Result<T>>,
{
    fn new(name: &'static str, iter: I) -> Self {
        Self {
            name,
            iter,
            head: None,
            last_key: None,
            exhausted: false,
        }
    }

    fn fill<K>(&mut self, key_of: &K) -> Result<()>
    where
        K: Fn(&T) -> Result<LocusKey>,
    {
        if self.head.is_some() || self.exhausted {
            return Ok(());
        }
        let Some(item) = self.iter.next() else {
            self.exhausted = true;
            return Ok(());
        };
        let item = item?;
        let key = key_of(&item)?;
        if let Some(last_key) = &self.last_key {
            if key < *last_key {
                return Err(VcfCleanError::UnsortedStream {
                    stream: self.name.to_string(),
                    previous: last_key.to_string(),
                    current: key.to_string(),
                });
            }
        }
        self.last_key = Some(key.clone());
        self.head = Some((key, item));
        Ok(())
    }

    fn head_key(&self) -> Option<&LocusKey> {
        self.head.as_ref().map(|(key, _)| key)
    }

    fn take(&mut self) -> Option<T> {
        self.head.take().map(|(_, item)| item)
    }
}

pub struct MergeJoin<P, S, T, K> {
    primary: SortedInput<P, T>,
    secondary: SortedInput<S, T>,
    key_of: K,
    counts: MergeCounts,
    failed: bool,
}

impl<P, S, T, K> MergeJoin<P, S, T, K>
where
    P: Iterator<Item = Result<T>>,
    S: Iterator<Item = Result<T>>,
    K: Fn(&T) -> Result<LocusKey>,
{
    pub fn new(primary: P, secondary: S, key_of: K) -> Self {
        Self {
            primary: SortedInput::new("primary", primary),
            secondary: SortedInput::new("secondary", secondary),
            key_of,
            counts: MergeCounts::default(),
            failed: false,
        }
    }

    pub fn counts(&self) -> MergeCounts {
        self.counts
    }

    fn next_side(&mut self) -> Result<Option<Side>> {
        self.primary.fill(&self.key_of)?;
        self.secondary.fill(&self.key_of)?;
        let side = match (self.primary.head_key(), self.secondary.head_key()) {
            (None, None) => return Ok(None),
            (Some(_), None) => Side::Primary,
            (None, Some(_)) => Side::Secondary,
            (Some(primary), Some(secondary)) => {
                if primary <= secondary {
                    Side::Primary
                } else {
                    Side::Secondary
                }
            }
        };
        Ok(Some(side))
    }

    /// Next merged item together with the stream it came from.
    pub fn next_with_side(&mut self) -> Option<Result<(Side, T)>> {
        if self.failed {
            return None;
        }
        match self.next_side() {
            Ok(Some(Side::Primary)) => {
                self.counts.primary += 1;
                self.primary.take().map(|item| Ok((Side::Primary, item)))
            }
            Ok(Some(Side::Secondary)) => {
                self.counts.secondary += 1;
                self.secondary.take().map(|item| Ok((Side::Secondary, item)))
            }
            Ok(None) => None,
            Err(error) => {
                self.failed = true;
                Some(Err(error))
            }
        }
    }
}

impl<P, S, T, K> Iterator for MergeJoin<P, S, T, K>
where
    P: Iterator<Item = Result<T>>,
    S: Iterator<Item = Result<T>>,
    K: Fn(&T) -> Result<LocusKey>,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_with_side()
            .map(|result| result.map(|(_, item)| item))
    }
}

/// Drains both streams through `emit` in merged order.
pub fn merge_sorted_into_sink<P, S, T, K, F>(
    primary: P,
    secondary: S,
    key_of: K,
    mut emit: F,
) -> Result<MergeCounts>
where
    P: Iterator<Item = Result<T>>,
    S: Iterator<Item = Result<T>>,
    K: Fn(&T) -> Result<LocusKey>,
    F: FnMut(Side, T) -> Result<()>,
{
    let mut merge = MergeJoin::new(primary, secondary, key_of);
    while let Some(next) = merge.next_with_side() {
        let (side, item) = next?;
        emit(side, item)?;
    }
    Ok(merge.counts())
}
