use crate::{
    core::record::{block_end_of_line, parse_locus, parse_ref_alt},
    utils::util::Result,
};

use super::types::Batch;

/// Cuts the ordered data-line stream into numbered batches.
///
/// A batch is closed once it holds at least `batch_size` lines and the next
/// line is a single-base REF/ALT record at a different locus than the line
/// before it, and no block on the previous line reaches that line's
/// position. Records that must be examined together (an indel and the
/// reference line preceding it, repeated positions, a block and the line its
/// END touches) thus never straddle a boundary.
pub struct BatchSplitter<I> {
    lines: I,
    batch_size: usize,
    current: Vec<(u64, String)>,
    previous_locus: Option<(String, u64)>,
    previous_block_end: Option<(String, u64)>,
    next_number: u64,
    done: bool,
}

fn is_single_base(allele: &str) -> bool {
    allele.len() == 1
}

impl<I> BatchSplitter<I>
where
    I: Iterator<Item = Result<(u64, String)>>,
{
    pub fn new(lines: I, batch_size: usize) -> Self {
        Self {
            lines,
            batch_size: batch_size.max(1),
            current: Vec::new(),
            previous_locus: None,
            previous_block_end: None,
            next_number: 0,
            done: false,
        }
    }

    /// Number of batches emitted so far.
    pub fn batches_emitted(&self) -> u64 {
        self.next_number
    }

    fn take_batch(&mut self) -> Batch {
        let batch = Batch {
            number: self.next_number,
            lines: std::mem::take(&mut self.current),
        };
        self.next_number += 1;
        batch
    }

    fn may_cut_before(&self, line: &str, line_number: u64) -> Result<bool> {
        let (ref_allele, alt) = parse_ref_alt(line, line_number)?;
        if !is_single_base(ref_allele) || !is_single_base(alt) {
            return Ok(false);
        }
        let (chrom, pos) = parse_locus(line, line_number)?;
        if let Some((block_chrom, end)) = &self.previous_block_end {
            if block_chrom == chrom && *end >= pos {
                return Ok(false);
            }
        }
        Ok(self
            .previous_locus
            .as_ref()
            .map_or(true, |(previous_chrom, previous_pos)| {
                previous_chrom != chrom || *previous_pos != pos
            }))
    }

    fn remember(&mut self, line: &str, line_number: u64) -> Result<()> {
        let (chrom, pos) = parse_locus(line, line_number)?;
        self.previous_block_end = block_end_of_line(line, line_number)?
            .map(|end| (chrom.to_string(), end));
        self.previous_locus = Some((chrom.to_string(), pos));
        Ok(())
    }

    fn next_batch(&mut self) -> Result<Option<Batch>> {
        while let Some(next) = self.lines.next() {
            let (line_number, line) = next?;
            let cut =
                self.may_cut_before(&line, line_number)? && self.current.len() >= self.batch_size;
            self.remember(&line, line_number)?;
            if cut {
                let batch = self.take_batch();
                self.current.push((line_number, line));
                return Ok(Some(batch));
            }
            self.current.push((line_number, line));
        }
        self.done = true;
        if self.current.is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.take_batch()))
        }
    }
}

impl<I> Iterator for BatchSplitter<I>
where
    I: Iterator<Item = Result<(u64, String)>>,
{
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_batch() {
            Ok(batch) => batch.map(Ok),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
