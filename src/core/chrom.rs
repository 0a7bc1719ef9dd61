//! Total order over contig names used by every sorted-stream operation.
//!
//! Numbered autosomes sort numerically, followed by X, Y and the mitochondrial
//! contig (M or MT). Any other contig (alt, decoy, unplaced) sorts after those,
//! lexicographically. A leading `chr` is ignored so `chr2` and `2` are equal.

use std::{cmp::Ordering, fmt};

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ChromKey {
    Numeric(u32),
    X,
    Y,
    Mito,
    Other(String),
}

impl ChromKey {
    pub fn from_name(name: &str) -> Self {
        let bare = name
            .strip_prefix("chr")
            .or_else(|| name.strip_prefix("Chr"))
            .or_else(|| name.strip_prefix("CHR"))
            .unwrap_or(name);
        if !bare.is_empty() && bare.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = bare.parse::<u32>() {
                return ChromKey::Numeric(n);
            }
        }
        match bare {
            "X" | "x" => ChromKey::X,
            "Y" | "y" => ChromKey::Y,
            "M" | "MT" | "m" | "mt" => ChromKey::Mito,
            _ => ChromKey::Other(bare.to_string()),
        }
    }
}

impl fmt::Display for ChromKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChromKey::Numeric(n) => write!(f, "{n}"),
            ChromKey::X => write!(f, "X"),
            ChromKey::Y => write!(f, "Y"),
            ChromKey::Mito => write!(f, "M"),
            ChromKey::Other(name) => write!(f, "{name}"),
        }
    }
}

/// Sort key of one record: contig rank, then 1-based position.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct LocusKey {
    pub chrom: ChromKey,
    pub pos: u64,
}

impl LocusKey {
    pub fn new(chrom: &str, pos: u64) -> Self {
        Self {
            chrom: ChromKey::from_name(chrom),
            pos,
        }
    }
}

impl Ord for LocusKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.chrom
            .cmp(&other.chrom)
            .then_with(|| self.pos.cmp(&other.pos))
    }
}

impl PartialOrd for LocusKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for LocusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chrom, self.pos)
    }
}
