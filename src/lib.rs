pub mod cli;
pub mod commands;
pub mod error;

pub mod core {
    pub mod chrom;
    pub mod genotype;
    pub mod header;
    pub mod merge_join;
    pub mod record;
    pub mod sample_remap;
}

pub mod io {
    pub mod readers;
    pub mod vcf_reader;
    pub mod vcf_writer;
}

pub mod annotation {
    pub mod cache;
    pub mod tool;
}

pub mod utils {
    pub mod util;
}

pub mod constants;

pub use constants::*;
