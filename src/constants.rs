pub const DEFAULT_MIN_DP: u32 = 10;
pub const DEFAULT_MIN_GQ: u32 = 20;
pub const DEFAULT_MIN_AF: f64 = 0.15;
pub const DEFAULT_MIN_DP_HV: u32 = 20;
pub const DEFAULT_MIN_AF_HV: f64 = 0.90;
pub const DEFAULT_MIN_DP_HET: u32 = 20;
pub const DEFAULT_MIN_AF_HET: f64 = 0.25;
pub const DEFAULT_MAX_AF_HET: f64 = 0.75;

pub const DEFAULT_BATCH_SIZE: usize = 100_000;
pub const DEFAULT_KEEP_HOM_REF: bool = false;

pub const DEFAULT_ANNOTATION_INFO_KEY: &str = "CSQ";

/// Whole-column sentinel for a sample without a usable call.
pub const NOCALL: &str = "./.";
pub const MISSING_VALUE: &str = ".";
pub const SPANNING_DELETION_ALLELE: &str = "*";

pub const AF_FORMAT_HEADER: &str =
    r#"##FORMAT=<ID=AF,Number=1,Type=Float,Description="Fraction of reads supporting the called variant allele">"#;

/// Minimum columns of a data line carrying genotypes: 8 fixed, FORMAT, one sample.
pub const MIN_GENOTYPE_COLUMNS: usize = 10;
