use crate::{constants::*, core::genotype::FilterParams, core::header::FULL_VERSION};
use anyhow::{anyhow, Result};
use chrono::Datelike;
use clap::{ArgAction, Parser, Subcommand};
use env_logger::fmt::Color;
use log::{Level, LevelFilter};
use std::{
    io::Write,
    path::{Path, PathBuf},
};

#[derive(Parser, Debug)]
#[command(name="vcfclean",
          version=&**FULL_VERSION,
          about="Batch-parallel VCF/GVCF genotype filtering, collation and cached annotation",
          long_about = None,
          after_help = format!("Copyright (C) {}  vcfclean contributors", chrono::Utc::now().year()),
          help_template = "{name} {version}\n{about-section}\n{usage-heading}\n    {usage}\n\n{all-args}{after-help}",
          )]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Specify multiple times to increase verbosity level (e.g., -vv for more verbosity)
    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        global = true
    )]
    pub verbosity: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Filter and correct genotypes, dropping records without variant calls
    Filter(FilterArgs),
    /// Merge a second sorted VCF into a primary one
    Collate(CollateArgs),
    /// Annotate records through a persisted cache and an external tool
    Annotate(AnnotateArgs),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Filter(_) => "filter",
            Command::Collate(_) => "collate",
            Command::Annotate(_) => "annotate",
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(arg_required_else_help(true))]
pub struct FilterArgs {
    /// Input VCF/GVCF (plain, gzip or BGZF; `-` for standard input)
    #[arg(value_name = "VCF", value_parser = check_input_path)]
    pub input: PathBuf,

    /// Write output to a file [default: standard output]
    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        value_parser = check_prefix_path
    )]
    pub output: Option<PathBuf>,

    /// Number of threads to use
    #[arg(
        short = '@',
        long = "threads",
        value_name = "THREADS",
        default_value = "1",
        value_parser = threads_in_range
    )]
    pub num_threads: usize,

    /// Target number of lines per batch
    #[arg(
        long = "batch-size",
        value_name = "LINES",
        default_value_t = DEFAULT_BATCH_SIZE,
        value_parser = batch_size_in_range
    )]
    pub batch_size: usize,

    /// Keep records whose only calls are homozygous reference
    #[arg(long = "keep-hom-ref", default_value_t = DEFAULT_KEEP_HOM_REF)]
    pub keep_hom_ref: bool,

    /// Samples to blank out (comma-separated list)
    #[arg(
        long = "exclude-samples",
        value_name = "SAMPLES",
        value_delimiter = ','
    )]
    pub exclude_samples: Vec<String>,

    /// Keep batch artifacts in this directory instead of memory (must not exist)
    #[arg(
        long = "scratch-dir",
        value_name = "DIR",
        value_parser = check_prefix_path,
        help_heading = "Advanced"
    )]
    pub scratch_dir: Option<PathBuf>,

    /// Do not append version and command line to the header
    #[arg(long = "no-version", help_heading = "Advanced")]
    pub no_version: bool,

    #[command(flatten)]
    pub filter_args: FilterArgsInner,
}

#[derive(Parser, Debug, Clone)]
pub struct FilterArgsInner {
    /// Minimum depth (max of DP, DPI, sum of AD) of a kept call
    #[arg(help_heading("Thresholds"), long, default_value_t = DEFAULT_MIN_DP)]
    pub min_dp: u32,

    /// Minimum genotype quality (max of GQ, GQX) of a kept call
    #[arg(help_heading("Thresholds"), long, default_value_t = DEFAULT_MIN_GQ)]
    pub min_gq: u32,

    /// Minimum variant allele fraction of a kept call
    #[arg(
        help_heading("Thresholds"),
        long,
        default_value_t = DEFAULT_MIN_AF,
        value_parser = fraction_in_range
    )]
    pub min_af: f64,

    /// Minimum depth for reclassifying a heterozygous call as homozygous variant
    #[arg(help_heading("Thresholds"), long, default_value_t = DEFAULT_MIN_DP_HV)]
    pub min_dp_hv: u32,

    /// Minimum allele fraction for reclassifying a heterozygous call as homozygous variant
    #[arg(
        help_heading("Thresholds"),
        long,
        default_value_t = DEFAULT_MIN_AF_HV,
        value_parser = fraction_in_range
    )]
    pub min_af_hv: f64,

    /// Minimum depth for reclassifying a homozygous variant call as heterozygous
    #[arg(help_heading("Thresholds"), long, default_value_t = DEFAULT_MIN_DP_HET)]
    pub min_dp_het: u32,

    /// Lower allele fraction bound for reclassifying a homozygous variant call as heterozygous
    #[arg(
        help_heading("Thresholds"),
        long,
        default_value_t = DEFAULT_MIN_AF_HET,
        value_parser = fraction_in_range
    )]
    pub min_af_het: f64,

    /// Upper allele fraction bound for reclassifying a homozygous variant call as heterozygous
    #[arg(
        help_heading("Thresholds"),
        long,
        default_value_t = DEFAULT_MAX_AF_HET,
        value_parser = fraction_in_range
    )]
    pub max_af_het: f64,
}

impl FilterArgsInner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, updates: impl FnOnce(&mut Self)) -> Self {
        updates(&mut self);
        self
    }

    /// Validated thresholds for the genotype filter.
    pub fn params(&self) -> crate::utils::util::Result<FilterParams> {
        let params = FilterParams {
            min_dp: self.min_dp,
            min_gq: self.min_gq,
            min_af: self.min_af,
            min_dp_hv: self.min_dp_hv,
            min_af_hv: self.min_af_hv,
            min_dp_het: self.min_dp_het,
            min_af_het: self.min_af_het,
            max_af_het: self.max_af_het,
        };
        params.validate()?;
        Ok(params)
    }
}

impl Default for FilterArgsInner {
    fn default() -> Self {
        Self {
            min_dp: DEFAULT_MIN_DP,
            min_gq: DEFAULT_MIN_GQ,
            min_af: DEFAULT_MIN_AF,
            min_dp_hv: DEFAULT_MIN_DP_HV,
            min_af_hv: DEFAULT_MIN_AF_HV,
            min_dp_het: DEFAULT_MIN_DP_HET,
            min_af_het: DEFAULT_MIN_AF_HET,
            max_af_het: DEFAULT_MAX_AF_HET,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(arg_required_else_help(true))]
pub struct CollateArgs {
    /// Primary VCF; its header and sample order define the output
    #[arg(long = "primary", value_name = "VCF", value_parser = check_input_path)]
    pub primary: PathBuf,

    /// Secondary VCF, remapped onto the primary sample order
    #[arg(long = "secondary", value_name = "VCF", value_parser = check_file_exists)]
    pub secondary: PathBuf,

    /// Write output to a file [default: standard output]
    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        value_parser = check_prefix_path
    )]
    pub output: Option<PathBuf>,

    /// Do not append version and command line to the header
    #[arg(long = "no-version", help_heading = "Advanced")]
    pub no_version: bool,
}

#[derive(Parser, Debug, Clone)]
#[command(arg_required_else_help(true))]
pub struct AnnotateArgs {
    /// Input VCF (plain, gzip or BGZF; `-` for standard input)
    #[arg(value_name = "VCF", value_parser = check_input_path)]
    pub input: PathBuf,

    /// Write output to a file [default: standard output]
    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        value_parser = check_prefix_path
    )]
    pub output: Option<PathBuf>,

    /// Annotation cache file, created on first use
    #[arg(long = "cache", value_name = "FILE", value_parser = check_prefix_path)]
    pub cache: PathBuf,

    /// Annotation program; reads VCF on standard input and writes VCF on standard output
    #[arg(long = "tool", value_name = "PROGRAM")]
    pub tool: String,

    /// Argument passed to the annotation program (repeatable)
    #[arg(
        long = "tool-arg",
        value_name = "ARG",
        allow_hyphen_values = true,
        action = ArgAction::Append
    )]
    pub tool_args: Vec<String>,

    /// INFO key carrying the annotation payload
    #[arg(long = "info-key", value_name = "KEY", default_value = DEFAULT_ANNOTATION_INFO_KEY)]
    pub info_key: String,

    /// Annotation schema header line the cache must have been built with
    #[arg(long = "expected-schema", value_name = "LINE")]
    pub expected_schema: Option<String>,

    /// Do not append version and command line to the header
    #[arg(long = "no-version", help_heading = "Advanced")]
    pub no_version: bool,
}

/// Initializes the verbosity level for logging based on the command-line arguments.
///
/// `-v` enables debug output, `-vv` and above enable trace output.
pub fn init_verbose(args: &Cli) {
    let filter_level: LevelFilter = match args.verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            let level = record.level();
            let mut style = buf.style();
            match record.level() {
                Level::Error => style.set_color(Color::Red),
                Level::Warn => style.set_color(Color::Yellow),
                Level::Info => style.set_color(Color::Green),
                Level::Debug => style.set_color(Color::Blue),
                Level::Trace => style.set_color(Color::Cyan),
            };

            writeln!(
                buf,
                "{} [{}] {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                style.value(level),
                record.module_path().unwrap_or("unknown_module"),
                record.args()
            )
        })
        .filter_level(filter_level)
        .init();
}

/// Validates that the provided string represents a valid number of threads.
fn threads_in_range(s: &str) -> Result<usize> {
    let thread: usize = s
        .parse::<usize>()
        .map_err(|_| anyhow!("`{}` is not a valid thread number", s))?;
    if thread == 0 {
        return Err(anyhow!("Number of threads must be >= 1"));
    }
    Ok(thread)
}

fn batch_size_in_range(s: &str) -> Result<usize> {
    let size: usize = s
        .parse::<usize>()
        .map_err(|_| anyhow!("`{}` is not a valid batch size", s))?;
    if size == 0 {
        return Err(anyhow!("Batch size must be >= 1"));
    }
    Ok(size)
}

fn fraction_in_range(s: &str) -> Result<f64> {
    let value: f64 = s
        .parse::<f64>()
        .map_err(|_| anyhow!("`{}` is not a valid fraction", s))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(anyhow!("Fraction must be within [0, 1], got {}", value));
    }
    Ok(value)
}

/// Checks if the provided file path exists.
fn check_file_exists(s: &str) -> Result<PathBuf> {
    let path = Path::new(s);
    if !path.exists() {
        return Err(anyhow!("File does not exist: {}", path.display()));
    }
    Ok(path.to_path_buf())
}

/// Like [`check_file_exists`], but also accepts `-` for standard input.
fn check_input_path(s: &str) -> Result<PathBuf> {
    if s == crate::io::readers::STDIN_PATH {
        return Ok(PathBuf::from(s));
    }
    check_file_exists(s)
}

fn check_prefix_path(s: &str) -> Result<PathBuf> {
    let path = Path::new(s);
    if let Some(parent_dir) = path.parent() {
        if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
            return Err(anyhow!("Path does not exist: {}", parent_dir.display()));
        }
    }
    Ok(path.to_path_buf())
}
