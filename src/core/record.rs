use crate::{
    constants::{MISSING_VALUE, NOCALL},
    core::chrom::LocusKey,
    error::VcfCleanError,
    utils::util::Result,
};
use std::fmt;

const FIXED_COLUMNS: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InfoField {
    pub key: String,
    pub value: Option<String>,
}

/// One VCF data line split into its columns.
///
/// Columns the pipeline does not interpret (ID, QUAL, FILTER, sample values)
/// are kept verbatim so an untouched record renders back to the same line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariantRecord {
    pub chrom: String,
    pub pos: u64,
    pub id: String,
    pub ref_allele: String,
    pub alt: String,
    pub qual: String,
    pub filter: String,
    pub info: Vec<InfoField>,
    pub format_keys: Vec<String>,
    pub samples: Vec<Vec<String>>,
}

/// Parses CHROM and POS without splitting the rest of the line.
pub fn parse_locus(line: &str, line_number: u64) -> Result<(&str, u64)> {
    let mut columns = line.splitn(3, '\t');
    let chrom = columns
        .next()
        .filter(|chrom| !chrom.is_empty())
        .ok_or_else(|| VcfCleanError::malformed(line_number, "missing CHROM column"))?;
    let pos = columns
        .next()
        .ok_or_else(|| VcfCleanError::malformed(line_number, "missing POS column"))?;
    let pos = parse_position(pos, line_number)?;
    Ok((chrom, pos))
}

pub fn locus_key_of_line(line: &str, line_number: u64) -> Result<LocusKey> {
    let (chrom, pos) = parse_locus(line, line_number)?;
    Ok(LocusKey::new(chrom, pos))
}

/// REF and ALT columns of a raw line.
pub fn parse_ref_alt(line: &str, line_number: u64) -> Result<(&str, &str)> {
    let mut columns = line.split('\t').skip(3);
    match (columns.next(), columns.next()) {
        (Some(ref_allele), Some(alt)) => Ok((ref_allele, alt)),
        _ => Err(VcfCleanError::malformed(
            line_number,
            "expected at least 5 tab-separated columns",
        )),
    }
}

fn parse_position(value: &str, line_number: u64) -> Result<u64> {
    match value.parse::<u64>() {
        Ok(pos) if pos > 0 => Ok(pos),
        _ => Err(VcfCleanError::malformed(
            line_number,
            format!("invalid POS '{value}'"),
        )),
    }
}

fn parse_info(info: &str) -> Vec<InfoField> {
    if info == MISSING_VALUE || info.is_empty() {
        return Vec::new();
    }
    info.split(';')
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) => InfoField {
                key: key.to_string(),
                value: Some(value.to_string()),
            },
            None => InfoField {
                key: entry.to_string(),
                value: None,
            },
        })
        .collect()
}

pub fn is_reference_only_alt(alt: &str) -> bool {
    matches!(alt, "." | "<NON_REF>" | "<*>")
}

/// END of a non-variant block line, `None` for any other line.
pub fn block_end_of_line(line: &str, line_number: u64) -> Result<Option<u64>> {
    let columns: Vec<&str> = line.splitn(9, '\t').collect();
    let (Some(alt), Some(info)) = (columns.get(4), columns.get(7)) else {
        return Ok(None);
    };
    if !is_reference_only_alt(alt) {
        return Ok(None);
    }
    match info.split(';').find_map(|entry| entry.strip_prefix("END=")) {
        Some(value) => value.parse::<u64>().map(Some).map_err(|_| {
            VcfCleanError::malformed(line_number, format!("invalid END '{value}'"))
        }),
        None => Ok(None),
    }
}

impl VariantRecord {
    pub fn parse(line: &str, line_number: u64) -> Result<Self> {
        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() < FIXED_COLUMNS {
            return Err(VcfCleanError::malformed(
                line_number,
                format!(
                    "expected at least {FIXED_COLUMNS} tab-separated columns, found {}",
                    columns.len()
                ),
            ));
        }
        if columns[0].is_empty() {
            return Err(VcfCleanError::malformed(line_number, "empty CHROM column"));
        }
        let pos = parse_position(columns[1], line_number)?;

        let format_keys = match columns.get(FIXED_COLUMNS) {
            Some(format) => format.split(':').map(str::to_string).collect(),
            None => Vec::new(),
        };
        let samples = columns
            .iter()
            .skip(FIXED_COLUMNS + 1)
            .map(|sample| sample.split(':').map(str::to_string).collect::<Vec<_>>())
            .collect::<Vec<_>>();
        for (sample_index, values) in samples.iter().enumerate() {
            if values.len() > format_keys.len() {
                return Err(VcfCleanError::malformed(
                    line_number,
                    format!(
                        "sample column {} has {} values but FORMAT declares {}",
                        sample_index + 1,
                        values.len(),
                        format_keys.len()
                    ),
                ));
            }
        }

        Ok(Self {
            chrom: columns[0].to_string(),
            pos,
            id: columns[2].to_string(),
            ref_allele: columns[3].to_string(),
            alt: columns[4].to_string(),
            qual: columns[5].to_string(),
            filter: columns[6].to_string(),
            info: parse_info(columns[7]),
            format_keys,
            samples,
        })
    }

    /// Variant identity used as the annotation cache key.
    pub fn signature(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.chrom, self.pos, self.ref_allele, self.alt
        )
    }

    pub fn alt_alleles(&self) -> impl Iterator<Item = &str> {
        self.alt.split(',')
    }

    /// Number of ALT alleles, counting a missing ALT as zero.
    pub fn alt_count(&self) -> usize {
        if self.alt == MISSING_VALUE {
            0
        } else {
            self.alt_alleles().count()
        }
    }

    pub fn info_value(&self, key: &str) -> Option<&str> {
        self.info
            .iter()
            .find(|field| field.key == key)
            .and_then(|field| field.value.as_deref())
    }

    pub fn set_info(&mut self, key: &str, value: Option<String>) {
        match self.info.iter_mut().find(|field| field.key == key) {
            Some(field) => field.value = value,
            None => self.info.push(InfoField {
                key: key.to_string(),
                value,
            }),
        }
    }

    pub fn end(&self, line_number: u64) -> Result<Option<u64>> {
        match self.info_value("END") {
            Some(value) => value.parse::<u64>().map(Some).map_err(|_| {
                VcfCleanError::malformed(line_number, format!("invalid END '{value}'"))
            }),
            None => Ok(None),
        }
    }

    pub fn is_reference_only(&self) -> bool {
        is_reference_only_alt(&self.alt)
    }

    /// Non-variant coverage block: reference-only ALT with an END coordinate.
    pub fn is_block(&self) -> bool {
        self.is_reference_only() && self.info_value("END").is_some()
    }

    pub fn nocall_sample() -> Vec<String> {
        vec![NOCALL.to_string()]
    }

    fn write_info(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.info.is_empty() {
            return write!(f, "{MISSING_VALUE}");
        }
        for (index, field) in self.info.iter().enumerate() {
            if index > 0 {
                write!(f, ";")?;
            }
            match &field.value {
                Some(value) => write!(f, "{}={}", field.key, value)?,
                None => write!(f, "{}", field.key)?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for VariantRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t",
            self.chrom, self.pos, self.id, self.ref_allele, self.alt, self.qual, self.filter
        )?;
        self.write_info(f)?;
        if self.format_keys.is_empty() {
            return Ok(());
        }
        write!(f, "\t{}", self.format_keys.join(":"))?;
        for values in &self.samples {
            write!(f, "\t{}", values.join(":"))?;
        }
        Ok(())
    }
}
