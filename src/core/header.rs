use crate::{error::VcfCleanError, utils::util::Result};
use once_cell::sync::Lazy;
use std::env;

/// Version string written to provenance header lines and `--version`.
pub static FULL_VERSION: Lazy<String> = Lazy::new(|| env!("CARGO_PKG_VERSION").to_string());

const COLUMN_PREFIX: &str = "#CHROM";
const FIXED_HEADER_COLUMNS: usize = 9;

/// Meta lines plus the `#CHROM` column line of a VCF stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VcfHeader {
    pub meta: Vec<String>,
    pub samples: Vec<String>,
    column_line: String,
}

/// Extracts the ID of a structured meta line, e.g. `##FORMAT=<ID=GT,...>`.
pub fn structured_line_id<'a>(line: &'a str, kind: &str) -> Option<&'a str> {
    let body = line.strip_prefix("##")?.strip_prefix(kind)?.strip_prefix("=<")?;
    let id_start = body.find("ID=")?;
    let id = &body[id_start + 3..];
    let id_end = id.find([',', '>']).unwrap_or(id.len());
    Some(&id[..id_end])
}

impl VcfHeader {
    pub fn new(meta: Vec<String>, column_line: String) -> Result<Self> {
        if !column_line.starts_with(COLUMN_PREFIX) {
            return Err(crate::vcfclean_error!(
                "Expected the #CHROM column line, found '{}'",
                column_line
            ));
        }
        let samples = column_line
            .split('\t')
            .skip(FIXED_HEADER_COLUMNS)
            .map(str::to_string)
            .collect();
        Ok(Self {
            meta,
            samples,
            column_line,
        })
    }

    /// Number of tab-separated columns a data line must carry.
    pub fn n_columns(&self) -> usize {
        self.column_line.split('\t').count()
    }

    pub fn sample_index(&self, name: &str) -> Option<usize> {
        self.samples.iter().position(|sample| sample == name)
    }

    pub fn structured_line(&self, kind: &str, id: &str) -> Option<&str> {
        self.meta
            .iter()
            .find(|line| structured_line_id(line, kind) == Some(id))
            .map(String::as_str)
    }

    pub fn declares_format(&self, id: &str) -> bool {
        self.structured_line("FORMAT", id).is_some()
    }

    pub fn require_format(&self, id: &str) -> Result<()> {
        if self.declares_format(id) {
            Ok(())
        } else {
            Err(VcfCleanError::MissingFormatField {
                field: id.to_string(),
            })
        }
    }

    /// Requires at least one of the given FORMAT fields to be declared.
    pub fn require_any_format(&self, ids: &[&str]) -> Result<()> {
        if ids.iter().any(|id| self.declares_format(id)) {
            Ok(())
        } else {
            Err(VcfCleanError::MissingFormatField {
                field: ids.join("|"),
            })
        }
    }

    /// Replaces the structured line with the same kind and ID, or appends it.
    pub fn upsert_structured_line(&mut self, kind: &str, line: &str) {
        let id = structured_line_id(line, kind);
        match self
            .meta
            .iter_mut()
            .find(|existing| id.is_some() && structured_line_id(existing, kind) == id)
        {
            Some(existing) => *existing = line.to_string(),
            None => self.meta.push(line.to_string()),
        }
    }

    pub fn add_version_info(&mut self) {
        let name = env!("CARGO_PKG_NAME");
        self.meta
            .push(format!("##{}Version={}", name, FULL_VERSION.as_str()));
        let command_line = env::args().collect::<Vec<String>>().join(" ");
        self.meta.push(format!("##{name}Command={command_line}"));
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.meta
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.column_line.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> VcfHeader {
        VcfHeader::new(
            vec![
                "##fileformat=VCFv4.2".to_string(),
                r#"##FORMAT=<ID=GT,Number=1,Type=String,Description="Genotype">"#.to_string(),
                r#"##FORMAT=<ID=AD,Number=R,Type=Integer,Description="Allelic depths">"#
                    .to_string(),
                r#"##INFO=<ID=CSQ,Number=.,Type=String,Description="Format: Allele|Gene">"#
                    .to_string(),
            ],
            "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2".to_string(),
        )
        .unwrap()
    }

    #[test]
    fn samples_are_read_from_the_column_line() {
        let header = header();
        assert_eq!(header.samples, vec!["S1", "S2"]);
        assert_eq!(header.n_columns(), 11);
        assert_eq!(header.sample_index("S2"), Some(1));
    }

    #[test]
    fn structured_ids_are_extracted() {
        assert_eq!(
            structured_line_id(r#"##FORMAT=<ID=DP,Number=1>"#, "FORMAT"),
            Some("DP")
        );
        assert_eq!(structured_line_id("##INFO=<ID=END>", "INFO"), Some("END"));
        assert_eq!(structured_line_id("##INFO=<ID=END>", "FORMAT"), None);
        assert_eq!(structured_line_id("##source=x", "INFO"), None);
    }

    #[test]
    fn format_requirements_are_checked() {
        let header = header();
        assert!(header.require_format("GT").is_ok());
        let err = header.require_any_format(&["GQ", "GQX"]).unwrap_err();
        assert!(matches!(err, VcfCleanError::MissingFormatField { ref field } if field == "GQ|GQX"));
    }

    #[test]
    fn upsert_replaces_matching_line_and_appends_new_ones() {
        let mut header = header();
        header.upsert_structured_line(
            "INFO",
            r#"##INFO=<ID=CSQ,Number=.,Type=String,Description="Format: Allele">"#,
        );
        header.upsert_structured_line("FORMAT", r#"##FORMAT=<ID=AF,Number=1,Type=Float>"#);
        assert_eq!(header.meta.len(), 5);
        assert!(header
            .structured_line("INFO", "CSQ")
            .unwrap()
            .contains("Format: Allele\""));
        assert!(header.declares_format("AF"));
    }

    #[test]
    fn version_info_is_appended() {
        let mut header = header();
        header.add_version_info();
        assert!(header.meta.iter().any(|line| line.starts_with("##vcfcleanVersion=")));
        assert!(header.meta.iter().any(|line| line.starts_with("##vcfcleanCommand=")));
    }

    #[test]
    fn column_line_must_start_with_chrom() {
        assert!(VcfHeader::new(Vec::new(), "chr1\t1".to_string()).is_err());
    }
}
