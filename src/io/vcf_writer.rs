use crate::{core::header::VcfHeader, utils::util::Result};
use rust_htslib::bgzf;
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    Vcf,
    CompressedVcf,
}

impl OutputType {
    pub fn from_path(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return OutputType::Vcf;
        };
        let path_lower = path.to_string_lossy().to_lowercase();
        if path_lower.ends_with(".gz") || path_lower.ends_with(".bgz") {
            OutputType::CompressedVcf
        } else {
            OutputType::Vcf
        }
    }
}

/// VCF text sink; `.gz`/`.bgz` paths are written BGZF-compressed.
pub struct VcfWriter {
    writer: Box<dyn Write>,
    pub records_written: u64,
}

impl VcfWriter {
    pub fn new(header: &VcfHeader, output: Option<&Path>) -> Result<Self> {
        let output_type = OutputType::from_path(output);
        log::trace!("Output type {:?}", output_type);
        let writer: Box<dyn Write> = match (output, output_type) {
            (None, _) => Box::new(BufWriter::new(io::stdout().lock())),
            (Some(path), OutputType::CompressedVcf) => {
                let writer = bgzf::Writer::from_path(path).map_err(|e| {
                    crate::vcfclean_error!(
                        "Failed to create BGZF writer for {}: {e}",
                        path.display()
                    )
                })?;
                Box::new(BufWriter::new(writer))
            }
            (Some(path), OutputType::Vcf) => {
                let file = File::create(path).map_err(|e| {
                    crate::vcfclean_error!("Failed to create {}: {e}", path.display())
                })?;
                Box::new(BufWriter::new(file))
            }
        };
        Self::from_writer(header, writer)
    }

    pub fn from_writer(header: &VcfHeader, mut writer: Box<dyn Write>) -> Result<Self> {
        for line in header.lines() {
            writeln!(writer, "{line}")?;
        }
        Ok(Self {
            writer,
            records_written: 0,
        })
    }

    pub fn write_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.writer, "{line}")?;
        self.records_written += 1;
        Ok(())
    }

    /// Copies already newline-terminated record text.
    pub fn write_block(&mut self, block: &[u8], records: u64) -> Result<()> {
        self.writer.write_all(block)?;
        self.records_written += records;
        Ok(())
    }

    pub fn finish(mut self) -> Result<u64> {
        self.writer.flush()?;
        Ok(self.records_written)
    }
}
