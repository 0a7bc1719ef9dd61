use crate::{
    core::header::VcfHeader,
    error::VcfCleanError,
    io::readers::open_vcf_input,
    utils::util::Result,
};
use std::{io::BufRead, path::Path};

/// Line-oriented VCF reader: the header is consumed on construction, data
/// lines are then yielded one at a time together with their line number.
pub struct VcfReader<R> {
    pub header: VcfHeader,
    reader: R,
    line_number: u64,
    buffer: String,
}

impl VcfReader<Box<dyn BufRead>> {
    pub fn from_path(path: &Path) -> Result<Self> {
        log::trace!("Start loading VCF {:?}", path);
        let reader = open_vcf_input(path)?;
        Self::new(reader)
            .map_err(|e| crate::vcfclean_error!("Error reading VCF header of {}: {e}", path.display()))
    }
}

impl<R: BufRead> VcfReader<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        let mut meta = Vec::new();
        let mut buffer = String::new();
        let mut line_number = 0;
        loop {
            buffer.clear();
            if reader.read_line(&mut buffer)? == 0 {
                return Err(crate::vcfclean_error!(
                    "Input ended before the #CHROM header line"
                ));
            }
            line_number += 1;
            let line = buffer.trim_end_matches(['\n', '\r']);
            if line.starts_with("##") {
                meta.push(line.to_string());
            } else if line.starts_with("#CHROM") {
                let header = VcfHeader::new(meta, line.to_string())?;
                return Ok(Self {
                    header,
                    reader,
                    line_number,
                    buffer,
                });
            } else {
                return Err(VcfCleanError::malformed(
                    line_number,
                    "data line found before the #CHROM header line",
                ));
            }
        }
    }

    /// Next data line and its 1-based line number in the input.
    pub fn next_line(&mut self) -> Result<Option<(u64, String)>> {
        loop {
            self.buffer.clear();
            if self.reader.read_line(&mut self.buffer)? == 0 {
                return Ok(None);
            }
            self.line_number += 1;
            let line = self.buffer.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                continue;
            }
            if line.starts_with('#') {
                return Err(VcfCleanError::malformed(
                    self.line_number,
                    "header line found after the #CHROM line",
                ));
            }
            return Ok(Some((self.line_number, line.to_string())));
        }
    }

    pub fn lines(self) -> DataLines<R> {
        DataLines { reader: self }
    }
}

pub struct DataLines<R> {
    reader: VcfReader<R>,
}

impl<R: BufRead> Iterator for DataLines<R> {
    type Item = Result<(u64, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next_line().transpose()
    }
}
