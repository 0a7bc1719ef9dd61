use crate::utils::util::Result;
use flate2::read::MultiGzDecoder;
use rust_htslib::bgzf;
use std::{
    fs::File,
    io::{self, BufRead, BufReader, Read},
    path::Path,
};

pub const STDIN_PATH: &str = "-";

fn has_gzip_magic(path: &Path) -> Result<bool> {
    let mut f = File::open(path)
        .map_err(|e| crate::vcfclean_error!("Failed to open {}: {e}", path.display()))?;
    let mut m = [0u8; 2];
    let n = f
        .read(&mut m)
        .map_err(|e| crate::vcfclean_error!("Failed to read {}: {e}", path.display()))?;
    Ok(n == 2 && m == [0x1f, 0x8b])
}

/// Opens a VCF text stream: stdin for `-`, BGZF through htslib, other gzip
/// through flate2, plain text otherwise.
pub fn open_vcf_input(path: &Path) -> Result<Box<dyn BufRead>> {
    if path.as_os_str() == STDIN_PATH {
        log::debug!("Reading VCF from standard input");
        return Ok(Box::new(BufReader::new(io::stdin().lock())));
    }

    if !has_gzip_magic(path)? {
        let file = File::open(path)
            .map_err(|e| crate::vcfclean_error!("Failed to open {}: {e}", path.display()))?;
        return Ok(Box::new(BufReader::new(file)));
    }

    let is_bgzf = bgzf::is_bgzip(path).map_err(|e| {
        crate::vcfclean_error!(
            "Failed to determine whether {} is BGZF-compressed: {e}",
            path.display()
        )
    })?;
    if is_bgzf {
        log::trace!("Opening {} as BGZF", path.display());
        let reader = bgzf::Reader::from_path(path).map_err(|e| {
            crate::vcfclean_error!("Failed to open BGZF reader for {}: {e}", path.display())
        })?;
        Ok(Box::new(BufReader::new(reader)))
    } else {
        log::trace!("Opening {} as gzip", path.display());
        let file = File::open(path)
            .map_err(|e| crate::vcfclean_error!("Failed to open {}: {e}", path.display()))?;
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    }
}
