//! Persisted variant annotation cache.
//!
//! Maps `chrom:pos:ref:alt` signatures to the annotation payload the external
//! tool attached to that variant. The annotation schema header line is kept
//! under [`SCHEMA_KEY`] so a cache is never reused with a different
//! annotation source. On disk the map is gzip-compressed JSON, replaced
//! atomically on every persist.

use crate::{error::VcfCleanError, utils::util::Result};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

pub const SCHEMA_KEY: &str = "__schema__";

#[derive(Debug)]
pub struct AnnotationCache {
    path: PathBuf,
    entries: HashMap<String, String>,
    added: usize,
}

impl AnnotationCache {
    /// Loads the cache at `path`, or starts an empty one when the file is absent.
    ///
    /// With `expected_schema`, a cache built under another schema is rejected
    /// and a fresh cache adopts the expected schema.
    pub fn load(path: &Path, expected_schema: Option<&str>) -> Result<Self> {
        let entries: HashMap<String, String> = if path.exists() {
            let file = File::open(path).map_err(|e| {
                crate::vcfclean_error!("Failed to open annotation cache {}: {e}", path.display())
            })?;
            let entries: HashMap<String, String> =
                serde_json::from_reader(BufReader::new(GzDecoder::new(file))).map_err(|e| {
                    crate::vcfclean_error!(
                        "Failed to read annotation cache {}: {e}",
                        path.display()
                    )
                })?;
            log::info!(
                "Loaded annotation cache {} with {} entries",
                path.display(),
                entries.len().saturating_sub(usize::from(entries.contains_key(SCHEMA_KEY)))
            );
            entries
        } else {
            log::info!(
                "Annotation cache {} does not exist yet, starting empty",
                path.display()
            );
            HashMap::new()
        };

        let mut cache = Self {
            path: path.to_path_buf(),
            entries,
            added: 0,
        };
        if let Some(expected) = expected_schema {
            cache.check_schema(expected)?;
        }
        Ok(cache)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> Option<&str> {
        self.entries.get(SCHEMA_KEY).map(String::as_str)
    }

    /// Adopts `schema` when the cache has none, otherwise requires a match.
    pub fn check_schema(&mut self, schema: &str) -> Result<()> {
        match self.schema() {
            Some(cached) if cached != schema => Err(VcfCleanError::SchemaMismatch {
                path: self.path.clone(),
                cached: cached.to_string(),
                expected: schema.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                self.entries
                    .insert(SCHEMA_KEY.to_string(), schema.to_string());
                Ok(())
            }
        }
    }

    pub fn lookup(&self, signature: &str) -> Option<&str> {
        if signature == SCHEMA_KEY {
            return None;
        }
        self.entries.get(signature).map(String::as_str)
    }

    pub fn store(&mut self, signature: String, payload: String) {
        if self.entries.insert(signature, payload).is_none() {
            self.added += 1;
        }
    }

    /// Number of variant entries, the schema excluded.
    pub fn len(&self) -> usize {
        self.entries.len() - usize::from(self.entries.contains_key(SCHEMA_KEY))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries stored since the cache was loaded.
    pub fn added(&self) -> usize {
        self.added
    }

    /// Writes the whole map next to the cache file, then renames it into place.
    pub fn persist(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let temp_file = tempfile::Builder::new()
            .prefix(".vcfclean-cache-")
            .tempfile_in(dir)
            .map_err(|e| {
                crate::vcfclean_error!(
                    "Failed to create temporary cache file in {}: {e}",
                    dir.display()
                )
            })?;
        {
            let mut encoder =
                GzEncoder::new(BufWriter::new(temp_file.as_file()), Compression::default());
            serde_json::to_writer(&mut encoder, &self.entries)?;
            let mut writer = encoder.finish()?;
            writer.flush()?;
        }
        temp_file.persist(&self.path).map_err(|e| {
            crate::vcfclean_error!(
                "Failed to replace annotation cache {}: {}",
                self.path.display(),
                e.error
            )
        })?;
        log::debug!(
            "Persisted {} annotation cache entries to {}",
            self.len(),
            self.path.display()
        );
        Ok(())
    }
}
