use crate::core::record::VariantRecord;
use std::collections::HashMap;

/// Moves a secondary stream's sample columns into the primary stream's order.
///
/// Primary samples missing from the secondary get the NOCALL sentinel;
/// secondary samples unknown to the primary are dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleRemap {
    source_for_target: Vec<Option<usize>>,
    dropped: Vec<String>,
}

impl SampleRemap {
    pub fn new(target_samples: &[String], source_samples: &[String]) -> Self {
        let source_index: HashMap<&str, usize> = source_samples
            .iter()
            .enumerate()
            .map(|(index, name)| (name.as_str(), index))
            .collect();
        let source_for_target = target_samples
            .iter()
            .map(|name| source_index.get(name.as_str()).copied())
            .collect();
        let dropped = source_samples
            .iter()
            .filter(|name| !target_samples.contains(name))
            .cloned()
            .collect();
        Self {
            source_for_target,
            dropped,
        }
    }

    pub fn dropped_samples(&self) -> &[String] {
        &self.dropped
    }

    pub fn missing_count(&self) -> usize {
        self.source_for_target
            .iter()
            .filter(|source| source.is_none())
            .count()
    }

    pub fn is_identity(&self, source_len: usize) -> bool {
        self.source_for_target.len() == source_len
            && self
                .source_for_target
                .iter()
                .enumerate()
                .all(|(index, source)| *source == Some(index))
    }

    pub fn apply(&self, record: &mut VariantRecord) {
        let mut source = std::mem::take(&mut record.samples);
        record.samples = self
            .source_for_target
            .iter()
            .map(|source_index| match source_index {
                Some(index) => source
                    .get_mut(*index)
                    .map(std::mem::take)
                    .unwrap_or_else(VariantRecord::nocall_sample),
                None => VariantRecord::nocall_sample(),
            })
            .collect();
        if record.format_keys.is_empty() && !record.samples.is_empty() {
            record.format_keys = vec!["GT".to_string()];
        }
    }
}
