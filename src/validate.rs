//! Per-file validation with a skip-and-warn policy.
//!
//! A bad input file never aborts the batch: it is excluded from the working
//! set, the reason is logged, and the rejection is kept in the
//! [`ValidationReport`] so callers (and tests) can inspect it.

use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::{
    data::io::EventGroupReader, extract::GroupPrefixes, schema::resolve_versioned_group,
};

/// A validated source file with its resolved group names.
///
/// Group names are immutable after construction; the set of [`EventFile`]s is
/// the unit over which all extraction operations are concatenated.
pub struct EventFile {
    reader: Box<dyn EventGroupReader>,
    hit_group: String,
    truth_group: String,
    initial_truth_group: Option<String>,
}

impl EventFile {
    /// The source's diagnostic name.
    pub fn source_name(&self) -> &str {
        self.reader.source_name()
    }

    /// The resolved hit-output group name.
    pub fn hit_group(&self) -> &str {
        &self.hit_group
    }

    /// The resolved truth group name.
    pub fn truth_group(&self) -> &str {
        &self.truth_group
    }

    /// The resolved initial-truth group name, absent when the file carries
    /// no such group.
    pub fn initial_truth_group(&self) -> Option<&str> {
        self.initial_truth_group.as_deref()
    }

    /// The underlying reader.
    pub fn reader(&self) -> &dyn EventGroupReader {
        self.reader.as_ref()
    }
}

impl fmt::Debug for EventFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventFile")
            .field("source", &self.source_name())
            .field("hit_group", &self.hit_group)
            .field("truth_group", &self.truth_group)
            .field("initial_truth_group", &self.initial_truth_group)
            .finish()
    }
}

/// Why a source file was excluded from the working set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// The source could not be opened or listed.
    OpenFailed(String),
    /// The source exposes at most one group, i.e. only metadata.
    MetadataOnly,
    /// No group matches the named required prefix.
    MissingGroup(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::OpenFailed(message) => write!(f, "open failed: {message}"),
            RejectReason::MetadataOnly => write!(f, "contains only metadata-level entries"),
            RejectReason::MissingGroup(prefix) => {
                write!(f, "no group matching required prefix '{prefix}'")
            }
        }
    }
}

/// One excluded source and the reason for its exclusion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// The source's diagnostic name.
    pub source: String,
    /// Why it was excluded.
    pub reason: RejectReason,
}

/// The outcome of validating a batch of candidate sources.
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// Sources that passed open and group resolution, in input order.
    pub accepted: Vec<EventFile>,
    /// Sources that were excluded, with reasons.
    pub rejected: Vec<Rejection>,
}

/// Validate candidate sources and resolve their group names.
///
/// Each failure is recorded and warned about, never raised; the batch
/// continues with the remaining files.
pub fn validate_sources(
    readers: Vec<Box<dyn EventGroupReader>>,
    prefixes: &GroupPrefixes,
) -> ValidationReport {
    let mut report = ValidationReport::default();
    for reader in readers {
        match validate_one(reader.as_ref(), prefixes) {
            Ok((hit_group, truth_group, initial_truth_group)) => {
                report.accepted.push(EventFile {
                    reader,
                    hit_group,
                    truth_group,
                    initial_truth_group,
                });
            }
            Err(reason) => {
                warn!("skipping '{}': {reason}", reader.source_name());
                report.rejected.push(Rejection {
                    source: reader.source_name().to_string(),
                    reason,
                });
            }
        }
    }
    report
}

fn validate_one(
    reader: &dyn EventGroupReader,
    prefixes: &GroupPrefixes,
) -> Result<(String, String, Option<String>), RejectReason> {
    let names = reader
        .group_names()
        .map_err(|err| RejectReason::OpenFailed(err.to_string()))?;
    if names.len() <= 1 {
        return Err(RejectReason::MetadataOnly);
    }
    let hit_group = resolve_versioned_group(&names, &prefixes.hits)
        .ok_or_else(|| RejectReason::MissingGroup(prefixes.hits.clone()))?;
    let truth_group = resolve_versioned_group(&names, &prefixes.truth)
        .ok_or_else(|| RejectReason::MissingGroup(prefixes.truth.clone()))?;
    let initial_truth_group = resolve_versioned_group(&names, &prefixes.initial_truth);
    Ok((hit_group, truth_group, initial_truth_group))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{io::MemoryReader, EventBatch, RaggedColumn};

    fn batch(n: usize) -> EventBatch {
        let mut batch = EventBatch::new();
        batch
            .insert(
                "h_time",
                RaggedColumn::from_events(vec![vec![0.0]; n]),
            )
            .unwrap();
        batch
    }

    fn boxed(reader: MemoryReader) -> Box<dyn EventGroupReader> {
        Box::new(reader)
    }

    #[test]
    fn test_metadata_only_file_is_excluded_not_raised() {
        let readers = vec![boxed(MemoryReader::new("meta.root").with_group("meta", batch(0)))];
        let report = validate_sources(readers, &GroupPrefixes::default());
        assert!(report.accepted.is_empty());
        assert_eq!(
            report.rejected,
            vec![Rejection {
                source: "meta.root".to_string(),
                reason: RejectReason::MetadataOnly,
            }]
        );
    }

    #[test]
    fn test_missing_required_group_is_excluded() {
        let readers = vec![boxed(
            MemoryReader::new("nohits.root")
                .with_group("mc_truth", batch(2))
                .with_group("meta", batch(0)),
        )];
        let report = validate_sources(readers, &GroupPrefixes::default());
        assert!(report.accepted.is_empty());
        assert_eq!(
            report.rejected[0].reason,
            RejectReason::MissingGroup("op_hits".to_string())
        );
    }

    #[test]
    fn test_valid_file_resolves_latest_hit_group() {
        let readers = vec![boxed(
            MemoryReader::new("good.root")
                .with_group("op_hits_1", batch(2))
                .with_group("op_hits_3", batch(2))
                .with_group("op_hits_2", batch(2))
                .with_group("mc_truth", batch(2)),
        )];
        let report = validate_sources(readers, &GroupPrefixes::default());
        assert!(report.rejected.is_empty());
        assert_eq!(report.accepted.len(), 1);
        let file = &report.accepted[0];
        assert_eq!(file.hit_group(), "op_hits_3");
        assert_eq!(file.truth_group(), "mc_truth");
        assert_eq!(file.initial_truth_group(), None);
    }

    #[test]
    fn test_bad_file_does_not_abort_the_batch() {
        let readers = vec![
            boxed(MemoryReader::new("meta.root").with_group("meta", batch(0))),
            boxed(
                MemoryReader::new("good.root")
                    .with_group("op_hits_1", batch(1))
                    .with_group("mc_truth", batch(1)),
            ),
        ];
        let report = validate_sources(readers, &GroupPrefixes::default());
        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.accepted[0].source_name(), "good.root");
    }
}
