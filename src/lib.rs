//! # ofos
//!
//! Extraction of optical-fibre detector simulation events into flat numeric
//! arrays and 2-D occupancy images suitable for downstream numeric/ML
//! consumption.
//!
//! Simulation output arrives as ROOT files holding several named groups
//! (trees), some of them versioned revisions of the same hit-output group.
//! This crate sits above the file decoder: it discovers the correct group per
//! file, pulls variable-length per-event hit collections across many files,
//! and folds them into
//!
//! - a flat per-hit observation table (position and time, one row per hit),
//! - per-event truth/hypothesis vectors derived via trigonometric transforms,
//! - fixed-size square occupancy images indexed by primary-element id.
//!
//! The entry point is [`DataExtractor`], which validates a set of input
//! files, resolves their group names, and exposes the extraction operations.
//! File decoding itself is delegated to implementations of
//! [`EventGroupReader`]; the [`RootEventReader`] backend wraps `oxyroot`,
//! while [`MemoryReader`] serves already-decoded columns.
#![warn(clippy::perf, clippy::style)]

use thiserror::Error;

/// Ragged per-event columns and batch containers.
pub mod data;
/// Extraction pipeline tying validation, loading, and the consumers together.
pub mod extract;
/// Hit flattening, time jitter, and hypothesis broadcasting.
pub mod flatten;
/// Truth/hypothesis vector transforms.
pub mod hypothesis;
/// Occupancy image rasterization.
pub mod image;
/// Versioned-group schema resolution.
pub mod schema;
/// File validation and the skip-and-warn report.
pub mod validate;

pub use crate::data::{
    io::{EventGroupReader, MemoryReader, RootEventReader},
    EventBatch, EventRange, RaggedColumn,
};
pub use crate::extract::{
    DataExtractor, EventRecord, GroupPrefixes, HIT_OBSERVATION_FIELDS, HIT_PRIMARY_ID_FIELD,
    INITIAL_TRUTH_FIELDS, TRUTH_FIELDS,
};
pub use crate::image::{SideLength, MAX_IMAGE_COUNT};
pub use crate::validate::{EventFile, RejectReason, Rejection, ValidationReport};

pub type OfosResult<T> = Result<T, OfosError>;

/// The error type used by all `ofos` methods.
///
/// File-level problems (unreadable files, missing required groups) are
/// normally absorbed by the validator as [`Rejection`]s and never surface
/// here; the variants below cover backend failures on accepted files and
/// input-validation failures, which abort the requested operation.
#[derive(Error, Debug)]
pub enum OfosError {
    /// A failure reported by the underlying record-reading backend.
    #[error("reader error in '{source_name}': {message}")]
    Root {
        /// Name of the offending source file.
        source_name: String,
        /// Backend error text.
        message: String,
    },
    /// No group matching a required prefix exists in a source.
    #[error("no group matching '{prefix}' in '{source_name}'")]
    MissingGroup {
        /// Name of the offending source file.
        source_name: String,
        /// The requested group name or prefix.
        prefix: String,
    },
    /// A requested field is not present in the group being read.
    #[error("no field named '{name}'")]
    MissingColumn {
        /// The missing field name.
        name: String,
    },
    /// A field exists but holds a type the pipeline cannot consume.
    #[error("field '{name}' has unsupported type '{type_name}'")]
    InvalidColumnType {
        /// The offending field name.
        name: String,
        /// The type name reported by the backend.
        type_name: String,
    },
    /// Outer or inner lengths disagree where the pipeline requires alignment.
    #[error("length mismatch in {context}: expected {expected}, got {actual}")]
    LengthMismatch {
        /// What was being compared.
        context: String,
        /// Expected length.
        expected: usize,
        /// Observed length.
        actual: usize,
    },
    /// An event range that violates `start <= stop <= n_events`.
    #[error("invalid event range: start {start}, stop {stop}, but {n_events} events available (require start <= stop <= n_events)")]
    InvalidRange {
        /// Requested first event.
        start: usize,
        /// Requested one-past-last event.
        stop: usize,
        /// Events available.
        n_events: usize,
    },
    /// A non-positive image side length.
    #[error("image side length must be positive, got {side}")]
    InvalidSideLength {
        /// The offending side length.
        side: usize,
    },
    /// A primary-element id outside the image grid, indicating a geometry
    /// mismatch between the data and the configured side length.
    #[error("primary element id {id} does not fit a {side}x{side} image grid")]
    ElementIdOutOfRange {
        /// The offending id as stored.
        id: f64,
        /// The grid side length in use.
        side: usize,
    },
    /// A per-cell hit count too large for the bulk image width.
    #[error("hit count {count} at element {id} exceeds the maximum representable image count {max}")]
    CountOverflow {
        /// Flat element id of the overflowing cell.
        id: usize,
        /// The count that did not fit.
        count: u32,
        /// Maximum representable count.
        max: u32,
    },
    /// A truth field whose per-event entry list is empty.
    #[error("truth field '{field}' has no entries for event {event}")]
    EmptyTruthEntry {
        /// The truth field name.
        field: String,
        /// Index of the offending event.
        event: usize,
    },
    /// A fallback for errors too infrequent to warrant their own category.
    #[error("{0}")]
    Custom(String),
}
