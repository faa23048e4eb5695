use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{OfosError, OfosResult};

/// Reader backends and the [`EventGroupReader`](io::EventGroupReader) seam.
pub mod io;

/// A named per-event sequence of variable-length values.
///
/// Stored as a flat value buffer plus an offset table of length
/// `n_events + 1`, so event boundaries resolve in O(1) and the whole column
/// flattens without per-event allocation. Scalar-per-event fields are
/// represented the same way with every inner length equal to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaggedColumn {
    values: Vec<f64>,
    offsets: Vec<usize>,
}

impl Default for RaggedColumn {
    fn default() -> Self {
        Self::new()
    }
}

impl RaggedColumn {
    /// Create an empty column with no events.
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            offsets: vec![0],
        }
    }

    /// Build a column from nested per-event value lists.
    pub fn from_events<I, E>(events: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: IntoIterator<Item = f64>,
    {
        let mut column = Self::new();
        for event in events {
            column.push_event(event);
        }
        column
    }

    /// Append one event's values.
    pub fn push_event<E: IntoIterator<Item = f64>>(&mut self, event: E) {
        self.values.extend(event);
        self.offsets.push(self.values.len());
    }

    /// Number of events (outer length).
    pub fn n_events(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Total number of values across all events.
    pub fn n_values(&self) -> usize {
        self.values.len()
    }

    /// The values of event `index`.
    pub fn event(&self, index: usize) -> &[f64] {
        &self.values[self.offsets[index]..self.offsets[index + 1]]
    }

    /// The flat value buffer in event order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Per-event inner lengths.
    pub fn lens(&self) -> Vec<usize> {
        self.offsets.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// The first value of every event, used to read event-scalar truth fields
    /// stored as single-entry lists.
    pub fn firsts(&self, field: &str) -> OfosResult<Vec<f64>> {
        (0..self.n_events())
            .map(|index| {
                self.event(index)
                    .first()
                    .copied()
                    .ok_or_else(|| OfosError::EmptyTruthEntry {
                        field: field.to_string(),
                        event: index,
                    })
            })
            .collect()
    }

    /// Copy out the events in `start..stop`.
    pub fn slice(&self, start: usize, stop: usize) -> Self {
        let lo = self.offsets[start];
        let hi = self.offsets[stop];
        Self {
            values: self.values[lo..hi].to_vec(),
            offsets: self.offsets[start..=stop].iter().map(|o| o - lo).collect(),
        }
    }

    /// Concatenate another column's events after this column's.
    pub fn append(&mut self, other: &RaggedColumn) {
        let base = self.values.len();
        self.values.extend_from_slice(&other.values);
        self.offsets
            .extend(other.offsets[1..].iter().map(|o| o + base));
    }
}

/// A set of named [`RaggedColumn`]s whose outer (event) indices are aligned.
///
/// The alignment of outer indices across fields loaded from the same
/// (file, group) pairs is the central invariant the rest of the pipeline
/// depends on; [`EventBatch::insert`] enforces it at construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventBatch {
    columns: IndexMap<String, RaggedColumn>,
}

impl EventBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events shared by all columns (zero when empty).
    pub fn n_events(&self) -> usize {
        self.columns
            .first()
            .map(|(_, column)| column.n_events())
            .unwrap_or(0)
    }

    /// Field names in insertion order.
    pub fn field_names(&self) -> Vec<&str> {
        self.columns.keys().map(String::as_str).collect()
    }

    /// Insert a column, enforcing outer-length agreement with the batch.
    pub fn insert(&mut self, name: impl Into<String>, column: RaggedColumn) -> OfosResult<()> {
        let name = name.into();
        if !self.columns.is_empty() && column.n_events() != self.n_events() {
            return Err(OfosError::LengthMismatch {
                context: format!("event count of field '{name}'"),
                expected: self.n_events(),
                actual: column.n_events(),
            });
        }
        self.columns.insert(name, column);
        Ok(())
    }

    /// Look up a column by field name.
    pub fn column(&self, name: &str) -> OfosResult<&RaggedColumn> {
        self.columns
            .get(name)
            .ok_or_else(|| OfosError::MissingColumn {
                name: name.to_string(),
            })
    }

    /// Iterate over `(name, column)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RaggedColumn)> {
        self.columns
            .iter()
            .map(|(name, column)| (name.as_str(), column))
    }

    /// Copy out the events in `start..stop` from every column.
    pub fn slice(&self, start: usize, stop: usize) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .map(|(name, column)| (name.clone(), column.slice(start, stop)))
                .collect(),
        }
    }

    /// Concatenate another batch's events after this batch's.
    ///
    /// The batches must carry identical field sets in identical order; this
    /// preserves outer-index alignment across multi-file concatenation.
    pub fn append(&mut self, other: &EventBatch) -> OfosResult<()> {
        if self.field_names() != other.field_names() {
            return Err(OfosError::Custom(format!(
                "cannot concatenate batches with differing field sets: {:?} vs {:?}",
                self.field_names(),
                other.field_names()
            )));
        }
        for (column, (_, incoming)) in self.columns.values_mut().zip(other.iter()) {
            column.append(incoming);
        }
        Ok(())
    }
}

/// A half-open restriction `start..stop` on the concatenated event sequence.
///
/// `stop = None` means "through the last event". Resolution against the
/// available event count happens before any branch is read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRange {
    /// Index of the first event to load.
    pub start: usize,
    /// One past the last event to load, or `None` for the full set.
    pub stop: Option<usize>,
}

impl EventRange {
    /// Restrict to `start..stop`.
    pub fn new(start: usize, stop: impl Into<Option<usize>>) -> Self {
        Self {
            start,
            stop: stop.into(),
        }
    }

    /// The unrestricted range.
    pub fn full() -> Self {
        Self::default()
    }

    /// Resolve against the total event count, enforcing
    /// `start <= stop <= n_events`.
    pub fn resolve(&self, n_events: usize) -> OfosResult<(usize, usize)> {
        let stop = self.stop.unwrap_or(n_events);
        if stop < self.start || stop > n_events {
            return Err(OfosError::InvalidRange {
                start: self.start,
                stop,
                n_events,
            });
        }
        Ok((self.start, stop))
    }
}
