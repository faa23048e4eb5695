//! The extraction pipeline: validated sources in, dense arrays out.
//!
//! [`DataExtractor`] owns the working set of validated files and exposes the
//! extraction operations. All of them concatenate events across files in
//! file order, so outer indices agree between the observation, hypothesis,
//! and image outputs of one extractor.

use std::path::Path;

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::{
    data::{
        io::{EventGroupReader, RootEventReader},
        EventBatch, EventRange, RaggedColumn,
    },
    flatten, hypothesis,
    hypothesis::HYPOTHESIS_WIDTH,
    image::{self, SideLength},
    validate::{validate_sources, EventFile, Rejection, ValidationReport},
    OfosError, OfosResult,
};

/// Hit-group fields folded into the flat observation table.
pub const HIT_OBSERVATION_FIELDS: [&str; 4] = ["h_pos_x", "h_pos_y", "h_pos_z", "h_time"];
/// Hit-group field carrying the primary detector-element id of each hit.
pub const HIT_PRIMARY_ID_FIELD: &str = "h_primary_id";
/// Truth-group fields consumed by the hypothesis transform.
pub const TRUTH_FIELDS: [&str; 8] = [
    "i_pos_x", "i_pos_y", "i_pos_z", "i_mom_x", "i_mom_y", "i_mom_z", "i_time", "i_E",
];
/// Initial-truth-group fields consumed by the 8-wide hypothesis transform.
pub const INITIAL_TRUTH_FIELDS: [&str; 9] = [
    "mcx", "mcy", "mcz", "mct", "mcu", "mcv", "mcw", "mcke", "mcpid",
];

/// Group-name prefixes used to resolve the data groups within each file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPrefixes {
    /// Prefix of the versioned hit-output groups.
    pub hits: String,
    /// Prefix of the truth group.
    pub truth: String,
    /// Prefix of the optional initial-truth group.
    pub initial_truth: String,
}

impl Default for GroupPrefixes {
    fn default() -> Self {
        Self {
            hits: "op_hits".to_string(),
            truth: "mc_truth".to_string(),
            initial_truth: "mc_init".to_string(),
        }
    }
}

impl GroupPrefixes {
    /// Set the hit-output group prefix.
    pub fn with_hits(mut self, prefix: impl Into<String>) -> Self {
        self.hits = prefix.into();
        self
    }

    /// Set the truth group prefix.
    pub fn with_truth(mut self, prefix: impl Into<String>) -> Self {
        self.truth = prefix.into();
        self
    }

    /// Set the initial-truth group prefix.
    pub fn with_initial_truth(mut self, prefix: impl Into<String>) -> Self {
        self.initial_truth = prefix.into();
        self
    }
}

#[derive(Debug, Clone, Copy)]
enum GroupRole {
    Hits,
    Truth,
    InitialTruth,
}

/// One event's assembled reconstruction record.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    /// The event's occupancy image.
    pub image: Array2<u32>,
    /// The event's hypothesis row (`x, y, z, zenith, azimuth, t, energy`).
    pub hypothesis: [f32; HYPOTHESIS_WIDTH],
    /// The event's hit count (equals the image cell sum).
    pub hit_count: usize,
}

/// Extracts event data from a validated set of input files.
///
/// Construction validates every candidate file and resolves its group names;
/// invalid files are excluded with a warning and retained in
/// [`DataExtractor::rejections`] rather than aborting the batch. All
/// extraction operations are free of hidden state: loading the same file set
/// twice with identical parameters yields identical arrays.
#[derive(Debug)]
pub struct DataExtractor {
    files: Vec<EventFile>,
    rejections: Vec<Rejection>,
    prefixes: GroupPrefixes,
}

impl DataExtractor {
    /// Open ROOT files with the default group prefixes.
    pub fn open<P: AsRef<Path>>(paths: &[P]) -> Self {
        Self::open_with(paths, GroupPrefixes::default())
    }

    /// Open ROOT files with explicit group prefixes.
    pub fn open_with<P: AsRef<Path>>(paths: &[P], prefixes: GroupPrefixes) -> Self {
        let readers = paths
            .iter()
            .map(|path| {
                Box::new(RootEventReader::new(path.as_ref())) as Box<dyn EventGroupReader>
            })
            .collect();
        Self::from_readers(readers, prefixes)
    }

    /// Build an extractor over arbitrary reader backends.
    pub fn from_readers(
        readers: Vec<Box<dyn EventGroupReader>>,
        prefixes: GroupPrefixes,
    ) -> Self {
        let ValidationReport { accepted, rejected } = validate_sources(readers, &prefixes);
        Self {
            files: accepted,
            rejections: rejected,
            prefixes,
        }
    }

    /// The validated working set, in input order.
    pub fn files(&self) -> &[EventFile] {
        &self.files
    }

    /// Candidate files that were excluded, with reasons.
    pub fn rejections(&self) -> &[Rejection] {
        &self.rejections
    }

    /// Whether every accepted file carries an initial-truth group.
    pub fn has_initial_truth(&self) -> bool {
        !self.files.is_empty()
            && self
                .files
                .iter()
                .all(|file| file.initial_truth_group().is_some())
    }

    /// Total event count across all accepted files.
    pub fn n_events(&self) -> OfosResult<usize> {
        let mut total = 0;
        for file in &self.files {
            total += file.reader().n_events(file.hit_group())?;
        }
        Ok(total)
    }

    fn group_of<'a>(&self, file: &'a EventFile, role: GroupRole) -> OfosResult<&'a str> {
        match role {
            GroupRole::Hits => Ok(file.hit_group()),
            GroupRole::Truth => Ok(file.truth_group()),
            GroupRole::InitialTruth => {
                file.initial_truth_group()
                    .ok_or_else(|| OfosError::MissingGroup {
                        source_name: file.source_name().to_string(),
                        prefix: self.prefixes.initial_truth.clone(),
                    })
            }
        }
    }

    /// Load and concatenate the named fields across all accepted files.
    ///
    /// All fields of one call are read from the same (file, group) pairs in
    /// file order, keeping outer (event) indices aligned across fields. The
    /// range is resolved against the total event count before any field is
    /// read.
    fn load_fields(
        &self,
        role: GroupRole,
        fields: &[&str],
        range: EventRange,
    ) -> OfosResult<EventBatch> {
        let mut counts = Vec::with_capacity(self.files.len());
        for file in &self.files {
            let group = self.group_of(file, role)?;
            counts.push(file.reader().n_events(group)?);
        }
        let total = counts.iter().sum();
        let (start, stop) = range.resolve(total)?;

        let mut batch = EventBatch::new();
        for &field in fields {
            batch.insert(field, RaggedColumn::new())?;
        }
        let mut offset = 0;
        for (file, &n_events) in self.files.iter().zip(&counts) {
            let file_start = start.saturating_sub(offset).min(n_events);
            let file_stop = stop.saturating_sub(offset).min(n_events);
            offset += n_events;
            if file_start >= file_stop {
                continue;
            }
            let group = self.group_of(file, role)?;
            let part = file
                .reader()
                .read_fields(group, fields, file_start, file_stop)?;
            batch.append(&part)?;
        }
        Ok(batch)
    }

    /// Flatten all hit observations into one table of `x, y, z, t` rows plus
    /// the per-event hit counts.
    pub fn flat_observations(
        &self,
        range: EventRange,
    ) -> OfosResult<(Array2<f32>, Vec<usize>)> {
        let batch = self.load_fields(GroupRole::Hits, &HIT_OBSERVATION_FIELDS, range)?;
        flatten::flatten_observations(&batch)
    }

    /// Like [`DataExtractor::flat_observations`], with an exponential
    /// time-decay perturbation of the given mean added to every hit time.
    pub fn flat_observations_with_jitter(
        &self,
        range: EventRange,
        decay_mean: f64,
        rng: &mut fastrand::Rng,
    ) -> OfosResult<(Array2<f32>, Vec<usize>)> {
        let (mut table, counts) = self.flat_observations(range)?;
        flatten::apply_time_jitter(&mut table, decay_mean, rng);
        Ok((table, counts))
    }

    /// One 7-wide hypothesis row per event, from the truth group.
    pub fn hypotheses(&self, range: EventRange) -> OfosResult<Array2<f32>> {
        let batch = self.load_fields(GroupRole::Truth, &TRUTH_FIELDS, range)?;
        hypothesis::hypothesis_rows(&batch)
    }

    /// One 8-wide hypothesis row per event, from the initial-truth group.
    ///
    /// Fails with [`OfosError::MissingGroup`] naming the first lacking file
    /// when an accepted file carries no initial-truth group; see
    /// [`DataExtractor::has_initial_truth`].
    pub fn initial_hypotheses(&self, range: EventRange) -> OfosResult<Array2<f32>> {
        let batch = self.load_fields(GroupRole::InitialTruth, &INITIAL_TRUTH_FIELDS, range)?;
        hypothesis::initial_hypothesis_rows(&batch)
    }

    /// One hypothesis row per *hit*, aligned with the flat observation
    /// table, for supervised training pairs.
    pub fn broadcast_hypotheses(&self, range: EventRange) -> OfosResult<Array2<f32>> {
        let hypotheses = self.hypotheses(range)?;
        let counts = self
            .load_fields(GroupRole::Hits, &[HIT_PRIMARY_ID_FIELD], range)?
            .column(HIT_PRIMARY_ID_FIELD)?
            .lens();
        flatten::broadcast_hypotheses(&hypotheses, &counts)
    }

    /// One occupancy image per event, assembled into a dense
    /// `(n_events, side, side)` block of quantized counts.
    ///
    /// When `side` is `None` it is inferred from the data and the returned
    /// [`SideLength`] is tagged accordingly.
    pub fn images(
        &self,
        side: Option<usize>,
        range: EventRange,
    ) -> OfosResult<(Array3<u16>, SideLength)> {
        let batch = self.load_fields(GroupRole::Hits, &[HIT_PRIMARY_ID_FIELD], range)?;
        let ids = batch.column(HIT_PRIMARY_ID_FIELD)?;
        let side = match side {
            Some(0) => return Err(OfosError::InvalidSideLength { side: 0 }),
            Some(side) => SideLength::Explicit(side),
            None => image::infer_side_length(ids),
        };
        let block = image::rasterize_all(side.get(), ids)?;
        Ok((block, side))
    }

    /// Assemble one reconstruction record per event: occupancy image,
    /// hypothesis row, and hit count, accumulated across all events in the
    /// range.
    pub fn event_records(
        &self,
        side: usize,
        range: EventRange,
    ) -> OfosResult<Vec<EventRecord>> {
        let batch = self.load_fields(GroupRole::Hits, &[HIT_PRIMARY_ID_FIELD], range)?;
        let ids = batch.column(HIT_PRIMARY_ID_FIELD)?;
        let hypotheses = self.hypotheses(range)?;
        if hypotheses.nrows() != ids.n_events() {
            return Err(OfosError::LengthMismatch {
                context: "truth events against hit events".to_string(),
                expected: ids.n_events(),
                actual: hypotheses.nrows(),
            });
        }

        let mut records = Vec::with_capacity(ids.n_events());
        for event in 0..ids.n_events() {
            let image = image::rasterize_event(side, ids.event(event))?;
            let mut row = [0.0_f32; HYPOTHESIS_WIDTH];
            for (slot, value) in row.iter_mut().zip(hypotheses.row(event)) {
                *slot = *value;
            }
            records.push(EventRecord {
                image,
                hypothesis: row,
                hit_count: ids.event(event).len(),
            });
        }
        Ok(records)
    }
}
