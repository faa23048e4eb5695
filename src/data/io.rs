//! Reader backends behind the [`EventGroupReader`] seam.
//!
//! The extraction pipeline never decodes files itself; it only asks a reader
//! to list group names and to materialize named fields as ragged columns.
//! [`RootEventReader`] is the production backend over `oxyroot`;
//! [`MemoryReader`] serves columns that are already in memory, which is also
//! what the test suite drives the pipeline with.

use std::path::PathBuf;

use indexmap::IndexMap;
use oxyroot::{Branch, Named, ReaderTree, RootFile};

use crate::{
    data::{EventBatch, RaggedColumn},
    OfosError, OfosResult,
};

/// The opaque record-reading collaborator the pipeline depends on.
///
/// Implementations expose a file-like source of named groups, each a table of
/// named fields; scalar-per-event fields are reported as single-entry inner
/// lists so every field reads as a sequence of sequences.
pub trait EventGroupReader {
    /// A human-readable name for diagnostics (usually the file path).
    fn source_name(&self) -> &str;

    /// All group names present in the source.
    fn group_names(&self) -> OfosResult<Vec<String>>;

    /// Number of events stored in `group`.
    fn n_events(&self, group: &str) -> OfosResult<usize>;

    /// Materialize the named fields of `group` for events `start..stop`.
    ///
    /// All fields of one call come from the same group read, so their outer
    /// indices are aligned by construction.
    fn read_fields(
        &self,
        group: &str,
        fields: &[&str],
        start: usize,
        stop: usize,
    ) -> OfosResult<EventBatch>;
}

/// ROOT-file backend over `oxyroot`.
///
/// The file is opened per call; the pipeline is sequential and the open is
/// cheap next to branch decompression.
#[derive(Debug, Clone)]
pub struct RootEventReader {
    path: PathBuf,
    name: String,
}

impl RootEventReader {
    /// Wrap a ROOT file path. The file is not touched until the first read.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self { path, name }
    }

    fn open(&self) -> OfosResult<RootFile> {
        RootFile::open(&self.path).map_err(|err| OfosError::Root {
            source_name: self.name.clone(),
            message: format!("failed to open: {err}"),
        })
    }

    fn tree(&self, file: &mut RootFile, group: &str) -> OfosResult<ReaderTree> {
        file.get_tree(group).map_err(|err| OfosError::Root {
            source_name: self.name.clone(),
            message: format!("failed to open group '{group}': {err}"),
        })
    }

    fn root_err(&self, field: &str, err: impl std::fmt::Display) -> OfosError {
        OfosError::Root {
            source_name: self.name.clone(),
            message: format!("failed to read field '{field}': {err}"),
        }
    }
}

impl EventGroupReader for RootEventReader {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn group_names(&self) -> OfosResult<Vec<String>> {
        let mut file = self.open()?;
        Ok(file
            .keys()
            .into_iter()
            .filter(|key| key.class_name() == "TTree")
            .map(|key| key.name().to_string())
            .collect())
    }

    fn n_events(&self, group: &str) -> OfosResult<usize> {
        let mut file = self.open()?;
        let tree = self.tree(&mut file, group)?;
        Ok(tree.entries() as usize)
    }

    fn read_fields(
        &self,
        group: &str,
        fields: &[&str],
        start: usize,
        stop: usize,
    ) -> OfosResult<EventBatch> {
        let mut file = self.open()?;
        let tree = self.tree(&mut file, group)?;
        let lookup: IndexMap<&str, &Branch> = tree
            .branches()
            .map(|branch| (branch.name(), branch))
            .collect();

        let mut batch = EventBatch::new();
        for &field in fields {
            let branch = *lookup
                .get(field)
                .ok_or_else(|| OfosError::MissingColumn {
                    name: field.to_string(),
                })?;
            let column = self.read_branch(branch, field, start, stop)?;
            batch.insert(field, column)?;
        }
        Ok(batch)
    }
}

#[derive(Clone, Copy)]
enum BranchKind {
    Scalar(NumericType),
    Ragged(NumericType),
}

#[derive(Clone, Copy)]
enum NumericType {
    F32,
    F64,
    I32,
    I64,
    U32,
}

fn numeric_type(type_name: &str) -> Option<NumericType> {
    match type_name {
        "float" | "float_t" | "float32_t" => Some(NumericType::F32),
        "double" | "double_t" | "double32_t" => Some(NumericType::F64),
        "int" | "int_t" | "int32_t" => Some(NumericType::I32),
        "long" | "long long" | "long64_t" | "int64_t" => Some(NumericType::I64),
        "unsigned int" | "uint_t" | "uint32_t" => Some(NumericType::U32),
        _ => None,
    }
}

fn branch_kind(branch: &Branch, field: &str) -> OfosResult<BranchKind> {
    let type_name = branch.item_type_name();
    let lower = type_name.to_ascii_lowercase();
    let kind = if let Some(inner) = lower
        .strip_prefix("vector<")
        .and_then(|rest| rest.strip_suffix('>'))
    {
        numeric_type(inner.trim()).map(BranchKind::Ragged)
    } else {
        numeric_type(lower.as_str()).map(BranchKind::Scalar)
    };
    kind.ok_or(OfosError::InvalidColumnType {
        name: field.to_string(),
        type_name,
    })
}

impl RootEventReader {
    fn read_branch(
        &self,
        branch: &Branch,
        field: &str,
        start: usize,
        stop: usize,
    ) -> OfosResult<RaggedColumn> {
        let take = stop - start;
        let mut column = RaggedColumn::new();
        match branch_kind(branch, field)? {
            BranchKind::Scalar(ty) => {
                let values: Vec<f64> = match ty {
                    NumericType::F32 => branch
                        .as_iter::<f32>()
                        .map_err(|err| self.root_err(field, err))?
                        .skip(start)
                        .take(take)
                        .map(f64::from)
                        .collect(),
                    NumericType::F64 => branch
                        .as_iter::<f64>()
                        .map_err(|err| self.root_err(field, err))?
                        .skip(start)
                        .take(take)
                        .collect(),
                    NumericType::I32 => branch
                        .as_iter::<i32>()
                        .map_err(|err| self.root_err(field, err))?
                        .skip(start)
                        .take(take)
                        .map(f64::from)
                        .collect(),
                    NumericType::I64 => branch
                        .as_iter::<i64>()
                        .map_err(|err| self.root_err(field, err))?
                        .skip(start)
                        .take(take)
                        .map(|value| value as f64)
                        .collect(),
                    NumericType::U32 => branch
                        .as_iter::<u32>()
                        .map_err(|err| self.root_err(field, err))?
                        .skip(start)
                        .take(take)
                        .map(f64::from)
                        .collect(),
                };
                for value in values {
                    column.push_event([value]);
                }
            }
            BranchKind::Ragged(ty) => match ty {
                NumericType::F32 => {
                    for event in branch
                        .as_iter::<Vec<f32>>()
                        .map_err(|err| self.root_err(field, err))?
                        .skip(start)
                        .take(take)
                    {
                        column.push_event(event.into_iter().map(f64::from));
                    }
                }
                NumericType::F64 => {
                    for event in branch
                        .as_iter::<Vec<f64>>()
                        .map_err(|err| self.root_err(field, err))?
                        .skip(start)
                        .take(take)
                    {
                        column.push_event(event);
                    }
                }
                NumericType::I32 => {
                    for event in branch
                        .as_iter::<Vec<i32>>()
                        .map_err(|err| self.root_err(field, err))?
                        .skip(start)
                        .take(take)
                    {
                        column.push_event(event.into_iter().map(f64::from));
                    }
                }
                NumericType::I64 => {
                    for event in branch
                        .as_iter::<Vec<i64>>()
                        .map_err(|err| self.root_err(field, err))?
                        .skip(start)
                        .take(take)
                    {
                        column.push_event(event.into_iter().map(|value| value as f64));
                    }
                }
                NumericType::U32 => {
                    for event in branch
                        .as_iter::<Vec<u32>>()
                        .map_err(|err| self.root_err(field, err))?
                        .skip(start)
                        .take(take)
                    {
                        column.push_event(event.into_iter().map(f64::from));
                    }
                }
            },
        }
        if column.n_events() != take {
            return Err(OfosError::LengthMismatch {
                context: format!("events read from field '{field}'"),
                expected: take,
                actual: column.n_events(),
            });
        }
        Ok(column)
    }
}

/// In-memory backend serving already-decoded columns.
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    name: String,
    groups: IndexMap<String, EventBatch>,
}

impl MemoryReader {
    /// Create an empty source with the given diagnostic name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: IndexMap::new(),
        }
    }

    /// Add a group of aligned columns.
    pub fn with_group(mut self, group: impl Into<String>, batch: EventBatch) -> Self {
        self.groups.insert(group.into(), batch);
        self
    }

    fn group(&self, group: &str) -> OfosResult<&EventBatch> {
        self.groups.get(group).ok_or_else(|| OfosError::MissingGroup {
            source_name: self.name.clone(),
            prefix: group.to_string(),
        })
    }
}

impl EventGroupReader for MemoryReader {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn group_names(&self) -> OfosResult<Vec<String>> {
        Ok(self.groups.keys().cloned().collect())
    }

    fn n_events(&self, group: &str) -> OfosResult<usize> {
        Ok(self.group(group)?.n_events())
    }

    fn read_fields(
        &self,
        group: &str,
        fields: &[&str],
        start: usize,
        stop: usize,
    ) -> OfosResult<EventBatch> {
        let stored = self.group(group)?;
        let mut batch = EventBatch::new();
        for &field in fields {
            batch.insert(field, stored.column(field)?.slice(start, stop))?;
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader() -> MemoryReader {
        let mut batch = EventBatch::new();
        batch
            .insert(
                "h_time",
                RaggedColumn::from_events(vec![vec![1.0, 2.0], vec![3.0], vec![]]),
            )
            .unwrap();
        batch
            .insert(
                "h_primary_id",
                RaggedColumn::from_events(vec![vec![0.0, 4.0], vec![8.0], vec![]]),
            )
            .unwrap();
        MemoryReader::new("mem").with_group("op_hits_1", batch)
    }

    #[test]
    fn test_memory_reader_slices_by_range() {
        let reader = reader();
        assert_eq!(reader.n_events("op_hits_1").unwrap(), 3);
        let batch = reader
            .read_fields("op_hits_1", &["h_time"], 1, 3)
            .unwrap();
        assert_eq!(batch.n_events(), 2);
        assert_eq!(batch.column("h_time").unwrap().event(0), &[3.0]);
    }

    #[test]
    fn test_memory_reader_missing_names() {
        let reader = reader();
        assert!(matches!(
            reader.n_events("mc_truth").unwrap_err(),
            OfosError::MissingGroup { .. }
        ));
        assert!(matches!(
            reader
                .read_fields("op_hits_1", &["h_pos_x"], 0, 3)
                .unwrap_err(),
            OfosError::MissingColumn { .. }
        ));
    }
}
