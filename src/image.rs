//! Rasterization of per-event primary-element id lists into square
//! occupancy images.

use log::warn;
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::{data::RaggedColumn, OfosError, OfosResult};

/// Maximum per-cell count representable in bulk image assembly.
///
/// Per-event images count in `u32`; when many events are assembled into one
/// dense block the counts are quantized to `u16`, and any cell beyond this
/// bound is a data-integrity error, never a silent wrap.
pub const MAX_IMAGE_COUNT: u16 = u16::MAX;

/// An image side length, tagged with how it was obtained.
///
/// The inferred variant comes from a heuristic fallback
/// (`⌊√(#distinct ids)⌋`) that carries no guarantee of geometric
/// correctness; downstream code can decide whether to trust it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SideLength {
    /// Supplied by the caller from known detector geometry.
    Explicit(usize),
    /// Inferred from the data as a fallback.
    Inferred(usize),
}

impl SideLength {
    /// The raw side length.
    pub fn get(&self) -> usize {
        match self {
            SideLength::Explicit(side) | SideLength::Inferred(side) => *side,
        }
    }
}

/// Infer a side length from the number of distinct ids in the dataset.
///
/// A heuristic fallback for when the fibre count per side is not configured;
/// the result is tagged [`SideLength::Inferred`] and logged.
pub fn infer_side_length(ids: &RaggedColumn) -> SideLength {
    let mut distinct: Vec<u64> = ids.values().iter().map(|id| id.to_bits()).collect();
    distinct.sort_unstable();
    distinct.dedup();
    let side = (distinct.len() as f64).sqrt() as usize;
    warn!("image side length not specified; inferred {side} from {} distinct primary ids", distinct.len());
    SideLength::Inferred(side)
}

/// Rasterize one event's primary-element ids into a side×side count grid.
///
/// Counts id occurrences and scatters them into a row-major grid where
/// `id = row * side + col`. Ids outside `[0, side²)` indicate a geometry
/// mismatch with the configured side length and are surfaced as errors,
/// never truncated.
pub fn rasterize_event(side: usize, ids: &[f64]) -> OfosResult<Array2<u32>> {
    if side == 0 {
        return Err(OfosError::InvalidSideLength { side });
    }
    let mut flat = vec![0_u32; side * side];
    for &id in ids {
        if !id.is_finite() || id < 0.0 || id >= (side * side) as f64 {
            return Err(OfosError::ElementIdOutOfRange { id, side });
        }
        flat[id as usize] += 1;
    }
    Array2::from_shape_vec((side, side), flat)
        .map_err(|err| OfosError::Custom(format!("failed to shape occupancy image: {err}")))
}

/// Rasterize every event and quantize the counts into one dense block of
/// shape `(n_events, side, side)`.
///
/// Counts beyond [`MAX_IMAGE_COUNT`] are reported as [`OfosError::CountOverflow`].
pub fn rasterize_all(side: usize, ids: &RaggedColumn) -> OfosResult<Array3<u16>> {
    let n_events = ids.n_events();
    let mut data = Vec::with_capacity(n_events * side * side);
    for event in 0..n_events {
        let image = rasterize_event(side, ids.event(event))?;
        for (cell, &count) in image.iter().enumerate() {
            data.push(u16::try_from(count).map_err(|_| OfosError::CountOverflow {
                id: cell,
                count,
                max: u32::from(MAX_IMAGE_COUNT),
            })?);
        }
    }
    Array3::from_shape_vec((n_events, side, side), data)
        .map_err(|err| OfosError::Custom(format!("failed to shape image block: {err}")))
}
