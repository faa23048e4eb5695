//! Flattening of ragged per-event hit collections into dense tables.

use ndarray::Array2;

use crate::{data::EventBatch, OfosError, OfosResult};

/// Columns of a flat observation row: `x, y, z, t`.
pub const OBSERVATION_WIDTH: usize = 4;

/// Concatenate per-event hit collections into a flat observation table.
///
/// Rows are ordered file-then-event-then-hit; the companion vector holds the
/// hit count of each event, so `sum(counts)` equals the row count. Inner
/// (per-event) lengths must agree across the four observation columns.
pub fn flatten_observations(batch: &EventBatch) -> OfosResult<(Array2<f32>, Vec<usize>)> {
    let x = batch.column("h_pos_x")?;
    let y = batch.column("h_pos_y")?;
    let z = batch.column("h_pos_z")?;
    let t = batch.column("h_time")?;

    let counts = x.lens();
    for (name, column) in [("h_pos_y", y), ("h_pos_z", z), ("h_time", t)] {
        let lens = column.lens();
        if lens != counts {
            let event = counts
                .iter()
                .zip(&lens)
                .position(|(a, b)| a != b)
                .unwrap_or(0);
            return Err(OfosError::LengthMismatch {
                context: format!("hit count of field '{name}' at event {event}"),
                expected: counts[event],
                actual: lens[event],
            });
        }
    }

    let n_hits = x.n_values();
    let mut data = Vec::with_capacity(n_hits * OBSERVATION_WIDTH);
    for hit in 0..n_hits {
        data.push(x.values()[hit] as f32);
        data.push(y.values()[hit] as f32);
        data.push(z.values()[hit] as f32);
        data.push(t.values()[hit] as f32);
    }
    let table = Array2::from_shape_vec((n_hits, OBSERVATION_WIDTH), data)
        .map_err(|err| OfosError::Custom(format!("failed to shape observation table: {err}")))?;
    Ok((table, counts))
}

/// Add an exponentially distributed time-decay perturbation to every hit.
///
/// Models detector timing jitter: each hit time independently gains a draw
/// from Exp(`mean`), applied per hit after flattening. The random source is
/// caller-supplied so the perturbation is seedable and reproducible.
pub fn apply_time_jitter(table: &mut Array2<f32>, mean: f64, rng: &mut fastrand::Rng) {
    for time in table.column_mut(OBSERVATION_WIDTH - 1) {
        let draw = -mean * (1.0 - rng.f64()).ln();
        *time += draw as f32;
    }
}

/// Repeat each event's hypothesis row once per hit of that event.
///
/// Produces one hypothesis row per hit, aligned with the flat observation
/// table, for supervised training pairs where each hit is an example labeled
/// with its parent event's truth.
pub fn broadcast_hypotheses(
    hypotheses: &Array2<f32>,
    hit_counts: &[usize],
) -> OfosResult<Array2<f32>> {
    if hypotheses.nrows() != hit_counts.len() {
        return Err(OfosError::LengthMismatch {
            context: "hypothesis rows against per-event hit counts".to_string(),
            expected: hit_counts.len(),
            actual: hypotheses.nrows(),
        });
    }
    let width = hypotheses.ncols();
    let n_hits: usize = hit_counts.iter().sum();
    let mut data = Vec::with_capacity(n_hits * width);
    for (row, &count) in hypotheses.rows().into_iter().zip(hit_counts) {
        for _ in 0..count {
            data.extend(row.iter().copied());
        }
    }
    Array2::from_shape_vec((n_hits, width), data)
        .map_err(|err| OfosError::Custom(format!("failed to shape broadcast table: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RaggedColumn;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn hit_batch() -> EventBatch {
        let mut batch = EventBatch::new();
        batch
            .insert(
                "h_pos_x",
                RaggedColumn::from_events(vec![vec![1.0, 2.0], vec![], vec![3.0]]),
            )
            .unwrap();
        batch
            .insert(
                "h_pos_y",
                RaggedColumn::from_events(vec![vec![4.0, 5.0], vec![], vec![6.0]]),
            )
            .unwrap();
        batch
            .insert(
                "h_pos_z",
                RaggedColumn::from_events(vec![vec![7.0, 8.0], vec![], vec![9.0]]),
            )
            .unwrap();
        batch
            .insert(
                "h_time",
                RaggedColumn::from_events(vec![vec![10.0, 11.0], vec![], vec![12.0]]),
            )
            .unwrap();
        batch
    }

    #[test]
    fn test_flatten_row_count_and_order() {
        let (table, counts) = flatten_observations(&hit_batch()).unwrap();
        assert_eq!(counts, vec![2, 0, 1]);
        assert_eq!(table.nrows(), counts.iter().sum::<usize>());
        assert_eq!(
            table,
            array![
                [1.0, 4.0, 7.0, 10.0],
                [2.0, 5.0, 8.0, 11.0],
                [3.0, 6.0, 9.0, 12.0]
            ]
        );
    }

    #[test]
    fn test_flatten_rejects_misaligned_inner_lengths() {
        let mut batch = hit_batch();
        batch
            .insert(
                "h_time",
                RaggedColumn::from_events(vec![vec![10.0], vec![], vec![12.0]]),
            )
            .unwrap();
        let err = flatten_observations(&batch).unwrap_err();
        assert!(matches!(
            err,
            OfosError::LengthMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_time_jitter_is_per_hit_and_seeded() {
        let (mut table, _) = flatten_observations(&hit_batch()).unwrap();
        let original = table.clone();
        let mut rng = fastrand::Rng::with_seed(7);
        apply_time_jitter(&mut table, 5.0, &mut rng);

        // Only the time column moves, every draw is non-negative, and
        // independent draws differ between hits.
        for row in 0..table.nrows() {
            for col in 0..3 {
                assert_relative_eq!(table[[row, col]], original[[row, col]]);
            }
            assert!(table[[row, 3]] >= original[[row, 3]]);
        }
        let d0 = table[[0, 3]] - original[[0, 3]];
        let d1 = table[[1, 3]] - original[[1, 3]];
        assert!((d0 - d1).abs() > f32::EPSILON);

        // Same seed reproduces the same perturbation.
        let (mut again, _) = flatten_observations(&hit_batch()).unwrap();
        let mut rng = fastrand::Rng::with_seed(7);
        apply_time_jitter(&mut again, 5.0, &mut rng);
        assert_eq!(again, table);
    }

    #[test]
    fn test_broadcast_aligns_rows_with_hits() {
        let hyp = array![[1.0_f32, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let broadcast = broadcast_hypotheses(&hyp, &[2, 0, 1]).unwrap();
        assert_eq!(broadcast, array![[1.0, 2.0], [1.0, 2.0], [5.0, 6.0]]);

        let err = broadcast_hypotheses(&hyp, &[1, 1]).unwrap_err();
        assert!(matches!(err, OfosError::LengthMismatch { .. }));
    }
}
