//! Conversion of raw per-event truth records into canonical hypothesis rows.
//!
//! A hypothesis row is the per-event label representation used for
//! supervised training: vertex position, direction expressed as zenith and
//! azimuth angles, time, and energy, with an optional particle id for the
//! initial-truth variant.

use std::f64::consts::TAU;

use ndarray::Array2;

use crate::{data::EventBatch, OfosError, OfosResult};

/// Columns of a truth hypothesis row: `x, y, z, zenith, azimuth, t, energy`.
pub const HYPOTHESIS_WIDTH: usize = 7;
/// Columns of an initial-truth hypothesis row: the above plus particle id.
pub const INITIAL_HYPOTHESIS_WIDTH: usize = 8;

/// Azimuth of a momentum or direction vector, reduced into `[0, 2π)`.
pub fn azimuth(y: f64, x: f64) -> f64 {
    let angle = y.atan2(x).rem_euclid(TAU);
    // rem_euclid rounds a tiny negative atan2 result up to exactly TAU.
    if angle == TAU {
        0.0
    } else {
        angle
    }
}

/// Zenith angle of a momentum vector, in `[0, π]`.
///
/// A zero-norm momentum is a degenerate input: the division yields NaN,
/// which is propagated rather than masked. Callers must guard or accept it.
pub fn zenith(x: f64, y: f64, z: f64) -> f64 {
    let norm = (x * x + y * y + z * z).sqrt();
    (z / norm).acos()
}

/// Fold truth-group columns into one hypothesis row per event.
///
/// Truth fields are stored as single-entry lists per event; the first entry
/// of each is taken. Column order is fixed:
/// `x, y, z, zenith, azimuth, t, energy`.
pub fn hypothesis_rows(batch: &EventBatch) -> OfosResult<Array2<f32>> {
    let x = batch.column("i_pos_x")?.firsts("i_pos_x")?;
    let y = batch.column("i_pos_y")?.firsts("i_pos_y")?;
    let z = batch.column("i_pos_z")?.firsts("i_pos_z")?;
    let mom_x = batch.column("i_mom_x")?.firsts("i_mom_x")?;
    let mom_y = batch.column("i_mom_y")?.firsts("i_mom_y")?;
    let mom_z = batch.column("i_mom_z")?.firsts("i_mom_z")?;
    let time = batch.column("i_time")?.firsts("i_time")?;
    let energy = batch.column("i_E")?.firsts("i_E")?;

    let n_events = x.len();
    let mut data = Vec::with_capacity(n_events * HYPOTHESIS_WIDTH);
    for event in 0..n_events {
        let ze = zenith(mom_x[event], mom_y[event], mom_z[event]);
        let az = azimuth(mom_y[event], mom_x[event]);
        data.extend(
            [
                x[event],
                y[event],
                z[event],
                ze,
                az,
                time[event],
                energy[event],
            ]
            .map(|value| value as f32),
        );
    }
    table(n_events, HYPOTHESIS_WIDTH, data)
}

/// Fold initial-truth columns into one 8-wide hypothesis row per event.
///
/// Direction is given directly as a unit vector `(u, v, w)` rather than a
/// momentum, and the row additionally carries the particle id. Column order:
/// `x, y, z, zenith, azimuth, t, ke, pid`.
pub fn initial_hypothesis_rows(batch: &EventBatch) -> OfosResult<Array2<f32>> {
    let x = batch.column("mcx")?.firsts("mcx")?;
    let y = batch.column("mcy")?.firsts("mcy")?;
    let z = batch.column("mcz")?.firsts("mcz")?;
    let time = batch.column("mct")?.firsts("mct")?;
    let u = batch.column("mcu")?.firsts("mcu")?;
    let v = batch.column("mcv")?.firsts("mcv")?;
    let w = batch.column("mcw")?.firsts("mcw")?;
    let ke = batch.column("mcke")?.firsts("mcke")?;
    let pid = batch.column("mcpid")?.firsts("mcpid")?;

    let n_events = x.len();
    let mut data = Vec::with_capacity(n_events * INITIAL_HYPOTHESIS_WIDTH);
    for event in 0..n_events {
        let ze = w[event].acos();
        let az = azimuth(v[event], u[event]);
        data.extend(
            [
                x[event],
                y[event],
                z[event],
                ze,
                az,
                time[event],
                ke[event],
                pid[event],
            ]
            .map(|value| value as f32),
        );
    }
    table(n_events, INITIAL_HYPOTHESIS_WIDTH, data)
}

fn table(rows: usize, cols: usize, data: Vec<f32>) -> OfosResult<Array2<f32>> {
    Array2::from_shape_vec((rows, cols), data)
        .map_err(|err| OfosError::Custom(format!("failed to shape hypothesis table: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RaggedColumn;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn truth_batch(mom: [(f64, f64, f64); 2]) -> EventBatch {
        let mut batch = EventBatch::new();
        let singles = |values: Vec<f64>| {
            RaggedColumn::from_events(values.into_iter().map(|v| vec![v]).collect::<Vec<_>>())
        };
        batch.insert("i_pos_x", singles(vec![1.0, -1.0])).unwrap();
        batch.insert("i_pos_y", singles(vec![2.0, -2.0])).unwrap();
        batch.insert("i_pos_z", singles(vec![3.0, -3.0])).unwrap();
        batch
            .insert("i_mom_x", singles(mom.iter().map(|m| m.0).collect()))
            .unwrap();
        batch
            .insert("i_mom_y", singles(mom.iter().map(|m| m.1).collect()))
            .unwrap();
        batch
            .insert("i_mom_z", singles(mom.iter().map(|m| m.2).collect()))
            .unwrap();
        batch.insert("i_time", singles(vec![10.0, 20.0])).unwrap();
        batch.insert("i_E", singles(vec![5.0, 6.0])).unwrap();
        batch
    }

    #[test]
    fn test_azimuth_reduced_into_zero_tau() {
        // atan2 alone would give -π/2 here.
        assert_relative_eq!(azimuth(-1.0, 0.0), 3.0 * PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(azimuth(0.0, 1.0), 0.0, epsilon = 1e-12);
        assert!(azimuth(1.0, 1.0) < TAU);
    }

    #[test]
    fn test_azimuth_never_reaches_tau() {
        // A tiny negative angle would otherwise round up to exactly TAU.
        assert_eq!(azimuth(-1e-300, 1.0), 0.0);
        for (y, x) in [(-f64::MIN_POSITIVE, 1.0), (-1e-16, 1.0), (-1.0, 1e300)] {
            assert!(azimuth(y, x) < TAU);
        }
    }

    #[test]
    fn test_zenith_range() {
        assert_relative_eq!(zenith(0.0, 0.0, 1.0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(zenith(0.0, 0.0, -1.0), PI, epsilon = 1e-12);
        assert_relative_eq!(zenith(1.0, 0.0, 0.0), PI / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_norm_momentum_is_nan() {
        assert!(zenith(0.0, 0.0, 0.0).is_nan());
    }

    #[test]
    fn test_hypothesis_row_layout() {
        let batch = truth_batch([(0.0, 1.0, 0.0), (1.0, -1.0, 1.0)]);
        let table = hypothesis_rows(&batch).unwrap();
        assert_eq!(table.dim(), (2, HYPOTHESIS_WIDTH));

        // Event 0: momentum along +y, so zenith = π/2 and azimuth = π/2.
        assert_relative_eq!(table[[0, 0]], 1.0);
        assert_relative_eq!(table[[0, 3]], (PI / 2.0) as f32, epsilon = 1e-6);
        assert_relative_eq!(table[[0, 4]], (PI / 2.0) as f32, epsilon = 1e-6);
        assert_relative_eq!(table[[0, 5]], 10.0);
        assert_relative_eq!(table[[0, 6]], 5.0);

        // Event 1: negative-y momentum lands in the upper half of [0, 2π).
        let az = table[[1, 4]] as f64;
        assert!(az > PI && az < TAU);
        let ze = table[[1, 3]] as f64;
        assert!((0.0..=PI).contains(&ze));
    }

    #[test]
    fn test_initial_hypothesis_includes_pid() {
        let mut batch = EventBatch::new();
        let singles =
            |values: Vec<f64>| RaggedColumn::from_events(values.into_iter().map(|v| vec![v]));
        batch.insert("mcx", singles(vec![0.5])).unwrap();
        batch.insert("mcy", singles(vec![0.6])).unwrap();
        batch.insert("mcz", singles(vec![0.7])).unwrap();
        batch.insert("mct", singles(vec![1.5])).unwrap();
        batch.insert("mcu", singles(vec![0.0])).unwrap();
        batch.insert("mcv", singles(vec![0.0])).unwrap();
        batch.insert("mcw", singles(vec![-1.0])).unwrap();
        batch.insert("mcke", singles(vec![2.5])).unwrap();
        batch.insert("mcpid", singles(vec![13.0])).unwrap();

        let table = initial_hypothesis_rows(&batch).unwrap();
        assert_eq!(table.dim(), (1, INITIAL_HYPOTHESIS_WIDTH));
        assert_relative_eq!(table[[0, 3]], PI as f32, epsilon = 1e-6);
        assert_relative_eq!(table[[0, 6]], 2.5);
        assert_relative_eq!(table[[0, 7]], 13.0);
    }
}
