use energy_client::Measurement;

/// Upper bound on plotted points per series.
pub const MAX_POINTS: usize = 9000;
/// Centered moving-average window applied after subsampling.
pub const SMOOTHING_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimationSettings {
    pub max_points: usize,
    pub window: usize,
}

impl Default for DecimationSettings {
    fn default() -> Self {
        Self {
            max_points: MAX_POINTS,
            window: SMOOTHING_WINDOW,
        }
    }
}

/// Positional stride that brings `n` rows down to at most `max_points`.
/// `1` means the rows are plotted as they are.
pub fn stride_for(n: usize, max_points: usize) -> usize {
    if max_points == 0 || n <= max_points {
        1
    } else {
        n.div_ceil(max_points)
    }
}

/// Centered moving average with windows clipped at both ends.
///
/// The window of point `i` covers `[i - window/2, i + (window-1)/2]`; near the
/// edges it shrinks to the samples that exist, never below one. Output length
/// equals input length.
pub fn centered_mean(values: &[f64], window: usize) -> Vec<f64> {
    if window <= 1 {
        return values.to_vec();
    }

    let before = window / 2;
    let after = (window - 1) / 2;
    let last = values.len().saturating_sub(1);

    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(before);
            let hi = (i + after).min(last);
            let span = &values[lo..=hi];
            span.iter().sum::<f64>() / span.len() as f64
        })
        .collect()
}

/// Bound the number of rows to plot.
///
/// Inputs within the cap come back unchanged. Larger inputs keep every
/// `stride`-th row and then have every numeric column smoothed with
/// [`centered_mean`]; timestamps are those of the kept rows.
pub fn decimate(rows: &[Measurement], settings: DecimationSettings) -> Vec<Measurement> {
    let stride = stride_for(rows.len(), settings.max_points);
    if stride <= 1 {
        return rows.to_vec();
    }

    let sampled: Vec<&Measurement> = rows.iter().step_by(stride).collect();
    let column = |f: fn(&Measurement) -> f64| {
        let values: Vec<f64> = sampled.iter().map(|m| f(m)).collect();
        centered_mean(&values, settings.window)
    };

    let voltage = column(|m| m.voltage);
    let current = column(|m| m.current);
    let power = column(|m| m.power);
    let energy = column(|m| m.energy);
    let frequency = column(|m| m.frequency);
    let pf = column(|m| m.pf);
    let cost = column(|m| m.cost);

    sampled
        .iter()
        .enumerate()
        .map(|(i, m)| Measurement {
            timestamp: m.timestamp,
            voltage: voltage[i],
            current: current[i],
            power: power[i],
            energy: energy[i],
            frequency: frequency[i],
            pf: pf[i],
            cost: cost[i],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{macros::datetime, Duration};

    fn rows(n: usize) -> Vec<Measurement> {
        (0..n)
            .map(|i| {
                let x = i as f64;
                Measurement {
                    timestamp: datetime!(2024-01-01 00:00:00) + Duration::seconds(i as i64),
                    voltage: 230.0 + (x * 0.1).sin(),
                    current: x * 0.001,
                    power: x,
                    energy: x * 0.01,
                    frequency: 50.0,
                    pf: 0.9,
                    cost: x * 0.003,
                }
            })
            .collect()
    }

    #[test]
    fn within_cap_is_identity() {
        let input = rows(9000);
        assert_eq!(decimate(&input, DecimationSettings::default()), input);

        let small = rows(3);
        assert_eq!(decimate(&small, DecimationSettings::default()), small);
        assert!(decimate(&[], DecimationSettings::default()).is_empty());
    }

    #[test]
    fn stride_never_exceeds_cap() {
        assert_eq!(stride_for(9000, 9000), 1);
        assert_eq!(stride_for(9001, 9000), 2);
        assert_eq!(stride_for(18000, 9000), 2);
        assert_eq!(stride_for(20000, 9000), 3);
        for n in [9001usize, 12345, 17999, 18001, 27001, 100_000] {
            assert!(n.div_ceil(stride_for(n, 9000)) <= 9000, "n = {n}");
        }
    }

    #[test]
    fn between_cap_and_twice_cap_is_halved_and_smoothed() {
        let input = rows(12000);
        let out = decimate(&input, DecimationSettings::default());

        assert_eq!(out.len(), 6000);
        assert_eq!(out[1].timestamp, input[2].timestamp);
        assert_eq!(out[5999].timestamp, input[11998].timestamp);
        // Smoothed, not the raw sample: mean of power at rows 0, 2, .., 8.
        assert_eq!(out[0].power, 4.0);
    }

    #[test]
    fn over_cap_subsamples_then_smooths() {
        let settings = DecimationSettings {
            max_points: 100,
            window: 10,
        };
        let input = rows(1000);
        let stride = stride_for(input.len(), settings.max_points);
        let out = decimate(&input, settings);

        assert_eq!(out.len(), input.len().div_ceil(stride));

        let sampled: Vec<&Measurement> = input.iter().step_by(stride).collect();
        for (o, s) in out.iter().zip(&sampled) {
            assert_eq!(o.timestamp, s.timestamp);
        }

        // Interior points are the plain mean of a full window.
        for i in 5..out.len() - 4 {
            let expected: f64 = sampled[i - 5..=i + 4].iter().map(|m| m.power).sum::<f64>() / 10.0;
            assert!((out[i].power - expected).abs() < 1e-9, "i = {i}");
        }
    }

    #[test]
    fn centered_mean_shrinks_at_edges() {
        let values = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0];
        let out = centered_mean(&values, 10);

        assert_eq!(out.len(), values.len());
        // [0..=4]
        assert_eq!(out[0], 2.0);
        // [0..=9]
        assert_eq!(out[5], 4.5);
        // [1..=10]
        assert_eq!(out[6], 5.5);
        // [6..=11]
        assert_eq!(out[11], 8.5);
    }

    #[test]
    fn centered_mean_of_single_sample() {
        assert_eq!(centered_mean(&[42.0], 10), vec![42.0]);
        assert!(centered_mean(&[], 10).is_empty());
    }
}
