use num_traits::Float;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Generate a noisy sine series with injected spike anomalies
///
/// Creates a smooth periodic baseline with uniform noise, then overwrites
/// the chosen positions with a large excursion. Useful for exercising the
/// forest on data where the anomalies are known.
///
/// ### Params
///
/// * `n` - Number of samples
/// * `period` - Samples per full sine cycle
/// * `noise` - Half-width of the uniform noise band
/// * `spikes` - Positions to overwrite with the spike value
/// * `magnitude` - Value written at each spike position
/// * `seed` - Random seed for reproducibility
///
/// ### Returns
///
/// The generated series
pub fn sine_with_spikes<T>(
    n: usize,
    period: usize,
    noise: f64,
    spikes: &[usize],
    magnitude: f64,
    seed: u64,
) -> Vec<T>
where
    T: Float,
{
    let mut rng = StdRng::seed_from_u64(seed);
    let step = std::f64::consts::TAU / period.max(1) as f64;

    let mut series: Vec<T> = (0..n)
        .map(|i| {
            let jitter = if noise > 0.0 {
                rng.random_range(-noise..noise)
            } else {
                0.0
            };
            T::from((i as f64 * step).sin() + jitter).unwrap()
        })
        .collect();

    for &at in spikes {
        if at < n {
            series[at] = T::from(magnitude).unwrap();
        }
    }
    series
}

/// Generate a flat series whose level shifts once
///
/// ### Params
///
/// * `n` - Number of samples
/// * `shift_at` - First position at the new level
/// * `low` - Level before the shift
/// * `high` - Level after the shift
/// * `noise` - Half-width of the uniform noise band
/// * `seed` - Random seed for reproducibility
///
/// ### Returns
///
/// The generated series
pub fn level_shift<T>(n: usize, shift_at: usize, low: f64, high: f64, noise: f64, seed: u64) -> Vec<T>
where
    T: Float,
{
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let level = if i < shift_at { low } else { high };
            let jitter = if noise > 0.0 {
                rng.random_range(-noise..noise)
            } else {
                0.0
            };
            T::from(level + jitter).unwrap()
        })
        .collect()
}

/// Pairs a value series with evenly spaced timestamps
///
/// ### Params
///
/// * `values` - The value series
/// * `start` - Timestamp of the first sample (e.g. epoch milliseconds)
/// * `step` - Spacing between consecutive timestamps
///
/// ### Returns
///
/// The `(timestamp, value)` series
pub fn with_timestamps<T>(values: &[T], start: i64, step: i64) -> Vec<(i64, T)>
where
    T: Float,
{
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| (start + step * i as i64, v))
        .collect()
}

///////////
// Tests //
///////////
