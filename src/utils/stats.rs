//! Small descriptive statistics over millisecond samples

/// Arithmetic mean, `None` for an empty slice
pub fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// Population standard deviation (divides by n)
pub fn population_std(samples: &[f64]) -> Option<f64> {
    let avg = mean(samples)?;
    let variance =
        samples.iter().map(|s| (s - avg).powi(2)).sum::<f64>() / samples.len() as f64;
    Some(variance.sqrt())
}

/// Sample standard deviation (divides by n - 1); 0 for a single sample
pub fn sample_stdev(samples: &[f64]) -> Option<f64> {
    let avg = mean(samples)?;
    if samples.len() < 2 {
        return Some(0.0);
    }
    let variance =
        samples.iter().map(|s| (s - avg).powi(2)).sum::<f64>() / (samples.len() - 1) as f64;
    Some(variance.sqrt())
}

pub fn min(samples: &[f64]) -> Option<f64> {
    samples.iter().cloned().reduce(f64::min)
}

pub fn max(samples: &[f64]) -> Option<f64> {
    samples.iter().cloned().reduce(f64::max)
}

/// Coefficient of variation in percent (`stdev / avg * 100`)
pub fn coefficient_of_variation(stdev: f64, avg: f64) -> f64 {
    if avg > 0.0 { stdev * 100.0 / avg } else { 0.0 }
}

/// Percent change from `from` to `to`; `None` when `from` is zero
pub fn percent_change(from: f64, to: f64) -> Option<f64> {
    if from == 0.0 {
        return None;
    }
    Some((to - from) * 100.0 / from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_samples() {
        assert_eq!(mean(&[]), None);
        assert_eq!(population_std(&[]), None);
        assert_eq!(min(&[]), None);
    }

    #[test]
    fn test_std_variants() {
        let samples = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&samples), Some(5.0));
        assert_eq!(population_std(&samples), Some(2.0));
        let stdev = sample_stdev(&samples).unwrap();
        assert!((stdev - 2.138).abs() < 0.001);
        assert_eq!(sample_stdev(&[3.0]), Some(0.0));
    }

    #[test]
    fn test_percent_change() {
        assert_eq!(percent_change(100.0, 80.0), Some(-20.0));
        assert_eq!(percent_change(0.0, 80.0), None);
        assert_eq!(coefficient_of_variation(5.0, 50.0), 10.0);
        assert_eq!(coefficient_of_variation(5.0, 0.0), 0.0);
    }
}
