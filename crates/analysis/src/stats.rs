use velo_core::MeasurementValues;

/// Pooled standard deviation of two sample sets.
///
/// `None` unless both sets have more than one sample.
pub fn pooled_stddev(old: &MeasurementValues, new: &MeasurementValues) -> Option<f64> {
    let (n1, n2) = (old.len(), new.len());
    if n1 < 2 || n2 < 2 {
        return None;
    }
    let pooled_variance = ((n1 - 1) as f64 * old.variance() + (n2 - 1) as f64 * new.variance())
        / (n1 + n2 - 2) as f64;
    Some(pooled_variance.sqrt())
}

/// Difference of means in units of the pooled standard error.
///
/// `None` when the spread is unavailable or zero.
pub fn sigma(old: &MeasurementValues, new: &MeasurementValues) -> Option<f64> {
    let sp = pooled_stddev(old, new)?;
    let se = sp * (1.0 / old.len() as f64 + 1.0 / new.len() as f64).sqrt();
    if se == 0.0 || !se.is_finite() {
        return None;
    }
    Some((new.mean() - old.mean()).abs() / se)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(v: &[f64]) -> MeasurementValues {
        MeasurementValues::new(v.to_vec()).unwrap()
    }

    #[test]
    fn single_samples_have_no_spread() {
        assert_eq!(pooled_stddev(&values(&[1.0]), &values(&[1.0, 2.0])), None);
        assert_eq!(sigma(&values(&[1.0, 2.0]), &values(&[3.0])), None);
    }

    #[test]
    fn pooled_stddev_of_equal_spreads() {
        // Both sets have variance 1.
        let sp = pooled_stddev(&values(&[1.0, 2.0, 3.0]), &values(&[4.0, 5.0, 6.0])).unwrap();
        assert!((sp - 1.0).abs() < 1e-12);
    }

    #[test]
    fn sigma_of_shifted_sets() {
        // se = 1 * sqrt(1/3 + 1/3), diff = 3
        let s = sigma(&values(&[1.0, 2.0, 3.0]), &values(&[4.0, 5.0, 6.0])).unwrap();
        let expected = 3.0 / (2.0f64 / 3.0).sqrt();
        assert!((s - expected).abs() < 1e-9);
    }

    #[test]
    fn constant_samples_have_no_sigma() {
        assert_eq!(sigma(&values(&[5.0, 5.0]), &values(&[7.0, 7.0])), None);
    }
}
