/// Convert a probability-scale price to decimal odds.
///
/// # Arguments
/// * `probability` - Price in (0, 1], or None when the feed had no price
///
/// # Returns
/// `1 / probability`, or None when the input is missing, zero, negative or
/// not finite. Never returns infinity or NaN.
pub fn to_odds(probability: Option<f64>) -> Option<f64> {
    let p = probability?;
    if !p.is_finite() || p <= 0.0 {
        return None;
    }
    let odds = 1.0 / p;
    odds.is_finite().then_some(odds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reciprocal() {
        assert_eq!(to_odds(Some(0.5)), Some(2.0));
        assert_eq!(to_odds(Some(0.25)), Some(4.0));
        assert_eq!(to_odds(Some(1.0)), Some(1.0));
    }

    #[test]
    fn test_null_and_zero() {
        assert_eq!(to_odds(None), None);
        assert_eq!(to_odds(Some(0.0)), None);
        assert_eq!(to_odds(Some(-0.0)), None);
        assert_eq!(to_odds(Some(-0.3)), None);
    }

    #[test]
    fn test_never_infinite_or_nan() {
        for p in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, f64::MIN_POSITIVE / 4.0] {
            let odds = to_odds(Some(p));
            assert!(odds.map_or(true, f64::is_finite), "{:?} -> {:?}", p, odds);
        }
    }
}
