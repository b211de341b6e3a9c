use crate::state::{EntityQuote, PriceSide};

/// Sum of probability-scale prices for one side across a market's entities.
///
/// Missing, zero and non-finite prices are skipped. A balanced book sums to
/// 1.0. Returns None when no entity has a usable price.
pub fn implied_overrun(entities: &[EntityQuote], side: PriceSide) -> Option<f64> {
    let mut prices = entities
        .iter()
        .filter_map(|e| e.price(side))
        .filter(|p| p.is_finite() && *p > 0.0)
        .peekable();

    prices.peek()?;
    Some(prices.sum())
}

/// Deviation of an overrun from a balanced book (positive = over-round).
pub fn imbalance(overrun: Option<f64>) -> Option<f64> {
    overrun.filter(|v| v.is_finite()).map(|v| v - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(back: Option<f64>, lay: Option<f64>) -> EntityQuote {
        EntityQuote {
            back,
            lay,
            ..EntityQuote::new("x")
        }
    }

    #[test]
    fn test_sum() {
        let entities = vec![
            quote(Some(0.5), Some(0.55)),
            quote(Some(0.3), Some(0.35)),
            quote(Some(0.15), None),
        ];

        let back = implied_overrun(&entities, PriceSide::Back).unwrap();
        let lay = implied_overrun(&entities, PriceSide::Lay).unwrap();
        assert!((back - 0.95).abs() < 1e-12);
        assert!((lay - 0.90).abs() < 1e-12);
    }

    #[test]
    fn test_no_prices() {
        let entities = vec![quote(None, Some(0.0))];
        assert_eq!(implied_overrun(&entities, PriceSide::Back), None);
        assert_eq!(implied_overrun(&entities, PriceSide::Lay), None);
        assert_eq!(implied_overrun(&[], PriceSide::Last), None);
    }

    #[test]
    fn test_imbalance() {
        assert!((imbalance(Some(1.05)).unwrap() - 0.05).abs() < 1e-12);
        assert!(imbalance(Some(0.9)).unwrap() < 0.0);
        assert_eq!(imbalance(None), None);
        assert_eq!(imbalance(Some(f64::NAN)), None);
    }
}
