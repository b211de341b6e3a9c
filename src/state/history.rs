use std::collections::VecDeque;

use crate::state::{EntityQuote, PriceSide};

/// Bounded window of observed prices for one side of one entity.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    values: VecDeque<f64>,
    capacity: usize,
    sum: f64,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity.min(64)),
            capacity,
            sum: 0.0,
        }
    }

    /// Record a sample. Non-finite and non-positive prices are ignored.
    pub fn push(&mut self, value: f64) {
        if self.capacity == 0 || !value.is_finite() || value <= 0.0 {
            return;
        }
        if self.values.len() == self.capacity {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
            }
        }
        self.values.push_back(value);
        self.sum += value;
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.sum / self.values.len() as f64)
        }
    }

    pub fn min(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::max)
    }
}

/// Back/lay/last windows for one entity.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    back: RollingWindow,
    lay: RollingWindow,
    last: RollingWindow,
}

impl PriceHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            back: RollingWindow::new(capacity),
            lay: RollingWindow::new(capacity),
            last: RollingWindow::new(capacity),
        }
    }

    pub fn window(&self, side: PriceSide) -> &RollingWindow {
        match side {
            PriceSide::Back => &self.back,
            PriceSide::Lay => &self.lay,
            PriceSide::Last => &self.last,
        }
    }

    fn window_mut(&mut self, side: PriceSide) -> &mut RollingWindow {
        match side {
            PriceSide::Back => &mut self.back,
            PriceSide::Lay => &mut self.lay,
            PriceSide::Last => &mut self.last,
        }
    }

    /// Record the quote's current prices, then fill any moving average or
    /// range the feed left out. Values the feed did send are kept.
    pub fn observe(&mut self, quote: &mut EntityQuote) {
        for side in PriceSide::ALL {
            if let Some(price) = quote.price(side) {
                self.window_mut(side).push(price);
            }

            let window = self.window(side);
            let avg = quote.moving_avg_mut(side);
            if avg.is_none() {
                *avg = window.mean();
            }

            let (min, max) = quote.range_mut(side);
            if min.is_none() {
                *min = window.min();
            }
            if max.is_none() {
                *max = window.max();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_evicts_oldest() {
        let mut w = RollingWindow::new(3);
        for v in [0.1, 0.2, 0.3, 0.4] {
            w.push(v);
        }

        assert_eq!(w.len(), 3);
        assert_eq!(w.min(), Some(0.2));
        assert_eq!(w.max(), Some(0.4));
        assert!((w.mean().unwrap() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_window_ignores_bad_samples() {
        let mut w = RollingWindow::new(10);
        w.push(0.0);
        w.push(-0.5);
        w.push(f64::NAN);
        w.push(f64::INFINITY);

        assert!(w.is_empty());
        assert_eq!(w.mean(), None);
        assert_eq!(w.min(), None);
    }

    #[test]
    fn test_zero_capacity_disabled() {
        let mut w = RollingWindow::new(0);
        w.push(0.5);
        assert!(w.is_empty());
    }

    #[test]
    fn test_observe_fills_missing_only() {
        let mut history = PriceHistory::new(100);

        let mut first = EntityQuote {
            back: Some(0.4),
            last: Some(0.5),
            ..EntityQuote::new("h1")
        };
        history.observe(&mut first);
        assert_eq!(first.back_moving_avg, Some(0.4));

        let mut second = EntityQuote {
            back: Some(0.6),
            last: Some(0.3),
            last_moving_avg: Some(0.99), // sent by the feed
            ..EntityQuote::new("h1")
        };
        history.observe(&mut second);

        assert!((second.back_moving_avg.unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(second.back_min, Some(0.4));
        assert_eq!(second.back_max, Some(0.6));
        assert_eq!(second.last_moving_avg, Some(0.99));
        assert_eq!(second.last_min, Some(0.3));
        assert_eq!(second.last_max, Some(0.5));
        // Never priced on the lay side
        assert_eq!(second.lay_moving_avg, None);
        assert_eq!(second.lay_min, None);
    }
}
