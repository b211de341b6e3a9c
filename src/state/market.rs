use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::Value;

/// Which price of a quote we are talking about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriceSide {
    Back,
    Lay,
    Last,
}

impl PriceSide {
    pub const ALL: [PriceSide; 3] = [PriceSide::Back, PriceSide::Lay, PriceSide::Last];
}

/// One competing entity (runner) in a market.
/// All prices are probability-scale: 1 / decimal odds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityQuote {
    pub entity_id: String,
    pub back: Option<f64>,
    pub lay: Option<f64>,
    pub last: Option<f64>,
    pub back_moving_avg: Option<f64>,
    pub lay_moving_avg: Option<f64>,
    pub last_moving_avg: Option<f64>,
    pub back_min: Option<f64>,
    pub back_max: Option<f64>,
    pub lay_min: Option<f64>,
    pub lay_max: Option<f64>,
    pub last_min: Option<f64>,
    pub last_max: Option<f64>,
    /// Traded volume, passed through untouched.
    pub volume: Option<f64>,
    pub display_name: Option<String>,
    pub info_table: BTreeMap<String, String>,
    /// Opaque annotation attached by the strategy process.
    pub strategy_status: Option<Value>,
}

impl EntityQuote {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            ..Default::default()
        }
    }

    pub fn price(&self, side: PriceSide) -> Option<f64> {
        match side {
            PriceSide::Back => self.back,
            PriceSide::Lay => self.lay,
            PriceSide::Last => self.last,
        }
    }

    pub fn moving_avg(&self, side: PriceSide) -> Option<f64> {
        match side {
            PriceSide::Back => self.back_moving_avg,
            PriceSide::Lay => self.lay_moving_avg,
            PriceSide::Last => self.last_moving_avg,
        }
    }

    pub fn moving_avg_mut(&mut self, side: PriceSide) -> &mut Option<f64> {
        match side {
            PriceSide::Back => &mut self.back_moving_avg,
            PriceSide::Lay => &mut self.lay_moving_avg,
            PriceSide::Last => &mut self.last_moving_avg,
        }
    }

    /// (min, max) slots for a side.
    pub fn range_mut(&mut self, side: PriceSide) -> (&mut Option<f64>, &mut Option<f64>) {
        match side {
            PriceSide::Back => (&mut self.back_min, &mut self.back_max),
            PriceSide::Lay => (&mut self.lay_min, &mut self.lay_max),
            PriceSide::Last => (&mut self.last_min, &mut self.last_max),
        }
    }

    /// Implied probability of the last traded price, if usable for ranking.
    pub fn favourite_key(&self) -> Option<f64> {
        self.last.filter(|p| p.is_finite() && *p > 0.0)
    }
}

/// Favourite first: higher `last` probability ranks earlier, unusable
/// prices rank after every usable one.
pub fn favourite_order(a: &EntityQuote, b: &EntityQuote) -> Ordering {
    match (a.favourite_key(), b.favourite_key()) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// One race as last reported by the feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketSnapshot {
    pub market_id: String,
    pub title: Option<String>,
    /// Negative once the race is off.
    pub seconds_to_start: Option<f64>,
    pub start_time: Option<String>,
    pub overrun_back: Option<f64>,
    pub overrun_lay: Option<f64>,
    pub overrun_last: Option<f64>,
    pub orders: Vec<Value>,
    pub strategy_status: Option<Value>,
    pub entities: Vec<EntityQuote>,
}

impl MarketSnapshot {
    pub fn new(market_id: impl Into<String>) -> Self {
        Self {
            market_id: market_id.into(),
            ..Default::default()
        }
    }

    pub fn entity(&self, entity_id: &str) -> Option<&EntityQuote> {
        self.entities.iter().find(|e| e.entity_id == entity_id)
    }

    pub fn overrun(&self, side: PriceSide) -> Option<f64> {
        match side {
            PriceSide::Back => self.overrun_back,
            PriceSide::Lay => self.overrun_lay,
            PriceSide::Last => self.overrun_last,
        }
    }

    /// Restore the favourite-first invariant. Stable, so ties keep input order.
    pub fn sort_entities(&mut self) {
        self.entities.sort_by(favourite_order);
    }
}
