//! Display-side derivations. Everything here is a pure function of stored
//! state; canonical values stay on the probability scale.

mod odds;
mod overrun;

pub use odds::to_odds;
pub use overrun::{imbalance, implied_overrun};

use std::collections::BTreeMap;

use serde_json::Value;

use crate::state::{AlertState, EntityQuote, MarketSnapshot, PriceSide};

/// An entity with every price converted to decimal odds.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayQuote {
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
    pub display_name: Option<String>,
    pub info_table: BTreeMap<String, String>,
    pub strategy_status: Option<Value>,
}

/// A market ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayMarket {
    pub market_id: String,
    pub title: Option<String>,
    pub seconds_to_start: Option<f64>,
    /// Overruns as reported by the feed.
    pub overrun_back: Option<f64>,
    pub overrun_lay: Option<f64>,
    pub overrun_last: Option<f64>,
    /// Overruns recomputed from the entities' own prices.
    pub implied_back: Option<f64>,
    pub implied_lay: Option<f64>,
    pub implied_last: Option<f64>,
    /// Feed overruns minus 1.0.
    pub imbalance_back: Option<f64>,
    pub imbalance_lay: Option<f64>,
    pub highlighted: bool,
    pub strategy_status: Option<Value>,
    pub entities: Vec<DisplayQuote>,
}

/// Convert one quote to odds. Each odds field is the reciprocal of its
/// probability field, or None when that field is missing or non-positive.
///
/// Note the inversion on ranges: `last_min` here is the odds of the stored
/// `last_min` probability, i.e. the longest price seen.
pub fn transform(quote: &EntityQuote) -> DisplayQuote {
    DisplayQuote {
        entity_id: quote.entity_id.clone(),
        back: to_odds(quote.back),
        lay: to_odds(quote.lay),
        last: to_odds(quote.last),
        back_moving_avg: to_odds(quote.back_moving_avg),
        lay_moving_avg: to_odds(quote.lay_moving_avg),
        last_moving_avg: to_odds(quote.last_moving_avg),
        back_min: to_odds(quote.back_min),
        back_max: to_odds(quote.back_max),
        lay_min: to_odds(quote.lay_min),
        lay_max: to_odds(quote.lay_max),
        last_min: to_odds(quote.last_min),
        last_max: to_odds(quote.last_max),
        display_name: quote.display_name.clone(),
        info_table: quote.info_table.clone(),
        strategy_status: quote.strategy_status.clone(),
    }
}

pub fn transform_market(market: &MarketSnapshot, alert: AlertState) -> DisplayMarket {
    DisplayMarket {
        market_id: market.market_id.clone(),
        title: market.title.clone(),
        seconds_to_start: market.seconds_to_start,
        overrun_back: market.overrun_back,
        overrun_lay: market.overrun_lay,
        overrun_last: market.overrun_last,
        implied_back: implied_overrun(&market.entities, PriceSide::Back),
        implied_lay: implied_overrun(&market.entities, PriceSide::Lay),
        implied_last: implied_overrun(&market.entities, PriceSide::Last),
        imbalance_back: imbalance(market.overrun_back),
        imbalance_lay: imbalance(market.overrun_lay),
        highlighted: alert == AlertState::Highlighted,
        strategy_status: market.strategy_status.clone(),
        entities: market.entities.iter().map(transform).collect(),
    }
}
