mod alert;
mod board;
mod history;
mod market;

pub use alert::{Alarm, AlertState, AlertTransition, Alerts};
pub use board::{Board, BoardView, MergeOutcome, Upsert};
pub use history::{PriceHistory, RollingWindow};
pub use market::{favourite_order, EntityQuote, MarketSnapshot, PriceSide};
