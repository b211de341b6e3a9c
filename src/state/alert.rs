use std::collections::HashMap;

use crate::config::AlertConfig;
use crate::state::MarketSnapshot;

/// A single cancellable deadline on the injected millisecond clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Alarm {
    deadline_ms: Option<u64>,
}

impl Alarm {
    /// Arm (or re-arm) the alarm. Any earlier deadline is replaced.
    pub fn arm(&mut self, at_ms: u64) {
        self.deadline_ms = Some(at_ms);
    }

    pub fn cancel(&mut self) {
        self.deadline_ms = None;
    }

    pub fn deadline(&self) -> Option<u64> {
        self.deadline_ms
    }

    pub fn is_armed(&self) -> bool {
        self.deadline_ms.is_some()
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        matches!(self.deadline_ms, Some(at) if now_ms >= at)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AlertState {
    #[default]
    Normal,
    Highlighted,
}

/// What an update did to a market's alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertTransition {
    /// Normal → Highlighted.
    Raised,
    /// Already highlighted; dwell restarted.
    Extended,
}

#[derive(Debug, Clone, Default)]
struct AlertTracker {
    state: AlertState,
    alarm: Alarm,
}

/// Overrun highlight state for every market, one alarm each.
#[derive(Debug)]
pub struct Alerts {
    config: AlertConfig,
    trackers: HashMap<String, AlertTracker>,
}

impl Alerts {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            config,
            trackers: HashMap::new(),
        }
    }

    /// Lay book over-round or back book under-round.
    pub fn is_triggered(&self, market: &MarketSnapshot) -> bool {
        let lay_hot = market.overrun_lay.is_some_and(|v| v > self.config.lay_trigger);
        let back_hot = market.overrun_back.is_some_and(|v| v < self.config.back_trigger);
        lay_hot || back_hot
    }

    /// Feed one merged update. Non-triggering updates change nothing.
    pub fn observe(&mut self, market: &MarketSnapshot, now_ms: u64) -> Option<AlertTransition> {
        if !self.is_triggered(market) {
            return None;
        }

        let tracker = self.trackers.entry(market.market_id.clone()).or_default();
        tracker.alarm.arm(now_ms.saturating_add(self.config.dwell_ms));
        match tracker.state {
            AlertState::Normal => {
                tracker.state = AlertState::Highlighted;
                Some(AlertTransition::Raised)
            }
            AlertState::Highlighted => Some(AlertTransition::Extended),
        }
    }

    /// Return every market whose dwell has run out to Normal.
    /// Returns the ids that changed, sorted.
    pub fn expire(&mut self, now_ms: u64) -> Vec<String> {
        let mut cleared: Vec<String> = self
            .trackers
            .iter()
            .filter(|(_, t)| t.alarm.is_due(now_ms))
            .map(|(id, _)| id.clone())
            .collect();
        cleared.sort();

        for id in &cleared {
            self.trackers.remove(id);
        }
        cleared
    }

    /// Earliest pending alarm across all markets.
    pub fn next_deadline(&self) -> Option<u64> {
        self.trackers.values().filter_map(|t| t.alarm.deadline()).min()
    }

    pub fn state(&self, market_id: &str) -> AlertState {
        self.trackers
            .get(market_id)
            .map(|t| t.state)
            .unwrap_or_default()
    }

    pub fn is_highlighted(&self, market_id: &str) -> bool {
        self.state(market_id) == AlertState::Highlighted
    }

    /// Drop a market's alert and cancel its alarm.
    pub fn remove(&mut self, market_id: &str) {
        self.trackers.remove(market_id);
    }

    /// Cancel every alarm.
    pub fn clear(&mut self) {
        self.trackers.clear();
    }

    pub fn highlighted_count(&self) -> usize {
        self.trackers.len()
    }

    pub fn highlighted_ids(&self) -> impl Iterator<Item = &str> {
        self.trackers.keys().map(String::as_str)
    }
}
