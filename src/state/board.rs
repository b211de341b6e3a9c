//! Canonical market state.
//!
//! Markets live in an arena of slots; `index` maps a market id to its slot
//! and `order` holds slot indices in display order. Upserts replace a slot in
//! place so a market keeps its position until the next resort, and the index
//! makes duplicates impossible.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::BoardConfig;
use crate::feeds::snapshot::ParsedFrame;
use crate::state::{MarketSnapshot, PriceHistory};

/// Immutable display-ordered snapshot handed to readers.
pub type BoardView = Arc<[Arc<MarketSnapshot>]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

/// Summary of one merge.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MergeOutcome {
    pub inserted: usize,
    pub updated: usize,
    /// Markets dropped by the eviction policy during this merge.
    pub evicted: Vec<String>,
    /// Whether the display order was re-evaluated.
    pub resorted: bool,
}

#[derive(Debug)]
struct Slot {
    market: Arc<MarketSnapshot>,
    /// Consecutive frames this market was absent from.
    missed_frames: u32,
    history: HashMap<String, PriceHistory>,
}

#[derive(Debug)]
pub struct Board {
    config: BoardConfig,
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    order: Vec<usize>,
    last_resort_ms: Option<u64>,
}

impl Board {
    pub fn new(config: BoardConfig) -> Self {
        Self {
            config,
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            order: Vec::new(),
            last_resort_ms: None,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, market_id: &str) -> bool {
        self.index.contains_key(market_id)
    }

    pub fn get(&self, market_id: &str) -> Option<&Arc<MarketSnapshot>> {
        let slot = *self.index.get(market_id)?;
        self.slots[slot].as_ref().map(|s| &s.market)
    }

    /// Current markets in display order.
    pub fn view(&self) -> BoardView {
        self.order
            .iter()
            .filter_map(|&i| self.slots[i].as_ref())
            .map(|s| Arc::clone(&s.market))
            .collect()
    }

    /// Market ids in display order.
    pub fn ids(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter_map(|&i| self.slots[i].as_ref())
            .map(|s| s.market.market_id.as_str())
            .collect()
    }

    // =========================================================================
    // MERGE
    // =========================================================================

    /// Replace a market in place, or append it if unseen.
    pub fn upsert(&mut self, mut market: MarketSnapshot) -> Upsert {
        if let Some(&i) = self.index.get(&market.market_id) {
            if let Some(slot) = self.slots[i].as_mut() {
                fill_from_history(&mut slot.history, &mut market, self.config.history_window);
                slot.market = Arc::new(market);
                slot.missed_frames = 0;
                return Upsert::Updated;
            }
        }

        let mut history = HashMap::new();
        fill_from_history(&mut history, &mut market, self.config.history_window);

        let id = market.market_id.clone();
        let slot = Slot {
            market: Arc::new(market),
            missed_frames: 0,
            history,
        };
        let i = match self.free.pop() {
            Some(i) => {
                self.slots[i] = Some(slot);
                i
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };
        self.index.insert(id, i);
        self.order.push(i);
        Upsert::Inserted
    }

    /// Upsert every market, then resort if the interval has elapsed.
    pub fn merge(&mut self, markets: Vec<MarketSnapshot>, now_ms: u64) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        for market in markets {
            match self.upsert(market) {
                Upsert::Inserted => outcome.inserted += 1,
                Upsert::Updated => outcome.updated += 1,
            }
        }
        outcome.resorted = self.maybe_resort(now_ms);
        outcome
    }

    /// Merge one decoded frame and count it as a feed cycle for eviction.
    /// Markets the frame mentioned but failed to decode count as present.
    pub fn apply_frame(&mut self, frame: ParsedFrame, now_ms: u64) -> MergeOutcome {
        let seen: HashSet<String> = frame.seen_ids().map(str::to_string).collect();
        let mut outcome = self.merge(frame.markets, now_ms);
        outcome.evicted = self.age_absent(&seen);
        outcome
    }

    fn age_absent(&mut self, seen: &HashSet<String>) -> Vec<String> {
        let limit = self.config.evict_after_missed_frames;
        let mut expired = Vec::new();

        for &i in &self.order {
            let Some(slot) = self.slots[i].as_mut() else {
                continue;
            };
            if seen.contains(&slot.market.market_id) {
                slot.missed_frames = 0;
                continue;
            }
            slot.missed_frames += 1;
            if limit > 0 && slot.missed_frames >= limit {
                expired.push(slot.market.market_id.clone());
            }
        }

        for id in &expired {
            debug!(market_id = %id, missed = limit, "Evicting market absent from feed");
            self.remove(id);
        }
        expired
    }

    /// Drop a market and its history.
    pub fn remove(&mut self, market_id: &str) -> Option<Arc<MarketSnapshot>> {
        let i = self.index.remove(market_id)?;
        self.order.retain(|&o| o != i);
        let slot = self.slots[i].take()?;
        self.free.push(i);
        Some(slot.market)
    }

    // =========================================================================
    // ORDERING
    // =========================================================================

    /// Periodic resort hook. Returns whether a resort ran.
    pub fn tick(&mut self, now_ms: u64) -> bool {
        self.maybe_resort(now_ms)
    }

    fn maybe_resort(&mut self, now_ms: u64) -> bool {
        let due = match self.last_resort_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.config.resort_interval_ms,
        };
        if !due {
            return false;
        }
        self.last_resort_ms = Some(now_ms);
        let moved = self.resort();
        trace!(moved, markets = self.order.len(), "Resorted board");
        true
    }

    /// Rebuild the display order by re-inserting markets in their previous
    /// order. Each market goes as late as possible: just ahead of the first
    /// placed market that starts more than the threshold after it. Any two
    /// markets further apart than the threshold therefore end up in start
    /// order, and closer pairs keep their previous relative order.
    /// Returns the number of markets that moved ahead of others.
    fn resort(&mut self) -> usize {
        let previous = std::mem::take(&mut self.order);
        let mut moved = 0;
        for i in previous {
            let at = self
                .order
                .iter()
                .position(|&placed| self.must_follow(placed, i))
                .unwrap_or(self.order.len());
            if at < self.order.len() {
                moved += 1;
            }
            self.order.insert(at, i);
        }
        moved
    }

    // Whether `other` has to be listed after `market`
    fn must_follow(&self, other: usize, market: usize) -> bool {
        let secs = |i: usize| {
            self.slots[i]
                .as_ref()
                .and_then(|s| s.market.seconds_to_start)
                .filter(|v| v.is_finite())
        };
        match (secs(market), secs(other)) {
            (Some(m), Some(o)) => o - m > self.config.swap_threshold_secs,
            // Unknown start times sink below known ones
            (Some(_), None) => true,
            _ => false,
        }
    }
}

fn fill_from_history(
    history: &mut HashMap<String, PriceHistory>,
    market: &mut MarketSnapshot,
    window: usize,
) {
    if window == 0 {
        return;
    }
    history.retain(|id, _| market.entities.iter().any(|e| &e.entity_id == id));
    for entity in &mut market.entities {
        history
            .entry(entity.entity_id.clone())
            .or_insert_with(|| PriceHistory::new(window))
            .observe(entity);
    }
}
