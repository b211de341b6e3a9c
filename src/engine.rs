//! The single owner of canonical state.
//!
//! [`Engine::handle`] takes one [`Event`] and the current clock reading and
//! returns the [`Effect`]s the runtime must carry out. It never sleeps or
//! spawns, so whole sessions can be replayed in tests.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::events::{Effect, Event};
use crate::feeds::snapshot::parse_frame_bytes;
use crate::feeds::ConnectionStatus;
use crate::metrics::{transform_market, DisplayMarket};
use crate::state::{AlertState, AlertTransition, Alerts, Board, BoardView};

/// Everything a renderer needs, as one immutable value.
#[derive(Debug, Clone)]
pub struct BoardSnapshot {
    pub markets: BoardView,
    pub highlighted: HashSet<String>,
    pub status: ConnectionStatus,
}

impl Default for BoardSnapshot {
    fn default() -> Self {
        Self {
            markets: BoardView::from(Vec::new()),
            highlighted: HashSet::new(),
            status: ConnectionStatus::Idle,
        }
    }
}

impl BoardSnapshot {
    pub fn alert_state(&self, market_id: &str) -> AlertState {
        if self.highlighted.contains(market_id) {
            AlertState::Highlighted
        } else {
            AlertState::Normal
        }
    }

    /// Markets in display order, converted to odds.
    pub fn render(&self) -> Vec<DisplayMarket> {
        self.markets
            .iter()
            .map(|m| transform_market(m, self.alert_state(&m.market_id)))
            .collect()
    }
}

pub struct Engine {
    board: Board,
    alerts: Alerts,
    status: ConnectionStatus,
}

impl Engine {
    pub fn new(config: &Config) -> Self {
        Self {
            board: Board::new(config.board.clone()),
            alerts: Alerts::new(config.alerts.clone()),
            status: ConnectionStatus::Idle,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn alerts(&self) -> &Alerts {
        &self.alerts
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            markets: self.board.view(),
            highlighted: self.alerts.highlighted_ids().map(str::to_string).collect(),
            status: self.status.clone(),
        }
    }

    pub fn handle(&mut self, event: Event, now_ms: u64) -> Vec<Effect> {
        match event {
            Event::Frame(text) => self.on_frame(text, now_ms),
            Event::Status(status) => self.on_status(status),
            Event::Tick => {
                if self.board.tick(now_ms) {
                    vec![Effect::Publish]
                } else {
                    Vec::new()
                }
            }
            Event::AlertDue => {
                let cleared = self.alerts.expire(now_ms);
                let mut effects = Vec::new();
                if !cleared.is_empty() {
                    debug!(markets = ?cleared, "Alerts decayed");
                    effects.push(Effect::Publish);
                }
                effects.push(Effect::WakeAt(self.alerts.next_deadline()));
                effects
            }
            Event::Shutdown => {
                info!("Shutting down");
                self.alerts.clear();
                vec![Effect::WakeAt(None), Effect::Stop]
            }
        }
    }

    fn on_frame(&mut self, text: String, now_ms: u64) -> Vec<Effect> {
        let mut bytes = text.into_bytes();
        let frame = match parse_frame_bytes(&mut bytes) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Dropping unparseable frame");
                return Vec::new();
            }
        };

        for rejected in &frame.rejected {
            warn!(
                market_id = rejected.market_id().unwrap_or(""),
                error = %rejected,
                "Dropping malformed market"
            );
        }

        let merged: Vec<String> = frame.markets.iter().map(|m| m.market_id.clone()).collect();
        let outcome = self.board.apply_frame(frame, now_ms);
        debug!(
            inserted = outcome.inserted,
            updated = outcome.updated,
            evicted = outcome.evicted.len(),
            resorted = outcome.resorted,
            "Merged frame"
        );

        for id in &outcome.evicted {
            self.alerts.remove(id);
        }

        // Alerts see the merged values, which include history-filled fields
        for id in &merged {
            let Some(market) = self.board.get(id) else {
                continue;
            };
            if let Some(AlertTransition::Raised) = self.alerts.observe(market, now_ms) {
                info!(
                    market_id = %id,
                    overrun_back = ?market.overrun_back,
                    overrun_lay = ?market.overrun_lay,
                    "Overrun alert raised"
                );
            }
        }

        vec![Effect::Publish, Effect::WakeAt(self.alerts.next_deadline())]
    }

    fn on_status(&mut self, status: ConnectionStatus) -> Vec<Effect> {
        if status == self.status {
            return Vec::new();
        }
        self.status = status;

        let mut effects = vec![Effect::Publish];
        if let ConnectionStatus::Abandoned { attempts } = self.status {
            effects.push(Effect::Abandoned { attempts });
        }
        effects
    }
}
