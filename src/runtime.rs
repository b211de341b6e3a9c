use std::future::{pending, Future};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep_until, Interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::clock::{Clock, MonotonicClock};
use crate::config::Config;
use crate::engine::{BoardSnapshot, Engine};
use crate::events::{Effect, Event};
use crate::feeds::{FeedConnection, RetryPolicy};

/// Runs the feed, the engine and its timers on one task until `shutdown`
/// resolves. Every state change is published on the returned watch channel.
pub struct Runtime {
    config: Config,
    board_tx: watch::Sender<BoardSnapshot>,
}

// The loop's own timers: periodic resort and the single alert alarm
struct Wakeups {
    clock: MonotonicClock,
    resort: Interval,
    alert_at: Option<u64>,
}

impl Wakeups {
    fn new(clock: MonotonicClock, resort_every: Duration) -> Self {
        let mut resort = interval_at(tokio::time::Instant::now() + resort_every, resort_every);
        resort.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            clock,
            resort,
            alert_at: None,
        }
    }

    // Timers come before the feed so a frame backlog cannot starve them
    async fn next_event<S>(
        &mut self,
        shutdown: &mut S,
        rx: &mut mpsc::Receiver<Event>,
        feed_open: &mut bool,
    ) -> Event
    where
        S: Future<Output = ()> + Unpin,
    {
        loop {
            let clock = self.clock;
            let alert_at = self.alert_at;
            let alert_due = async move {
                match alert_at {
                    Some(at) => sleep_until(clock.instant_at(at)).await,
                    None => pending().await,
                }
            };

            return tokio::select! {
                biased;
                _ = &mut *shutdown => Event::Shutdown,
                _ = alert_due => Event::AlertDue,
                _ = self.resort.tick() => Event::Tick,
                msg = rx.recv(), if *feed_open => match msg {
                    Some(event) => event,
                    None => {
                        // Driver gave up; keep serving the last board
                        *feed_open = false;
                        continue;
                    }
                },
            };
        }
    }
}

impl Runtime {
    pub fn new(config: Config) -> (Self, watch::Receiver<BoardSnapshot>) {
        let (board_tx, board_rx) = watch::channel(BoardSnapshot::default());
        (Self { config, board_tx }, board_rx)
    }

    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let (tx, mut rx) = mpsc::channel::<Event>(self.config.feed.channel_capacity);
        let feed = FeedConnection::new(
            self.config.feed.url.clone(),
            RetryPolicy::from(&self.config.feed),
        )
        .spawn(tx);

        let clock = MonotonicClock::new();
        let mut engine = Engine::new(&self.config);
        let mut wakeups = Wakeups::new(
            clock,
            Duration::from_millis(self.config.board.resort_interval_ms),
        );
        let mut feed_open = true;
        tokio::pin!(shutdown);

        info!(url = %self.config.feed.url, "Starting event loop");

        loop {
            let event = wakeups
                .next_event(&mut shutdown, &mut rx, &mut feed_open)
                .await;

            for effect in engine.handle(event, clock.now_ms()) {
                match effect {
                    Effect::Publish => {
                        self.board_tx.send_replace(engine.snapshot());
                    }
                    Effect::WakeAt(at) => wakeups.alert_at = at,
                    Effect::Abandoned { attempts } => {
                        error!(attempts, "Feed abandoned, board is no longer updating");
                    }
                    Effect::Stop => {
                        if let Err(e) = feed.stop().await {
                            warn!(error = %e, "Feed task ended with error");
                        }
                        return;
                    }
                }
            }
        }
    }
}
