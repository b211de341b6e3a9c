//! Connection lifecycle as a pure state machine.
//!
//! [`StreamClient`] never touches a socket or a timer. It receives transport
//! events and answers with [`Command`]s for the driver to execute, so retry
//! and backoff behaviour can be tested without a network.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::FeedConfig;

/// Connection status as reported to the rest of the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Connected,
    /// Waiting out the delay before reconnection attempt `attempt`.
    Reconnecting { attempt: u32, delay: Duration },
    /// Retry ceiling reached. Terminal until `start()` is called again.
    Abandoned { attempts: u32 },
    Stopped,
}

impl ConnectionStatus {
    /// Whether a connection exists or is being pursued.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Connecting
                | ConnectionStatus::Connected
                | ConnectionStatus::Reconnecting { .. }
        )
    }
}

/// What happened on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Opened,
    Message(String),
    Closed { reason: Option<String> },
    Error(String),
    /// The reconnection delay has elapsed.
    RetryDue,
}

/// What the driver should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect,
    Deliver(String),
    ScheduleRetry(Duration),
    CancelRetry,
    Disconnect,
    Report(ConnectionStatus),
}

/// Reconnection policy, lifted from [`FeedConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl From<&FeedConfig> for RetryPolicy {
    fn from(cfg: &FeedConfig) -> Self {
        Self {
            initial_delay: cfg.reconnect_delay(),
            multiplier: cfg.backoff_multiplier,
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            max_retries: cfg.max_retries,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&FeedConfig::default())
    }
}

impl RetryPolicy {
    /// Delay before attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exp);
        let capped = ms.min(self.max_delay.as_millis() as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

/// One logical connection to the feed.
#[derive(Debug)]
pub struct StreamClient {
    policy: RetryPolicy,
    status: ConnectionStatus,
    /// Consecutive failed connections. Reset once a connection opens.
    retries: u32,
}

impl StreamClient {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            status: ConnectionStatus::Idle,
            retries: 0,
        }
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Open the connection. A no-op while one is active or pending.
    pub fn start(&mut self) -> Vec<Command> {
        if self.status.is_active() {
            return Vec::new();
        }
        self.retries = 0;
        self.set(ConnectionStatus::Connecting, vec![Command::Connect])
    }

    /// Cancel any pending retry and close the active connection.
    pub fn stop(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();
        match self.status {
            ConnectionStatus::Reconnecting { .. } => commands.push(Command::CancelRetry),
            ConnectionStatus::Connecting | ConnectionStatus::Connected => {
                commands.push(Command::Disconnect)
            }
            ConnectionStatus::Stopped => return commands,
            _ => {}
        }
        self.set(ConnectionStatus::Stopped, commands)
    }

    pub fn handle(&mut self, event: Transport) -> Vec<Command> {
        match event {
            Transport::Opened => {
                if self.status != ConnectionStatus::Connecting {
                    return Vec::new();
                }
                info!("Feed connected");
                self.retries = 0;
                self.set(ConnectionStatus::Connected, Vec::new())
            }
            Transport::Message(text) => {
                if self.status == ConnectionStatus::Connected {
                    vec![Command::Deliver(text)]
                } else {
                    Vec::new()
                }
            }
            Transport::Closed { reason } => {
                if !self.can_fail() {
                    return Vec::new();
                }
                warn!(reason = reason.as_deref().unwrap_or(""), "Feed closed");
                self.schedule_retry()
            }
            Transport::Error(e) => {
                if !self.can_fail() {
                    return Vec::new();
                }
                warn!(error = %e, "Feed transport error");
                self.schedule_retry()
            }
            Transport::RetryDue => match self.status {
                ConnectionStatus::Reconnecting { .. } => {
                    self.set(ConnectionStatus::Connecting, vec![Command::Connect])
                }
                // Stale timer from a stopped lifecycle
                _ => Vec::new(),
            },
        }
    }

    // Only a live or pending connection can fail; a close that trails an
    // error for the same connection finds us already Reconnecting.
    fn can_fail(&self) -> bool {
        matches!(
            self.status,
            ConnectionStatus::Connecting | ConnectionStatus::Connected
        )
    }

    fn schedule_retry(&mut self) -> Vec<Command> {
        if self.retries >= self.policy.max_retries {
            error!(
                attempts = self.retries,
                "Maximum reconnection attempts reached, giving up"
            );
            return self.set(
                ConnectionStatus::Abandoned {
                    attempts: self.retries,
                },
                Vec::new(),
            );
        }

        self.retries += 1;
        let delay = self.policy.delay_for(self.retries);
        info!(
            attempt = self.retries,
            max = self.policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting after delay"
        );
        self.set(
            ConnectionStatus::Reconnecting {
                attempt: self.retries,
                delay,
            },
            vec![Command::ScheduleRetry(delay)],
        )
    }

    // The report leads so observers learn the status before the driver
    // blocks on the command that follows it
    fn set(&mut self, status: ConnectionStatus, mut commands: Vec<Command>) -> Vec<Command> {
        self.status = status.clone();
        commands.insert(0, Command::Report(status));
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            ..RetryPolicy::default()
        }
    }

    fn has(commands: &[Command], wanted: &Command) -> bool {
        commands.iter().any(|c| c == wanted)
    }

    fn open(client: &mut StreamClient) {
        client.start();
        client.handle(Transport::Opened);
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut client = StreamClient::new(policy(3));
        let first = client.start();
        assert!(has(&first, &Command::Connect));

        assert!(client.start().is_empty());
        client.handle(Transport::Opened);
        assert!(client.start().is_empty());
        assert_eq!(client.status(), &ConnectionStatus::Connected);
    }

    #[test]
    fn test_messages_delivered_only_when_connected() {
        let mut client = StreamClient::new(policy(3));
        assert!(client.handle(Transport::Message("{}".into())).is_empty());

        open(&mut client);
        assert_eq!(
            client.handle(Transport::Message("{}".into())),
            vec![Command::Deliver("{}".into())]
        );
    }

    #[test]
    fn test_close_schedules_retry_without_connecting() {
        let mut client = StreamClient::new(policy(3));
        open(&mut client);

        let commands = client.handle(Transport::Closed { reason: None });
        assert!(has(&commands, &Command::ScheduleRetry(Duration::from_millis(2000))));
        // No reconnect before the delay elapses
        assert!(!has(&commands, &Command::Connect));
        assert_eq!(client.retries(), 1);

        let commands = client.handle(Transport::RetryDue);
        assert!(has(&commands, &Command::Connect));
    }

    #[test]
    fn test_error_then_close_schedules_once() {
        let mut client = StreamClient::new(policy(3));
        open(&mut client);

        let first = client.handle(Transport::Error("reset".into()));
        let second = client.handle(Transport::Closed { reason: None });
        assert!(has(&first, &Command::ScheduleRetry(Duration::from_millis(2000))));
        assert!(second.is_empty());
        assert_eq!(client.retries(), 1);
    }

    #[test]
    fn test_retries_climb_to_ceiling_then_abandon() {
        let mut client = StreamClient::new(policy(3));
        client.start();

        let mut seen = Vec::new();
        for _ in 0..3 {
            let commands = client.handle(Transport::Error("refused".into()));
            assert!(commands.iter().any(|c| matches!(c, Command::ScheduleRetry(_))));
            seen.push(client.retries());
            client.handle(Transport::RetryDue);
        }
        assert_eq!(seen, vec![1, 2, 3]);

        let commands = client.handle(Transport::Error("refused".into()));
        assert_eq!(
            commands,
            vec![Command::Report(ConnectionStatus::Abandoned { attempts: 3 })]
        );

        // Nothing further is ever scheduled
        assert!(client.handle(Transport::Closed { reason: None }).is_empty());
        assert!(client.handle(Transport::RetryDue).is_empty());
        assert_eq!(client.retries(), 3);
    }

    #[test]
    fn test_successful_open_resets_counter() {
        let mut client = StreamClient::new(policy(2));
        client.start();
        client.handle(Transport::Error("refused".into()));
        client.handle(Transport::RetryDue);
        assert_eq!(client.retries(), 1);

        client.handle(Transport::Opened);
        assert_eq!(client.retries(), 0);
    }

    #[test]
    fn test_stop_cancels_pending_retry() {
        let mut client = StreamClient::new(policy(3));
        open(&mut client);
        client.handle(Transport::Closed { reason: None });

        let commands = client.stop();
        assert!(has(&commands, &Command::CancelRetry));
        assert_eq!(client.status(), &ConnectionStatus::Stopped);

        // A timer that fires anyway is ignored
        assert!(client.handle(Transport::RetryDue).is_empty());
        assert!(client.stop().is_empty());
    }

    #[test]
    fn test_stop_disconnects_open_connection() {
        let mut client = StreamClient::new(policy(3));
        open(&mut client);
        assert!(has(&client.stop(), &Command::Disconnect));
    }

    #[test]
    fn test_restart_after_abandon() {
        let mut client = StreamClient::new(policy(1));
        client.start();
        client.handle(Transport::Error("refused".into()));
        client.handle(Transport::RetryDue);
        client.handle(Transport::Error("refused".into()));
        assert!(matches!(client.status(), ConnectionStatus::Abandoned { .. }));

        assert!(has(&client.start(), &Command::Connect));
        assert_eq!(client.retries(), 0);
    }

    #[test]
    fn test_backoff_growth_is_capped() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(2000),
            multiplier: 2.0,
            max_delay: Duration::from_millis(30_000),
            max_retries: 10,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(16_000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(30_000));
        assert_eq!(policy.delay_for(50), Duration::from_millis(30_000));
    }

    #[test]
    fn test_fixed_delay_by_default() {
        let policy = RetryPolicy::default();
        for attempt in 1..10 {
            assert_eq!(policy.delay_for(attempt), Duration::from_millis(2000));
        }
    }
}
