use crate::feeds::ConnectionStatus;

// Everything the event loop reacts to. Feed frames and status changes come
// from the socket task; ticks and alert wake-ups come from the loop's own
// timers.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    // Raw text of one feed frame, in arrival order
    Frame(String),

    // Connection lifecycle change
    Status(ConnectionStatus),

    // Resort interval elapsed
    Tick,

    // Earliest alert alarm is due
    AlertDue,

    // Ctrl+C or owner teardown
    Shutdown,
}

// What the event loop must do after handling an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    // Board or alert state changed; hand readers a fresh snapshot
    Publish,

    // Re-arm the single alert timer (None disarms it)
    WakeAt(Option<u64>),

    // Retry ceiling reached; the feed will not come back on its own
    Abandoned { attempts: u32 },

    // Tear down timers and the connection, then exit
    Stop,
}
