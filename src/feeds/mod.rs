pub mod client;
pub mod snapshot;
pub mod socket;

pub use client::{Command, ConnectionStatus, RetryPolicy, StreamClient, Transport};
pub use snapshot::{parse_frame, parse_frame_bytes, parse_value, ParsedFrame};
pub use socket::{FeedConnection, FeedHandle};
