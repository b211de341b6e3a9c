pub mod api;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod feeds;
pub mod metrics;
pub mod runtime;
pub mod state;

pub use config::Config;
pub use engine::{BoardSnapshot, Engine};
pub use error::{Error, Result};
pub use runtime::Runtime;
