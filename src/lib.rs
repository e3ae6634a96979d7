pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod providers;
pub mod storage;
pub mod types;
pub mod validation;

pub use config::Config;
pub use engine::{SessionHandle, SessionOutcome};
pub use types::*;
