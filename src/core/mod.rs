pub mod config;
pub mod error;
pub mod types;

pub use config::BattleConfig;
pub use error::{Result, SimError};
