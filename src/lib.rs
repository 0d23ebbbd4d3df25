//! shieldwall: a squad-based tactical battle simulator
//!
//! Two (or more) teams of squads fight in real time. Individual units run
//! a combat state machine (wind-up, strike, block, evade, recover) over
//! three vitals: hit points, stamina and morale. Squad commanders manage
//! formations, tactics, charges and the decision to break and run.
//!
//! The crate is renderer-agnostic: drive [`battle::BattleState::run_tick`]
//! at a fixed step, drain the event queue, and read unit/squad snapshots
//! for display.

pub mod battle;
pub mod core;

pub use battle::{BattleState, SquadSpawn};
pub use core::{BattleConfig, Result, SimError};
