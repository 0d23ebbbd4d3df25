//! Real-time squad battle simulation
//!
//! Units fight individually through a small combat state machine; squads
//! steer them through formations, commander decisions and charges. The
//! [`simulator::BattleState`] tick driver holds it all together.

pub mod charge;
pub mod combat;
pub mod constants;
pub mod events;
pub mod formation;
pub mod formation_manager;
pub mod simulator;
pub mod squad;
pub mod squad_ai;
pub mod stats;
pub mod unit;

pub use charge::ChargeSystem;
pub use events::{BattleEvent, EventKind, EventQueue};
pub use formation::{Formation, FormationKind, Slot, DEFAULT_FORMATION_SPACING};
pub use formation_manager::FormationManager;
pub use simulator::{BattleState, SquadOverlay, SquadSpawn, UnitSnapshot};
pub use squad::{Squad, SquadInfo};
pub use squad_ai::{SquadAi, SquadState, Tactic};
pub use stats::{UnitClass, UnitStats};
pub use unit::{Intent, Unit, UnitOrders, UnitState};
