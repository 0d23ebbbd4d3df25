//! Battle event records
//!
//! Everything observable that happens during a tick is pushed onto the
//! battle's event queue and drained by the caller. Renderers turn these
//! into floating text, hit flashes and log lines; the simulation itself
//! never reads them back.

use serde::{Deserialize, Serialize};

use crate::battle::formation::FormationKind;
use crate::battle::squad_ai::{SquadState, Tactic};
use crate::core::types::{SquadId, Team, Tick, UnitId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleEvent {
    pub tick: Tick,
    pub kind: EventKind,
}

/// Per-battle event accumulator. The driver stamps the current tick;
/// everything pushed during that tick carries it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventQueue {
    tick: Tick,
    events: Vec<BattleEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tick(&mut self, tick: Tick) {
        self.tick = tick;
    }

    pub fn push(&mut self, kind: EventKind) {
        self.events.push(BattleEvent {
            tick: self.tick,
            kind,
        });
    }

    pub fn events(&self) -> &[BattleEvent] {
        &self.events
    }

    /// Hands the accumulated events to the caller and clears the queue
    pub fn drain(&mut self) -> Vec<BattleEvent> {
        std::mem::take(&mut self.events)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventKind {
    /// An attack connected and dealt damage (post-mitigation)
    AttackLanded {
        attacker: UnitId,
        defender: UnitId,
        damage: f32,
    },
    /// Defense absorbed part or all of an attack
    Blocked {
        defender: UnitId,
        attacker: UnitId,
        absorbed: f32,
        damage_through: f32,
    },
    Evaded {
        defender: UnitId,
        attacker: UnitId,
    },
    /// Transient flash cue, intensity in [0, 1]
    HitFlash { unit: UnitId, intensity: f32 },
    /// Unit ran dry and dropped into forced recovery
    Exhausted { unit: UnitId },
    UnitDied {
        unit: UnitId,
        killer: Option<UnitId>,
    },
    SquadStateChanged {
        squad: SquadId,
        from: SquadState,
        to: SquadState,
    },
    TacticChanged { squad: SquadId, tactic: Tactic },
    FormationChanged {
        squad: SquadId,
        kind: FormationKind,
    },
    ChargeStarted { squad: SquadId },
    ChargeEnded { squad: SquadId },
    TeamEliminated { team: Team },
    BattleEnded { winner: Option<Team> },
}
