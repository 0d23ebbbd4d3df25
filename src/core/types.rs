//! Core type definitions used throughout the codebase

use serde::{Deserialize, Serialize};

/// Unique identifier for units
///
/// Doubles as the index into the battle's unit arena: units are allocated
/// sequentially and never removed, only marked dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub u32);

impl UnitId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Unique identifier for squads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SquadId(pub u32);

impl SquadId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Team tag. Two teams is the common case but nothing below assumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Team(pub u8);

impl Team {
    pub const BLUE: Team = Team(0);
    pub const RED: Team = Team(1);
}

/// Simulation tick counter
pub type Tick = u64;

/// Wraps an angle into (-PI, PI]
pub fn normalize_angle(angle: f32) -> f32 {
    let mut a = angle % std::f32::consts::TAU;
    if a > std::f32::consts::PI {
        a -= std::f32::consts::TAU;
    } else if a <= -std::f32::consts::PI {
        a += std::f32::consts::TAU;
    }
    a
}
