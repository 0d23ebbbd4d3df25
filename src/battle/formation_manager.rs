//! Slot assignment, formation transitions and local movement interference
//!
//! The manager binds a squad's living units to formation slots and tracks
//! the transition window that opens whenever the shape or the assignment
//! changes. While transitioning, units move faster, pass closer through
//! allies and shrug off part of the usual obstruction slowdown so the new
//! shape forms quickly instead of jamming.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::battle::constants::*;
use crate::battle::formation::Formation;
use crate::battle::unit::Unit;
use crate::core::config::BattleConfig;
use crate::core::types::UnitId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormationManager {
    transitioning: bool,
    transition_timer: f32,
}

impl Default for FormationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FormationManager {
    pub fn new() -> Self {
        Self {
            transitioning: false,
            transition_timer: 0.0,
        }
    }

    pub fn is_transitioning(&self) -> bool {
        self.transitioning
    }

    /// Opens the transition window (formation change, charge re-snap, rally)
    pub fn start_transition(&mut self) {
        self.transitioning = true;
        self.transition_timer = FORMATION_TRANSITION_DURATION;
    }

    pub fn update(&mut self, dt: f32) {
        if self.transitioning {
            self.transition_timer -= dt;
            if self.transition_timer <= 0.0 {
                self.transitioning = false;
                self.transition_timer = 0.0;
            }
        }
    }

    pub fn speed_multiplier(&self) -> f32 {
        if self.transitioning {
            FORMATION_TRANSITION_SPEED_MULT
        } else {
            1.0
        }
    }

    /// How close allies in the same squad may pass through each other,
    /// as a fraction of combined radii
    pub fn pass_through_ratio(&self) -> f32 {
        if self.transitioning {
            SQUAD_PASS_THROUGH_RATIO * FORMATION_TRANSITION_PASS_THROUGH_RATIO
        } else {
            SQUAD_PASS_THROUGH_RATIO
        }
    }

    /// Binds living units to slots, strongest to the foremost slot.
    ///
    /// Strength order is hp, then stamina, then id as the tie-breaker, so
    /// the binding is stable across ticks for unchanged vitals. Dead units
    /// lose their slot; indices past the slot list collapse to the anchor.
    pub fn assign_slots(
        &self,
        formation: &Formation,
        anchor: Vec2,
        facing: f32,
        members: &[UnitId],
        units: &mut [Unit],
    ) {
        let mut alive: Vec<UnitId> = members
            .iter()
            .copied()
            .filter(|id| units[id.index()].is_alive())
            .collect();
        alive.sort_by(|a, b| {
            let ua = &units[a.index()];
            let ub = &units[b.index()];
            ub.hp
                .total_cmp(&ua.hp)
                .then(ub.stamina.total_cmp(&ua.stamina))
                .then(a.cmp(b))
        });

        for (slot_index, id) in alive.iter().enumerate() {
            let (pos, heading) = formation.world_slot(slot_index, anchor, facing);
            let unit = &mut units[id.index()];
            unit.slot_target = Some(pos);
            unit.target_heading = heading;
            unit.transitioning = self.transitioning;
        }
        for id in members {
            let unit = &mut units[id.index()];
            if !unit.is_alive() {
                unit.slot_target = None;
            }
        }
    }
}

/// Speed multiplier in [0, 1] for a unit trying to move along `move_dir`.
///
/// Scans a 90 degree cone out to 2.5x combined radii. An enemy body blocks
/// outright inside `sqrt(enemy_block_area)` of the combined radius and
/// slows movement further out; an ally slows inside its pass-through
/// radius. Transitioning units take only half the slowdown.
pub fn obstruction_factor(units: &[Unit], idx: usize, move_dir: Vec2, cfg: &BattleConfig) -> f32 {
    let me = &units[idx];
    let dir = move_dir.normalize_or_zero();
    if dir == Vec2::ZERO {
        return 1.0;
    }
    let cone_cos = OBSTRUCTION_CONE_HALF_ANGLE.cos();
    let mut factor = 1.0f32;

    for (j, other) in units.iter().enumerate() {
        if j == idx || !other.is_alive() {
            continue;
        }
        let delta = other.pos - me.pos;
        let dist = delta.length();
        let combined = me.radius + other.radius;
        let scan = OBSTRUCTION_SCAN_MULT * combined * 0.5;
        if dist >= scan || dist < 1e-3 {
            continue;
        }
        if delta.dot(dir) / dist < cone_cos {
            continue;
        }

        let f = if other.team != me.team {
            let inner = combined * cfg.enemy_block_area.sqrt();
            if dist <= inner {
                0.0
            } else {
                let t = (dist - inner) / (scan - inner).max(1e-3);
                (1.0 - cfg.enemy_max_slow * (1.0 - t)).max(OBSTRUCTION_MIN_FACTOR)
            }
        } else {
            let inner = combined * cfg.ally_pass_area.sqrt();
            if dist <= inner {
                let t = (dist / inner.max(1e-3)).clamp(0.0, 1.0);
                (1.0 - cfg.ally_max_slow * (1.0 - t)).max(OBSTRUCTION_MIN_FACTOR)
            } else {
                1.0
            }
        };
        factor = factor.min(f);
    }

    if me.transitioning && factor > 0.0 {
        factor = 1.0 - (1.0 - factor) * FORMATION_TRANSITION_SLOWDOWN_REDUCTION;
    }
    factor
}

/// Soft separation between squadmates so a shape can settle without
/// shoving the rest of the battle line around
pub fn resolve_squad_collisions(units: &mut [Unit], members: &[UnitId], pass_through: f32) {
    for _ in 0..SQUAD_COLLISION_ITERATIONS {
        for a in 0..members.len() {
            for b in (a + 1)..members.len() {
                let (ia, ib) = (members[a].index(), members[b].index());
                if !units[ia].is_alive() || !units[ib].is_alive() {
                    continue;
                }
                let delta = units[ib].pos - units[ia].pos;
                let dist = delta.length();
                let min_dist = (units[ia].radius + units[ib].radius) * pass_through;
                if dist >= min_dist || dist < 1e-4 {
                    continue;
                }
                let push = delta / dist * (min_dist - dist) * SQUAD_COLLISION_PUSH * 0.5;
                units[ia].pos -= push;
                units[ib].pos += push;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::formation::FormationKind;
    use crate::battle::stats::{UnitClass, UnitStats};
    use crate::core::types::{SquadId, Team};

    fn make_unit(id: u32, team: Team, pos: Vec2) -> Unit {
        Unit::new(
            UnitId(id),
            SquadId(0),
            team,
            UnitClass::Infantry,
            pos,
            &UnitStats::conscript(),
        )
    }

    fn arena(positions: &[(Team, Vec2)]) -> Vec<Unit> {
        positions
            .iter()
            .enumerate()
            .map(|(i, (team, pos))| make_unit(i as u32, *team, *pos))
            .collect()
    }

    #[test]
    fn test_transition_window_expires() {
        let mut manager = FormationManager::new();
        manager.start_transition();
        assert!(manager.is_transitioning());
        assert_eq!(manager.speed_multiplier(), FORMATION_TRANSITION_SPEED_MULT);
        manager.update(FORMATION_TRANSITION_DURATION + 0.1);
        assert!(!manager.is_transitioning());
        assert_eq!(manager.speed_multiplier(), 1.0);
    }

    #[test]
    fn test_transition_tightens_pass_through() {
        let mut manager = FormationManager::new();
        let relaxed = manager.pass_through_ratio();
        manager.start_transition();
        assert!(manager.pass_through_ratio() < relaxed);
    }

    #[test]
    fn test_strongest_unit_takes_front_slot() {
        let formation = Formation::new(FormationKind::Column, 3, 40.0).unwrap();
        let mut units = arena(&[
            (Team::BLUE, Vec2::ZERO),
            (Team::BLUE, Vec2::new(10.0, 0.0)),
            (Team::BLUE, Vec2::new(20.0, 0.0)),
        ]);
        units[0].hp = 5.0;
        units[2].max_hp = 25.0;
        units[2].hp = 25.0;
        let members = [UnitId(0), UnitId(1), UnitId(2)];
        let manager = FormationManager::new();
        manager.assign_slots(&formation, Vec2::ZERO, 0.0, &members, &mut units);

        // front slot is the one furthest along the facing (+x)
        let front = units[2].slot_target.unwrap();
        for id in [0, 1] {
            assert!(units[id].slot_target.unwrap().x <= front.x + 1e-4);
        }
    }

    #[test]
    fn test_dead_units_lose_their_slot() {
        let formation = Formation::new(FormationKind::Square, 2, 40.0).unwrap();
        let mut units = arena(&[(Team::BLUE, Vec2::ZERO), (Team::BLUE, Vec2::new(10.0, 0.0))]);
        units[1].hp = 0.0;
        let members = [UnitId(0), UnitId(1)];
        FormationManager::new().assign_slots(&formation, Vec2::ZERO, 0.0, &members, &mut units);
        assert!(units[0].slot_target.is_some());
        assert!(units[1].slot_target.is_none());
    }

    #[test]
    fn test_enemy_directly_ahead_blocks() {
        let cfg = BattleConfig::default();
        let units = arena(&[(Team::BLUE, Vec2::ZERO), (Team::RED, Vec2::new(20.0, 0.0))]);
        let factor = obstruction_factor(&units, 0, Vec2::new(1.0, 0.0), &cfg);
        assert_eq!(factor, 0.0);
    }

    #[test]
    fn test_unit_behind_does_not_obstruct() {
        let cfg = BattleConfig::default();
        let units = arena(&[(Team::BLUE, Vec2::ZERO), (Team::RED, Vec2::new(-20.0, 0.0))]);
        let factor = obstruction_factor(&units, 0, Vec2::new(1.0, 0.0), &cfg);
        assert_eq!(factor, 1.0);
    }

    #[test]
    fn test_ally_slows_less_than_enemy() {
        let cfg = BattleConfig::default();
        let with_ally = arena(&[(Team::BLUE, Vec2::ZERO), (Team::BLUE, Vec2::new(20.0, 0.0))]);
        let with_enemy = arena(&[(Team::BLUE, Vec2::ZERO), (Team::RED, Vec2::new(20.0, 0.0))]);
        let ally_factor = obstruction_factor(&with_ally, 0, Vec2::new(1.0, 0.0), &cfg);
        let enemy_factor = obstruction_factor(&with_enemy, 0, Vec2::new(1.0, 0.0), &cfg);
        assert!(ally_factor > enemy_factor);
        assert!(ally_factor >= 1.0 - cfg.ally_max_slow - 1e-4);
    }

    #[test]
    fn test_squad_collision_separates_overlapping_units() {
        let mut units = arena(&[(Team::BLUE, Vec2::ZERO), (Team::BLUE, Vec2::new(4.0, 0.0))]);
        let members = [UnitId(0), UnitId(1)];
        let before = (units[1].pos - units[0].pos).length();
        resolve_squad_collisions(&mut units, &members, SQUAD_PASS_THROUGH_RATIO);
        let after = (units[1].pos - units[0].pos).length();
        assert!(after > before);
    }
}
