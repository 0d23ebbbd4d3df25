//! Battle state and the fixed-order tick driver
//!
//! One tick runs in four phases: squads (commander decisions, anchor
//! movement, slot upkeep, charge timers) against a frozen snapshot of the
//! previous tick, then every unit, then the global collision pass, then
//! the termination check. Phase order is part of the contract: squad
//! decisions never see mid-tick unit state.

use glam::Vec2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::battle::constants::*;
use crate::battle::events::{BattleEvent, EventKind, EventQueue};
use crate::battle::formation::{Formation, FormationKind};
use crate::battle::squad::{Squad, SquadInfo};
use crate::battle::squad_ai::{SquadState, Tactic};
use crate::battle::stats::{UnitClass, UnitStats};
use crate::battle::unit::{update_unit, Intent, Unit, UnitOrders, UnitState};
use crate::core::config::BattleConfig;
use crate::core::error::{Result, SimError};
use crate::core::types::{SquadId, Team, Tick, UnitId};

/// Everything needed to field one squad
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquadSpawn {
    pub team: Team,
    pub class: UnitClass,
    pub formation: FormationKind,
    pub unit_count: usize,
    pub spacing: f32,
    pub stats: UnitStats,
    pub anchor: Vec2,
    pub facing: f32,
}

/// Render-facing view of one unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub id: UnitId,
    pub squad: SquadId,
    pub team: Team,
    pub pos: Vec2,
    pub heading: f32,
    pub state: UnitState,
    pub intent: Intent,
    pub hp: f32,
    pub max_hp: f32,
    pub stamina: f32,
    pub max_stamina: f32,
    pub morale: f32,
    pub max_morale: f32,
    pub is_charging: bool,
}

/// Render-facing view of one squad: world slots plus commander status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquadOverlay {
    pub id: SquadId,
    pub team: Team,
    pub state: SquadState,
    pub tactic: Tactic,
    pub transitioning: bool,
    pub charging: bool,
    pub collapse: f32,
    pub slots: Vec<(Vec2, f32)>,
}

#[derive(Debug)]
pub struct BattleState {
    pub config: BattleConfig,
    units: Vec<Unit>,
    squads: Vec<Squad>,
    rng: StdRng,
    events: EventQueue,
    tick: Tick,
    elapsed: f32,
    eliminated: Vec<Team>,
    finished: bool,
    winner: Option<Team>,
}

impl BattleState {
    pub fn new(config: BattleConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            units: Vec::new(),
            squads: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            events: EventQueue::new(),
            tick: 0,
            elapsed: 0.0,
            eliminated: Vec::new(),
            finished: false,
            winner: None,
        })
    }

    /// Fields a squad, spawning its units on their formation slots
    pub fn add_squad(&mut self, spawn: SquadSpawn) -> Result<SquadId> {
        let formation = Formation::new(spawn.formation, spawn.unit_count, spawn.spacing)?;
        let squad_id = SquadId(self.squads.len() as u32);
        let mut members = Vec::with_capacity(spawn.unit_count);
        for slot_index in 0..spawn.unit_count {
            let id = UnitId(self.units.len() as u32);
            let (pos, heading) = formation.world_slot(slot_index, spawn.anchor, spawn.facing);
            let mut unit = Unit::new(id, squad_id, spawn.team, spawn.class, pos, &spawn.stats);
            unit.heading = heading;
            unit.target_heading = heading;
            unit.slot_target = Some(pos);
            members.push(id);
            self.units.push(unit);
        }
        self.squads.push(Squad::new(
            squad_id,
            spawn.team,
            spawn.class,
            formation,
            spawn.anchor,
            spawn.facing,
            members,
        ));
        debug!(squad = squad_id.0, team = spawn.team.0, count = spawn.unit_count, "squad fielded");
        Ok(squad_id)
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn squads(&self) -> &[Squad] {
        &self.squads
    }

    pub fn unit(&self, id: UnitId) -> Result<&Unit> {
        self.units.get(id.index()).ok_or(SimError::UnknownUnit(id))
    }

    pub fn squad(&self, id: SquadId) -> Result<&Squad> {
        self.squads
            .get(id.index())
            .ok_or(SimError::UnknownSquad(id))
    }

    pub fn squad_mut(&mut self, id: SquadId) -> Result<&mut Squad> {
        self.squads
            .get_mut(id.index())
            .ok_or(SimError::UnknownSquad(id))
    }

    /// Re-forms a squad into a new shape, opening its transition window
    pub fn change_formation(&mut self, id: SquadId, kind: FormationKind) -> Result<()> {
        let squad = self
            .squads
            .get_mut(id.index())
            .ok_or(SimError::UnknownSquad(id))?;
        squad.change_formation(kind, &mut self.events)
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn winner(&self) -> Option<Team> {
        self.winner
    }

    /// Hands over everything that happened since the last drain
    pub fn drain_events(&mut self) -> Vec<BattleEvent> {
        self.events.drain()
    }

    /// Advances the battle by one tick. Oversized steps (debugger pauses,
    /// dropped frames) are clamped so physics stays stable.
    pub fn run_tick(&mut self, dt: f32) {
        if self.finished {
            return;
        }
        let dt = dt.min(MAX_TICK_DT);
        if dt <= 0.0 {
            return;
        }
        self.tick += 1;
        self.elapsed += dt;
        self.events.set_tick(self.tick);

        // phase 1: squads, against last tick's aggregates
        let infos: Vec<SquadInfo> = self.squads.iter().map(|s| s.info(&self.units)).collect();
        for squad in &mut self.squads {
            squad.update(dt, &infos, &mut self.units, &mut self.rng, &mut self.events);
        }

        // phase 2: units
        let orders: Vec<UnitOrders> = self
            .units
            .iter()
            .map(|u| self.squads[u.squad.index()].orders())
            .collect();
        for idx in 0..self.units.len() {
            update_unit(
                &mut self.units,
                idx,
                orders[idx],
                dt,
                &self.config,
                &mut self.rng,
                &mut self.events,
            );
        }

        // phase 3: separation
        resolve_collisions(&mut self.units, &self.config);

        // phase 4: termination
        self.check_termination();
    }

    fn check_termination(&mut self) {
        let mut teams: Vec<Team> = self.squads.iter().map(|s| s.team).collect();
        teams.sort();
        teams.dedup();
        if teams.len() < 2 {
            return;
        }

        let mut survivors = Vec::new();
        for team in &teams {
            let alive = self
                .units
                .iter()
                .any(|u| u.team == *team && u.is_alive());
            if alive {
                survivors.push(*team);
            } else if !self.eliminated.contains(team) {
                self.eliminated.push(*team);
                debug!(team = team.0, "team eliminated");
                self.events.push(EventKind::TeamEliminated { team: *team });
            }
        }

        if survivors.len() <= 1 {
            self.finished = true;
            self.winner = survivors.first().copied();
            debug!(winner = ?self.winner, tick = self.tick, "battle over");
            self.events.push(EventKind::BattleEnded {
                winner: self.winner,
            });
        }
    }

    pub fn unit_snapshots(&self) -> Vec<UnitSnapshot> {
        self.units
            .iter()
            .map(|u| UnitSnapshot {
                id: u.id,
                squad: u.squad,
                team: u.team,
                pos: u.pos,
                heading: u.heading,
                state: u.state,
                intent: u.intent,
                hp: u.hp,
                max_hp: u.max_hp,
                stamina: u.stamina,
                max_stamina: u.max_stamina,
                morale: u.morale,
                max_morale: u.max_morale,
                is_charging: u.is_charging,
            })
            .collect()
    }

    pub fn squad_overlays(&self) -> Vec<SquadOverlay> {
        self.squads
            .iter()
            .map(|s| SquadOverlay {
                id: s.id,
                team: s.team,
                state: s.ai.state,
                tactic: s.ai.tactic,
                transitioning: s.manager.is_transitioning(),
                charging: s.charge.is_active(),
                collapse: s.collapse(&self.units),
                slots: (0..s.members.len())
                    .map(|i| s.formation.world_slot(i, s.anchor, s.facing))
                    .collect(),
            })
            .collect()
    }
}

/// Pairwise mass-weighted separation. Units being flung by knockback are
/// left alone so a big hit reads as a big hit.
fn resolve_collisions(units: &mut [Unit], cfg: &BattleConfig) {
    for _ in 0..COLLISION_ITERATIONS {
        for i in 0..units.len() {
            if !units[i].is_alive() || units[i].knockback_vel > cfg.knockback_collision_threshold {
                continue;
            }
            for j in (i + 1)..units.len() {
                if !units[j].is_alive()
                    || units[j].knockback_vel > cfg.knockback_collision_threshold
                {
                    continue;
                }
                let delta = units[j].pos - units[i].pos;
                let dist = delta.length();
                let min_dist = units[i].radius + units[j].radius;
                if dist >= min_dist {
                    continue;
                }
                // coincident centers get a fixed separation axis
                let axis = if dist < 1e-4 { Vec2::X } else { delta / dist };
                let overlap = min_dist - dist;
                let total_mass = units[i].mass + units[j].mass;
                let push_i = overlap * 0.5 * (units[j].mass / total_mass);
                let push_j = overlap * 0.5 * (units[i].mass / total_mass);
                units[i].pos -= axis * push_i;
                units[j].pos += axis * push_j;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn(team: Team, x: f32, facing: f32, count: usize) -> SquadSpawn {
        SquadSpawn {
            team,
            class: UnitClass::Infantry,
            formation: FormationKind::Square,
            unit_count: count,
            spacing: 40.0,
            stats: UnitStats::light_infantry(),
            anchor: Vec2::new(x, 0.0),
            facing,
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = BattleConfig::default();
        config.knockback_decay = 2.0;
        assert!(BattleState::new(config, 1).is_err());
    }

    #[test]
    fn test_add_squad_spawns_on_slots() {
        let mut battle = BattleState::new(BattleConfig::default(), 1).unwrap();
        let id = battle.add_squad(spawn(Team::BLUE, 0.0, 0.0, 6)).unwrap();
        assert_eq!(battle.units().len(), 6);
        let squad = battle.squad(id).unwrap();
        for member in &squad.members {
            let unit = battle.unit(*member).unwrap();
            assert_eq!(unit.squad, id);
            assert_eq!(Some(unit.pos), unit.slot_target);
        }
    }

    #[test]
    fn test_unknown_ids_error() {
        let battle = BattleState::new(BattleConfig::default(), 1).unwrap();
        assert!(battle.unit(UnitId(0)).is_err());
        assert!(battle.squad(SquadId(3)).is_err());
    }

    #[test]
    fn test_dt_is_clamped() {
        let mut battle = BattleState::new(BattleConfig::default(), 1).unwrap();
        battle.add_squad(spawn(Team::BLUE, 0.0, 0.0, 2)).unwrap();
        battle.add_squad(spawn(Team::RED, 400.0, std::f32::consts::PI, 2)).unwrap();
        battle.run_tick(5.0);
        assert!((battle.elapsed() - MAX_TICK_DT).abs() < 1e-6);
    }

    #[test]
    fn test_single_team_never_terminates() {
        let mut battle = BattleState::new(BattleConfig::default(), 1).unwrap();
        battle.add_squad(spawn(Team::BLUE, 0.0, 0.0, 4)).unwrap();
        for _ in 0..100 {
            battle.run_tick(0.05);
        }
        assert!(!battle.is_finished());
    }

    #[test]
    fn test_collision_pass_never_swaps_sides() {
        let cfg = BattleConfig::default();
        let mut units = vec![
            Unit::new(
                UnitId(0),
                SquadId(0),
                Team::BLUE,
                UnitClass::Infantry,
                Vec2::new(0.0, 0.0),
                &UnitStats::conscript(),
            ),
            Unit::new(
                UnitId(1),
                SquadId(1),
                Team::RED,
                UnitClass::Infantry,
                Vec2::new(3.0, 0.0),
                &UnitStats::heavy_infantry(),
            ),
        ];
        resolve_collisions(&mut units, &cfg);
        assert!(units[0].pos.x < units[1].pos.x);
        // separation grew
        assert!((units[1].pos - units[0].pos).length() > 3.0);
    }

    #[test]
    fn test_collision_mass_weighting() {
        let cfg = BattleConfig::default();
        let mut units = vec![
            Unit::new(
                UnitId(0),
                SquadId(0),
                Team::BLUE,
                UnitClass::Infantry,
                Vec2::new(0.0, 0.0),
                &UnitStats::conscript(), // mass 11
            ),
            Unit::new(
                UnitId(1),
                SquadId(1),
                Team::RED,
                UnitClass::Cavalry,
                Vec2::new(10.0, 0.0),
                &UnitStats::cavalry(), // mass 45
            ),
        ];
        resolve_collisions(&mut units, &cfg);
        // the light unit gives more ground
        assert!(units[0].pos.x.abs() > (units[1].pos.x - 10.0).abs());
    }

    #[test]
    fn test_knocked_back_units_skip_separation() {
        let cfg = BattleConfig::default();
        let mut units = vec![
            Unit::new(
                UnitId(0),
                SquadId(0),
                Team::BLUE,
                UnitClass::Infantry,
                Vec2::new(0.0, 0.0),
                &UnitStats::conscript(),
            ),
            Unit::new(
                UnitId(1),
                SquadId(1),
                Team::RED,
                UnitClass::Infantry,
                Vec2::new(3.0, 0.0),
                &UnitStats::conscript(),
            ),
        ];
        units[0].knockback_vel = cfg.knockback_collision_threshold + 1.0;
        let before = (units[0].pos, units[1].pos);
        resolve_collisions(&mut units, &cfg);
        assert_eq!((units[0].pos, units[1].pos), before);
    }

    #[test]
    fn test_close_battle_runs_to_elimination() {
        let mut battle = BattleState::new(BattleConfig::default(), 42).unwrap();
        battle.add_squad(spawn(Team::BLUE, 0.0, 0.0, 5)).unwrap();
        let red = SquadSpawn {
            stats: UnitStats::conscript(),
            ..spawn(Team::RED, 250.0, std::f32::consts::PI, 3)
        };
        battle.add_squad(red).unwrap();

        for _ in 0..120_000 {
            battle.run_tick(0.05);
            if battle.is_finished() {
                break;
            }
        }
        assert!(battle.is_finished(), "battle should resolve");
        let events = battle.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(e.kind, EventKind::BattleEnded { .. })));
        if let Some(winner) = battle.winner() {
            assert!(battle
                .units()
                .iter()
                .filter(|u| u.team != winner)
                .all(|u| !u.is_alive()));
        }
    }

    #[test]
    fn test_dead_stay_dead() {
        let mut battle = BattleState::new(BattleConfig::default(), 7).unwrap();
        battle.add_squad(spawn(Team::BLUE, 0.0, 0.0, 3)).unwrap();
        battle.add_squad(spawn(Team::RED, 150.0, std::f32::consts::PI, 3)).unwrap();
        let mut died: Vec<UnitId> = Vec::new();
        for _ in 0..4000 {
            battle.run_tick(0.05);
            for id in &died {
                assert_eq!(battle.unit(*id).unwrap().state, UnitState::Dead);
            }
            for event in battle.drain_events() {
                if let EventKind::UnitDied { unit, .. } = event.kind {
                    died.push(unit);
                }
            }
            if battle.is_finished() {
                break;
            }
        }
        assert!(!died.is_empty(), "somebody should have fallen");
    }

    #[test]
    fn test_finished_battle_ignores_ticks() {
        let mut battle = BattleState::new(BattleConfig::default(), 7).unwrap();
        battle.add_squad(spawn(Team::BLUE, 0.0, 0.0, 4)).unwrap();
        battle.add_squad(spawn(Team::RED, 150.0, std::f32::consts::PI, 1)).unwrap();
        for _ in 0..120_000 {
            battle.run_tick(0.05);
            if battle.is_finished() {
                break;
            }
        }
        assert!(battle.is_finished());
        let tick = battle.tick();
        battle.run_tick(0.05);
        assert_eq!(battle.tick(), tick);
    }

    #[test]
    fn test_snapshots_cover_every_unit() {
        let mut battle = BattleState::new(BattleConfig::default(), 1).unwrap();
        battle.add_squad(spawn(Team::BLUE, 0.0, 0.0, 4)).unwrap();
        battle.add_squad(spawn(Team::RED, 500.0, std::f32::consts::PI, 6)).unwrap();
        battle.run_tick(0.05);
        let snapshots = battle.unit_snapshots();
        assert_eq!(snapshots.len(), 10);
        let overlays = battle.squad_overlays();
        assert_eq!(overlays.len(), 2);
        assert_eq!(overlays[0].slots.len(), 4);
    }
}
