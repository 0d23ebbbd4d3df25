//! Squads: unit ownership, derived aggregates and the per-tick squad update
//!
//! A squad owns its member ids (the units themselves live in the battle's
//! arena), a formation, a formation manager, a commander and a charge
//! system. Destroyed squads stay in place with their dead so ids never
//! dangle.

use glam::Vec2;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::battle::charge::ChargeSystem;
use crate::battle::constants::*;
use crate::battle::events::{EventKind, EventQueue};
use crate::battle::formation::{Formation, FormationKind};
use crate::battle::formation_manager::{resolve_squad_collisions, FormationManager};
use crate::battle::squad_ai::{SquadAi, SquadState, Tactic};
use crate::battle::stats::UnitClass;
use crate::battle::unit::{Unit, UnitOrders};
use crate::core::error::Result;
use crate::core::types::{SquadId, Team, UnitId};

/// Aggregate snapshot of a squad, derived on demand from living members.
/// All squads read the same frozen set of these each tick, so decision
/// order between squads does not matter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquadInfo {
    pub id: SquadId,
    pub team: Team,
    pub alive: usize,
    pub destroyed: bool,
    pub centroid: Vec2,
    /// Centroid pushed to the leading edge along the squad facing
    pub front_center: Vec2,
    /// Morale points, for condition comparisons between squads
    pub avg_morale: f32,
    pub avg_morale_ratio: f32,
    pub avg_stamina: f32,
    pub avg_stamina_ratio: f32,
    pub avg_attack: f32,
    pub avg_move_speed: f32,
    /// Mean weapon reach of living members, in world units
    pub combat_range: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Squad {
    pub id: SquadId,
    pub team: Team,
    pub class: UnitClass,
    pub anchor: Vec2,
    pub facing: f32,
    pub members: Vec<UnitId>,
    pub formation: Formation,
    pub manager: FormationManager,
    pub ai: SquadAi,
    pub charge: ChargeSystem,
    retreat_dir: Vec2,
}

impl Squad {
    pub fn new(
        id: SquadId,
        team: Team,
        class: UnitClass,
        formation: Formation,
        anchor: Vec2,
        facing: f32,
        members: Vec<UnitId>,
    ) -> Self {
        Self {
            id,
            team,
            class,
            anchor,
            facing,
            members,
            formation,
            manager: FormationManager::new(),
            ai: SquadAi::new(),
            charge: ChargeSystem::new(),
            retreat_dir: Vec2::ZERO,
        }
    }

    pub fn alive_count(&self, units: &[Unit]) -> usize {
        self.members
            .iter()
            .filter(|id| units[id.index()].is_alive())
            .count()
    }

    pub fn is_destroyed(&self, units: &[Unit]) -> bool {
        self.alive_count(units) == 0
    }

    /// Swaps the formation shape, opening a transition window
    pub fn change_formation(
        &mut self,
        kind: FormationKind,
        events: &mut EventQueue,
    ) -> Result<()> {
        self.formation = Formation::new(kind, self.members.len(), self.formation.spacing)?;
        self.manager.start_transition();
        events.push(EventKind::FormationChanged {
            squad: self.id,
            kind,
        });
        Ok(())
    }

    pub fn info(&self, units: &[Unit]) -> SquadInfo {
        let alive: Vec<&Unit> = self
            .members
            .iter()
            .map(|id| &units[id.index()])
            .filter(|u| u.is_alive())
            .collect();
        let n = alive.len();
        if n == 0 {
            return SquadInfo {
                id: self.id,
                team: self.team,
                alive: 0,
                destroyed: true,
                centroid: self.anchor,
                front_center: self.anchor,
                avg_morale: 0.0,
                avg_morale_ratio: 0.0,
                avg_stamina: 0.0,
                avg_stamina_ratio: 0.0,
                avg_attack: 0.0,
                avg_move_speed: 0.0,
                combat_range: 0.0,
            };
        }
        let nf = n as f32;
        let centroid = alive.iter().map(|u| u.pos).fold(Vec2::ZERO, |a, p| a + p) / nf;
        let forward = Vec2::new(self.facing.cos(), self.facing.sin());
        let lead = alive
            .iter()
            .map(|u| (u.pos - centroid).dot(forward))
            .fold(0.0f32, f32::max);
        SquadInfo {
            id: self.id,
            team: self.team,
            alive: n,
            destroyed: false,
            centroid,
            front_center: centroid + forward * lead,
            avg_morale: alive.iter().map(|u| u.morale).sum::<f32>() / nf,
            avg_morale_ratio: alive.iter().map(|u| u.morale_ratio()).sum::<f32>() / nf,
            avg_stamina: alive.iter().map(|u| u.stamina).sum::<f32>() / nf,
            avg_stamina_ratio: alive.iter().map(|u| u.stamina_ratio()).sum::<f32>() / nf,
            avg_attack: alive.iter().map(|u| u.attack).sum::<f32>() / nf,
            avg_move_speed: alive.iter().map(|u| u.move_speed).sum::<f32>() / nf,
            combat_range: alive.iter().map(|u| u.range).sum::<f32>() / nf,
        }
    }

    /// Radius of the smallest circle around the centroid that contains
    /// every living member
    pub fn bounding_radius(&self, units: &[Unit]) -> f32 {
        let alive: Vec<&Unit> = self
            .members
            .iter()
            .map(|id| &units[id.index()])
            .filter(|u| u.is_alive())
            .collect();
        if alive.is_empty() {
            return 0.0;
        }
        let centroid = alive.iter().map(|u| u.pos).fold(Vec2::ZERO, |a, p| a + p)
            / alive.len() as f32;
        alive
            .iter()
            .map(|u| (u.pos - centroid).length() + u.radius)
            .fold(0.0f32, f32::max)
    }

    /// How far the squad has smeared out of formation, 0 (tight) to 1
    /// (fully scattered)
    pub fn collapse(&self, units: &[Unit]) -> f32 {
        let alive: Vec<&Unit> = self
            .members
            .iter()
            .map(|id| &units[id.index()])
            .filter(|u| u.is_alive())
            .collect();
        if alive.is_empty() {
            return 0.0;
        }
        let max_dist = self.formation.width * FORMATION_COLLAPSE_MAX_DIST_MULT;
        if max_dist < 1e-3 {
            return 0.0;
        }
        let centroid = alive.iter().map(|u| u.pos).fold(Vec2::ZERO, |a, p| a + p)
            / alive.len() as f32;
        let avg_dist = alive
            .iter()
            .map(|u| (u.pos - centroid).length())
            .sum::<f32>()
            / alive.len() as f32;
        (avg_dist / max_dist).clamp(0.0, 1.0)
    }

    /// Marching orders for this tick, derived from the commander
    pub fn orders(&self) -> UnitOrders {
        match self.ai.state {
            SquadState::Routing | SquadState::Retreating => UnitOrders::Withdraw {
                dir: self.retreat_dir,
            },
            SquadState::Moving | SquadState::Reorganizing | SquadState::Defending => {
                UnitOrders::Hold
            }
            SquadState::Engaging => UnitOrders::Fight,
            SquadState::InCombat => match self.ai.tactic {
                Tactic::ForcedAttack | Tactic::FreeAttack | Tactic::FormationAttack => {
                    UnitOrders::Fight
                }
                Tactic::StandGround => UnitOrders::Hold,
                Tactic::Receding | Tactic::FallBack => UnitOrders::Withdraw {
                    dir: self.retreat_dir,
                },
            },
        }
    }

    /// One squad tick: commander, anchor movement, slot upkeep, charge
    /// timers and intra-squad separation. Unit combat happens later, in
    /// the unit pass.
    pub fn update(
        &mut self,
        dt: f32,
        infos: &[SquadInfo],
        units: &mut [Unit],
        rng: &mut StdRng,
        events: &mut EventQueue,
    ) {
        let Some(me) = infos.iter().find(|i| i.id == self.id) else {
            return;
        };
        if me.destroyed {
            return;
        }

        let collapse = self.collapse(units);
        let charge_ready = self.charge.can_start(
            &self.formation,
            self.class,
            me.avg_morale_ratio,
            self.ai.in_combat,
        );
        let decision = self.ai.update(
            dt,
            self.id,
            me,
            infos,
            collapse,
            charge_ready,
            rng,
            events,
        );

        if decision.apply_collapse_penalty {
            let penalty = me.avg_morale * COLLAPSE_MORALE_PENALTY;
            for id in &self.members {
                let unit = &mut units[id.index()];
                if unit.is_alive() {
                    unit.add_morale(-penalty);
                }
            }
        }
        if decision.entered == Some(SquadState::Reorganizing) {
            // rally where the troops actually are
            self.anchor = me.centroid;
            self.manager.start_transition();
        }

        let enemy = self
            .ai
            .target_squad
            .and_then(|id| infos.iter().find(|i| i.id == id));
        self.steer(dt, me, enemy);

        self.manager.update(dt);
        self.manager.assign_slots(
            &self.formation,
            self.anchor,
            self.facing,
            &self.members,
            units,
        );

        if decision.trigger_charge {
            self.trigger_charge(units, events);
        }
        if self.charge.update(dt, units, &self.members) {
            events.push(EventKind::ChargeEnded { squad: self.id });
        }

        resolve_squad_collisions(units, &self.members, self.manager.pass_through_ratio());
    }

    /// Anchor movement and facing per commander state
    fn steer(&mut self, dt: f32, me: &SquadInfo, enemy: Option<&SquadInfo>) {
        let Some(enemy) = enemy else {
            return;
        };
        let to_enemy = enemy.centroid - self.anchor;
        if to_enemy.length_squared() > 1e-4 {
            match self.ai.state {
                SquadState::Routing => {
                    self.facing = (-to_enemy).y.atan2((-to_enemy).x);
                }
                _ => {
                    self.facing = to_enemy.y.atan2(to_enemy.x);
                }
            }
        }

        match self.ai.state {
            SquadState::Moving | SquadState::Engaging => {
                if !self.ai.in_combat {
                    let dir = to_enemy.normalize_or_zero();
                    self.anchor += dir * me.avg_move_speed * dt;
                }
            }
            SquadState::Retreating | SquadState::Routing => {
                self.retreat_dir = -to_enemy.normalize_or_zero();
                self.anchor += self.retreat_dir * me.avg_move_speed * dt;
            }
            SquadState::InCombat if matches!(self.ai.tactic, Tactic::Receding | Tactic::FallBack) => {
                self.retreat_dir = -to_enemy.normalize_or_zero();
            }
            _ => {}
        }
    }

    /// Rigid re-snap into the (already assigned) slots, everyone pointed
    /// with the squad, bonuses armed
    fn trigger_charge(&mut self, units: &mut [Unit], events: &mut EventQueue) {
        self.charge.start(units, &self.members);
        for id in &self.members {
            let unit = &mut units[id.index()];
            if !unit.is_alive() {
                continue;
            }
            if let Some(slot) = unit.slot_target {
                unit.pos = slot;
            }
            unit.heading = self.facing;
        }
        self.manager.start_transition();
        events.push(EventKind::ChargeStarted { squad: self.id });
    }
}
