//! Individual soldiers and their per-tick state machine
//!
//! A unit is a small bundle of vitals (hp, stamina, morale), combat stats
//! and a current state. States gate what the unit may do this tick:
//! winding up an attack, recovering between swings, holding a defensive
//! posture, or catching its breath. Dead units stay in the arena so every
//! id stays valid; they only drift out any remaining knockback.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::battle::combat;
use crate::battle::constants::*;
use crate::battle::events::{EventKind, EventQueue};
use crate::battle::formation_manager::obstruction_factor;
use crate::battle::stats::{UnitClass, UnitStats};
use crate::core::config::BattleConfig;
use crate::core::types::{SquadId, Team, UnitId};
use rand::rngs::StdRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitState {
    Idle,
    Moving,
    /// Winding up a swing; lands when the timer runs out
    PreAttack,
    /// Too winded to fight, regenerating until safely above the attack cost
    Recover,
    /// Cooldown between actions, with a stamina regen bonus
    Interval,
    Defending,
    Dead,
}

/// What the unit is trying to do, for observers. Purely descriptive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intent {
    None,
    Engage,
    Attack,
    Defend,
    Rest,
}

/// Squad-level marching orders for one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnitOrders {
    /// Fight freely: chase the chosen target
    Fight,
    /// Keep the formation slot; strike only what comes into reach
    Hold,
    /// Fall back along the given direction, no fighting
    Withdraw { dir: Vec2 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub squad: SquadId,
    pub team: Team,
    pub class: UnitClass,

    pub pos: Vec2,
    pub heading: f32,
    pub radius: f32,

    pub max_hp: f32,
    pub hp: f32,
    pub attack: f32,
    pub attack_speed: f32,
    /// Reach in world units (stat range times [`RANGE_SCALE`])
    pub range: f32,
    pub move_speed: f32,
    pub shield: f32,
    pub armor: f32,
    pub max_stamina: f32,
    pub stamina: f32,
    pub max_morale: f32,
    pub morale: f32,
    pub mass: f32,

    pub state: UnitState,
    pub state_timer: f32,
    /// DEFENDING re-evaluation clock, period 1 / attack_speed
    pub defend_timer: f32,
    pub intent: Intent,

    pub target: Option<UnitId>,
    /// Whoever hit us last; preferred when re-targeting
    pub attacker: Option<UnitId>,

    pub slot_target: Option<Vec2>,
    pub target_heading: f32,
    pub transitioning: bool,

    pub knockback_dir: Vec2,
    pub knockback_vel: f32,

    pub is_charging: bool,
    pub charge_bonus_used: bool,
}

impl Unit {
    pub fn new(
        id: UnitId,
        squad: SquadId,
        team: Team,
        class: UnitClass,
        pos: Vec2,
        stats: &UnitStats,
    ) -> Self {
        Self {
            id,
            squad,
            team,
            class,
            pos,
            heading: 0.0,
            radius: UNIT_RADIUS,
            max_hp: stats.hp,
            hp: stats.hp,
            attack: stats.attack,
            attack_speed: stats.attack_speed,
            range: stats.range * RANGE_SCALE,
            move_speed: stats.move_speed,
            shield: stats.shield,
            armor: stats.armor,
            max_stamina: stats.max_stamina,
            stamina: stats.max_stamina,
            max_morale: stats.max_morale,
            morale: stats.max_morale,
            mass: stats.effective_mass(),
            state: UnitState::Idle,
            state_timer: 0.0,
            defend_timer: 0.0,
            intent: Intent::None,
            target: None,
            attacker: None,
            slot_target: None,
            target_heading: 0.0,
            transitioning: false,
            knockback_dir: Vec2::ZERO,
            knockback_vel: 0.0,
            is_charging: false,
            charge_bonus_used: false,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state != UnitState::Dead && self.hp > 0.0
    }

    /// Whether the unit can still react to an incoming attack
    pub fn can_react(&self) -> bool {
        matches!(
            self.state,
            UnitState::Idle | UnitState::Moving | UnitState::Defending
        )
    }

    pub fn hp_ratio(&self) -> f32 {
        if self.max_hp > 0.0 {
            (self.hp / self.max_hp).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn morale_ratio(&self) -> f32 {
        if self.max_morale > 0.0 {
            (self.morale / self.max_morale).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn stamina_ratio(&self) -> f32 {
        if self.max_stamina > 0.0 {
            (self.stamina / self.max_stamina).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn distance_to(&self, other: &Unit) -> f32 {
        (other.pos - self.pos).length()
    }

    pub fn set_state(&mut self, state: UnitState, timer: f32) {
        self.state = state;
        self.state_timer = timer;
    }

    pub fn face(&mut self, point: Vec2) {
        let delta = point - self.pos;
        if delta.length_squared() > 1e-6 {
            self.heading = delta.y.atan2(delta.x);
        }
    }

    pub fn add_morale(&mut self, delta: f32) {
        self.morale = (self.morale + delta).clamp(0.0, self.max_morale);
    }

    pub fn drain_stamina(&mut self, amount: f32) {
        self.stamina = (self.stamina - amount).clamp(0.0, self.max_stamina);
    }

    pub fn take_damage(&mut self, amount: f32) {
        self.hp = (self.hp - amount).clamp(0.0, self.max_hp);
    }

    pub fn die(&mut self) {
        self.state = UnitState::Dead;
        self.state_timer = 0.0;
        self.intent = Intent::None;
        self.target = None;
        self.slot_target = None;
        self.is_charging = false;
    }

    /// Stamina regeneration, boosted while catching breath in INTERVAL
    pub fn regen_stamina(&mut self, dt: f32, cfg: &BattleConfig) {
        let mult = if self.state == UnitState::Interval {
            cfg.interval_stamina_bonus
        } else {
            1.0
        };
        self.stamina = (self.stamina + cfg.stamina_regen * mult * dt).min(self.max_stamina);
    }

    /// Knockback drift: integrate, decay, stop below walking interference
    pub fn integrate_knockback(&mut self, dt: f32, cfg: &BattleConfig) {
        if self.knockback_vel <= 0.0 {
            return;
        }
        self.pos += self.knockback_dir * self.knockback_vel * dt;
        self.knockback_vel *= cfg.knockback_decay;
        if self.knockback_vel < KNOCKBACK_STOP_SPEED {
            self.knockback_vel = 0.0;
        }
    }
}

/// Picks this tick's target for the unit at `idx`, re-validating every
/// remembered id against the arena.
///
/// Priority: the live unit that last hit us; then an enemy already
/// swinging at us; then the nearest enemy nobody else has claimed, with a
/// preference for a weaker one at comparable distance; finally the nearest
/// enemy of any kind.
pub fn select_target(units: &[Unit], idx: usize) -> Option<UnitId> {
    let me = &units[idx];

    if let Some(attacker_id) = me.attacker {
        let attacker = &units[attacker_id.index()];
        if attacker.is_alive() && attacker.team != me.team {
            return Some(attacker_id);
        }
    }

    let mut nearest: Option<(UnitId, f32)> = None;
    let mut nearest_aggressor: Option<(UnitId, f32)> = None;

    let claimed: HashSet<UnitId> = units
        .iter()
        .filter(|u| u.is_alive() && u.id != me.id && u.team == me.team)
        .filter_map(|u| u.target)
        .collect();

    let mut nearest_free: Option<(UnitId, f32)> = None;
    let mut weakest_free: Option<(UnitId, f32, f32)> = None; // id, dist, hp ratio

    for other in units.iter() {
        if !other.is_alive() || other.team == me.team {
            continue;
        }
        let dist = me.distance_to(other);
        if nearest.map_or(true, |(_, d)| dist < d) {
            nearest = Some((other.id, dist));
        }
        if other.target == Some(me.id) && nearest_aggressor.map_or(true, |(_, d)| dist < d) {
            nearest_aggressor = Some((other.id, dist));
        }
        if !claimed.contains(&other.id) {
            if nearest_free.map_or(true, |(_, d)| dist < d) {
                nearest_free = Some((other.id, dist));
            }
            let ratio = other.hp_ratio();
            if weakest_free.map_or(true, |(_, _, r)| ratio < r) {
                weakest_free = Some((other.id, dist, ratio));
            }
        }
    }

    if let Some((id, _)) = nearest_aggressor {
        return Some(id);
    }
    if let (Some((free_id, free_dist)), Some((weak_id, weak_dist, _))) =
        (nearest_free, weakest_free)
    {
        // finish off a weakened enemy if it is not much further away
        if weak_dist <= free_dist * 1.5 {
            return Some(weak_id);
        }
        return Some(free_id);
    }
    nearest.map(|(id, _)| id)
}

/// Advances one unit by one tick under the squad's orders.
///
/// Order of operations matters: death first, then knockback drift, then
/// regen, then the state machine. A unit at zero hp acts on nothing this
/// tick and never again.
#[allow(clippy::too_many_arguments)]
pub fn update_unit(
    units: &mut [Unit],
    idx: usize,
    orders: UnitOrders,
    dt: f32,
    cfg: &BattleConfig,
    rng: &mut StdRng,
    events: &mut EventQueue,
) {
    if units[idx].state == UnitState::Dead {
        units[idx].integrate_knockback(dt, cfg);
        return;
    }
    if units[idx].hp <= 0.0 {
        let killer = units[idx].attacker;
        units[idx].die();
        events.push(EventKind::UnitDied {
            unit: units[idx].id,
            killer,
        });
        units[idx].integrate_knockback(dt, cfg);
        return;
    }

    units[idx].integrate_knockback(dt, cfg);
    units[idx].regen_stamina(dt, cfg);

    if let UnitOrders::Withdraw { dir } = orders {
        withdraw(units, idx, dir, dt, cfg);
        return;
    }

    let target = select_target(units, idx);
    units[idx].target = target;

    let Some(target_id) = target else {
        // nobody left to fight: settle into the slot if we have one
        if units[idx].state_timer > 0.0 {
            units[idx].state_timer -= dt;
            return;
        }
        units[idx].intent = Intent::None;
        move_to_slot(units, idx, dt, cfg);
        return;
    };
    let tj = target_id.index();
    let target_pos = units[tj].pos;
    units[idx].face(target_pos);

    // ---- timed states ----
    if units[idx].state_timer > 0.0 {
        units[idx].state_timer -= dt;

        if units[idx].state == UnitState::PreAttack {
            pre_attack_drift(units, idx, tj, dt, cfg);
        }

        if units[idx].state_timer <= 0.0 {
            match units[idx].state {
                UnitState::Interval | UnitState::Defending => {
                    combat::decide_next_action(units, idx, tj, cfg, rng);
                }
                UnitState::PreAttack => {
                    combat::execute_attack(units, idx, tj, cfg, rng, events);
                }
                _ => {}
            }
        } else if units[idx].state == UnitState::Defending {
            defending_reevaluation(units, idx, tj, dt, cfg, rng);
        }
        return;
    }

    match units[idx].state {
        UnitState::Recover => {
            units[idx].intent = Intent::Rest;
            if units[idx].stamina >= cfg.attack_cost + RECOVER_STAMINA_MARGIN {
                units[idx].set_state(UnitState::Idle, 0.0);
            }
        }
        UnitState::Idle | UnitState::Moving => {
            if units[idx].knockback_vel > 0.0 {
                return;
            }
            let dist = (target_pos - units[idx].pos).length();
            if dist <= units[idx].range {
                if units[idx].stamina < cfg.attack_cost {
                    events.push(EventKind::Exhausted {
                        unit: units[idx].id,
                    });
                    units[idx].intent = Intent::Rest;
                    units[idx].set_state(UnitState::Recover, 0.0);
                } else {
                    units[idx].intent = Intent::Attack;
                    units[idx].set_state(UnitState::PreAttack, cfg.pre_delay);
                }
            } else {
                match orders {
                    UnitOrders::Fight => chase(units, idx, target_pos, dt, cfg),
                    _ => move_to_slot(units, idx, dt, cfg),
                }
            }
        }
        _ => {}
    }
}

/// Closing on an engaged enemy: overspeed, paying stamina for the sprint
fn chase(units: &mut [Unit], idx: usize, dest: Vec2, dt: f32, cfg: &BattleConfig) {
    let dir = dest - units[idx].pos;
    let factor = obstruction_factor(units, idx, dir, cfg);
    let unit = &mut units[idx];
    unit.intent = Intent::Engage;
    unit.state = UnitState::Moving;
    let speed = unit.move_speed * cfg.move_mult * factor;
    step_toward(unit, dest, speed * dt);
    unit.drain_stamina((cfg.move_mult - 1.0) * cfg.stamina_regen * dt);
}

/// Walking back into formation at normal speed (transition bonus applies)
fn move_to_slot(units: &mut [Unit], idx: usize, dt: f32, cfg: &BattleConfig) {
    let Some(slot) = units[idx].slot_target else {
        units[idx].state = UnitState::Idle;
        return;
    };
    let delta = slot - units[idx].pos;
    if delta.length() < 1.0 {
        let unit = &mut units[idx];
        unit.state = UnitState::Idle;
        unit.heading = unit.target_heading;
        return;
    }
    let factor = obstruction_factor(units, idx, delta, cfg);
    let trans = if units[idx].transitioning {
        FORMATION_TRANSITION_SPEED_MULT
    } else {
        1.0
    };
    let unit = &mut units[idx];
    unit.state = UnitState::Moving;
    unit.face(slot);
    let speed = unit.move_speed * trans * factor;
    step_toward(unit, slot, speed * dt);
}

fn withdraw(units: &mut [Unit], idx: usize, dir: Vec2, dt: f32, cfg: &BattleConfig) {
    let dir = dir.normalize_or_zero();
    if dir == Vec2::ZERO {
        return;
    }
    let factor = obstruction_factor(units, idx, dir, cfg);
    let unit = &mut units[idx];
    unit.intent = Intent::None;
    unit.target = None;
    if unit.state != UnitState::Recover {
        unit.state = UnitState::Moving;
    }
    unit.heading = dir.y.atan2(dir.x);
    unit.pos += dir * unit.move_speed * factor * dt;
}

/// Keeps a winding-up attacker in touch with a target that is drifting
/// out of reach, at half speed and proportional stamina cost
fn pre_attack_drift(units: &mut [Unit], idx: usize, tj: usize, dt: f32, cfg: &BattleConfig) {
    if units[idx].knockback_vel > 0.0 {
        return;
    }
    let target_pos = units[tj].pos;
    let dist = (target_pos - units[idx].pos).length();
    if dist <= units[idx].range * PRE_ATTACK_DRIFT_RANGE_RATIO {
        return;
    }
    let dir = target_pos - units[idx].pos;
    let factor = obstruction_factor(units, idx, dir, cfg);
    let unit = &mut units[idx];
    let speed = unit.move_speed * PRE_ATTACK_ADVANCE_SPEED_RATIO * factor;
    step_toward(unit, target_pos, speed * dt);
    unit.drain_stamina(speed / unit.move_speed.max(1e-3) * cfg.stamina_regen * dt);
}

/// A defender periodically re-rolls the attack-vs-defend decision instead
/// of waiting out the whole posture
fn defending_reevaluation(
    units: &mut [Unit],
    idx: usize,
    tj: usize,
    dt: f32,
    cfg: &BattleConfig,
    rng: &mut StdRng,
) {
    units[idx].defend_timer -= dt;
    if units[idx].defend_timer > 0.0 {
        return;
    }
    units[idx].defend_timer = 1.0 / units[idx].attack_speed.max(1e-3);
    combat::decide_next_action(units, idx, tj, cfg, rng);
}

fn step_toward(unit: &mut Unit, dest: Vec2, max_step: f32) {
    let delta = dest - unit.pos;
    let dist = delta.length();
    if dist <= max_step || dist < 1e-4 {
        unit.pos = dest;
    } else {
        unit.pos += delta / dist * max_step;
    }
}
