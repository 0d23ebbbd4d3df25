//! Squad commander: a state machine over aggregate unit condition
//!
//! The commander works off cached battlefield information refreshed once a
//! second and re-rolls its tactical decision every two seconds, so squads
//! react with a human-ish delay instead of instantly tracking every hp bar.
//! Routing is the one exception: morale collapse is checked every tick and
//! overrides everything.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::battle::constants::*;
use crate::battle::events::{EventKind, EventQueue};
use crate::battle::squad::SquadInfo;
use crate::core::types::SquadId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SquadState {
    /// Advancing toward the enemy
    Moving,
    /// Close enough to commit; the charge window
    Engaging,
    InCombat,
    /// Outmatched: weapons up, ground held
    Defending,
    /// Deliberate, ordered withdrawal
    Retreating,
    /// Rallying and reforming out of contact
    Reorganizing,
    /// Morale broke; running, not fighting
    Routing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tactic {
    /// Everyone attacks, no defensive re-decisions
    ForcedAttack,
    /// Default melee: individual target choice
    FreeAttack,
    /// Fight while holding slots
    FormationAttack,
    StandGround,
    /// Give ground slowly while fighting
    Receding,
    FallBack,
}

const TACTICS: [Tactic; 6] = [
    Tactic::ForcedAttack,
    Tactic::FreeAttack,
    Tactic::FormationAttack,
    Tactic::StandGround,
    Tactic::Receding,
    Tactic::FallBack,
];
const TACTIC_BASE_WEIGHTS: [f32; 6] = [0.2, 0.4, 0.2, 0.1, 0.05, 0.05];

/// What the owning squad should do this tick beyond routine updates
#[derive(Debug, Clone, Copy, Default)]
pub struct AiDecision {
    pub trigger_charge: bool,
    pub apply_collapse_penalty: bool,
    /// State freshly entered this tick, if any
    pub entered: Option<SquadState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquadAi {
    pub state: SquadState,
    pub tactic: Tactic,
    pub target_squad: Option<SquadId>,
    /// (us - them) / them, from the last info refresh
    pub numeric_advantage: f32,
    pub in_combat: bool,
    in_engage_range: bool,
    info_timer: f32,
    decision_timer: f32,
    tactic_cooldown: f32,
    collapse_penalty_timer: f32,
}

impl Default for SquadAi {
    fn default() -> Self {
        Self::new()
    }
}

impl SquadAi {
    pub fn new() -> Self {
        Self {
            state: SquadState::Moving,
            tactic: Tactic::FreeAttack,
            target_squad: None,
            numeric_advantage: 0.0,
            in_combat: false,
            in_engage_range: false,
            info_timer: 0.0,
            decision_timer: 0.0,
            tactic_cooldown: 0.0,
            collapse_penalty_timer: 0.0,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        dt: f32,
        squad_id: SquadId,
        me: &SquadInfo,
        infos: &[SquadInfo],
        collapse: f32,
        charge_ready: bool,
        rng: &mut StdRng,
        events: &mut EventQueue,
    ) -> AiDecision {
        let mut decision = AiDecision::default();

        self.info_timer -= dt;
        self.decision_timer -= dt;
        self.tactic_cooldown = (self.tactic_cooldown - dt).max(0.0);
        self.collapse_penalty_timer = (self.collapse_penalty_timer - dt).max(0.0);

        if self.info_timer <= 0.0 {
            self.refresh_information(me, infos);
            self.info_timer = INFO_CHECK_INTERVAL;
        }
        let enemy = self
            .target_squad
            .and_then(|id| infos.iter().find(|i| i.id == id));

        // morale collapse overrides everything, checked every tick
        if me.avg_morale_ratio <= SQUAD_ROUTING_MORALE_THRESHOLD
            && self.state != SquadState::Routing
        {
            self.enter(SquadState::Routing, squad_id, &mut decision, events);
            return decision;
        }

        match self.state {
            SquadState::Moving => {
                if enemy.is_some() && self.in_engage_range {
                    self.enter(SquadState::Engaging, squad_id, &mut decision, events);
                }
            }
            SquadState::Engaging => {
                if charge_ready && !self.in_combat {
                    decision.trigger_charge = true;
                }
                if self.in_combat {
                    self.enter(SquadState::InCombat, squad_id, &mut decision, events);
                } else if enemy.is_none() || !self.in_engage_range {
                    self.enter(SquadState::Moving, squad_id, &mut decision, events);
                }
            }
            SquadState::InCombat => {
                if enemy.is_none() {
                    self.enter(SquadState::Moving, squad_id, &mut decision, events);
                    return decision;
                }
                if collapse >= 1.0 && self.collapse_penalty_timer <= 0.0 {
                    decision.apply_collapse_penalty = true;
                    self.collapse_penalty_timer = DECISION_INTERVAL;
                }
                if !self.in_combat {
                    // contact lost: break off and reform rather than blunder
                    // forward in a combat posture
                    self.enter(SquadState::Retreating, squad_id, &mut decision, events);
                    return decision;
                }
                if self.decision_timer <= 0.0 {
                    self.decision_timer = DECISION_INTERVAL;
                    if let Some(enemy) = enemy {
                        let (defend, disengage) = outmatched(me, enemy);
                        if disengage {
                            self.enter(SquadState::Retreating, squad_id, &mut decision, events);
                        } else if defend {
                            self.enter(SquadState::Defending, squad_id, &mut decision, events);
                        } else {
                            self.choose_tactic(squad_id, me, rng, events);
                        }
                    }
                }
            }
            SquadState::Defending => {
                if self.decision_timer <= 0.0 {
                    self.decision_timer = DECISION_INTERVAL;
                    match enemy {
                        Some(enemy) => {
                            let (defend, disengage) = outmatched(me, enemy);
                            if disengage {
                                self.enter(SquadState::Retreating, squad_id, &mut decision, events);
                            } else if !defend {
                                self.enter(SquadState::InCombat, squad_id, &mut decision, events);
                            }
                        }
                        None => self.enter(SquadState::Moving, squad_id, &mut decision, events),
                    }
                }
            }
            SquadState::Retreating => {
                if !self.in_combat {
                    self.enter(SquadState::Reorganizing, squad_id, &mut decision, events);
                }
            }
            SquadState::Reorganizing => {
                if me.avg_stamina_ratio >= SQUAD_REENGAGE_STAMINA_THRESHOLD
                    && me.avg_morale_ratio >= SQUAD_REENGAGE_MORALE_THRESHOLD
                {
                    if enemy.is_some() && self.in_engage_range {
                        self.enter(SquadState::Engaging, squad_id, &mut decision, events);
                    } else {
                        self.enter(SquadState::Moving, squad_id, &mut decision, events);
                    }
                }
            }
            SquadState::Routing => {
                if me.avg_morale_ratio >= SQUAD_REORGANIZE_MORALE_THRESHOLD {
                    self.enter(SquadState::Reorganizing, squad_id, &mut decision, events);
                }
            }
        }
        decision
    }

    fn refresh_information(&mut self, me: &SquadInfo, infos: &[SquadInfo]) {
        let nearest = infos
            .iter()
            .filter(|i| i.team != me.team && !i.destroyed)
            .min_by(|a, b| {
                let da = (a.centroid - me.centroid).length_squared();
                let db = (b.centroid - me.centroid).length_squared();
                da.total_cmp(&db)
            });
        match nearest {
            Some(enemy) => {
                self.target_squad = Some(enemy.id);
                self.numeric_advantage =
                    (me.alive as f32 - enemy.alive as f32) / (enemy.alive as f32).max(1.0);
                let front_gap = (enemy.front_center - me.front_center).length();
                self.in_combat = front_gap <= me.combat_range;
                let centroid_gap = (enemy.centroid - me.centroid).length();
                self.in_engage_range = centroid_gap <= me.combat_range * ENGAGE_RANGE_MULT;
            }
            None => {
                self.target_squad = None;
                self.numeric_advantage = 0.0;
                self.in_combat = false;
                self.in_engage_range = false;
            }
        }
    }

    fn enter(
        &mut self,
        state: SquadState,
        squad_id: SquadId,
        decision: &mut AiDecision,
        events: &mut EventQueue,
    ) {
        if self.state == state {
            return;
        }
        debug!(squad = squad_id.0, from = ?self.state, to = ?state, "squad state change");
        events.push(EventKind::SquadStateChanged {
            squad: squad_id,
            from: self.state,
            to: state,
        });
        self.state = state;
        decision.entered = Some(state);
        // fresh posture gets a fresh decision clock
        self.decision_timer = DECISION_INTERVAL;
    }

    /// Weighted re-roll of the in-combat tactic, gated by a cooldown.
    /// Clear numerical superiority overrides the roll entirely.
    fn choose_tactic(
        &mut self,
        squad_id: SquadId,
        me: &SquadInfo,
        rng: &mut StdRng,
        events: &mut EventQueue,
    ) {
        if self.tactic_cooldown > 0.0 {
            return;
        }
        let picked = if self.numeric_advantage > FORCED_ATTACK_ADVANTAGE {
            self.tactic_cooldown = FORCED_ATTACK_COOLDOWN;
            Tactic::ForcedAttack
        } else {
            self.tactic_cooldown = TACTIC_COOLDOWN;
            let mut weights = TACTIC_BASE_WEIGHTS;
            if self.numeric_advantage > 0.3 {
                weights[0] *= 1.5;
                weights[1] *= 1.2;
            } else if self.numeric_advantage < -0.3 {
                weights[3] *= 1.5;
                weights[4] *= 1.3;
                weights[5] *= 1.3;
            }
            if me.avg_morale_ratio < 0.3 {
                weights[4] *= 2.0;
                weights[5] *= 2.0;
            }
            match weighted_pick(&weights, rng) {
                Some(index) => TACTICS[index],
                // degenerate weights: keep what we have
                None => self.tactic,
            }
        };
        if picked != self.tactic {
            debug!(squad = squad_id.0, tactic = ?picked, "tactic change");
            self.tactic = picked;
            events.push(EventKind::TacticChanged {
                squad: squad_id,
                tactic: picked,
            });
        }
    }
}

/// Pairwise condition check against the engaged enemy: a 50% deficit on
/// any aggregate means fight defensively, a 100% deficit means break off.
fn outmatched(me: &SquadInfo, enemy: &SquadInfo) -> (bool, bool) {
    let gap = |mine: f32, theirs: f32| (theirs - mine) / mine.max(1.0);
    let worst = gap(me.avg_attack, enemy.avg_attack)
        .max(gap(me.avg_morale, enemy.avg_morale))
        .max(gap(me.avg_stamina, enemy.avg_stamina));
    (worst >= 0.5, worst >= 1.0)
}

fn weighted_pick(weights: &[f32], rng: &mut StdRng) -> Option<usize> {
    let total: f32 = weights.iter().filter(|w| **w > 0.0).sum();
    if total <= 0.0 {
        return None;
    }
    let mut roll = rng.gen::<f32>() * total;
    for (index, weight) in weights.iter().enumerate() {
        if *weight <= 0.0 {
            continue;
        }
        roll -= weight;
        if roll <= 0.0 {
            return Some(index);
        }
    }
    Some(weights.len() - 1)
}
