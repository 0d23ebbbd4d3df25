//! Battle configuration with documented constants
//!
//! All combat tunables are collected here with explanations of their purpose
//! and how they interact with each other. The config is plain data: it is
//! passed by reference into every system that needs it, never stored in a
//! global, so two battles can run side by side with different tuning.

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, SimError};

/// Tunable parameters for combat resolution and unit behavior
///
/// Defaults reproduce the baseline balance the simulator was tuned against.
/// Changing them shifts pacing (interval/defend durations), lethality
/// (damage reduction, defense multipliers) and the evade/block economy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleConfig {
    // === ATTACK DECISION ===
    /// Attack probability at full morale when re-deciding after an interval
    pub atk_prob_max: f32,

    /// Attack probability at (or below) the morale threshold
    ///
    /// Between `morale_threshold` and full morale the probability is
    /// interpolated linearly up to `atk_prob_max`.
    pub atk_prob_min: f32,

    /// Morale ratio below which attack probability bottoms out
    pub morale_threshold: f32,

    /// How much morale scales outgoing damage (0 = ignore morale)
    ///
    /// Damage factor is `(1 - morale_inf) + morale_inf * morale_ratio`.
    pub morale_inf: f32,

    /// How much stamina scales outgoing damage (0 = ignore stamina)
    pub stamina_inf: f32,

    // === EVADE ===
    /// Base evade chance before bonuses and encumbrance
    pub base_evade: f32,

    /// Global evade chance multiplier
    pub evade_bonus: f32,

    /// How strongly shield weight suppresses evasion
    ///
    /// Evade chance is scaled by `max(0, 1 - shield/20 * shield_pen)`.
    pub shield_pen: f32,

    /// How strongly armor weight suppresses evasion
    pub armor_pen: f32,

    /// Stamina cost of a successful evade
    pub evade_cost: f32,

    // === BLOCK / DEFENSE ===
    /// Defense multiplier for a deliberate (reactive or posture) block
    pub def_bonus: f32,

    /// Flat defense contributed per point of shield
    pub shield_base_mult: f32,

    /// Flat defense contributed per point of armor
    pub armor_base_mult: f32,

    /// Extra defense multiplier while in the DEFENDING posture
    pub defending_bonus: f32,

    /// How long a unit holds the DEFENDING posture (seconds)
    pub defending_duration: f32,

    /// Global scale on all incoming damage, applied before mitigation
    pub damage_reduction: f32,

    // === TIMING ===
    /// Wind-up before an attack lands (seconds)
    pub pre_delay: f32,

    /// Recovery after a successful evade (seconds)
    pub interval_evade: f32,

    /// Recovery after a block (seconds)
    pub interval_block: f32,

    // === STAMINA ===
    /// Stamina cost of one attack
    pub attack_cost: f32,

    /// Stamina regenerated per second while not exerting
    pub stamina_regen: f32,

    /// Regen multiplier while in the INTERVAL state (catching breath)
    pub interval_stamina_bonus: f32,

    // === MOVEMENT ===
    /// Speed multiplier when closing on an engaged enemy
    ///
    /// The overspeed fraction drains stamina: `(mult - 1) * stamina_regen`
    /// per second, so sprinting to contact is not free.
    pub move_mult: f32,

    /// Fraction of an enemy's radius (as area) that blocks movement outright
    pub enemy_block_area: f32,

    /// Strongest slowdown an enemy can impose short of a full block
    pub enemy_max_slow: f32,

    /// Fraction of an ally's radius (as area) a unit can squeeze through
    pub ally_pass_area: f32,

    /// Strongest slowdown an ally in the way can impose
    pub ally_max_slow: f32,

    // === KNOCKBACK ===
    /// Knockback distance for a hit equal to the defender's max hp
    pub knockback_max_dist: f32,

    /// Knockback distance multiplier on a killing blow
    pub death_knockback_mult: f32,

    /// Converts knockback distance into initial velocity
    pub knockback_force_mult: f32,

    /// Per-tick velocity decay factor, in (0, 1)
    pub knockback_decay: f32,

    /// Units moving faster than this are skipped by the collision pass
    pub knockback_collision_threshold: f32,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            atk_prob_max: 1.0,
            atk_prob_min: 0.3,
            morale_threshold: 0.2,
            morale_inf: 0.4,
            stamina_inf: 0.3,
            base_evade: 0.1,
            evade_bonus: 2.0,
            shield_pen: 0.5,
            armor_pen: 0.5,
            evade_cost: 5.0,
            def_bonus: 1.5,
            shield_base_mult: 1.5,
            armor_base_mult: 1.0,
            defending_bonus: 1.3,
            defending_duration: 2.0,
            damage_reduction: 0.5,
            pre_delay: 0.5,
            interval_evade: 0.5,
            interval_block: 0.8,
            attack_cost: 10.0,
            stamina_regen: 1.0,
            interval_stamina_bonus: 2.0,
            move_mult: 1.2,
            enemy_block_area: 0.9,
            enemy_max_slow: 0.7,
            ally_pass_area: 0.6,
            ally_max_slow: 0.2,
            knockback_max_dist: 1.0,
            death_knockback_mult: 1.5,
            knockback_force_mult: 600.0,
            knockback_decay: 0.90,
            knockback_collision_threshold: 1.0,
        }
    }
}

impl BattleConfig {
    /// Checks internal consistency. Called once at battle construction;
    /// a battle never starts with a config that fails here.
    pub fn validate(&self) -> Result<()> {
        fn probability(name: &str, v: f32) -> Result<()> {
            if !(0.0..=1.0).contains(&v) {
                return Err(SimError::InvalidConfig(format!(
                    "{name} must be in [0, 1], got {v}"
                )));
            }
            Ok(())
        }
        fn positive(name: &str, v: f32) -> Result<()> {
            if !(v > 0.0) {
                return Err(SimError::InvalidConfig(format!(
                    "{name} must be positive, got {v}"
                )));
            }
            Ok(())
        }
        fn non_negative(name: &str, v: f32) -> Result<()> {
            if !(v >= 0.0) {
                return Err(SimError::InvalidConfig(format!(
                    "{name} must be non-negative, got {v}"
                )));
            }
            Ok(())
        }

        probability("atk_prob_max", self.atk_prob_max)?;
        probability("atk_prob_min", self.atk_prob_min)?;
        if self.atk_prob_min > self.atk_prob_max {
            return Err(SimError::InvalidConfig(format!(
                "atk_prob_min ({}) exceeds atk_prob_max ({})",
                self.atk_prob_min, self.atk_prob_max
            )));
        }
        probability("morale_threshold", self.morale_threshold)?;
        probability("morale_inf", self.morale_inf)?;
        probability("stamina_inf", self.stamina_inf)?;
        probability("base_evade", self.base_evade)?;
        probability("damage_reduction", self.damage_reduction)?;
        probability("enemy_block_area", self.enemy_block_area)?;
        probability("enemy_max_slow", self.enemy_max_slow)?;
        probability("ally_pass_area", self.ally_pass_area)?;
        probability("ally_max_slow", self.ally_max_slow)?;

        non_negative("evade_bonus", self.evade_bonus)?;
        non_negative("shield_pen", self.shield_pen)?;
        non_negative("armor_pen", self.armor_pen)?;
        non_negative("evade_cost", self.evade_cost)?;
        non_negative("shield_base_mult", self.shield_base_mult)?;
        non_negative("armor_base_mult", self.armor_base_mult)?;
        non_negative("attack_cost", self.attack_cost)?;
        non_negative("stamina_regen", self.stamina_regen)?;
        non_negative("knockback_max_dist", self.knockback_max_dist)?;
        non_negative("knockback_force_mult", self.knockback_force_mult)?;
        non_negative("knockback_collision_threshold", self.knockback_collision_threshold)?;

        positive("def_bonus", self.def_bonus)?;
        positive("defending_bonus", self.defending_bonus)?;
        positive("defending_duration", self.defending_duration)?;
        positive("pre_delay", self.pre_delay)?;
        positive("interval_evade", self.interval_evade)?;
        positive("interval_block", self.interval_block)?;
        positive("interval_stamina_bonus", self.interval_stamina_bonus)?;
        positive("death_knockback_mult", self.death_knockback_mult)?;
        if self.move_mult < 1.0 {
            return Err(SimError::InvalidConfig(format!(
                "move_mult must be at least 1.0, got {}",
                self.move_mult
            )));
        }
        if !(self.knockback_decay > 0.0 && self.knockback_decay < 1.0) {
            return Err(SimError::InvalidConfig(format!(
                "knockback_decay must be in (0, 1), got {}",
                self.knockback_decay
            )));
        }
        Ok(())
    }

    /// Loads a config snapshot previously produced by [`to_json`](Self::to_json)
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(BattleConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_probability_out_of_range() {
        let mut config = BattleConfig::default();
        config.atk_prob_max = 1.3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_attack_probabilities() {
        let mut config = BattleConfig::default();
        config.atk_prob_min = 0.9;
        config.atk_prob_max = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_knockback_decay() {
        let mut config = BattleConfig::default();
        config.knockback_decay = 1.0;
        assert!(config.validate().is_err());
        config.knockback_decay = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_nan() {
        let mut config = BattleConfig::default();
        config.pre_delay = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let config = BattleConfig::default();
        let json = config.to_json().unwrap();
        let back = BattleConfig::from_json(&json).unwrap();
        assert_eq!(back.attack_cost, config.attack_cost);
        assert_eq!(back.knockback_force_mult, config.knockback_force_mult);
    }

    #[test]
    fn test_from_json_revalidates() {
        let mut config = BattleConfig::default();
        config.damage_reduction = 2.0;
        let json = serde_json::to_string(&config).unwrap();
        assert!(BattleConfig::from_json(&json).is_err());
    }
}
