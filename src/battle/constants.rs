//! Battle system constants - fixed tunables that are not part of [`BattleConfig`]
//!
//! Values in `BattleConfig` are expected to be tuned per battle; the values
//! here define the shape of the simulation itself and change only with the
//! rules.
//!
//! [`BattleConfig`]: crate::core::config::BattleConfig

// Scale
/// World units per point of weapon range. A range stat of 1.0 reaches
/// 60 world units from the attacker's center.
pub const RANGE_SCALE: f32 = 60.0;
pub const UNIT_RADIUS: f32 = 16.0;

// Tick driver
pub const MAX_TICK_DT: f32 = 0.1;
pub const COLLISION_ITERATIONS: usize = 3;

// Knockback resolution
pub const KNOCKBACK_MIN_DIST: f32 = 0.15;
pub const KNOCKBACK_STOP_SPEED: f32 = 2.0;
pub const KNOCKBACK_MASS_RATIO_MIN: f32 = 0.5;
pub const KNOCKBACK_MASS_RATIO_MAX: f32 = 2.0;

// Damage side effects
pub const MORALE_LOSS_PER_HP_RATIO: f32 = 30.0;
pub const EVADE_MORALE_RECOVERY: f32 = 0.33;
pub const EVADE_STEP_DIST: f32 = 15.0;

// Reactive block chances when a shield is carried
pub const BLOCK_CHANCE_DEFENDING: f32 = 0.9;
pub const BLOCK_CHANCE_REACTIVE: f32 = 0.7;

// Pre-attack micro-advance
pub const PRE_ATTACK_DRIFT_RANGE_RATIO: f32 = 0.95;
pub const PRE_ATTACK_ADVANCE_SPEED_RATIO: f32 = 0.5;

// Recover state exit margin above the attack cost
pub const RECOVER_STAMINA_MARGIN: f32 = 5.0;

// Squad AI cadence (seconds)
pub const INFO_CHECK_INTERVAL: f32 = 1.0;
pub const DECISION_INTERVAL: f32 = 2.0;
pub const TACTIC_COOLDOWN: f32 = 3.0;
pub const FORCED_ATTACK_COOLDOWN: f32 = 5.0;

// Squad AI morale/stamina gates (ratios of max)
pub const SQUAD_ROUTING_MORALE_THRESHOLD: f32 = 0.10;
pub const SQUAD_REORGANIZE_MORALE_THRESHOLD: f32 = 0.30;
pub const SQUAD_REENGAGE_STAMINA_THRESHOLD: f32 = 0.50;
pub const SQUAD_REENGAGE_MORALE_THRESHOLD: f32 = 0.40;

// Engagement geometry
/// A squad starts engaging (charge window opens) at this multiple of its
/// combat range; it counts as in combat at the combat range itself.
pub const ENGAGE_RANGE_MULT: f32 = 3.0;

// Forced-attack override when clearly outnumbering the enemy
pub const FORCED_ATTACK_ADVANTAGE: f32 = 0.5;

// Cohesion
pub const FORMATION_COLLAPSE_MAX_DIST_MULT: f32 = 1.5;
pub const COLLAPSE_MORALE_PENALTY: f32 = 0.5;

// Formation transitions
pub const FORMATION_TRANSITION_DURATION: f32 = 2.0;
pub const FORMATION_TRANSITION_SPEED_MULT: f32 = 1.5;
pub const FORMATION_TRANSITION_PASS_THROUGH_RATIO: f32 = 0.5;
pub const FORMATION_TRANSITION_SLOWDOWN_REDUCTION: f32 = 0.5;

// Intra-squad collision softening
pub const SQUAD_COLLISION_ITERATIONS: usize = 2;
pub const SQUAD_PASS_THROUGH_RATIO: f32 = 0.85;
pub const SQUAD_COLLISION_PUSH: f32 = 0.2;

// Movement obstruction cone
pub const OBSTRUCTION_SCAN_MULT: f32 = 2.5;
pub const OBSTRUCTION_CONE_HALF_ANGLE: f32 = std::f32::consts::FRAC_PI_4;
pub const OBSTRUCTION_MIN_FACTOR: f32 = 0.2;

// Charges
pub const CHARGE_DURATION: f32 = 3.0;
pub const CHARGE_COOLDOWN_DURATION: f32 = 10.0;
pub const CHARGE_MIN_MORALE_RATIO: f32 = 0.1;
pub const CHARGE_MORALE_RECOVERY: f32 = 0.10;
pub const CHARGE_DAMAGE_MULT: f32 = 1.2;
pub const CHARGE_KNOCKBACK_FORCE_MULT: f32 = 2.0;
pub const CHARGE_MASS_MULT: f32 = 2.0;
pub const CHARGE_ARMOR_PEN_INFANTRY: f32 = 0.1;
pub const CHARGE_ARMOR_PEN_CAVALRY: f32 = 0.5;
/// A charging unit forfeits its bonus once stamina drops below
/// `move_speed * CHARGE_HIGH_SPEED_STAMINA_MULT`; too winded to hit hard.
pub const CHARGE_HIGH_SPEED_STAMINA_MULT: f32 = 0.5;
