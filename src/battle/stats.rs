//! Unit stat bundles and presets

use serde::{Deserialize, Serialize};

/// Broad troop class. Only melee classes may charge; cavalry charges
/// punch through armor far better than infantry ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitClass {
    Infantry,
    Cavalry,
    Ranged,
}

impl UnitClass {
    pub fn is_melee(&self) -> bool {
        matches!(self, UnitClass::Infantry | UnitClass::Cavalry)
    }
}

/// Creation-time stat bundle for a unit
///
/// `range` is in formation units; world reach is `range * RANGE_SCALE`.
/// `mass` of 0.0 means "derive from equipment" via [`derived_mass`](Self::derived_mass).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitStats {
    pub hp: f32,
    pub attack: f32,
    /// Attacks per second; also sets the DEFENDING re-evaluation cadence
    pub attack_speed: f32,
    pub range: f32,
    /// World units per second
    pub move_speed: f32,
    pub shield: f32,
    pub armor: f32,
    pub max_stamina: f32,
    pub max_morale: f32,
    pub mass: f32,
}

impl UnitStats {
    /// Body mass plus equipment weight, used when no explicit mass is given
    pub fn derived_mass(&self) -> f32 {
        10.0 + 1.0 + 0.5 * self.shield + 0.3 * self.armor
    }

    /// Mass to use in knockback and collision resolution
    pub fn effective_mass(&self) -> f32 {
        if self.mass > 0.0 {
            self.mass
        } else {
            self.derived_mass()
        }
    }

    pub fn conscript() -> Self {
        Self {
            hp: 20.0,
            attack: 10.0,
            attack_speed: 1.0,
            range: 1.0,
            move_speed: 40.0,
            shield: 0.0,
            armor: 1.0,
            max_stamina: 60.0,
            max_morale: 40.0,
            mass: 11.0,
        }
    }

    pub fn light_infantry() -> Self {
        Self {
            hp: 30.0,
            attack: 15.0,
            attack_speed: 0.9,
            range: 1.0,
            move_speed: 45.0,
            shield: 3.0,
            armor: 2.0,
            max_stamina: 65.0,
            max_morale: 60.0,
            mass: 15.0,
        }
    }

    pub fn heavy_infantry() -> Self {
        Self {
            hp: 35.0,
            attack: 15.0,
            attack_speed: 0.7,
            range: 1.2,
            move_speed: 35.0,
            shield: 5.0,
            armor: 5.0,
            max_stamina: 75.0,
            max_morale: 80.0,
            mass: 21.0,
        }
    }

    pub fn cavalry() -> Self {
        Self {
            hp: 40.0,
            attack: 18.0,
            attack_speed: 0.8,
            range: 1.1,
            move_speed: 70.0,
            shield: 2.0,
            armor: 3.0,
            max_stamina: 80.0,
            max_morale: 70.0,
            mass: 45.0,
        }
    }
}
