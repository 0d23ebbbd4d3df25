//! Squad charges
//!
//! A charge is a short, committed burst: the squad snaps rigidly back into
//! shape, pointed at the enemy, and every unit carries a one-time bonus on
//! its next attack. The bonus is forfeited by units too winded to sprint.

use serde::{Deserialize, Serialize};

use crate::battle::constants::*;
use crate::battle::formation::Formation;
use crate::battle::stats::UnitClass;
use crate::battle::unit::Unit;
use crate::core::types::UnitId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeSystem {
    active: bool,
    timer: f32,
    cooldown: f32,
}

impl Default for ChargeSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl ChargeSystem {
    pub fn new() -> Self {
        Self {
            active: false,
            timer: 0.0,
            cooldown: 0.0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn remaining(&self) -> f32 {
        self.timer
    }

    /// All the gates at once: melee troops, a charge-capable shape, off
    /// cooldown, not already locked in melee, and morale above the floor
    pub fn can_start(
        &self,
        formation: &Formation,
        class: UnitClass,
        avg_morale_ratio: f32,
        in_combat: bool,
    ) -> bool {
        !self.active
            && self.cooldown <= 0.0
            && class.is_melee()
            && formation.kind.chargeable()
            && !in_combat
            && avg_morale_ratio >= CHARGE_MIN_MORALE_RATIO
    }

    /// Arms the charge. The caller handles the rigid re-snap; this marks
    /// every living unit and rallies them.
    pub fn start(&mut self, units: &mut [Unit], members: &[UnitId]) {
        self.active = true;
        self.timer = CHARGE_DURATION;
        for id in members {
            let unit = &mut units[id.index()];
            if !unit.is_alive() {
                continue;
            }
            unit.is_charging = true;
            unit.charge_bonus_used = false;
            unit.add_morale(unit.max_morale * CHARGE_MORALE_RECOVERY);
        }
    }

    /// Ticks the charge window and the cooldown; returns true on the tick
    /// the charge ends
    pub fn update(&mut self, dt: f32, units: &mut [Unit], members: &[UnitId]) -> bool {
        if self.cooldown > 0.0 {
            self.cooldown = (self.cooldown - dt).max(0.0);
        }
        if !self.active {
            return false;
        }

        for id in members {
            let unit = &mut units[id.index()];
            if unit.is_charging
                && !unit.charge_bonus_used
                && unit.stamina < unit.move_speed * CHARGE_HIGH_SPEED_STAMINA_MULT
            {
                // too winded to keep momentum
                unit.charge_bonus_used = true;
            }
        }

        self.timer -= dt;
        if self.timer <= 0.0 {
            self.end(units, members);
            return true;
        }
        false
    }

    fn end(&mut self, units: &mut [Unit], members: &[UnitId]) {
        self.active = false;
        self.timer = 0.0;
        self.cooldown = CHARGE_COOLDOWN_DURATION;
        for id in members {
            let unit = &mut units[id.index()];
            unit.is_charging = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::formation::FormationKind;
    use crate::battle::stats::UnitStats;
    use crate::core::types::{SquadId, Team};
    use glam::Vec2;

    fn squad_units(count: u32) -> (Vec<Unit>, Vec<UnitId>) {
        let units: Vec<Unit> = (0..count)
            .map(|i| {
                Unit::new(
                    UnitId(i),
                    SquadId(0),
                    Team::BLUE,
                    UnitClass::Infantry,
                    Vec2::new(i as f32 * 20.0, 0.0),
                    &UnitStats::light_infantry(),
                )
            })
            .collect();
        let ids = units.iter().map(|u| u.id).collect();
        (units, ids)
    }

    #[test]
    fn test_eligibility_gates() {
        let charge = ChargeSystem::new();
        let wedge = Formation::new(FormationKind::Wedge, 5, 40.0).unwrap();
        let column = Formation::new(FormationKind::Column, 5, 40.0).unwrap();

        assert!(charge.can_start(&wedge, UnitClass::Infantry, 0.8, false));
        assert!(!charge.can_start(&column, UnitClass::Infantry, 0.8, false));
        assert!(!charge.can_start(&wedge, UnitClass::Ranged, 0.8, false));
        assert!(!charge.can_start(&wedge, UnitClass::Infantry, 0.05, false));
        assert!(!charge.can_start(&wedge, UnitClass::Infantry, 0.8, true));
    }

    #[test]
    fn test_start_marks_and_rallies_units() {
        let (mut units, ids) = squad_units(4);
        for unit in &mut units {
            unit.morale = unit.max_morale * 0.5;
        }
        let mut charge = ChargeSystem::new();
        charge.start(&mut units, &ids);
        assert!(charge.is_active());
        for unit in &units {
            assert!(unit.is_charging);
            assert!(!unit.charge_bonus_used);
            assert!(unit.morale > unit.max_morale * 0.5);
        }
    }

    #[test]
    fn test_dead_units_are_not_marked() {
        let (mut units, ids) = squad_units(2);
        units[1].hp = 0.0;
        let mut charge = ChargeSystem::new();
        charge.start(&mut units, &ids);
        assert!(!units[1].is_charging);
    }

    #[test]
    fn test_charge_expires_into_cooldown() {
        let (mut units, ids) = squad_units(3);
        let mut charge = ChargeSystem::new();
        charge.start(&mut units, &ids);
        let ended = charge.update(CHARGE_DURATION + 0.1, &mut units, &ids);
        assert!(ended);
        assert!(!charge.is_active());
        for unit in &units {
            assert!(!unit.is_charging);
        }
        // still cooling down: cannot start again
        let wedge = Formation::new(FormationKind::Wedge, 3, 40.0).unwrap();
        assert!(!charge.can_start(&wedge, UnitClass::Infantry, 0.8, false));
    }

    #[test]
    fn test_cooldown_eventually_clears() {
        let (mut units, ids) = squad_units(3);
        let mut charge = ChargeSystem::new();
        charge.start(&mut units, &ids);
        charge.update(CHARGE_DURATION + 0.1, &mut units, &ids);
        for _ in 0..200 {
            charge.update(0.1, &mut units, &ids);
        }
        let wedge = Formation::new(FormationKind::Wedge, 3, 40.0).unwrap();
        assert!(charge.can_start(&wedge, UnitClass::Infantry, 0.8, false));
    }

    #[test]
    fn test_winded_unit_forfeits_mid_charge() {
        let (mut units, ids) = squad_units(2);
        let mut charge = ChargeSystem::new();
        charge.start(&mut units, &ids);
        units[0].stamina = units[0].move_speed * CHARGE_HIGH_SPEED_STAMINA_MULT - 1.0;
        charge.update(0.1, &mut units, &ids);
        assert!(units[0].charge_bonus_used);
        assert!(!units[1].charge_bonus_used);
    }
}
