//! Formation shapes and slot generation
//!
//! A formation is a pure function of (kind, unit count, spacing): a sorted
//! list of relative slots. Two slot lists are kept. The front-anchored list
//! (front rank at y = 0, deeper ranks at +y) is what gets rotated into the
//! world around the squad anchor; the centroid-anchored copy provides the
//! bounding box used for width, height and cohesion checks.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::core::error::{Result, SimError};

pub const DEFAULT_FORMATION_SPACING: f32 = 40.0;

const DENSE_SPACING_RATIO: f32 = 0.7;
const LOOSE_SPACING_RATIO: f32 = 1.5;
const TURTLE_SPACING_RATIO: f32 = 0.7;
const CRANE_BASE_RATIO: f32 = 0.4;
const ECHELON_SHIFT_RATIO: f32 = 0.3;
const SORT_X_EPSILON: f32 = 0.1;

/// Closed set of formation shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormationKind {
    /// Wide rectangle, two files of frontage per file of depth
    Square,
    /// Square footprint at 0.7 spacing
    Dense,
    /// Square footprint at 1.5 spacing
    Loose,
    /// Hollow box, everyone facing outward
    Hollow,
    /// Inverted wedge, widest rank forward
    Fish,
    /// Forward point
    Wedge,
    /// Rear base with two wings swept 45 degrees forward
    Crane,
    /// Rectangle with each rank stepped sideways
    Echelon,
    /// Compact rectangle at 0.7 spacing
    Turtle,
    /// Three deep ranks, maximum frontage
    Phalanx,
    /// Deep marching column
    Column,
}

impl FormationKind {
    pub const ALL: [FormationKind; 11] = [
        FormationKind::Square,
        FormationKind::Dense,
        FormationKind::Loose,
        FormationKind::Hollow,
        FormationKind::Fish,
        FormationKind::Wedge,
        FormationKind::Crane,
        FormationKind::Echelon,
        FormationKind::Turtle,
        FormationKind::Phalanx,
        FormationKind::Column,
    ];

    /// Shapes that concentrate momentum enough to carry a charge
    pub fn chargeable(&self) -> bool {
        matches!(
            self,
            FormationKind::Square | FormationKind::Fish | FormationKind::Wedge
        )
    }
}

/// One relative position within a formation
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Slot {
    /// Offset in formation space: x lateral, +y toward the rear
    pub offset: Vec2,
    /// Heading relative to the squad facing (non-zero only for outward-facing shapes)
    pub heading: f32,
    /// Rank index, primary sort key for slot assignment
    pub layer: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Formation {
    pub kind: FormationKind,
    pub unit_count: usize,
    pub spacing: f32,
    front_slots: Vec<Slot>,
    centered_slots: Vec<Slot>,
    /// Lateral extent of the centered bounding box
    pub width: f32,
    /// Depth extent of the centered bounding box
    pub height: f32,
}

impl Formation {
    pub fn new(kind: FormationKind, unit_count: usize, spacing: f32) -> Result<Self> {
        if unit_count == 0 {
            return Err(SimError::InvalidFormation(
                "formation requires at least one unit".into(),
            ));
        }
        if !(spacing > 0.0) {
            return Err(SimError::InvalidFormation(format!(
                "spacing must be positive, got {spacing}"
            )));
        }
        let front_slots = normalize_and_sort(generate(kind, unit_count, spacing));
        let centered_slots = recenter(front_slots.clone());
        let (width, height) = bounding_extent(&centered_slots);
        Ok(Self {
            kind,
            unit_count,
            spacing,
            front_slots,
            centered_slots,
            width,
            height,
        })
    }

    /// Front-anchored slots, front rank at y = 0
    pub fn front_slots(&self) -> &[Slot] {
        &self.front_slots
    }

    /// Centroid-anchored slots, bounding box centered on the origin
    pub fn centered_slots(&self) -> &[Slot] {
        &self.centered_slots
    }

    pub fn slot_count(&self) -> usize {
        self.front_slots.len()
    }

    /// World position and heading for the given slot index.
    /// Indices past the slot list collapse onto the anchor itself.
    pub fn world_slot(&self, index: usize, anchor: Vec2, facing: f32) -> (Vec2, f32) {
        match self.front_slots.get(index) {
            Some(slot) => {
                let forward = Vec2::new(facing.cos(), facing.sin());
                let lateral = Vec2::new(-facing.sin(), facing.cos());
                let pos = anchor + lateral * slot.offset.x - forward * slot.offset.y;
                (pos, facing + slot.heading)
            }
            None => (anchor, facing),
        }
    }
}

fn generate(kind: FormationKind, count: usize, spacing: f32) -> Vec<Slot> {
    match kind {
        FormationKind::Square => rectangle_slots(count, spacing, 2.0, 1.0),
        FormationKind::Dense => rectangle_slots(count, spacing * DENSE_SPACING_RATIO, 2.0, 1.0),
        FormationKind::Loose => rectangle_slots(count, spacing * LOOSE_SPACING_RATIO, 2.0, 1.0),
        FormationKind::Hollow => hollow_slots(count, spacing),
        FormationKind::Fish => fish_slots(count, spacing),
        FormationKind::Wedge => wedge_slots(count, spacing),
        FormationKind::Crane => crane_slots(count, spacing),
        FormationKind::Echelon => echelon_slots(count, spacing),
        FormationKind::Turtle => rectangle_slots(count, spacing * TURTLE_SPACING_RATIO, 1.0, 1.0),
        FormationKind::Phalanx => phalanx_slots(count, spacing),
        FormationKind::Column => rectangle_slots(count, spacing, 1.0, 4.0),
    }
}

/// Rectangle with the given frontage-to-depth ratio
fn rectangle_slots(count: usize, spacing: f32, width_ratio: f32, height_ratio: f32) -> Vec<Slot> {
    let rows = ((count as f32 * (height_ratio / width_ratio)).sqrt().round() as usize).max(1);
    let cols = count.div_ceil(rows);
    grid_slots(count, cols, spacing, 0.0)
}

/// Three ranks regardless of strength
fn phalanx_slots(count: usize, spacing: f32) -> Vec<Slot> {
    let rows = 3.min(count);
    let cols = count.div_ceil(rows);
    grid_slots(count, cols, spacing, 0.0)
}

/// Rectangle with every rank stepped laterally
fn echelon_slots(count: usize, spacing: f32) -> Vec<Slot> {
    let rows = ((count as f32 * 0.5).sqrt().round() as usize).max(1);
    let cols = count.div_ceil(rows);
    grid_slots(count, cols, spacing, spacing * ECHELON_SHIFT_RATIO)
}

fn grid_slots(count: usize, cols: usize, spacing: f32, row_shift: f32) -> Vec<Slot> {
    let half = (cols.saturating_sub(1)) as f32 / 2.0;
    (0..count)
        .map(|i| {
            let row = i / cols;
            let col = i % cols;
            Slot {
                offset: Vec2::new(
                    (col as f32 - half) * spacing + row as f32 * row_shift,
                    row as f32 * spacing,
                ),
                heading: 0.0,
                layer: row as u32,
            }
        })
        .collect()
}

/// Hollow box; falls back to a rectangle when too thin to close the ring
fn hollow_slots(count: usize, spacing: f32) -> Vec<Slot> {
    if count < 8 {
        return rectangle_slots(count, spacing, 1.0, 1.0);
    }
    // smallest square whose perimeter holds everyone
    let mut side = 3usize;
    while 4 * (side - 1) < count {
        side += 1;
    }
    let half = (side - 1) as f32 / 2.0;
    let perimeter = 4 * (side - 1);
    (0..count)
        .map(|i| {
            // walk the ring clockwise from the front-left corner; overflow
            // wraps into a second inner pass at half spacing inward
            let lap = i / perimeter;
            let step = i % perimeter;
            let inset = lap as f32 * spacing * 0.5;
            let (x, y, heading) = ring_position(step, side, spacing);
            let toward_center = Vec2::new(-x, -y).normalize_or_zero() * inset;
            Slot {
                offset: Vec2::new(x + toward_center.x, y + toward_center.y),
                heading,
                layer: lap as u32,
            }
        })
        .map(|mut slot| {
            slot.offset.y += half * spacing;
            slot
        })
        .collect()
}

fn ring_position(step: usize, side: usize, spacing: f32) -> (f32, f32, f32) {
    use std::f32::consts::{FRAC_PI_2, PI};
    let half = (side - 1) as f32 / 2.0;
    let edge = side - 1;
    let (col, row, heading) = if step < edge {
        (step, 0, 0.0)
    } else if step < 2 * edge {
        (edge, step - edge, -FRAC_PI_2)
    } else if step < 3 * edge {
        (3 * edge - step, edge, PI)
    } else {
        (0, 4 * edge - step, FRAC_PI_2)
    };
    (
        (col as f32 - half) * spacing,
        (row as f32 - half) * spacing,
        heading,
    )
}

/// Inverted wedge: the widest rank leads, tapering toward the rear
fn fish_slots(count: usize, spacing: f32) -> Vec<Slot> {
    let mut rows = 1usize;
    while rows * (rows + 1) / 2 < count {
        rows += 1;
    }
    let mut slots = Vec::with_capacity(count);
    let mut remaining = count;
    for row in 0..rows {
        let width = (rows - row).min(remaining);
        let half = (width.saturating_sub(1)) as f32 / 2.0;
        for col in 0..width {
            slots.push(Slot {
                offset: Vec2::new((col as f32 - half) * spacing, row as f32 * spacing),
                heading: 0.0,
                layer: row as u32,
            });
        }
        remaining -= width;
        if remaining == 0 {
            break;
        }
    }
    slots
}

/// Forward point: a single unit leads, each rank behind one wider
fn wedge_slots(count: usize, spacing: f32) -> Vec<Slot> {
    let mut slots = Vec::with_capacity(count);
    let mut row = 0usize;
    let mut remaining = count;
    while remaining > 0 {
        let width = (row + 1).min(remaining);
        let half = (width.saturating_sub(1)) as f32 / 2.0;
        for col in 0..width {
            slots.push(Slot {
                offset: Vec2::new((col as f32 - half) * spacing, row as f32 * spacing),
                heading: 0.0,
                layer: row as u32,
            });
        }
        remaining -= width;
        row += 1;
    }
    slots
}

/// Rear base with two wings swept forward at 45 degrees
fn crane_slots(count: usize, spacing: f32) -> Vec<Slot> {
    let base_count = ((count as f32 * CRANE_BASE_RATIO).round() as usize).max(1).min(count);
    let mut slots = rectangle_slots(base_count, spacing, 2.0, 1.0);
    let base_half_width = slots
        .iter()
        .map(|s| s.offset.x.abs())
        .fold(0.0f32, f32::max);
    let base_layer = slots.iter().map(|s| s.layer).max().unwrap_or(0);

    let wing_count = count - base_count;
    let diag = spacing * std::f32::consts::FRAC_1_SQRT_2;
    for i in 0..wing_count {
        let step = (i / 2 + 1) as f32;
        let side = if i % 2 == 0 { -1.0 } else { 1.0 };
        slots.push(Slot {
            offset: Vec2::new(side * (base_half_width + step * diag), -step * diag),
            heading: side * std::f32::consts::FRAC_PI_4,
            layer: base_layer + 1 + (i / 2) as u32,
        });
    }
    slots
}

/// Re-centers on the bounding box, then anchors the front rank at y = 0
/// and sorts. Idempotent: normalizing an already normalized list is a no-op.
fn normalize_and_sort(mut slots: Vec<Slot>) -> Vec<Slot> {
    if slots.is_empty() {
        return slots;
    }
    let (min, max) = bounding_box(&slots);
    let center_x = (min.x + max.x) / 2.0;
    for slot in &mut slots {
        slot.offset.x -= center_x;
        slot.offset.y -= min.y;
    }
    sort_slots(&mut slots);
    slots
}

/// Shifts a front-anchored list so its bounding box centers on the origin
fn recenter(mut slots: Vec<Slot>) -> Vec<Slot> {
    if slots.is_empty() {
        return slots;
    }
    let (min, max) = bounding_box(&slots);
    let center = (min + max) / 2.0;
    for slot in &mut slots {
        slot.offset -= center;
    }
    slots
}

fn sort_slots(slots: &mut [Slot]) {
    slots.sort_by(|a, b| {
        a.layer.cmp(&b.layer).then_with(|| {
            let (abs_a, abs_b) = (a.offset.x.abs(), b.offset.x.abs());
            if (abs_a - abs_b).abs() > SORT_X_EPSILON {
                abs_a.total_cmp(&abs_b)
            } else {
                a.offset.x.total_cmp(&b.offset.x)
            }
        })
    });
}

fn bounding_box(slots: &[Slot]) -> (Vec2, Vec2) {
    let mut min = Vec2::splat(f32::MAX);
    let mut max = Vec2::splat(f32::MIN);
    for slot in slots {
        min = min.min(slot.offset);
        max = max.max(slot.offset);
    }
    (min, max)
}

fn bounding_extent(slots: &[Slot]) -> (f32, f32) {
    let (min, max) = bounding_box(slots);
    (max.x - min.x, max.y - min.y)
}
