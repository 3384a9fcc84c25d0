// Coordinate mapping between the focused region and the physical screen.
use serde::{Deserialize, Serialize};

use crate::perception::types::Entity;

/// Translation from region-relative to absolute screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Offset {
    pub dx: i32,
    pub dy: i32,
}

impl Offset {
    pub const ZERO: Offset = Offset { dx: 0, dy: 0 };

    pub fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// `None` when the translated point does not fit in screen coordinates.
    pub fn to_absolute(&self, x: i32, y: i32) -> Option<(i32, i32)> {
        Some((x.checked_add(self.dx)?, y.checked_add(self.dy)?))
    }

    pub fn to_relative(&self, x: i32, y: i32) -> Option<(i32, i32)> {
        Some((x.checked_sub(self.dx)?, y.checked_sub(self.dy)?))
    }
}

/// Click point of an entity, relative to the image it was detected in.
pub fn entity_center(entity: &Entity) -> (i32, i32) {
    entity.bounding_box.center()
}

/// Resolve a label the model referred to. Exact (case-insensitive) match wins,
/// otherwise the first entity whose label contains the target.
pub fn find_entity<'a>(entities: &'a [Entity], target: &str) -> Option<&'a Entity> {
    let needle = target.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    entities
        .iter()
        .find(|e| e.label.to_lowercase() == needle)
        .or_else(|| entities.iter().find(|e| e.label.to_lowercase().contains(&needle)))
}
