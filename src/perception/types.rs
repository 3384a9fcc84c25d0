use serde::{Deserialize, Serialize};

/// Pixel rectangle, relative to the image it was detected in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn center(&self) -> (i32, i32) {
        (
            self.x.saturating_add(self.width / 2),
            self.y.saturating_add(self.height / 2),
        )
    }

    fn right(&self) -> Option<i32> {
        self.x.checked_add(self.width)
    }

    fn bottom(&self) -> Option<i32> {
        self.y.checked_add(self.height)
    }

    /// A rectangle whose edges overflow is never contained.
    pub fn contains_rect(&self, other: &BoundingBox) -> bool {
        let (Some(right), Some(bottom), Some(other_right), Some(other_bottom)) =
            (self.right(), self.bottom(), other.right(), other.bottom())
        else {
            return false;
        };
        other.x >= self.x && other.y >= self.y && other_right <= right && other_bottom <= bottom
    }
}

/// One visible UI element as reported by the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, alias = "box", alias = "bbox")]
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Entity {
    /// Free text used for ignore-list matching.
    pub fn description(&self) -> String {
        let mut text = format!("{} {} {}", self.kind, self.label, self.state);
        if let Some(v) = &self.value {
            text.push(' ');
            text.push_str(v);
        }
        text
    }
}

/// A captured PNG image together with its pixel dimensions.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_accepts_bbox_alias_and_missing_fields() {
        let e: Entity = serde_json::from_str(
            r#"{"kind":"button","label":"Submit","bbox":{"x":10,"y":20,"width":80,"height":30}}"#,
        )
        .unwrap();
        assert_eq!(e.bounding_box.center(), (50, 35));
        assert_eq!(e.state, "");
        assert!(e.value.is_none());
    }

    #[test]
    fn overflowing_rect_is_not_contained() {
        let screen = BoundingBox::new(0, 0, 1920, 1080);
        assert!(screen.contains_rect(&BoundingBox::new(100, 50, 400, 300)));
        assert!(!screen.contains_rect(&BoundingBox::new(2_147_483_000, 0, 1000, 10)));
        assert!(!screen.contains_rect(&BoundingBox::new(0, 10, 10, i32::MAX)));
        assert_eq!(BoundingBox::new(i32::MAX - 1, 0, 10, 10).center(), (i32::MAX, 5));
    }

    #[test]
    fn description_includes_value() {
        let e = Entity {
            kind: "text_field".into(),
            label: "Search".into(),
            bounding_box: BoundingBox::default(),
            state: "focused".into(),
            value: Some("rust".into()),
        };
        assert_eq!(e.description(), "text_field Search focused rust");
    }
}
