//! Focused context: restrict perception to the application window most
//! relevant to the goal, so every later snapshot is smaller and less noisy.
//!
//! Input coordinates produced while focused are relative to the crop and must
//! be translated by the region's [`Offset`] before reaching the input device.

use serde::Deserialize;

use crate::config::FocusConfig;
use crate::errors::AgentResult;
use crate::executor::coordinator::Offset;
use crate::llm::parse::extract_json;
use crate::perception::traits::ScreenCapture;
use crate::perception::types::{BoundingBox, Snapshot};

/// The oracle's answer to "which window matters for this goal".
#[derive(Debug, Clone, Deserialize)]
pub struct FocusProposal {
    #[serde(default = "default_found")]
    pub found_target_application: bool,
    #[serde(default)]
    pub application_name: Option<String>,
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub confidence: f64,
}

fn default_found() -> bool {
    true
}

impl FocusProposal {
    pub fn parse(reply: &str) -> Option<Self> {
        serde_json::from_value(extract_json(reply)?).ok()
    }
}

/// Region all perception for one task is captured from.
#[derive(Debug, Clone, PartialEq)]
pub struct FocusRegion {
    pub bounds: Option<BoundingBox>,
    pub offset: Offset,
}

impl FocusRegion {
    pub fn full_screen() -> Self {
        Self {
            bounds: None,
            offset: Offset::ZERO,
        }
    }

    pub fn is_focused(&self) -> bool {
        self.bounds.is_some()
    }

    /// Accept a proposal only if it is a plausible window on this screen.
    /// The error string explains the rejection for logging.
    pub fn from_proposal(
        proposal: &FocusProposal,
        screen_width: u32,
        screen_height: u32,
        cfg: &FocusConfig,
    ) -> Result<Self, String> {
        if !proposal.found_target_application {
            return Err("no target application found".into());
        }
        if proposal.confidence < cfg.confidence_threshold {
            return Err(format!(
                "confidence {:.2} below {:.2}",
                proposal.confidence, cfg.confidence_threshold
            ));
        }
        let b = proposal.bounding_box;
        if b.width <= 0 || b.height <= 0 {
            return Err(format!("non-positive size {}x{}", b.width, b.height));
        }
        if (b.width as u32) < cfg.min_width || (b.height as u32) < cfg.min_height {
            return Err(format!(
                "window {}x{} smaller than {}x{}",
                b.width, b.height, cfg.min_width, cfg.min_height
            ));
        }
        let screen = BoundingBox::new(0, 0, screen_width as i32, screen_height as i32);
        if !screen.contains_rect(&b) {
            return Err(format!(
                "box ({}, {}, {}x{}) outside screen {}x{}",
                b.x, b.y, b.width, b.height, screen_width, screen_height
            ));
        }
        Ok(Self {
            bounds: Some(b),
            offset: Offset::new(b.x, b.y),
        })
    }

    /// Capture what this region covers.
    pub async fn capture(&self, capture: &dyn ScreenCapture) -> AgentResult<Snapshot> {
        match self.bounds {
            Some(b) => {
                capture
                    .capture_region(b.x, b.y, b.width as u32, b.height as u32)
                    .await
            }
            None => capture.capture_full_screen().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(x: i32, y: i32, w: i32, h: i32, confidence: f64) -> FocusProposal {
        FocusProposal {
            found_target_application: true,
            application_name: Some("Editor".into()),
            bounding_box: BoundingBox::new(x, y, w, h),
            confidence,
        }
    }

    #[test]
    fn valid_window_becomes_offset() {
        let region =
            FocusRegion::from_proposal(&proposal(200, 100, 800, 600, 0.9), 1920, 1080, &FocusConfig::default())
                .unwrap();
        assert!(region.is_focused());
        assert_eq!(region.offset, Offset::new(200, 100));
    }

    #[test]
    fn rejections() {
        let cfg = FocusConfig::default();
        // below confidence threshold
        assert!(FocusRegion::from_proposal(&proposal(0, 0, 800, 600, 0.4), 1920, 1080, &cfg).is_err());
        // too small
        assert!(FocusRegion::from_proposal(&proposal(0, 0, 99, 600, 0.9), 1920, 1080, &cfg).is_err());
        // off screen
        assert!(FocusRegion::from_proposal(&proposal(1500, 0, 800, 600, 0.9), 1920, 1080, &cfg).is_err());
        // zero size
        assert!(FocusRegion::from_proposal(&proposal(0, 0, 0, 600, 0.9), 1920, 1080, &cfg).is_err());
        // edges past i32::MAX
        assert!(FocusRegion::from_proposal(&proposal(2_147_483_000, 0, 1000, 600, 0.9), 1920, 1080, &cfg).is_err());
        assert!(FocusRegion::from_proposal(&proposal(0, 10, 800, i32::MAX, 0.9), 1920, 1080, &cfg).is_err());
    }

    #[test]
    fn parses_oracle_reply() {
        let reply = r#"```json
{"found_target_application": true, "application_name": "Mail",
 "bounding_box": {"x": 10, "y": 20, "width": 640, "height": 480}, "confidence": 0.93}
```"#;
        let p = FocusProposal::parse(reply).unwrap();
        assert_eq!(p.bounding_box, BoundingBox::new(10, 20, 640, 480));
        assert!(FocusProposal::parse("no window").is_none());
    }
}
