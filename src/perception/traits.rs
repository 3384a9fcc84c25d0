use std::path::Path;

use async_trait::async_trait;

use crate::errors::{AgentError, AgentResult};
use crate::perception::types::Snapshot;

/// Screen capture backend. Coordinates are absolute screen pixels.
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    async fn capture_region(&self, x: i32, y: i32, width: u32, height: u32) -> AgentResult<Snapshot>;
    async fn capture_full_screen(&self) -> AgentResult<Snapshot>;
}

/// Serves a fixed PNG as "the screen". Used by the CLI dry-run mode.
pub struct StaticImageCapture {
    image: image::DynamicImage,
}

impl StaticImageCapture {
    pub fn from_path(path: &Path) -> AgentResult<Self> {
        let image = image::open(path)
            .map_err(|e| AgentError::Capture(format!("load {}: {e}", path.display())))?;
        Ok(Self { image })
    }

    pub fn from_image(image: image::DynamicImage) -> Self {
        Self { image }
    }
}

#[async_trait]
impl ScreenCapture for StaticImageCapture {
    async fn capture_region(&self, x: i32, y: i32, width: u32, height: u32) -> AgentResult<Snapshot> {
        let (w, h) = (self.image.width(), self.image.height());
        let x = x.max(0) as u32;
        let y = y.max(0) as u32;
        if x >= w || y >= h || width == 0 || height == 0 {
            return Err(AgentError::Capture(format!(
                "region {x},{y} {width}x{height} outside {w}x{h}"
            )));
        }
        let cw = width.min(w - x);
        let ch = height.min(h - y);
        encode_png(&self.image.crop_imm(x, y, cw, ch))
    }

    async fn capture_full_screen(&self) -> AgentResult<Snapshot> {
        encode_png(&self.image)
    }
}

/// Encode an image as PNG.
pub fn encode_png(img: &image::DynamicImage) -> AgentResult<Snapshot> {
    let mut png = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| AgentError::Capture(format!("PNG encode: {e}")))?;
    Ok(Snapshot {
        png,
        width: img.width(),
        height: img.height(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture() -> StaticImageCapture {
        StaticImageCapture::from_image(image::DynamicImage::ImageRgb8(image::RgbImage::new(640, 480)))
    }

    #[tokio::test]
    async fn region_is_clamped_to_image() {
        let snap = capture().capture_region(600, 400, 200, 200).await.unwrap();
        assert_eq!((snap.width, snap.height), (40, 80));
        let decoded = image::load_from_memory(&snap.png).unwrap();
        assert_eq!(decoded.width(), 40);
    }

    #[tokio::test]
    async fn region_outside_image_fails() {
        let err = capture().capture_region(700, 0, 10, 10).await.unwrap_err();
        assert!(matches!(err, AgentError::Capture(_)));
    }
}
