//! One perception cycle: capture the focused region, then refresh the world
//! model from it. A failed refresh degrades to the previous entity list.

use crate::errors::AgentResult;
use crate::perception::focus_crop::FocusRegion;
use crate::perception::traits::ScreenCapture;
use crate::perception::types::{Entity, Snapshot};
use crate::perception::world_model::WorldModel;

pub struct Observation {
    pub snapshot: Snapshot,
    pub entities: Vec<Entity>,
    /// True when the refresh failed and `entities` are from an earlier cycle.
    pub stale: bool,
}

pub async fn observe(
    capture: &dyn ScreenCapture,
    region: &FocusRegion,
    world: &WorldModel,
    ignore_list: &[String],
) -> AgentResult<Observation> {
    let snapshot = region.capture(capture).await?;
    match world.refresh(&snapshot.png, ignore_list).await {
        Ok(entities) => Ok(Observation {
            snapshot,
            entities,
            stale: false,
        }),
        Err(e) => {
            tracing::warn!(error = %e, "perception refresh failed, using stale entities");
            Ok(Observation {
                snapshot,
                entities: world.entities(),
                stale: true,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AgentError;
    use crate::llm::gateway::Oracle;
    use crate::llm::types::ModelTier;
    use crate::perception::traits::StaticImageCapture;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Down;

    #[async_trait]
    impl Oracle for Down {
        async fn call(&self, _prompt: &str, _image: Option<&[u8]>, _tier: ModelTier) -> AgentResult<String> {
            Err(AgentError::Oracle("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn oracle_outage_yields_stale_observation() {
        let capture =
            StaticImageCapture::from_image(image::DynamicImage::ImageRgb8(image::RgbImage::new(320, 200)));
        let world = WorldModel::new(Arc::new(Down));
        let obs = observe(&capture, &FocusRegion::full_screen(), &world, &[]).await.unwrap();
        assert!(obs.stale);
        assert!(obs.entities.is_empty());
        assert_eq!((obs.snapshot.width, obs.snapshot.height), (320, 200));
    }
}
