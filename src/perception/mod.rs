pub mod focus_crop;
pub mod pipeline;
pub mod traits;
pub mod types;
pub mod wait;
pub mod world_model;
