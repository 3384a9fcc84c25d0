pub mod loader;
pub mod manager;
pub mod types;

pub use manager::CapabilityGapHandler;
pub use types::GapResolution;
