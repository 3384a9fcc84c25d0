pub mod document;
pub mod store;

pub use document::{KnowledgeDocument, Objective, StepSpec, Strategy};
pub use store::PlanMemory;
