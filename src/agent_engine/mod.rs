pub mod confidence;
pub mod event_bus;
pub mod foresight;
pub mod history;
pub mod loop_control;
pub mod prompts;
pub mod runtime;
pub mod scratchpad;
pub mod state;
pub mod strategic;
pub mod tactical;
