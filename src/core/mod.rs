pub mod context;
pub mod control;
pub mod errors;
pub mod events;
pub mod job;
pub mod models;
pub mod orchestrator;
pub mod phase;
