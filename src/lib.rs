pub mod actuator;
pub mod backend;
pub mod client;
pub mod config;
pub mod criteria;
pub mod detector;
pub mod layout;
pub mod orchestrator;
pub mod prompt;
pub mod state;
