//! Core agent logic.

pub mod agent_loop;

pub use agent_loop::{Agent, AgentDeps};
