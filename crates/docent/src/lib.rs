//! Docent - Agent-Scoped Knowledge Retrieval
//!
//! Turns a free-text question into a ranked, budget-limited set of grounding
//! passages drawn from one agent's knowledge sections, ready to be placed in
//! a completion prompt.

pub mod cli;
pub mod config;
pub mod errors;
pub mod models;
pub mod services;
