//! CLI command handlers.

pub mod deploy;
pub mod package;
pub mod plan;
pub mod remove;
pub mod status;
pub mod util;
