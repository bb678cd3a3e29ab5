//! Infrastructure adapters and runtime bootstrap.

pub mod bootstrap;
pub mod content;
pub mod db;
pub mod error;
pub mod memory;
pub mod render;
pub mod telemetry;
