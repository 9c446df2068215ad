//! Session-scoped tabular data engine.
//!
//! An upload becomes the session's raw [`Dataset`](data::model::Dataset);
//! cleaning derives a replacement; profiling, charting and regression read
//! whichever dataset is active. [`engine::Engine`] ties these together and
//! [`api`] exposes them as JSON requests.

pub mod analysis;
pub mod api;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod state;

pub use engine::Engine;
pub use error::{EngineError, Result};
