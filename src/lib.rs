//! Carton packing service: assigns pick-list items to carton types, reduces
//! identical cartons to patterns and serves the results over HTTP.

pub mod api;
pub mod candidate;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod geometry;
pub mod model;
pub mod normalizer;
pub mod pattern;
pub mod service;
pub mod solver;
pub mod strategy;
pub mod types;
pub mod wire;

pub use error::{PackingError, Result};
pub use model::{CartonType, Item, PickList, PickListLine};
pub use solver::PackingConfig;
pub use strategy::{PackEvent, PackingResult, Strategy, pack, pack_lines, pack_with_progress};
