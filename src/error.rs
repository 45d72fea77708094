//! Error types for carton packing.

use thiserror::Error;

/// Result type alias for packing operations.
pub type Result<T> = std::result::Result<T, PackingError>;

/// Errors that abort a request.
///
/// Per-unit failures (a unit that fits no carton, is too heavy, or cannot be
/// positioned) are not raised; they are collected as [`crate::model::UnplacedReason`]
/// values in the packing result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PackingError {
    /// Malformed item line (non-positive quantity or dimension, bad weight).
    #[error("Invalid item data: {0}")]
    InvalidItemData(String),

    /// Malformed carton type in the catalog.
    #[error("Invalid carton data: {0}")]
    InvalidCartonData(String),

    #[error("No suitable carton for item {item_code}")]
    NoSuitableCarton { item_code: String },

    #[error("Item {item_code} weighs {weight} kg, carton limit is {limit} kg")]
    ItemExceedsCartonWeight {
        item_code: String,
        weight: f64,
        limit: f64,
    },

    /// No calculated result is stored for the pick list.
    #[error("No packing result for pick list {0}")]
    NoPackingResult(String),

    #[error("Invalid carton assignment index {index} ({available} available)")]
    InvalidCartonIndex { index: usize, available: usize },

    #[error("Pick list {0} not found")]
    PickListNotFound(String),

    #[error("Packing calculation for pick list {0} is already running")]
    CalculationInProgress(String),

    /// Stored positions could not be encoded or decoded.
    #[error("Malformed placement data: {0}")]
    MalformedPositions(String),
}
