//! Serializable payloads for packing results, summaries and visualization.
//!
//! `positions_3d` is emitted in structured form. Stored or forwarded payloads may
//! carry it as a JSON string instead, so readers go through [`Positions3d::resolve`].

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::error::{PackingError, Result};
use crate::model::{CartonType, Item, UnplacedReason};
use crate::pattern::Pattern;
use crate::strategy::PackingResult;

/// Fallback item colors for the visualizer.
pub const ITEM_PALETTE: [&str; 12] = [
    "#3498db", "#e74c3c", "#2ecc71", "#f39c12", "#9b59b6", "#1abc9c", "#e67e22", "#34495e",
    "#f1c40f", "#c0392b", "#2980b9", "#27ae60",
];

/// Palette color for an item code, stable across runs and processes.
pub fn palette_color(item_code: &str) -> &'static str {
    let digest = Sha256::digest(item_code.as_bytes());
    ITEM_PALETTE[digest[0] as usize % ITEM_PALETTE.len()]
}

fn item_color(item: &Item) -> String {
    item.color
        .clone()
        .unwrap_or_else(|| palette_color(&item.code).to_string())
}

/// One placed unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Position3d {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub rotated: bool,
    #[serde(default)]
    pub unit_index: u32,
}

/// Placements of one carton keyed by item code.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum Positions3d {
    Structured(BTreeMap<String, Vec<Position3d>>),
    /// The structured map as a JSON string.
    Serialized(String),
}

impl Positions3d {
    pub fn from_pattern(pattern: &Pattern) -> Self {
        let mut map: BTreeMap<String, Vec<Position3d>> = BTreeMap::new();
        for p in &pattern.layout.placements {
            map.entry(p.item_code().to_string())
                .or_default()
                .push(Position3d {
                    x: p.position.x,
                    y: p.position.y,
                    z: p.position.z,
                    length: p.dims.x,
                    width: p.dims.y,
                    height: p.dims.z,
                    rotated: p.orientation.is_rotated(),
                    unit_index: p.unit.unit_index,
                });
        }
        Positions3d::Structured(map)
    }

    /// The structured map, parsing the string form if needed.
    pub fn resolve(&self) -> std::result::Result<Cow<'_, BTreeMap<String, Vec<Position3d>>>, serde_json::Error> {
        match self {
            Positions3d::Structured(map) => Ok(Cow::Borrowed(map)),
            Positions3d::Serialized(raw) => serde_json::from_str(raw).map(Cow::Owned),
        }
    }

    /// Converts to the string form.
    pub fn to_serialized(&self) -> std::result::Result<Self, serde_json::Error> {
        match self {
            Positions3d::Structured(map) => serde_json::to_string(map).map(Positions3d::Serialized),
            Positions3d::Serialized(raw) => Ok(Positions3d::Serialized(raw.clone())),
        }
    }

    pub fn unit_count(&self) -> std::result::Result<usize, serde_json::Error> {
        Ok(self.resolve()?.values().map(Vec::len).sum())
    }
}

/// One pattern of the chosen assignment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CartonAssignment {
    pub carton_id: String,
    pub carton_name: String,
    pub material: String,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    /// Physical cartons sharing this layout.
    pub carton_count: usize,
    pub items_per_carton: usize,
    pub total_items: usize,
    /// Volume utilization of one carton in percent.
    pub efficiency: f64,
    pub total_cost: f64,
    pub pattern_signature: String,
    pub item_summary: String,
    pub positions_3d: Positions3d,
}

impl CartonAssignment {
    pub fn from_pattern(pattern: &Pattern) -> Self {
        let carton = pattern.carton();
        Self {
            carton_id: carton.id.clone(),
            carton_name: carton.display_name().to_string(),
            material: carton.material.clone(),
            length: carton.length,
            width: carton.width,
            height: carton.height,
            carton_count: pattern.carton_count,
            items_per_carton: pattern.items_per_carton(),
            total_items: pattern.total_items(),
            efficiency: pattern.efficiency(),
            total_cost: pattern.total_cost(),
            pattern_signature: pattern.signature.clone(),
            item_summary: pattern.item_summary(),
            positions_3d: Positions3d::from_pattern(pattern),
        }
    }
}

/// Units of one item left without a carton for the same reason.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UnplacedItem {
    pub item_code: String,
    pub quantity: usize,
    pub unit_indices: Vec<u32>,
    pub reason_code: UnplacedReason,
    pub reason: String,
}

/// Stored form of a packing result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "packing_strategy": "minimize_cartons_pattern_optimized",
    "total_cartons": 2,
    "unique_patterns": 2,
    "average_efficiency": 62.5,
    "total_packing_cost": 3.0,
    "items_processed": 10,
    "cartons_evaluated": 1,
    "item_groups": 1,
    "is_complete": true,
    "carton_assignments": [],
    "unplaced_items": []
}))]
pub struct PackingSummary {
    pub packing_strategy: String,
    pub total_cartons: usize,
    pub unique_patterns: usize,
    pub average_efficiency: f64,
    pub total_packing_cost: f64,
    pub items_processed: usize,
    pub cartons_evaluated: usize,
    pub item_groups: usize,
    pub is_complete: bool,
    pub carton_assignments: Vec<CartonAssignment>,
    pub unplaced_items: Vec<UnplacedItem>,
}

impl PackingSummary {
    pub fn from_result(result: &PackingResult) -> Self {
        let mut unplaced_items: Vec<UnplacedItem> = Vec::new();
        for u in &result.unplaced {
            let code = u.unit.item_code();
            match unplaced_items
                .iter_mut()
                .find(|entry| entry.item_code == code && entry.reason_code == u.reason)
            {
                Some(entry) => {
                    entry.quantity += 1;
                    entry.unit_indices.push(u.unit.unit_index);
                }
                None => unplaced_items.push(UnplacedItem {
                    item_code: code.to_string(),
                    quantity: 1,
                    unit_indices: vec![u.unit.unit_index],
                    reason_code: u.reason,
                    reason: u.reason.to_string(),
                }),
            }
        }

        Self {
            packing_strategy: result.strategy_label(),
            total_cartons: result.total_cartons,
            unique_patterns: result.unique_patterns(),
            average_efficiency: result.average_efficiency,
            total_packing_cost: result.total_cost,
            items_processed: result.items_processed,
            cartons_evaluated: result.cartons_evaluated,
            item_groups: result.item_groups,
            is_complete: result.is_complete(),
            carton_assignments: result
                .patterns
                .iter()
                .map(CartonAssignment::from_pattern)
                .collect(),
            unplaced_items,
        }
    }

    pub fn unplaced_units(&self) -> usize {
        self.unplaced_items.iter().map(|u| u.quantity).sum()
    }

    /// Same summary with every `positions_3d` in string form.
    pub fn with_serialized_positions(&self) -> Result<Self> {
        let mut copy = self.clone();
        for assignment in &mut copy.carton_assignments {
            assignment.positions_3d = assignment
                .positions_3d
                .to_serialized()
                .map_err(|err| PackingError::MalformedPositions(err.to_string()))?;
        }
        Ok(copy)
    }
}

/// Reply to a packing calculation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CalculatePackingResponse {
    pub success: bool,
    pub message: String,
    pub summary: PackingSummary,
}

impl CalculatePackingResponse {
    pub fn from_summary(summary: PackingSummary) -> Self {
        let message = if summary.is_complete {
            format!(
                "Packed {} items into {} cartons ({} patterns)",
                summary.items_processed, summary.total_cartons, summary.unique_patterns
            )
        } else {
            format!(
                "Packed into {} cartons; {} units could not be placed",
                summary.total_cartons,
                summary.unplaced_units()
            )
        };
        Self {
            success: true,
            message,
            summary,
        }
    }
}

/// Carton geometry for the viewer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CartonGeometry {
    pub id: String,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub material: String,
    pub volume: f64,
}

impl CartonGeometry {
    pub fn from_carton(carton: &CartonType) -> Self {
        Self {
            id: carton.id.clone(),
            length: carton.length,
            width: carton.width,
            height: carton.height,
            material: carton.material.clone(),
            volume: carton.length * carton.width * carton.height,
        }
    }
}

/// A layout to draw, with how many cartons repeat it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VisualizationPattern {
    pub positions_3d: Positions3d,
    pub carton_count: usize,
    pub items_per_carton: usize,
    pub pattern_signature: String,
    pub efficiency: f64,
}

impl VisualizationPattern {
    fn from_assignment(assignment: &CartonAssignment) -> Self {
        Self {
            positions_3d: assignment.positions_3d.clone(),
            carton_count: assignment.carton_count,
            items_per_carton: assignment.items_per_carton,
            pattern_signature: assignment.pattern_signature.clone(),
            efficiency: assignment.efficiency,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ItemInfo {
    pub name: String,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub color: String,
}

/// Everything the 3D viewer needs for one carton assignment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VisualizationData {
    pub carton: CartonGeometry,
    /// Every pattern using the selected carton type, selected one first.
    pub patterns: Vec<VisualizationPattern>,
    pub item_info: BTreeMap<String, ItemInfo>,
    pub total_patterns: usize,
    pub show_multiple: bool,
    /// The selected pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_info: Option<VisualizationPattern>,
}

impl VisualizationData {
    /// Builds the viewer payload for `carton_assignments[carton_index]`.
    ///
    /// `carton` and `items` supply geometry and display data; items missing from
    /// `items` are left out of `item_info`.
    pub fn build(
        summary: &PackingSummary,
        carton_index: usize,
        carton: &CartonType,
        items: &[Item],
    ) -> Result<Self> {
        let selected = summary.carton_assignments.get(carton_index).ok_or(
            PackingError::InvalidCartonIndex {
                index: carton_index,
                available: summary.carton_assignments.len(),
            },
        )?;

        let same_type = summary
            .carton_assignments
            .iter()
            .enumerate()
            .filter(|(idx, a)| *idx != carton_index && a.carton_id == selected.carton_id)
            .map(|(_, a)| a);
        let patterns: Vec<VisualizationPattern> = std::iter::once(selected)
            .chain(same_type)
            .map(VisualizationPattern::from_assignment)
            .collect();

        let mut item_info = BTreeMap::new();
        for pattern in &patterns {
            let positions = pattern
                .positions_3d
                .resolve()
                .map_err(|err| PackingError::MalformedPositions(err.to_string()))?;
            for code in positions.keys() {
                if item_info.contains_key(code) {
                    continue;
                }
                if let Some(item) = items.iter().find(|i| &i.code == code) {
                    item_info.insert(
                        code.clone(),
                        ItemInfo {
                            name: item.display_name().to_string(),
                            length: item.length,
                            width: item.width,
                            height: item.height,
                            color: item_color(item),
                        },
                    );
                }
            }
        }

        Ok(Self {
            carton: CartonGeometry::from_carton(carton),
            total_patterns: patterns.len(),
            show_multiple: patterns.len() > 1,
            pattern_info: patterns.first().cloned(),
            patterns,
            item_info,
        })
    }
}
