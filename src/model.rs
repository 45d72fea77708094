//! Data model for a packing run.
//!
//! - `Item` / `PickListLine` / `PickList`: what has to be shipped
//! - `CartonType`: reference data for the box types on hand
//! - `PackUnit`: one physical unit of an item, produced by the normalizer
//! - `Placement` / `CartonInstance`: where units ended up
//!
//! Everything here is created fresh for each calculation and immutable once loaded,
//! except `CartonInstance`, which the solver fills while it owns it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use utoipa::ToSchema;

use crate::error::{PackingError, Result};
use crate::types::{BoundingBox, Dimensional, Positioned, Vec3, Weighted};

fn validate_dimension(value: f64, name: &str, owner: &str) -> std::result::Result<(), String> {
    if value <= 0.0 || !value.is_finite() {
        return Err(format!("{owner}: {name} must be positive, got: {value}"));
    }
    Ok(())
}

fn validate_dims(dims: Vec3, owner: &str) -> std::result::Result<(), String> {
    validate_dimension(dims.x, "Length", owner)?;
    validate_dimension(dims.y, "Width", owner)?;
    validate_dimension(dims.z, "Height", owner)?;
    Ok(())
}

/// An axis permutation applied to an item's (length, width, height).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Lwh,
    Lhw,
    Wlh,
    Whl,
    Hlw,
    Hwl,
}

impl Orientation {
    /// Canonical search order.
    pub const ALL: [Orientation; 6] = [
        Orientation::Lwh,
        Orientation::Lhw,
        Orientation::Wlh,
        Orientation::Whl,
        Orientation::Hlw,
        Orientation::Hwl,
    ];

    /// Orientations that keep the item's height vertical.
    pub const UPRIGHT: [Orientation; 2] = [Orientation::Lwh, Orientation::Wlh];

    /// Dimensions of an item with base dimensions `dims` in this orientation.
    pub fn apply(self, dims: Vec3) -> Vec3 {
        let (l, w, h) = dims.as_tuple();
        match self {
            Orientation::Lwh => Vec3::new(l, w, h),
            Orientation::Lhw => Vec3::new(l, h, w),
            Orientation::Wlh => Vec3::new(w, l, h),
            Orientation::Whl => Vec3::new(w, h, l),
            Orientation::Hlw => Vec3::new(h, l, w),
            Orientation::Hwl => Vec3::new(h, w, l),
        }
    }

    pub fn is_rotated(self) -> bool {
        self != Orientation::Lwh
    }
}

/// Which orientations an item may be placed in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RotationPolicy {
    /// All six axis permutations.
    #[default]
    Any,
    /// Height must stay vertical (no tipping or inversion).
    Upright,
    /// Only the catalog orientation.
    Fixed,
}

impl RotationPolicy {
    pub fn orientations(self) -> &'static [Orientation] {
        match self {
            RotationPolicy::Any => &Orientation::ALL,
            RotationPolicy::Upright => &Orientation::UPRIGHT,
            RotationPolicy::Fixed => &Orientation::ALL[..1],
        }
    }
}

/// An item as loaded from the pick list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "code": "ITEM-001",
    "name": "Ceramic mug",
    "length": 12.0,
    "width": 9.0,
    "height": 10.0,
    "weight": 0.4,
    "fragile": true
}))]
pub struct Item {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub weight: f64,
    /// Display color for the visualizer (`#rrggbb`).
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub fragile: bool,
    /// Falls back to `upright` for fragile items and `any` otherwise.
    #[serde(default)]
    pub rotation: Option<RotationPolicy>,
}

impl Item {
    /// Creates an item with default name, color and rotation policy.
    pub fn new(code: impl Into<String>, dims: (f64, f64, f64), weight: f64) -> Result<Self> {
        let item = Self {
            code: code.into(),
            name: None,
            length: dims.0,
            width: dims.1,
            height: dims.2,
            weight,
            color: None,
            fragile: false,
            rotation: None,
        };
        item.validate()?;
        Ok(item)
    }

    pub fn with_rotation(mut self, policy: RotationPolicy) -> Self {
        self.rotation = Some(policy);
        self
    }

    pub fn fragile(mut self) -> Self {
        self.fragile = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.code.trim().is_empty() {
            return Err(PackingError::InvalidItemData(
                "Item code must not be empty".to_string(),
            ));
        }
        validate_dims(self.dims(), &self.code).map_err(PackingError::InvalidItemData)?;
        if self.weight < 0.0 || !self.weight.is_finite() {
            return Err(PackingError::InvalidItemData(format!(
                "{}: Weight must not be negative, got: {}",
                self.code, self.weight
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn dims(&self) -> Vec3 {
        Vec3::new(self.length, self.width, self.height)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.code)
    }

    pub fn rotation_policy(&self) -> RotationPolicy {
        match self.rotation {
            Some(policy) => policy,
            None if self.fragile => RotationPolicy::Upright,
            None => RotationPolicy::Any,
        }
    }

    /// Legal oriented dimensions, in canonical order, without duplicates
    /// (a cube has only one).
    pub fn oriented_dims(&self) -> Vec<(Orientation, Vec3)> {
        let mut result: Vec<(Orientation, Vec3)> = Vec::with_capacity(6);
        for &orientation in self.rotation_policy().orientations() {
            let dims = orientation.apply(self.dims());
            if !result.iter().any(|(_, seen)| *seen == dims) {
                result.push((orientation, dims));
            }
        }
        result
    }
}

impl Dimensional for Item {
    fn dimensions(&self) -> Vec3 {
        self.dims()
    }
}

impl Weighted for Item {
    fn weight(&self) -> f64 {
        self.weight
    }
}

/// One line of a pick list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PickListLine {
    pub item: Item,
    pub quantity: u32,
}

/// A pick list: the unit of input to a packing calculation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PickList {
    pub id: String,
    pub lines: Vec<PickListLine>,
}

/// A box type from the carton catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "CTN-M",
    "length": 40.0,
    "width": 30.0,
    "height": 30.0,
    "max_weight": 20.0,
    "material": "Cardboard",
    "cost": 1.2
}))]
pub struct CartonType {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub max_weight: f64,
    #[serde(default = "default_material")]
    pub material: String,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub fragile_safe: bool,
}

fn default_material() -> String {
    "Cardboard".to_string()
}

impl CartonType {
    pub fn new(
        id: impl Into<String>,
        dims: (f64, f64, f64),
        max_weight: f64,
        cost: f64,
    ) -> Result<Self> {
        let carton = Self {
            id: id.into(),
            name: None,
            length: dims.0,
            width: dims.1,
            height: dims.2,
            max_weight,
            material: default_material(),
            cost,
            disabled: false,
            fragile_safe: false,
        };
        carton.validate()?;
        Ok(carton)
    }

    pub fn fragile_safe(mut self) -> Self {
        self.fragile_safe = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(PackingError::InvalidCartonData(
                "Carton id must not be empty".to_string(),
            ));
        }
        validate_dims(self.dims(), &self.id).map_err(PackingError::InvalidCartonData)?;
        if self.max_weight <= 0.0 || !self.max_weight.is_finite() {
            return Err(PackingError::InvalidCartonData(format!(
                "{}: Max weight must be positive, got: {}",
                self.id, self.max_weight
            )));
        }
        if self.cost < 0.0 || !self.cost.is_finite() {
            return Err(PackingError::InvalidCartonData(format!(
                "{}: Cost must not be negative, got: {}",
                self.id, self.cost
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn dims(&self) -> Vec3 {
        Vec3::new(self.length, self.width, self.height)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn interior(&self) -> BoundingBox {
        BoundingBox::from_position_and_dims(Vec3::zero(), self.dims())
    }

    /// Whether the item may go into this carton at all (status and fragility).
    pub fn accepts(&self, item: &Item) -> bool {
        !self.disabled && (!item.fragile || self.fragile_safe)
    }

}

impl Dimensional for CartonType {
    fn dimensions(&self) -> Vec3 {
        self.dims()
    }
}

/// One physical unit of an item.
#[derive(Clone, Debug, PartialEq)]
pub struct PackUnit {
    pub item: Arc<Item>,
    /// 1-based index among the units of the same item.
    pub unit_index: u32,
}

impl PackUnit {
    pub fn item_code(&self) -> &str {
        &self.item.code
    }
}

impl Dimensional for PackUnit {
    fn dimensions(&self) -> Vec3 {
        self.item.dims()
    }
}

impl Weighted for PackUnit {
    fn weight(&self) -> f64 {
        self.item.weight
    }
}

/// A unit positioned inside a carton instance.
#[derive(Clone, Debug, PartialEq)]
pub struct Placement {
    pub unit: PackUnit,
    /// Lower-left-front corner.
    pub position: Vec3,
    /// Dimensions after rotation.
    pub dims: Vec3,
    pub orientation: Orientation,
}

impl Placement {
    pub fn item_code(&self) -> &str {
        self.unit.item_code()
    }

    #[inline]
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_position_and_dims(self.position, self.dims)
    }
}

impl Positioned for Placement {
    fn position(&self) -> Vec3 {
        self.position
    }
}

impl Dimensional for Placement {
    fn dimensions(&self) -> Vec3 {
        self.dims
    }
}

impl Weighted for Placement {
    fn weight(&self) -> f64 {
        self.unit.item.weight
    }
}

/// One physical carton of a given type and the units placed in it.
#[derive(Clone, Debug, PartialEq)]
pub struct CartonInstance {
    pub carton: Arc<CartonType>,
    pub placements: Vec<Placement>,
}

impl CartonInstance {
    pub fn new(carton: Arc<CartonType>) -> Self {
        Self {
            carton,
            placements: Vec::new(),
        }
    }

    pub fn total_weight(&self) -> f64 {
        self.placements.iter().map(|p| p.weight()).sum()
    }

    pub fn remaining_weight(&self) -> f64 {
        self.carton.max_weight - self.total_weight()
    }

    /// Sum of placed unit volumes.
    pub fn utilized_volume(&self) -> f64 {
        self.placements.iter().map(|p| p.volume()).sum()
    }

    pub fn carton_volume(&self) -> f64 {
        self.carton.volume()
    }

    pub fn unused_volume(&self) -> f64 {
        (self.carton_volume() - self.utilized_volume()).max(0.0)
    }

    /// Volume utilization in percent (0.0 to 100.0).
    pub fn efficiency_percent(&self) -> f64 {
        let total = self.carton_volume();
        if total <= 0.0 {
            return 0.0;
        }
        (self.utilized_volume() / total * 100.0).clamp(0.0, 100.0)
    }

    pub fn unit_count(&self) -> usize {
        self.placements.len()
    }
}

impl Dimensional for CartonInstance {
    fn dimensions(&self) -> Vec3 {
        self.carton.dims()
    }
}

/// Why a unit ended up without a carton.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UnplacedReason {
    /// No eligible carton type contains the unit in any legal orientation.
    NoSuitableCarton,
    /// The unit fits some carton type dimensionally but is heavier than its limit.
    ItemExceedsCartonWeight,
    /// No position was found even in an empty carton.
    UnplaceableItem,
    /// The search budget ran out before the unit was tried.
    SearchBudgetExhausted,
}

impl UnplacedReason {
    /// Per-unit failures that are recorded instead of aborting the calculation.
    pub fn from_error(err: &PackingError) -> Option<Self> {
        match err {
            PackingError::NoSuitableCarton { .. } => Some(UnplacedReason::NoSuitableCarton),
            PackingError::ItemExceedsCartonWeight { .. } => {
                Some(UnplacedReason::ItemExceedsCartonWeight)
            }
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            UnplacedReason::NoSuitableCarton => "no_suitable_carton",
            UnplacedReason::ItemExceedsCartonWeight => "item_exceeds_carton_weight",
            UnplacedReason::UnplaceableItem => "unplaceable_item",
            UnplacedReason::SearchBudgetExhausted => "search_budget_exhausted",
        }
    }
}

impl std::fmt::Display for UnplacedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnplacedReason::NoSuitableCarton => {
                write!(f, "No available carton type can hold the item in any orientation")
            }
            UnplacedReason::ItemExceedsCartonWeight => {
                write!(f, "Item exceeds the weight limit of every fitting carton type")
            }
            UnplacedReason::UnplaceableItem => {
                write!(f, "No valid position found inside an empty carton")
            }
            UnplacedReason::SearchBudgetExhausted => {
                write!(f, "Search budget exhausted before the item could be placed")
            }
        }
    }
}

/// A unit that could not be assigned to any carton.
#[derive(Clone, Debug, PartialEq)]
pub struct UnplacedUnit {
    pub unit: PackUnit,
    pub reason: UnplacedReason,
}
