//! Greedy 3D placement of units into cartons of a single type.
//!
//! Units are processed in a fixed order (largest volume first, then item code,
//! then unit index). For each unit every legal orientation is tried in canonical
//! order and, per orientation, every anchor candidate in ascending (z, y, x)
//! order. The first anchor that is inside the carton, free of overlaps and
//! supported from below is taken.
//!
//! Anchor candidates are the carton origin plus, for every placed unit, the three
//! corners touching its right, back and top faces. Each instance keeps them in an
//! [`AnchorSet`] that drops points once a unit covers them or the wall leaves no
//! room for the smallest remaining unit.
//!
//! A carton instance is filled until no remaining unit fits; the leftover units are
//! then carried over to a fresh instance of the same type.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::{PackingError, Result};
use crate::evaluator::EfficiencyAveraging;
use crate::geometry::{intersects, is_supported};
use crate::model::{
    CartonInstance, CartonType, Item, Orientation, PackUnit, Placement, UnplacedReason,
    UnplacedUnit,
};
use crate::types::{BoundingBox, Dimensional, Vec3, Weighted};

/// Settings for the packing algorithm.
#[derive(Copy, Clone, Debug)]
pub struct PackingConfig {
    /// Minimum fraction of the base that must rest on other units (0.0 to 1.0).
    /// 0.0 accepts any positive contact.
    pub support_ratio: f64,
    /// Tolerance for "resting on" checks.
    pub height_epsilon: f64,
    /// General numeric tolerance.
    pub general_epsilon: f64,
    /// Anchor checks allowed per carton-type trial before giving up.
    pub max_position_checks: u64,
    /// When false, every item is packed in its catalog orientation.
    pub allow_item_rotation: bool,
    pub efficiency_averaging: EfficiencyAveraging,
    /// Run carton-type trials on the rayon pool.
    pub parallel_trials: bool,
}

impl PackingConfig {
    pub const DEFAULT_SUPPORT_RATIO: f64 = 0.0;
    pub const DEFAULT_HEIGHT_EPSILON: f64 = 1e-3;
    pub const DEFAULT_GENERAL_EPSILON: f64 = 1e-6;
    pub const DEFAULT_MAX_POSITION_CHECKS: u64 = 2_000_000;
    pub const DEFAULT_ALLOW_ITEM_ROTATION: bool = true;
    pub const DEFAULT_PARALLEL_TRIALS: bool = true;

    pub fn builder() -> PackingConfigBuilder {
        PackingConfigBuilder::default()
    }
}

impl Default for PackingConfig {
    fn default() -> Self {
        Self {
            support_ratio: Self::DEFAULT_SUPPORT_RATIO,
            height_epsilon: Self::DEFAULT_HEIGHT_EPSILON,
            general_epsilon: Self::DEFAULT_GENERAL_EPSILON,
            max_position_checks: Self::DEFAULT_MAX_POSITION_CHECKS,
            allow_item_rotation: Self::DEFAULT_ALLOW_ITEM_ROTATION,
            efficiency_averaging: EfficiencyAveraging::default(),
            parallel_trials: Self::DEFAULT_PARALLEL_TRIALS,
        }
    }
}

/// Builder for [`PackingConfig`].
#[derive(Clone, Debug, Default)]
pub struct PackingConfigBuilder {
    config: PackingConfig,
}

impl PackingConfigBuilder {
    pub fn support_ratio(mut self, ratio: f64) -> Self {
        self.config.support_ratio = ratio;
        self
    }

    pub fn height_epsilon(mut self, epsilon: f64) -> Self {
        self.config.height_epsilon = epsilon;
        self
    }

    pub fn general_epsilon(mut self, epsilon: f64) -> Self {
        self.config.general_epsilon = epsilon;
        self
    }

    pub fn max_position_checks(mut self, checks: u64) -> Self {
        self.config.max_position_checks = checks;
        self
    }

    pub fn allow_item_rotation(mut self, allow: bool) -> Self {
        self.config.allow_item_rotation = allow;
        self
    }

    pub fn efficiency_averaging(mut self, mode: EfficiencyAveraging) -> Self {
        self.config.efficiency_averaging = mode;
        self
    }

    pub fn parallel_trials(mut self, parallel: bool) -> Self {
        self.config.parallel_trials = parallel;
        self
    }

    pub fn build(self) -> PackingConfig {
        self.config
    }
}

/// Countdown of anchor checks for one trial.
#[derive(Clone, Debug)]
pub struct SearchBudget {
    remaining: u64,
}

impl SearchBudget {
    pub fn new(limit: u64) -> Self {
        Self { remaining: limit }
    }

    /// Consumes one check. Returns false once the budget is spent.
    fn consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Outcome of packing a unit sequence into one carton type.
#[derive(Clone, Debug, Default)]
pub struct SolveOutcome {
    pub instances: Vec<CartonInstance>,
    /// Units this carton type cannot take, with the reason.
    pub rejected: Vec<UnplacedUnit>,
}

/// Sorts units into packing order: descending volume, then item code, then unit index.
pub fn sort_packing_order(units: &mut [PackUnit]) {
    units.sort_by(|a, b| {
        b.volume()
            .partial_cmp(&a.volume())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.item_code().cmp(b.item_code()))
            .then_with(|| a.unit_index.cmp(&b.unit_index))
    });
}

/// Checks whether a unit can go into an empty carton of this type at all.
///
/// Weight is checked before any placement attempt.
pub fn check_unit_fits(carton: &CartonType, unit: &PackUnit, config: &PackingConfig) -> Result<()> {
    let item = &unit.item;
    let fits = carton.accepts(item)
        && legal_orientations(unit, config)
            .iter()
            .any(|(_, dims)| dims.fits_within(&carton.dims(), config.general_epsilon));
    if !fits {
        return Err(PackingError::NoSuitableCarton {
            item_code: item.code.clone(),
        });
    }
    if item.weight > carton.max_weight + config.general_epsilon {
        return Err(PackingError::ItemExceedsCartonWeight {
            item_code: item.code.clone(),
            weight: item.weight,
            limit: carton.max_weight,
        });
    }
    Ok(())
}

fn legal_orientations(unit: &PackUnit, config: &PackingConfig) -> Vec<(Orientation, Vec3)> {
    let mut orientations = unit.item.oriented_dims();
    if !config.allow_item_rotation {
        orientations.truncate(1);
    }
    orientations
}

/// Packs `units` into as many instances of `carton` as needed.
///
/// Units this carton type can never take are returned in `rejected` with
/// `NoSuitableCarton` or `ItemExceedsCartonWeight`. When the budget runs out, every
/// unit not yet placed is rejected with `SearchBudgetExhausted`.
pub fn pack_into_carton_type(
    mut units: Vec<PackUnit>,
    carton: &Arc<CartonType>,
    config: &PackingConfig,
    budget: &mut SearchBudget,
) -> SolveOutcome {
    sort_packing_order(&mut units);

    let mut outcome = SolveOutcome::default();
    let mut remaining: Vec<PackUnit> = Vec::with_capacity(units.len());
    for unit in units {
        match check_unit_fits(carton, &unit, config) {
            Ok(()) => remaining.push(unit),
            Err(err) => {
                let reason =
                    UnplacedReason::from_error(&err).unwrap_or(UnplacedReason::UnplaceableItem);
                outcome.rejected.push(UnplacedUnit { unit, reason });
            }
        }
    }

    while !remaining.is_empty() {
        let mut instance = CartonInstance::new(Arc::clone(carton));
        let mut anchors = AnchorSet::new(smallest_side(&remaining));
        let mut deferred: Vec<PackUnit> = Vec::new();
        // Units of one item are adjacent; after a miss the next unit of the same item
        // sees the same instance and misses too.
        let mut missed_item: Option<Arc<Item>> = None;
        let mut units_iter = remaining.into_iter();
        let mut out_of_budget = false;

        for unit in units_iter.by_ref() {
            if missed_item
                .as_ref()
                .is_some_and(|item| Arc::ptr_eq(item, &unit.item))
            {
                deferred.push(unit);
                continue;
            }
            match find_position(&instance, &anchors, &unit, config, budget) {
                Ok(Some((orientation, position, dims))) => {
                    instance.placements.push(Placement {
                        unit,
                        position,
                        dims,
                        orientation,
                    });
                    anchors.record_last(&instance, config.general_epsilon);
                    missed_item = None;
                }
                Ok(None) => {
                    missed_item = Some(Arc::clone(&unit.item));
                    deferred.push(unit);
                }
                Err(()) => {
                    deferred.push(unit);
                    out_of_budget = true;
                    break;
                }
            }
        }

        if out_of_budget {
            log::warn!(
                "⚠️ Search budget exhausted while packing carton type {}",
                carton.id
            );
            if !instance.placements.is_empty() {
                outcome.instances.push(instance);
            }
            outcome.rejected.extend(
                deferred
                    .into_iter()
                    .chain(units_iter)
                    .map(|unit| UnplacedUnit {
                        unit,
                        reason: UnplacedReason::SearchBudgetExhausted,
                    }),
            );
            break;
        }

        if instance.placements.is_empty() {
            // Nothing fits even an empty carton.
            outcome
                .rejected
                .extend(deferred.into_iter().map(|unit| UnplacedUnit {
                    unit,
                    reason: UnplacedReason::UnplaceableItem,
                }));
            break;
        }

        outcome.instances.push(instance);
        remaining = deferred;
    }

    outcome
}

/// Smallest edge over all units; a lower bound for any unit's extent on any axis.
fn smallest_side(units: &[PackUnit]) -> f64 {
    units
        .iter()
        .map(|u| u.dimensions().sorted_components()[0])
        .fold(f64::INFINITY, f64::min)
}

/// Anchor points of one carton instance, ascending by (z, y, x), without duplicates.
///
/// Only points a unit could still start at are kept. A point inside a placed unit
/// fails the overlap check for every unit, and a point closer to a wall than
/// `min_side` fails the containment check, so dropping them does not change which
/// anchor is found first.
#[derive(Clone, Debug)]
struct AnchorSet {
    points: Vec<Vec3>,
    min_side: f64,
}

impl AnchorSet {
    fn new(min_side: f64) -> Self {
        Self {
            points: vec![Vec3::zero()],
            min_side,
        }
    }

    fn points(&self) -> &[Vec3] {
        &self.points
    }

    /// Updates the set after a unit was pushed onto `instance`.
    fn record_last(&mut self, instance: &CartonInstance, tolerance: f64) {
        let Some(placed) = instance.placements.last() else {
            return;
        };
        let placed_box = placed.bounding_box();
        self.points
            .retain(|&point| !covers(&placed_box, point, tolerance));

        let limit = instance.carton.interior().max;
        let (min, max) = (placed_box.min, placed_box.max);
        for point in [
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(min.x, max.y, min.z),
            Vec3::new(min.x, min.y, max.z),
        ] {
            let has_room = limit.x - point.x >= self.min_side - tolerance
                && limit.y - point.y >= self.min_side - tolerance
                && limit.z - point.z >= self.min_side - tolerance;
            let covered = instance
                .placements
                .iter()
                .any(|p| covers(&p.bounding_box(), point, tolerance));
            if has_room && !covered {
                self.insert(point);
            }
        }
    }

    fn insert(&mut self, point: Vec3) {
        if let Err(pos) = self.points.binary_search_by(|p| anchor_order(p, &point)) {
            self.points.insert(pos, point);
        }
    }
}

fn anchor_order(a: &Vec3, b: &Vec3) -> Ordering {
    a.z.total_cmp(&b.z)
        .then_with(|| a.y.total_cmp(&b.y))
        .then_with(|| a.x.total_cmp(&b.x))
}

/// Whether a unit starting at `point` would overlap `placed` whatever its size.
fn covers(placed: &BoundingBox, point: Vec3, tolerance: f64) -> bool {
    point.x >= placed.min.x - tolerance
        && point.x < placed.max.x - tolerance
        && point.y >= placed.min.y - tolerance
        && point.y < placed.max.y - tolerance
        && point.z >= placed.min.z - tolerance
        && point.z < placed.max.z - tolerance
}

/// First valid (orientation, anchor, oriented dims) for `unit`, `Ok(None)` if there is
/// none, `Err(())` when the budget ran out.
fn find_position(
    instance: &CartonInstance,
    anchors: &AnchorSet,
    unit: &PackUnit,
    config: &PackingConfig,
    budget: &mut SearchBudget,
) -> std::result::Result<Option<(Orientation, Vec3, Vec3)>, ()> {
    if unit.weight() > instance.remaining_weight() + config.general_epsilon {
        return Ok(None);
    }

    let interior = instance.carton.interior();

    for (orientation, dims) in legal_orientations(unit, config) {
        if !dims.fits_within(&interior.max, config.general_epsilon) {
            continue;
        }

        for &anchor in anchors.points() {
            if !budget.consume() {
                return Err(());
            }
            if is_valid_anchor(instance, &interior, anchor, dims, config) {
                return Ok(Some((orientation, anchor, dims)));
            }
        }
    }

    Ok(None)
}

fn is_valid_anchor(
    instance: &CartonInstance,
    interior: &BoundingBox,
    anchor: Vec3,
    dims: Vec3,
    config: &PackingConfig,
) -> bool {
    let candidate = BoundingBox::from_position_and_dims(anchor, dims);
    if !interior.contains_box(&candidate, config.general_epsilon) {
        return false;
    }
    if instance
        .placements
        .iter()
        .any(|p| p.bounding_box().intersects(&candidate, config.general_epsilon))
    {
        return false;
    }
    is_supported(
        anchor,
        dims,
        &instance.placements,
        config.support_ratio,
        config.height_epsilon,
    )
}

/// Checks the placement invariants of an instance: every unit inside the carton,
/// no two units overlapping.
///
/// `tolerance` is the slack allowed on both checks; 0.0 demands exact containment
/// and at most touching faces.
pub fn validate_instance(instance: &CartonInstance, tolerance: f64) -> bool {
    let interior = instance.carton.interior();
    let inside = instance
        .placements
        .iter()
        .all(|p| p.position.z >= 0.0 && interior.contains_box(&p.bounding_box(), tolerance));
    let disjoint = instance.placements.iter().enumerate().all(|(i, a)| {
        instance.placements[i + 1..]
            .iter()
            .all(|b| !intersects(a, b, tolerance))
    });
    inside && disjoint
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PickListLine, RotationPolicy};
    use crate::normalizer::normalize;
    use crate::types::EPSILON_GENERAL;

    fn units(item: Item, quantity: u32) -> Vec<PackUnit> {
        normalize(&[PickListLine { item, quantity }]).unwrap().units
    }

    fn carton(dims: (f64, f64, f64), max_weight: f64) -> Arc<CartonType> {
        Arc::new(CartonType::new("C", dims, max_weight, 1.0).unwrap())
    }

    fn budget() -> SearchBudget {
        SearchBudget::new(PackingConfig::DEFAULT_MAX_POSITION_CHECKS)
    }

    #[test]
    fn ten_cubes_fill_a_two_by_two_by_two_carton_then_spill_over() {
        let config = PackingConfig::default();
        let item = Item::new("CUBE", (10.0, 10.0, 10.0), 1.0).unwrap();
        let outcome = pack_into_carton_type(
            units(item, 10),
            &carton((20.0, 20.0, 20.0), 100.0),
            &config,
            &mut budget(),
        );

        assert!(outcome.rejected.is_empty());
        assert_eq!(outcome.instances.len(), 2);
        assert_eq!(outcome.instances[0].unit_count(), 8);
        assert_eq!(outcome.instances[1].unit_count(), 2);
        for instance in &outcome.instances {
            assert!(validate_instance(instance, 0.0));
        }
    }

    #[test]
    fn first_unit_snaps_to_origin() {
        let config = PackingConfig::default();
        let item = Item::new("A", (5.0, 5.0, 5.0), 1.0).unwrap();
        let outcome = pack_into_carton_type(
            units(item, 1),
            &carton((20.0, 20.0, 20.0), 100.0),
            &config,
            &mut budget(),
        );
        assert_eq!(outcome.instances[0].placements[0].position, Vec3::zero());
    }

    #[test]
    fn fills_floor_before_stacking() {
        let config = PackingConfig::default();
        let item = Item::new("A", (10.0, 10.0, 10.0), 1.0).unwrap();
        let outcome = pack_into_carton_type(
            units(item, 5),
            &carton((20.0, 20.0, 20.0), 100.0),
            &config,
            &mut budget(),
        );
        let placements = &outcome.instances[0].placements;
        let positions: Vec<_> = placements.iter().map(|p| p.position.as_tuple()).collect();
        assert_eq!(
            positions,
            vec![
                (0.0, 0.0, 0.0),
                (10.0, 0.0, 0.0),
                (0.0, 10.0, 0.0),
                (10.0, 10.0, 0.0),
                (0.0, 0.0, 10.0),
            ]
        );
    }

    #[test]
    fn rotates_long_items_into_tall_cartons() {
        let config = PackingConfig::default();
        let item = Item::new("ROD", (30.0, 5.0, 5.0), 1.0).unwrap();
        let outcome = pack_into_carton_type(
            units(item, 1),
            &carton((10.0, 10.0, 40.0), 100.0),
            &config,
            &mut budget(),
        );
        let placement = &outcome.instances[0].placements[0];
        assert_eq!(placement.dims, Vec3::new(5.0, 5.0, 30.0));
        assert!(placement.orientation.is_rotated());
    }

    #[test]
    fn fixed_orientation_items_are_rejected_when_only_a_rotation_fits() {
        let config = PackingConfig::default();
        let item = Item::new("ROD", (30.0, 5.0, 5.0), 1.0)
            .unwrap()
            .with_rotation(RotationPolicy::Fixed);
        let outcome = pack_into_carton_type(
            units(item, 1),
            &carton((10.0, 10.0, 40.0), 100.0),
            &config,
            &mut budget(),
        );
        assert!(outcome.instances.is_empty());
        assert_eq!(outcome.rejected[0].reason, UnplacedReason::NoSuitableCarton);
    }

    #[test]
    fn global_rotation_switch_pins_orientation() {
        let config = PackingConfig::builder().allow_item_rotation(false).build();
        let item = Item::new("ROD", (30.0, 5.0, 5.0), 1.0).unwrap();
        let outcome = pack_into_carton_type(
            units(item, 1),
            &carton((10.0, 10.0, 40.0), 100.0),
            &config,
            &mut budget(),
        );
        assert_eq!(outcome.rejected.len(), 1);
    }

    #[test]
    fn too_heavy_units_are_rejected_before_placement() {
        let config = PackingConfig::default();
        let item = Item::new("LEAD", (5.0, 5.0, 5.0), 25.0).unwrap();
        let outcome = pack_into_carton_type(
            units(item, 2),
            &carton((10.0, 10.0, 10.0), 10.0),
            &config,
            &mut budget(),
        );
        assert!(outcome.instances.is_empty());
        assert_eq!(outcome.rejected.len(), 2);
        assert!(
            outcome
                .rejected
                .iter()
                .all(|r| r.reason == UnplacedReason::ItemExceedsCartonWeight)
        );
    }

    #[test]
    fn weight_limit_opens_additional_cartons() {
        let config = PackingConfig::default();
        let item = Item::new("HEAVY", (10.0, 10.0, 10.0), 300.0).unwrap();
        let outcome = pack_into_carton_type(
            units(item, 3),
            &carton((20.0, 20.0, 20.0), 400.0),
            &config,
            &mut budget(),
        );
        assert_eq!(outcome.instances.len(), 3);
        assert!(outcome.instances.iter().all(|i| i.unit_count() == 1));
    }

    #[test]
    fn no_floating_placements() {
        let config = PackingConfig::default();
        let small = Item::new("S", (5.0, 5.0, 5.0), 1.0).unwrap();
        let big = Item::new("B", (20.0, 20.0, 5.0), 1.0).unwrap();
        let mut all = units(small, 1);
        all.extend(units(big, 1));

        let outcome =
            pack_into_carton_type(all, &carton((20.0, 20.0, 20.0), 100.0), &config, &mut budget());

        for instance in &outcome.instances {
            for p in &instance.placements {
                assert!(is_supported(
                    p.position,
                    p.dims,
                    &instance
                        .placements
                        .iter()
                        .filter(|other| *other != p)
                        .cloned()
                        .collect::<Vec<_>>(),
                    0.0,
                    config.height_epsilon
                ));
            }
        }
    }

    #[test]
    fn exhausted_budget_reports_remaining_units() {
        let config = PackingConfig::default();
        let item = Item::new("A", (10.0, 10.0, 10.0), 1.0).unwrap();
        let mut tiny = SearchBudget::new(3);
        let outcome =
            pack_into_carton_type(units(item, 10), &carton((20.0, 20.0, 20.0), 100.0), &config, &mut tiny);

        let placed: usize = outcome.instances.iter().map(|i| i.unit_count()).sum();
        assert_eq!(placed + outcome.rejected.len(), 10);
        assert!(tiny.is_exhausted());
        assert!(
            outcome
                .rejected
                .iter()
                .all(|r| r.reason == UnplacedReason::SearchBudgetExhausted)
        );
    }

    #[test]
    fn large_orders_open_further_cartons_within_the_default_budget() {
        let config = PackingConfig::default();
        let item = Item::new("SOAP", (8.0, 5.0, 3.0), 0.01).unwrap();
        let mut budget = budget();
        let outcome = pack_into_carton_type(
            units(item, 2000),
            &carton((60.0, 60.0, 60.0), 1000.0),
            &config,
            &mut budget,
        );

        assert!(outcome.rejected.is_empty());
        assert_eq!(outcome.instances.len(), 2);
        let placed: usize = outcome.instances.iter().map(|i| i.unit_count()).sum();
        assert_eq!(placed, 2000);
        assert!(!budget.is_exhausted());
        for instance in &outcome.instances {
            assert!(validate_instance(instance, 0.0));
        }
    }

    #[test]
    fn anchor_set_drops_covered_and_cramped_points() {
        let item = Arc::new(Item::new("A", (10.0, 10.0, 10.0), 1.0).unwrap());
        let mut instance = CartonInstance::new(carton((20.0, 20.0, 15.0), 100.0));
        let mut anchors = AnchorSet::new(10.0);
        instance.placements.push(Placement {
            unit: PackUnit {
                item: Arc::clone(&item),
                unit_index: 1,
            },
            position: Vec3::zero(),
            dims: Vec3::new(10.0, 10.0, 10.0),
            orientation: Orientation::Lwh,
        });
        anchors.record_last(&instance, EPSILON_GENERAL);

        // The origin is covered and the top corner leaves only 5 of height.
        assert_eq!(
            anchors.points(),
            &[Vec3::new(10.0, 0.0, 0.0), Vec3::new(0.0, 10.0, 0.0)]
        );
    }

    #[test]
    fn validation_without_slack_catches_tiny_overlaps() {
        let item = Arc::new(Item::new("A", (10.0, 10.0, 10.0), 1.0).unwrap());
        let mut instance = CartonInstance::new(carton((30.0, 30.0, 30.0), 100.0));
        for (index, x) in [(1, 0.0), (2, 10.0 - 1e-7)] {
            instance.placements.push(Placement {
                unit: PackUnit {
                    item: Arc::clone(&item),
                    unit_index: index,
                },
                position: Vec3::new(x, 0.0, 0.0),
                dims: Vec3::new(10.0, 10.0, 10.0),
                orientation: Orientation::Lwh,
            });
        }
        assert!(validate_instance(&instance, 1e-6));
        assert!(!validate_instance(&instance, 0.0));

        instance.placements[1].position = Vec3::new(20.0 + 1e-7, 0.0, 0.0);
        assert!(!validate_instance(&instance, 0.0));
        instance.placements[1].position = Vec3::new(20.0, 0.0, 0.0);
        assert!(validate_instance(&instance, 0.0));
    }

    #[test]
    fn packing_order_is_deterministic() {
        let mut all = units(Item::new("B", (1.0, 1.0, 1.0), 1.0).unwrap(), 2);
        all.extend(units(Item::new("A", (1.0, 1.0, 1.0), 1.0).unwrap(), 1));
        all.extend(units(Item::new("Z", (2.0, 2.0, 2.0), 1.0).unwrap(), 1));
        sort_packing_order(&mut all);

        let order: Vec<_> = all
            .iter()
            .map(|u| format!("{}{}", u.item_code(), u.unit_index))
            .collect();
        assert_eq!(order, vec!["Z1", "A1", "B1", "B2"]);
    }
}
