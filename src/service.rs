//! Packing service: calculate, summarize and visualize per pick list.
//!
//! Results are kept in memory keyed by pick list id. A new calculation replaces the
//! stored result; a failed one removes it so stale geometry is never served.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError, RwLock};

use crate::error::{PackingError, Result};
use crate::model::{CartonType, Item, PickList};
use crate::normalizer::normalize;
use crate::solver::PackingConfig;
use crate::strategy::{Strategy, pack_lines};
use crate::wire::{CalculatePackingResponse, PackingSummary, VisualizationData};

/// Where pick lists and the carton catalog come from.
pub trait PickListSource: Send + Sync {
    fn pick_list(&self, id: &str) -> Result<PickList>;

    /// Current carton catalog, disabled types included.
    fn cartons(&self) -> Vec<CartonType>;
}

/// Pick lists and cartons held in memory.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    cartons: RwLock<Vec<CartonType>>,
    pick_lists: RwLock<HashMap<String, PickList>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the catalog. Rejects invalid cartons and duplicate ids.
    pub fn replace_cartons(&self, cartons: Vec<CartonType>) -> Result<usize> {
        let mut seen = HashSet::new();
        for carton in &cartons {
            carton.validate()?;
            if !seen.insert(carton.id.as_str()) {
                return Err(PackingError::InvalidCartonData(format!(
                    "{}: Duplicate carton id",
                    carton.id
                )));
            }
        }
        let count = cartons.len();
        *self.cartons.write().unwrap_or_else(PoisonError::into_inner) = cartons;
        Ok(count)
    }

    /// Registers or replaces a pick list after validating its lines.
    pub fn put_pick_list(&self, pick_list: PickList) -> Result<()> {
        normalize(&pick_list.lines)?;
        self.pick_lists
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pick_list.id.clone(), pick_list);
        Ok(())
    }
}

impl PickListSource for InMemoryCatalog {
    fn pick_list(&self, id: &str) -> Result<PickList> {
        self.pick_lists
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| PackingError::PickListNotFound(id.to_string()))
    }

    fn cartons(&self) -> Vec<CartonType> {
        self.cartons
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// A calculated result with the reference data it was computed from.
#[derive(Clone, Debug)]
struct StoredResult {
    summary: PackingSummary,
    with_3d: bool,
    cartons: Vec<CartonType>,
    items: Vec<Item>,
}

/// Marks a pick list as being calculated until dropped.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    id: String,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(in_flight: &'a Mutex<HashSet<String>>, id: &str) -> Result<Self> {
        let mut running = in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !running.insert(id.to_string()) {
            return Err(PackingError::CalculationInProgress(id.to_string()));
        }
        Ok(Self {
            in_flight,
            id: id.to_string(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// The three pick-list operations as plain synchronous calls.
pub struct PackingService<S: PickListSource = InMemoryCatalog> {
    source: S,
    config: PackingConfig,
    results: RwLock<HashMap<String, StoredResult>>,
    in_flight: Mutex<HashSet<String>>,
}

impl<S: PickListSource> PackingService<S> {
    pub fn new(source: S, config: PackingConfig) -> Self {
        Self {
            source,
            config,
            results: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &PackingConfig {
        &self.config
    }

    /// Packs a pick list and stores the result, replacing any previous one.
    ///
    /// Unplaced units still count as success; they are listed in the summary.
    /// Fails with `CalculationInProgress` while another calculation for the same
    /// pick list is running.
    pub fn calculate_packing(
        &self,
        pick_list_id: &str,
        strategy: Strategy,
        enable_3d: bool,
    ) -> Result<CalculatePackingResponse> {
        let _guard = InFlightGuard::acquire(&self.in_flight, pick_list_id)?;

        let pick_list = self.source.pick_list(pick_list_id)?;
        let cartons = self.source.cartons();
        log::info!(
            "📥 Packing pick list {}: {} lines, {} carton types, strategy {}",
            pick_list_id,
            pick_list.lines.len(),
            cartons.len(),
            strategy
        );

        let result = match pack_lines(&pick_list.lines, &cartons, strategy, &self.config) {
            Ok(result) => result,
            Err(err) => {
                self.results
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(pick_list_id);
                log::warn!("❌ Packing pick list {pick_list_id} failed: {err}");
                return Err(err);
            }
        };

        let summary = PackingSummary::from_result(&result);
        log::info!(
            "📦 Pick list {}: {} cartons, {} patterns, {} unplaced units",
            pick_list_id,
            summary.total_cartons,
            summary.unique_patterns,
            summary.unplaced_units()
        );

        let stored = StoredResult {
            summary: summary.clone(),
            with_3d: enable_3d,
            cartons,
            items: pick_list.lines.into_iter().map(|line| line.item).collect(),
        };
        self.results
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pick_list_id.to_string(), stored);

        Ok(CalculatePackingResponse::from_summary(summary))
    }

    /// Stored summary of the last successful calculation.
    pub fn packing_summary(&self, pick_list_id: &str) -> Result<PackingSummary> {
        self.stored(pick_list_id).map(|stored| stored.summary)
    }

    /// Viewer payload for one carton assignment of the stored result.
    pub fn visualization_data(
        &self,
        pick_list_id: &str,
        carton_index: usize,
    ) -> Result<VisualizationData> {
        let stored = self.stored(pick_list_id)?;
        if !stored.with_3d {
            return Err(PackingError::NoPackingResult(format!(
                "{pick_list_id} (calculated without 3D placement data)"
            )));
        }

        let assignment = stored
            .summary
            .carton_assignments
            .get(carton_index)
            .ok_or(PackingError::InvalidCartonIndex {
                index: carton_index,
                available: stored.summary.carton_assignments.len(),
            })?;
        let carton = stored
            .cartons
            .iter()
            .find(|c| c.id == assignment.carton_id)
            .ok_or_else(|| PackingError::NoPackingResult(pick_list_id.to_string()))?;

        VisualizationData::build(&stored.summary, carton_index, carton, &stored.items)
    }

    fn stored(&self, pick_list_id: &str) -> Result<StoredResult> {
        self.results
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(pick_list_id)
            .cloned()
            .ok_or_else(|| PackingError::NoPackingResult(pick_list_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PickListLine;

    fn service_with(lines: Vec<PickListLine>) -> PackingService {
        let catalog = InMemoryCatalog::new();
        catalog
            .replace_cartons(vec![
                CartonType::new("C", (20.0, 20.0, 20.0), 100.0, 1.5).unwrap(),
            ])
            .unwrap();
        catalog
            .put_pick_list(PickList {
                id: "PL-1".to_string(),
                lines,
            })
            .unwrap();
        PackingService::new(catalog, PackingConfig::default())
    }

    fn cubes(quantity: u32) -> Vec<PickListLine> {
        vec![PickListLine {
            item: Item::new("CUBE", (10.0, 10.0, 10.0), 1.0).unwrap(),
            quantity,
        }]
    }

    #[test]
    fn calculates_and_stores_a_summary() {
        let service = service_with(cubes(10));
        let response = service
            .calculate_packing("PL-1", Strategy::MinimizeCartons, true)
            .unwrap();
        assert!(response.success);
        assert_eq!(response.summary.total_cartons, 2);

        let summary = service.packing_summary("PL-1").unwrap();
        assert_eq!(summary, response.summary);
        assert_eq!(summary.packing_strategy, "minimize_cartons_pattern_optimized");
    }

    #[test]
    fn summary_before_calculation_is_an_error() {
        let service = service_with(cubes(1));
        assert_eq!(
            service.packing_summary("PL-1"),
            Err(PackingError::NoPackingResult("PL-1".to_string()))
        );
        assert!(matches!(
            service.visualization_data("PL-1", 0),
            Err(PackingError::NoPackingResult(_))
        ));
    }

    #[test]
    fn unknown_pick_list_is_reported() {
        let service = service_with(cubes(1));
        assert_eq!(
            service
                .calculate_packing("nope", Strategy::MinimizeCartons, true)
                .unwrap_err(),
            PackingError::PickListNotFound("nope".to_string())
        );
    }

    #[test]
    fn visualization_reads_the_stored_result() {
        let service = service_with(cubes(10));
        service
            .calculate_packing("PL-1", Strategy::MinimizeCartons, true)
            .unwrap();

        let data = service.visualization_data("PL-1", 0).unwrap();
        assert_eq!(data.carton.length, 20.0);
        assert_eq!(data.patterns[0].carton_count, 1);
        assert_eq!(data.patterns[0].positions_3d.unit_count().unwrap(), 8);
        assert!(data.item_info.contains_key("CUBE"));

        assert!(matches!(
            service.visualization_data("PL-1", 2),
            Err(PackingError::InvalidCartonIndex {
                index: 2,
                available: 2
            })
        ));
    }

    #[test]
    fn visualization_ignores_later_catalog_changes() {
        let service = service_with(cubes(3));
        service
            .calculate_packing("PL-1", Strategy::MinimizeCartons, true)
            .unwrap();
        service
            .source()
            .replace_cartons(vec![CartonType::new("X", (5.0, 5.0, 5.0), 1.0, 1.0).unwrap()])
            .unwrap();

        let data = service.visualization_data("PL-1", 0).unwrap();
        assert_eq!(data.carton.id, "C");
    }

    #[test]
    fn calculation_without_3d_has_no_geometry() {
        let service = service_with(cubes(2));
        service
            .calculate_packing("PL-1", Strategy::MinimizeCartons, false)
            .unwrap();
        assert!(service.packing_summary("PL-1").is_ok());
        assert!(matches!(
            service.visualization_data("PL-1", 0),
            Err(PackingError::NoPackingResult(_))
        ));
    }

    #[test]
    fn recalculation_replaces_the_previous_result() {
        let service = service_with(cubes(10));
        service
            .calculate_packing("PL-1", Strategy::MinimizeCartons, true)
            .unwrap();
        service
            .source()
            .put_pick_list(PickList {
                id: "PL-1".to_string(),
                lines: cubes(3),
            })
            .unwrap();
        service
            .calculate_packing("PL-1", Strategy::MinimizeWaste, true)
            .unwrap();

        let summary = service.packing_summary("PL-1").unwrap();
        assert_eq!(summary.total_cartons, 1);
        assert_eq!(summary.packing_strategy, "minimize_waste_pattern_optimized");
    }

    #[test]
    fn oversized_items_still_succeed() {
        let mut lines = cubes(1);
        lines.push(PickListLine {
            item: Item::new("HUGE", (90.0, 90.0, 90.0), 1.0).unwrap(),
            quantity: 1,
        });
        let service = service_with(lines);
        let response = service
            .calculate_packing("PL-1", Strategy::MinimizeCartons, true)
            .unwrap();
        assert!(response.success);
        assert!(!response.summary.is_complete);
        assert_eq!(response.summary.unplaced_items[0].item_code, "HUGE");
    }

    #[test]
    fn concurrent_calculation_of_the_same_pick_list_is_refused() {
        let service = service_with(cubes(1));
        let guard = InFlightGuard::acquire(&service.in_flight, "PL-1").unwrap();
        assert_eq!(
            service
                .calculate_packing("PL-1", Strategy::MinimizeCartons, true)
                .unwrap_err(),
            PackingError::CalculationInProgress("PL-1".to_string())
        );
        drop(guard);
        assert!(
            service
                .calculate_packing("PL-1", Strategy::MinimizeCartons, true)
                .is_ok()
        );
    }

    #[test]
    fn catalog_rejects_duplicate_and_invalid_cartons() {
        let catalog = InMemoryCatalog::new();
        let carton = CartonType::new("A", (1.0, 1.0, 1.0), 1.0, 0.0).unwrap();
        assert!(matches!(
            catalog.replace_cartons(vec![carton.clone(), carton.clone()]),
            Err(PackingError::InvalidCartonData(_))
        ));

        let mut broken = carton;
        broken.max_weight = 0.0;
        assert!(catalog.replace_cartons(vec![broken]).is_err());
        assert!(catalog.cartons().is_empty());
    }

    #[test]
    fn catalog_rejects_invalid_pick_lists() {
        let catalog = InMemoryCatalog::new();
        let mut lines = cubes(1);
        lines[0].quantity = 0;
        assert!(matches!(
            catalog.put_pick_list(PickList {
                id: "bad".to_string(),
                lines,
            }),
            Err(PackingError::InvalidItemData(_))
        ));
        assert!(catalog.pick_list("bad").is_err());
    }
}
