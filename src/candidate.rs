//! Carton candidate selection.
//!
//! Splits off units that no carton in the catalog can take, then ranks the
//! remaining carton types for the chosen strategy.

use std::sync::Arc;

use crate::error::{PackingError, Result};
use crate::model::{CartonType, PackUnit, UnplacedReason, UnplacedUnit};
use crate::solver::{PackingConfig, check_unit_fits};
use crate::strategy::Strategy;
use crate::types::Dimensional;

/// Ranked carton types plus the units that can be packed at all.
#[derive(Clone, Debug, Default)]
pub struct CandidateSelection {
    /// Carton types to try, best first for the strategy.
    pub candidates: Vec<Arc<CartonType>>,
    /// Units at least one candidate can take.
    pub packable: Vec<PackUnit>,
    /// Units no carton type can take.
    pub unplaced: Vec<UnplacedUnit>,
}

/// Checks a unit against the whole catalog.
///
/// Fails with `NoSuitableCarton` if no eligible carton holds it in any legal
/// orientation and with `ItemExceedsCartonWeight` if every carton that holds it is
/// too weak (the reported limit is the strongest of those).
pub fn check_unit_against_catalog(
    unit: &PackUnit,
    catalog: &[Arc<CartonType>],
    config: &PackingConfig,
) -> Result<()> {
    let mut strongest_fitting: Option<f64> = None;
    for carton in catalog {
        match check_unit_fits(carton, unit, config) {
            Ok(()) => return Ok(()),
            Err(PackingError::ItemExceedsCartonWeight { limit, .. }) => {
                strongest_fitting = Some(strongest_fitting.map_or(limit, |l: f64| l.max(limit)));
            }
            Err(_) => {}
        }
    }

    match strongest_fitting {
        Some(limit) => Err(PackingError::ItemExceedsCartonWeight {
            item_code: unit.item_code().to_string(),
            weight: unit.item.weight,
            limit,
        }),
        None => Err(PackingError::NoSuitableCarton {
            item_code: unit.item_code().to_string(),
        }),
    }
}

/// Partitions units into packable and unplaced, and ranks the carton types that
/// can take at least one packable unit.
pub fn select_candidates(
    units: Vec<PackUnit>,
    catalog: &[CartonType],
    strategy: Strategy,
    config: &PackingConfig,
) -> CandidateSelection {
    let enabled: Vec<Arc<CartonType>> = catalog
        .iter()
        .filter(|c| !c.disabled)
        .cloned()
        .map(Arc::new)
        .collect();

    let mut selection = CandidateSelection::default();
    for unit in units {
        match check_unit_against_catalog(&unit, &enabled, config) {
            Ok(()) => selection.packable.push(unit),
            Err(err) => {
                log::info!("📭 {err}");
                let reason =
                    UnplacedReason::from_error(&err).unwrap_or(UnplacedReason::NoSuitableCarton);
                selection.unplaced.push(UnplacedUnit { unit, reason });
            }
        }
    }

    let useful: Vec<Arc<CartonType>> = enabled
        .into_iter()
        .filter(|carton| {
            selection
                .packable
                .iter()
                .any(|unit| check_unit_fits(carton, unit, config).is_ok())
        })
        .collect();

    let aggregate_volume: f64 = selection.packable.iter().map(|u| u.volume()).sum();
    selection.candidates = rank_candidates(useful, strategy, aggregate_volume);
    selection
}

/// Orders carton types for a strategy.
///
/// - `minimize_cartons`: descending volume (fewer, bigger cartons)
/// - `minimize_waste`: closest volume to the aggregate unit volume
/// - `maximize_efficiency`: ascending volume
///
/// Remaining ties go to the cheaper carton, then to the carton id.
pub fn rank_candidates(
    mut cartons: Vec<Arc<CartonType>>,
    strategy: Strategy,
    aggregate_volume: f64,
) -> Vec<Arc<CartonType>> {
    cartons.sort_by(|a, b| {
        let primary = match strategy {
            Strategy::MinimizeCartons => b.volume().total_cmp(&a.volume()),
            Strategy::MinimizeWaste => (a.volume() - aggregate_volume)
                .abs()
                .total_cmp(&(b.volume() - aggregate_volume).abs()),
            Strategy::MaximizeEfficiency => a.volume().total_cmp(&b.volume()),
        };
        primary
            .then_with(|| a.cost.total_cmp(&b.cost))
            .then_with(|| a.id.cmp(&b.id))
    });
    cartons
}
