//! Strategy selection: the top-level packing driver.
//!
//! Every candidate carton type is tried once as the primary carton. Units the
//! primary cannot take fall through a fixed chain of the other candidates (largest
//! volume first), so the set of trials is the same for every strategy and only the
//! choice between them differs. Trials are independent and run on the rayon pool.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::candidate::{rank_candidates, select_candidates};
use crate::error::Result;
use crate::evaluator::{Evaluation, average_efficiency, evaluate_instances, total_packing_cost};
use crate::model::{CartonInstance, CartonType, PackUnit, PickListLine, UnplacedReason, UnplacedUnit};
use crate::normalizer::{NormalizedItems, group_similar_items, normalize};
use crate::pattern::{ExactLayout, Pattern, expand_patterns, reduce_patterns};
use crate::solver::{PackingConfig, SearchBudget, pack_into_carton_type};
use crate::types::Weighted;

/// Packing objective.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Fewest cartons, then lowest cost.
    #[default]
    MinimizeCartons,
    /// Least unused volume, then fewest cartons.
    MinimizeWaste,
    /// Highest average efficiency, then fewest cartons.
    MaximizeEfficiency,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [
        Strategy::MinimizeCartons,
        Strategy::MinimizeWaste,
        Strategy::MaximizeEfficiency,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::MinimizeCartons => "minimize_cartons",
            Strategy::MinimizeWaste => "minimize_waste",
            Strategy::MaximizeEfficiency => "maximize_efficiency",
        }
    }

    /// Label stored with a result, e.g. `minimize_cartons_pattern_optimized`.
    pub fn label(self) -> String {
        format!("{}_pattern_optimized", self.as_str())
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        Strategy::ALL
            .into_iter()
            .find(|s| s.as_str() == normalized)
            .ok_or_else(|| format!("Unknown strategy '{raw}'"))
    }
}

/// Events emitted while a result is produced, for live visualization.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum PackEvent {
    /// One carton-type trial has been evaluated.
    TrialEvaluated {
        carton_id: String,
        cartons: usize,
        unplaced: usize,
        average_efficiency: f64,
    },
    /// A carton of the chosen assignment is opened.
    CartonStarted {
        id: usize,
        carton_id: String,
        dims: (f64, f64, f64),
        max_weight: f64,
    },
    /// A unit was placed.
    UnitPlaced {
        carton: usize,
        item_code: String,
        unit_index: u32,
        pos: (f64, f64, f64),
        dims: (f64, f64, f64),
        rotated: bool,
        total_weight: f64,
    },
    /// A unit could not be placed.
    UnitRejected {
        item_code: String,
        unit_index: u32,
        reason_code: String,
        reason_text: String,
    },
    /// Packing finished.
    Finished { cartons: usize, unplaced: usize },
}

/// Result of a packing calculation.
#[derive(Clone, Debug, PartialEq)]
pub struct PackingResult {
    pub strategy: Strategy,
    pub patterns: Vec<Pattern>,
    /// Units without a carton, sorted by item code and unit index.
    pub unplaced: Vec<UnplacedUnit>,
    pub total_cartons: usize,
    pub total_cost: f64,
    pub average_efficiency: f64,
    /// Units handed to the calculation (placed and unplaced).
    pub items_processed: usize,
    /// Carton-type trials run.
    pub cartons_evaluated: usize,
    /// Groups of items interchangeable for packing.
    pub item_groups: usize,
}

impl PackingResult {
    fn empty(strategy: Strategy) -> Self {
        Self {
            strategy,
            patterns: Vec::new(),
            unplaced: Vec::new(),
            total_cartons: 0,
            total_cost: 0.0,
            average_efficiency: 0.0,
            items_processed: 0,
            cartons_evaluated: 0,
            item_groups: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.unplaced.is_empty()
    }

    pub fn unique_patterns(&self) -> usize {
        self.patterns.len()
    }

    pub fn placed_units(&self) -> usize {
        self.patterns.iter().map(Pattern::total_items).sum()
    }

    pub fn unplaced_count(&self) -> usize {
        self.unplaced.len()
    }

    pub fn strategy_label(&self) -> String {
        self.strategy.label()
    }

    /// One instance per physical carton.
    pub fn instances(&self) -> Vec<CartonInstance> {
        expand_patterns(&self.patterns)
    }
}

/// Outcome of packing with one primary carton type.
#[derive(Clone, Debug)]
struct Trial {
    /// Position of the primary carton in the strategy ranking.
    rank: usize,
    primary: Arc<CartonType>,
    instances: Vec<CartonInstance>,
    rejected: Vec<UnplacedUnit>,
    evaluation: Evaluation,
    average_efficiency: f64,
}

fn run_trial(
    rank: usize,
    primary: &Arc<CartonType>,
    fallback: &[Arc<CartonType>],
    units: &[PackUnit],
    config: &PackingConfig,
) -> Trial {
    let mut budget = SearchBudget::new(config.max_position_checks);
    let mut instances = Vec::new();
    let mut rejected: Vec<UnplacedUnit> = Vec::new();
    let mut pending: Vec<UnplacedUnit> = units
        .iter()
        .cloned()
        .map(|unit| UnplacedUnit {
            unit,
            reason: UnplacedReason::NoSuitableCarton,
        })
        .collect();

    let chain = std::iter::once(primary).chain(fallback.iter().filter(|c| c.id != primary.id));
    for carton in chain {
        if pending.is_empty() {
            break;
        }
        let outcome = pack_into_carton_type(
            pending.drain(..).map(|u| u.unit).collect(),
            carton,
            config,
            &mut budget,
        );
        instances.extend(outcome.instances);
        for unplaced in outcome.rejected {
            match unplaced.reason {
                UnplacedReason::SearchBudgetExhausted => rejected.push(unplaced),
                _ => pending.push(unplaced),
            }
        }
    }
    rejected.extend(pending);

    let evaluation = evaluate_instances(&instances);
    let patterns = reduce_patterns(&instances, &ExactLayout);
    let average = average_efficiency(&patterns, config.efficiency_averaging);

    log::debug!(
        "Trial {} ({}): {} cartons, {} unplaced, {:.2}% average efficiency",
        rank,
        primary.id,
        evaluation.carton_count,
        rejected.len(),
        average
    );

    Trial {
        rank,
        primary: Arc::clone(primary),
        instances,
        rejected,
        evaluation,
        average_efficiency: average,
    }
}

/// Orders trials best first for a strategy. Fewer unplaced units always win.
fn compare_trials(a: &Trial, b: &Trial, strategy: Strategy) -> Ordering {
    let (ea, eb) = (&a.evaluation, &b.evaluation);
    a.rejected
        .len()
        .cmp(&b.rejected.len())
        .then_with(|| match strategy {
            Strategy::MinimizeCartons => ea
                .carton_count
                .cmp(&eb.carton_count)
                .then_with(|| ea.total_cost.total_cmp(&eb.total_cost)),
            Strategy::MinimizeWaste => ea
                .total_unused_volume
                .total_cmp(&eb.total_unused_volume)
                .then_with(|| ea.carton_count.cmp(&eb.carton_count)),
            Strategy::MaximizeEfficiency => b
                .average_efficiency
                .total_cmp(&a.average_efficiency)
                .then_with(|| ea.carton_count.cmp(&eb.carton_count)),
        })
        .then_with(|| a.rank.cmp(&b.rank))
}

/// Normalizes pick list lines and packs them.
pub fn pack_lines(
    lines: &[PickListLine],
    catalog: &[CartonType],
    strategy: Strategy,
    config: &PackingConfig,
) -> Result<PackingResult> {
    let normalized = normalize(lines)?;
    Ok(pack(&normalized, catalog, strategy, config))
}

/// Packs normalized units with the given strategy.
pub fn pack(
    normalized: &NormalizedItems,
    catalog: &[CartonType],
    strategy: Strategy,
    config: &PackingConfig,
) -> PackingResult {
    pack_with_progress(normalized, catalog, strategy, config, |_| {})
}

/// Like [`pack`], reporting trial evaluations and the chosen assignment as events.
pub fn pack_with_progress(
    normalized: &NormalizedItems,
    catalog: &[CartonType],
    strategy: Strategy,
    config: &PackingConfig,
    mut on_event: impl FnMut(&PackEvent),
) -> PackingResult {
    let mut result = PackingResult::empty(strategy);
    result.items_processed = normalized.total_quantity();
    result.item_groups = group_similar_items(normalized).len();

    if normalized.units.is_empty() {
        on_event(&PackEvent::Finished {
            cartons: 0,
            unplaced: 0,
        });
        return result;
    }

    let selection = select_candidates(normalized.units.clone(), catalog, strategy, config);
    let mut unplaced = selection.unplaced;

    if !selection.candidates.is_empty() && !selection.packable.is_empty() {
        let fallback =
            rank_candidates(selection.candidates.clone(), Strategy::MinimizeCartons, 0.0);
        let units = selection.packable;

        let trials: Vec<Trial> = if config.parallel_trials {
            selection
                .candidates
                .par_iter()
                .enumerate()
                .map(|(rank, primary)| run_trial(rank, primary, &fallback, &units, config))
                .collect()
        } else {
            selection
                .candidates
                .iter()
                .enumerate()
                .map(|(rank, primary)| run_trial(rank, primary, &fallback, &units, config))
                .collect()
        };
        result.cartons_evaluated = trials.len();

        for trial in &trials {
            on_event(&PackEvent::TrialEvaluated {
                carton_id: trial.primary.id.clone(),
                cartons: trial.evaluation.carton_count,
                unplaced: trial.rejected.len(),
                average_efficiency: trial.average_efficiency,
            });
        }

        if let Some(best) = trials
            .into_iter()
            .min_by(|a, b| compare_trials(a, b, strategy))
        {
            log::info!(
                "🏆 {} chose primary carton {} ({} cartons, {} unplaced)",
                strategy,
                best.primary.id,
                best.evaluation.carton_count,
                best.rejected.len()
            );
            result.patterns = reduce_patterns(&best.instances, &ExactLayout);
            result.total_cartons = best.evaluation.carton_count;
            result.total_cost = total_packing_cost(&result.patterns);
            result.average_efficiency =
                average_efficiency(&result.patterns, config.efficiency_averaging);
            unplaced.extend(best.rejected);
        }
    } else {
        // No candidate carton left for these units.
        unplaced.extend(selection.packable.into_iter().map(|unit| UnplacedUnit {
            unit,
            reason: UnplacedReason::NoSuitableCarton,
        }));
    }

    unplaced.sort_by(|a, b| {
        a.unit
            .item_code()
            .cmp(b.unit.item_code())
            .then_with(|| a.unit.unit_index.cmp(&b.unit.unit_index))
    });
    result.unplaced = unplaced;

    replay_events(&result, &mut on_event);
    result
}

fn replay_events(result: &PackingResult, on_event: &mut impl FnMut(&PackEvent)) {
    for (idx, instance) in result.instances().iter().enumerate() {
        let id = idx + 1;
        on_event(&PackEvent::CartonStarted {
            id,
            carton_id: instance.carton.id.clone(),
            dims: instance.carton.dims().as_tuple(),
            max_weight: instance.carton.max_weight,
        });
        let mut total_weight = 0.0;
        for p in &instance.placements {
            total_weight += p.weight();
            on_event(&PackEvent::UnitPlaced {
                carton: id,
                item_code: p.item_code().to_string(),
                unit_index: p.unit.unit_index,
                pos: p.position.as_tuple(),
                dims: p.dims.as_tuple(),
                rotated: p.orientation.is_rotated(),
                total_weight,
            });
        }
    }
    for u in &result.unplaced {
        on_event(&PackEvent::UnitRejected {
            item_code: u.unit.item_code().to_string(),
            unit_index: u.unit.unit_index,
            reason_code: u.reason.code().to_string(),
            reason_text: u.reason.to_string(),
        });
    }
    on_event(&PackEvent::Finished {
        cartons: result.total_cartons,
        unplaced: result.unplaced.len(),
    });
}
