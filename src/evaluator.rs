//! Packing statistics: per-carton efficiency, cost and aggregates.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::CartonInstance;
use crate::pattern::Pattern;

/// How `average_efficiency` is aggregated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EfficiencyAveraging {
    /// Mean over every physical carton (a pattern used 5 times counts 5 times).
    #[default]
    Instance,
    /// Mean over distinct patterns, ignoring their repetition counts.
    Pattern,
}

impl EfficiencyAveraging {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "instance" | "carton" => Some(EfficiencyAveraging::Instance),
            "pattern" => Some(EfficiencyAveraging::Pattern),
            _ => None,
        }
    }
}

/// Aggregate figures for a set of carton instances.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Evaluation {
    pub carton_count: usize,
    pub total_cost: f64,
    /// Carton volume not occupied by units, summed over all instances.
    pub total_unused_volume: f64,
    /// Mean instance efficiency in percent.
    pub average_efficiency: f64,
    pub placed_units: usize,
}

/// Utilized volume over carton volume, in percent.
pub fn instance_efficiency(instance: &CartonInstance) -> f64 {
    instance.efficiency_percent()
}

pub fn evaluate_instances(instances: &[CartonInstance]) -> Evaluation {
    if instances.is_empty() {
        return Evaluation::default();
    }

    let efficiency_sum: f64 = instances.iter().map(instance_efficiency).sum();
    Evaluation {
        carton_count: instances.len(),
        total_cost: instances.iter().map(|i| i.carton.cost).sum(),
        total_unused_volume: instances.iter().map(|i| i.unused_volume()).sum(),
        average_efficiency: efficiency_sum / instances.len() as f64,
        placed_units: instances.iter().map(|i| i.unit_count()).sum(),
    }
}

/// Average efficiency over reduced patterns, using the chosen interpretation.
pub fn average_efficiency(patterns: &[Pattern], mode: EfficiencyAveraging) -> f64 {
    match mode {
        EfficiencyAveraging::Instance => {
            let cartons: usize = patterns.iter().map(|p| p.carton_count).sum();
            if cartons == 0 {
                return 0.0;
            }
            let weighted: f64 = patterns
                .iter()
                .map(|p| p.efficiency() * p.carton_count as f64)
                .sum();
            weighted / cartons as f64
        }
        EfficiencyAveraging::Pattern => {
            if patterns.is_empty() {
                return 0.0;
            }
            patterns.iter().map(Pattern::efficiency).sum::<f64>() / patterns.len() as f64
        }
    }
}

/// Sum of carton unit costs over every physical carton.
pub fn total_packing_cost(patterns: &[Pattern]) -> f64 {
    patterns.iter().map(Pattern::total_cost).sum()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::{CartonType, Item, Orientation, PackUnit, Placement};
    use crate::pattern::{ExactLayout, reduce_patterns};
    use crate::types::Vec3;

    fn instance_with_cubes(carton: &Arc<CartonType>, cubes: usize) -> CartonInstance {
        let item = Arc::new(Item::new("CUBE", (10.0, 10.0, 10.0), 1.0).unwrap());
        let mut instance = CartonInstance::new(Arc::clone(carton));
        for i in 0..cubes {
            instance.placements.push(Placement {
                unit: PackUnit {
                    item: Arc::clone(&item),
                    unit_index: i as u32 + 1,
                },
                position: Vec3::new(10.0 * (i % 2) as f64, 10.0 * (i / 2 % 2) as f64, 10.0 * (i / 4) as f64),
                dims: Vec3::new(10.0, 10.0, 10.0),
                orientation: Orientation::Lwh,
            });
        }
        instance
    }

    #[test]
    fn evaluates_cost_and_efficiency() {
        let carton = Arc::new(CartonType::new("C", (20.0, 20.0, 20.0), 100.0, 2.5).unwrap());
        let instances = vec![
            instance_with_cubes(&carton, 8),
            instance_with_cubes(&carton, 2),
        ];

        let evaluation = evaluate_instances(&instances);
        assert_eq!(evaluation.carton_count, 2);
        assert_eq!(evaluation.placed_units, 10);
        assert!((evaluation.total_cost - 5.0).abs() < 1e-9);
        assert!((evaluation.average_efficiency - 62.5).abs() < 1e-9);
        assert!((evaluation.total_unused_volume - 6000.0).abs() < 1e-9);
    }

    #[test]
    fn empty_input_evaluates_to_zero() {
        let evaluation = evaluate_instances(&[]);
        assert_eq!(evaluation, Evaluation::default());
        assert_eq!(average_efficiency(&[], EfficiencyAveraging::Instance), 0.0);
        assert_eq!(average_efficiency(&[], EfficiencyAveraging::Pattern), 0.0);
    }

    #[test]
    fn averaging_modes_differ_when_patterns_repeat() {
        let carton = Arc::new(CartonType::new("C", (20.0, 20.0, 20.0), 100.0, 1.0).unwrap());
        let instances = vec![
            instance_with_cubes(&carton, 8),
            instance_with_cubes(&carton, 8),
            instance_with_cubes(&carton, 8),
            instance_with_cubes(&carton, 4),
        ];
        let patterns = reduce_patterns(&instances, &ExactLayout);
        assert_eq!(patterns.len(), 2);

        // 3 × 100% + 1 × 50%
        let per_instance = average_efficiency(&patterns, EfficiencyAveraging::Instance);
        assert!((per_instance - 87.5).abs() < 1e-9);
        assert!((per_instance - evaluate_instances(&instances).average_efficiency).abs() < 1e-9);

        // (100% + 50%) / 2
        let per_pattern = average_efficiency(&patterns, EfficiencyAveraging::Pattern);
        assert!((per_pattern - 75.0).abs() < 1e-9);

        assert!((total_packing_cost(&patterns) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn parses_averaging_mode() {
        assert_eq!(EfficiencyAveraging::parse("Pattern"), Some(EfficiencyAveraging::Pattern));
        assert_eq!(EfficiencyAveraging::parse(" instance "), Some(EfficiencyAveraging::Instance));
        assert_eq!(EfficiencyAveraging::parse("weighted"), None);
    }
}
