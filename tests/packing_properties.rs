use std::collections::HashMap;

use carton_pack::model::{CartonType, Item, PickListLine, UnplacedReason};
use carton_pack::pattern::{ExactLayout, expand_patterns, reduce_patterns};
use carton_pack::solver::validate_instance;
use carton_pack::wire::{CalculatePackingResponse, PackingSummary};
use carton_pack::{PackingConfig, PackingResult, Strategy, pack_lines};

fn line(code: &str, dims: (f64, f64, f64), weight: f64, quantity: u32) -> PickListLine {
    PickListLine {
        item: Item::new(code, dims, weight).unwrap(),
        quantity,
    }
}

fn catalog() -> Vec<CartonType> {
    vec![
        CartonType::new("CTN-S", (20.0, 15.0, 10.0), 5.0, 0.8).unwrap(),
        CartonType::new("CTN-M", (40.0, 30.0, 30.0), 20.0, 1.2).unwrap(),
        CartonType::new("CTN-L", (60.0, 40.0, 40.0), 30.0, 2.5).unwrap(),
    ]
}

fn mixed_order() -> Vec<PickListLine> {
    vec![
        line("MUG", (12.0, 9.0, 10.0), 0.4, 14),
        line("BOOK", (24.0, 17.0, 4.0), 0.9, 6),
        line("LAMP", (30.0, 20.0, 35.0), 2.5, 2),
        line("SOAP", (8.0, 5.0, 3.0), 0.1, 25),
    ]
}

fn run(lines: &[PickListLine], strategy: Strategy) -> PackingResult {
    pack_lines(lines, &catalog(), strategy, &PackingConfig::default()).unwrap()
}

#[test]
fn every_carton_respects_bounds_weight_and_overlap() {
    for strategy in Strategy::ALL {
        let result = run(&mixed_order(), strategy);
        for instance in result.instances() {
            assert!(
                validate_instance(&instance, 0.0),
                "{strategy}: invalid layout in {}",
                instance.carton.id
            );
            assert!(instance.total_weight() <= instance.carton.max_weight + 1e-9);
        }
    }
}

#[test]
fn every_unit_is_placed_or_reported_exactly_once() {
    let lines = mixed_order();
    let expected: HashMap<&str, usize> = lines
        .iter()
        .map(|l| (l.item.code.as_str(), l.quantity as usize))
        .collect();

    for strategy in Strategy::ALL {
        let result = run(&lines, strategy);
        let mut seen: HashMap<String, Vec<u32>> = HashMap::new();
        for instance in result.instances() {
            for placement in &instance.placements {
                seen.entry(placement.item_code().to_string())
                    .or_default()
                    .push(placement.unit.unit_index);
            }
        }
        for unit in &result.unplaced {
            seen.entry(unit.unit.item_code().to_string())
                .or_default()
                .push(unit.unit.unit_index);
        }

        for (code, quantity) in &expected {
            let mut indices = seen.remove(*code).unwrap_or_default();
            indices.sort_unstable();
            let want: Vec<u32> = (1..=*quantity as u32).collect();
            assert_eq!(indices, want, "{strategy}: units of {code}");
        }
        assert!(seen.is_empty());
        assert_eq!(result.items_processed, 47);
        assert_eq!(result.placed_units() + result.unplaced_count(), 47);
    }
}

#[test]
fn efficiencies_stay_within_percent_range() {
    for strategy in Strategy::ALL {
        let result = run(&mixed_order(), strategy);
        assert!((0.0..=100.0).contains(&result.average_efficiency));
        for pattern in &result.patterns {
            assert!((0.0..=100.0).contains(&pattern.efficiency()));
        }
    }
}

#[test]
fn reducing_expanded_patterns_gives_the_same_patterns() {
    let result = run(&mixed_order(), Strategy::MaximizeEfficiency);
    let again = reduce_patterns(&expand_patterns(&result.patterns), &ExactLayout);
    assert_eq!(again, result.patterns);

    let total: usize = result.patterns.iter().map(|p| p.carton_count).sum();
    assert_eq!(total, result.total_cartons);
}

#[test]
fn minimize_cartons_is_never_beaten_on_carton_count() {
    let lines = mixed_order();
    let baseline = run(&lines, Strategy::MinimizeCartons);
    for strategy in [Strategy::MinimizeWaste, Strategy::MaximizeEfficiency] {
        let other = run(&lines, strategy);
        assert!(other.unplaced_count() >= baseline.unplaced_count());
        if other.unplaced_count() == baseline.unplaced_count() {
            assert!(baseline.total_cartons <= other.total_cartons, "{strategy}");
        }
    }
}

#[test]
fn odd_sized_cartons_keep_exact_efficiencies_through_json() {
    let cartons = vec![
        CartonType::new("ODD-S", (33.3, 27.7, 19.1), 15.0, 0.9).unwrap(),
        CartonType::new("ODD-L", (41.9, 31.3, 29.7), 25.0, 1.7).unwrap(),
    ];
    for quantity in [1, 7, 23] {
        let lines = [line("TIN", (9.7, 6.1, 4.3), 0.3, quantity)];
        for strategy in Strategy::ALL {
            let result = pack_lines(&lines, &cartons, strategy, &PackingConfig::default()).unwrap();
            let summary = PackingSummary::from_result(&result);
            let parsed: PackingSummary =
                serde_json::from_str(&serde_json::to_string(&summary).unwrap()).unwrap();
            assert_eq!(parsed.average_efficiency.to_bits(), summary.average_efficiency.to_bits());
            assert_eq!(parsed, summary, "{strategy}, {quantity} units");
        }
    }
}

#[test]
fn ten_cubes_fill_one_carton_and_spill_into_a_second() {
    let cartons = vec![CartonType::new("CUBE-BOX", (20.0, 20.0, 20.0), 100.0, 1.0).unwrap()];
    let result = pack_lines(
        &[line("CUBE", (10.0, 10.0, 10.0), 1.0, 10)],
        &cartons,
        Strategy::MinimizeCartons,
        &PackingConfig::default(),
    )
    .unwrap();

    let mut per_carton: Vec<usize> = result
        .instances()
        .iter()
        .map(|instance| instance.unit_count())
        .collect();
    per_carton.sort_unstable();
    assert_eq!(per_carton, vec![2, 8]);
}

#[test]
fn empty_pick_list_packs_into_nothing() {
    let result = run(&[], Strategy::MinimizeCartons);
    assert_eq!(result.total_cartons, 0);
    assert!(result.patterns.is_empty());
    assert!(result.is_complete());

    let response = CalculatePackingResponse::from_summary(PackingSummary::from_result(&result));
    assert!(response.success);
    assert_eq!(response.summary.average_efficiency, 0.0);
}

#[test]
fn oversized_items_still_produce_a_successful_response() {
    let mut lines = mixed_order();
    lines.push(line("SOFA", (200.0, 90.0, 80.0), 40.0, 1));

    let result = run(&lines, Strategy::MinimizeCartons);
    assert!(!result.is_complete());
    assert_eq!(result.unplaced_count(), 1);

    let response = CalculatePackingResponse::from_summary(PackingSummary::from_result(&result));
    assert!(response.success);
    assert!(!response.summary.is_complete);
    assert_eq!(response.summary.unplaced_items.len(), 1);
    assert_eq!(response.summary.unplaced_items[0].item_code, "SOFA");
    assert_eq!(
        response.summary.unplaced_items[0].reason_code,
        UnplacedReason::NoSuitableCarton
    );
}

#[test]
fn summary_survives_a_json_round_trip() {
    for strategy in Strategy::ALL {
        let summary = PackingSummary::from_result(&run(&mixed_order(), strategy));
        let json = serde_json::to_string(&summary).unwrap();
        let parsed: PackingSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, summary, "{strategy}");
    }

    let result = run(&mixed_order(), Strategy::MinimizeWaste);
    let summary = PackingSummary::from_result(&result);

    let serialized = summary.with_serialized_positions().unwrap();
    let json = serde_json::to_string(&serialized).unwrap();
    let parsed: PackingSummary = serde_json::from_str(&json).unwrap();
    for (a, b) in parsed
        .carton_assignments
        .iter()
        .zip(&summary.carton_assignments)
    {
        assert_eq!(a.positions_3d.resolve().unwrap(), b.positions_3d.resolve().unwrap());
    }
}
