//! Collapses identical carton layouts into patterns with a repetition count.
//!
//! Layout equality is delegated to a [`LayoutComparator`]. The default,
//! [`ExactLayout`], demands exact equality of every placement after canonical
//! sorting; [`ToleranceLayout`] exists for callers whose coordinates carry noise.

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::model::{CartonInstance, CartonType, Placement};

/// Decides whether two carton instances share a layout.
pub trait LayoutComparator: Send + Sync {
    fn same_layout(&self, a: &CartonInstance, b: &CartonInstance) -> bool;
}

/// Exact structural equality: same carton type, same items at the same positions
/// with the same oriented dimensions.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExactLayout;

impl LayoutComparator for ExactLayout {
    fn same_layout(&self, a: &CartonInstance, b: &CartonInstance) -> bool {
        compare_canonical(a, b, |x, y| x == y)
    }
}

/// Like [`ExactLayout`] but coordinates may differ by up to `tolerance`.
#[derive(Clone, Copy, Debug)]
pub struct ToleranceLayout {
    pub tolerance: f64,
}

impl LayoutComparator for ToleranceLayout {
    fn same_layout(&self, a: &CartonInstance, b: &CartonInstance) -> bool {
        compare_canonical(a, b, |x, y| (x - y).abs() <= self.tolerance)
    }
}

fn compare_canonical(
    a: &CartonInstance,
    b: &CartonInstance,
    coord_eq: impl Fn(f64, f64) -> bool,
) -> bool {
    if a.carton.id != b.carton.id || a.placements.len() != b.placements.len() {
        return false;
    }
    canonical_placements(a)
        .iter()
        .zip(canonical_placements(b).iter())
        .all(|(p, q)| {
            p.item_code() == q.item_code()
                && coord_eq(p.position.x, q.position.x)
                && coord_eq(p.position.y, q.position.y)
                && coord_eq(p.position.z, q.position.z)
                && coord_eq(p.dims.x, q.dims.x)
                && coord_eq(p.dims.y, q.dims.y)
                && coord_eq(p.dims.z, q.dims.z)
        })
}

/// Placements sorted by (item code, x, y, z).
pub fn canonical_placements(instance: &CartonInstance) -> Vec<&Placement> {
    let mut placements: Vec<&Placement> = instance.placements.iter().collect();
    placements.sort_by(|a, b| {
        a.item_code()
            .cmp(b.item_code())
            .then_with(|| a.position.x.total_cmp(&b.position.x))
            .then_with(|| a.position.y.total_cmp(&b.position.y))
            .then_with(|| a.position.z.total_cmp(&b.position.z))
    });
    placements
}

/// Short content hash of a layout (12 hex digits), stable across runs.
///
/// Coordinates are rounded to two decimals, so the signature is a display key,
/// not an equality test.
pub fn layout_signature(instance: &CartonInstance) -> String {
    let mut hasher = Sha256::new();
    hasher.update(instance.carton.id.as_bytes());
    for p in canonical_placements(instance) {
        hasher.update(
            format!(
                "|{}:{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{}",
                p.item_code(),
                p.position.x,
                p.position.y,
                p.position.z,
                p.dims.x,
                p.dims.y,
                p.dims.z,
                u8::from(p.orientation.is_rotated())
            )
            .as_bytes(),
        );
    }
    hasher
        .finalize()
        .iter()
        .take(6)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// A layout shared by `carton_count` physical cartons.
#[derive(Clone, Debug, PartialEq)]
pub struct Pattern {
    /// The first instance with this layout.
    pub layout: CartonInstance,
    pub carton_count: usize,
    pub signature: String,
}

impl Pattern {
    pub fn carton(&self) -> &Arc<CartonType> {
        &self.layout.carton
    }

    pub fn efficiency(&self) -> f64 {
        self.layout.efficiency_percent()
    }

    pub fn items_per_carton(&self) -> usize {
        self.layout.unit_count()
    }

    pub fn total_items(&self) -> usize {
        self.items_per_carton() * self.carton_count
    }

    pub fn total_cost(&self) -> f64 {
        self.layout.carton.cost * self.carton_count as f64
    }

    /// Per-item unit counts in one carton, in first-placed order.
    pub fn item_counts(&self) -> Vec<(&str, usize)> {
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for p in &self.layout.placements {
            match counts.iter_mut().find(|(code, _)| *code == p.item_code()) {
                Some((_, n)) => *n += 1,
                None => counts.push((p.item_code(), 1)),
            }
        }
        counts
    }

    /// `"CODE (×n); ..."` for one carton.
    pub fn item_summary(&self) -> String {
        self.item_counts()
            .iter()
            .map(|(code, n)| format!("{code} (×{n})"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Groups instances with identical layouts, keeping first-occurrence order.
///
/// The sum of `carton_count` over the result equals `instances.len()`.
pub fn reduce_patterns(
    instances: &[CartonInstance],
    comparator: &dyn LayoutComparator,
) -> Vec<Pattern> {
    let mut patterns: Vec<Pattern> = Vec::new();
    for instance in instances {
        match patterns
            .iter_mut()
            .find(|p| comparator.same_layout(&p.layout, instance))
        {
            Some(pattern) => pattern.carton_count += 1,
            None => patterns.push(Pattern {
                layout: instance.clone(),
                carton_count: 1,
                signature: layout_signature(instance),
            }),
        }
    }
    patterns
}

/// Expands patterns back into one instance per physical carton.
pub fn expand_patterns(patterns: &[Pattern]) -> Vec<CartonInstance> {
    patterns
        .iter()
        .flat_map(|p| std::iter::repeat_n(p.layout.clone(), p.carton_count))
        .collect()
}
