//! Turns pick-list lines into packable units.
//!
//! Lines referencing the same item code are merged (a pick list may gather the same
//! item from several warehouse locations), so unit indices stay unique per item.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{PackingError, Result};
use crate::model::{Item, PackUnit, PickListLine};

/// Pick list lines after validation and expansion.
#[derive(Clone, Debug, Default)]
pub struct NormalizedItems {
    /// Distinct items in first-seen order.
    pub items: Vec<Arc<Item>>,
    /// Requested quantity per entry of `items`.
    pub quantities: Vec<u32>,
    /// One unit per physical item, grouped by item in `items` order.
    pub units: Vec<PackUnit>,
}

impl NormalizedItems {
    pub fn total_quantity(&self) -> usize {
        self.units.len()
    }
}

/// Validates the lines and expands quantities into individual units.
///
/// Fails with `InvalidItemData` on a zero quantity, a non-positive dimension, a
/// negative weight, or two lines that define the same item code differently.
pub fn normalize(lines: &[PickListLine]) -> Result<NormalizedItems> {
    let mut index_by_code: HashMap<&str, usize> = HashMap::new();
    let mut items: Vec<Arc<Item>> = Vec::new();
    let mut quantities: Vec<u32> = Vec::new();

    for line in lines {
        line.item.validate()?;
        if line.quantity == 0 {
            return Err(PackingError::InvalidItemData(format!(
                "{}: Quantity must be positive",
                line.item.code
            )));
        }

        match index_by_code.get(line.item.code.as_str()) {
            Some(&idx) => {
                if *items[idx] != line.item {
                    return Err(PackingError::InvalidItemData(format!(
                        "{}: Conflicting item data across pick list lines",
                        line.item.code
                    )));
                }
                quantities[idx] = quantities[idx].checked_add(line.quantity).ok_or_else(|| {
                    PackingError::InvalidItemData(format!(
                        "{}: Quantity overflow",
                        line.item.code
                    ))
                })?;
            }
            None => {
                index_by_code.insert(line.item.code.as_str(), items.len());
                items.push(Arc::new(line.item.clone()));
                quantities.push(line.quantity);
            }
        }
    }

    let units = items
        .iter()
        .zip(&quantities)
        .flat_map(|(item, &qty)| {
            (1..=qty).map(move |unit_index| PackUnit {
                item: Arc::clone(item),
                unit_index,
            })
        })
        .collect();

    Ok(NormalizedItems {
        items,
        quantities,
        units,
    })
}

/// Items that are interchangeable for packing purposes.
#[derive(Clone, Debug, PartialEq)]
pub struct ItemGroup {
    pub item_codes: Vec<String>,
    pub total_quantity: u32,
}

/// Groups items whose sorted dimensions, weight and fragility coincide.
///
/// Groups keep first-seen order.
pub fn group_similar_items(normalized: &NormalizedItems) -> Vec<ItemGroup> {
    type Key = ([u64; 3], u64, bool);

    let mut groups: Vec<(Key, ItemGroup)> = Vec::new();
    for (item, &qty) in normalized.items.iter().zip(&normalized.quantities) {
        let dims = item.dims().sorted_components();
        let key: Key = (
            [dims[0].to_bits(), dims[1].to_bits(), dims[2].to_bits()],
            item.weight.to_bits(),
            item.fragile,
        );
        match groups.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, group)) => {
                group.item_codes.push(item.code.clone());
                group.total_quantity += qty;
            }
            None => groups.push((
                key,
                ItemGroup {
                    item_codes: vec![item.code.clone()],
                    total_quantity: qty,
                },
            )),
        }
    }
    groups.into_iter().map(|(_, group)| group).collect()
}
