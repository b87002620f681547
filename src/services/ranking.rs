use serde::Serialize;

use crate::models::{Category, CategoryCount, RankedList, RecommendationRecord, Summary};

/// Sorts by affinity descending.
///
/// `sort_by` is stable: equal affinities keep their input (category fetch) order.
pub fn rank(mut records: Vec<RecommendationRecord>) -> RankedList {
    records.sort_by(|a, b| b.affinity.total_cmp(&a.affinity));
    RankedList::from_sorted(records)
}

/// Ranked records of one category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryGroup {
    pub category: Category,
    pub records: Vec<RecommendationRecord>,
}

/// Categories in `order` first (present even when empty), then any other
/// category found in the list, by first appearance
fn category_order(list: &RankedList, order: &[Category]) -> Vec<Category> {
    let mut categories: Vec<Category> = Vec::new();
    for category in order.iter().chain(list.iter().map(|r| &r.category)) {
        if !categories.contains(category) {
            categories.push(*category);
        }
    }
    categories
}

/// Groups a ranked list by category; each group keeps the global rank order
pub fn group_by_category(list: &RankedList, order: &[Category]) -> Vec<CategoryGroup> {
    category_order(list, order)
        .into_iter()
        .map(|category| CategoryGroup {
            category,
            records: list
                .iter()
                .filter(|r| r.category == category)
                .cloned()
                .collect(),
        })
        .collect()
}

pub fn summarize(list: &RankedList, order: &[Category]) -> Summary {
    let per_category: Vec<CategoryCount> = category_order(list, order)
        .into_iter()
        .map(|category| CategoryCount {
            category,
            count: list.iter().filter(|r| r.category == category).count(),
        })
        .collect();

    let non_empty = per_category.iter().filter(|c| c.count > 0).count();

    Summary {
        total_count: list.len(),
        message: format!(
            "Found {} total recommendations across {} categories",
            list.len(),
            non_empty
        ),
        per_category,
    }
}
