//! Per-category identifier sets derived from a report's entities.

use std::collections::BTreeSet;

use super::Category;
use crate::entities::{EntityRecord, EntityType};

/// Distinct anchor identifiers per category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierSet {
    pub companies: BTreeSet<String>,
    pub industries: BTreeSet<String>,
    pub themes: BTreeSet<String>,
}

impl IdentifierSet {
    pub fn for_category(&self, category: Category) -> &BTreeSet<String> {
        match category {
            Category::Company => &self.companies,
            Category::Industry => &self.industries,
            Category::Theme => &self.themes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.companies.is_empty() && self.industries.is_empty() && self.themes.is_empty()
    }

    /// Categories with at least one identifier, in dispatch order.
    pub fn non_empty_categories(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|c| !self.for_category(*c).is_empty())
            .collect()
    }
}

/// Company key used when no ticker is known: lowercase, whitespace -> `_`.
pub fn normalize_company_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect::<String>()
        .to_lowercase()
}

/// Build identifier sets from entity records.
///
/// Companies use their `ticker` property when present and non-empty, the
/// normalized name otherwise. Industries and themes use the name verbatim.
/// Blank names and unknown entity types contribute nothing.
pub fn extract_identifiers(entities: &[EntityRecord]) -> IdentifierSet {
    let mut ids = IdentifierSet::default();

    for entity in entities {
        let has_name = !entity.name.trim().is_empty();
        match &entity.entity_type {
            EntityType::Company => {
                if let Some(ticker) = entity.str_property("ticker") {
                    ids.companies.insert(ticker.to_string());
                } else if has_name {
                    ids.companies.insert(normalize_company_name(&entity.name));
                }
            }
            EntityType::Industry if has_name => {
                ids.industries.insert(entity.name.clone());
            }
            EntityType::Theme if has_name => {
                ids.themes.insert(entity.name.clone());
            }
            _ => {}
        }
    }

    ids
}
