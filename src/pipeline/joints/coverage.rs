//! Coverage verification: does every entity have at least one selected article?
//!
//! Pure and model-free. Missing entities produce deterministic search
//! suggestions that the orchestrator feeds back into title retrieval.

use super::types::{CoverageResult, Entity, EntityInfo, EntityType, Titled};

/// Cap on `CoverageResult::suggested_searches`.
pub const MAX_SUGGESTED_SEARCHES: usize = 12;

const DISAMBIGUATION_SUFFIXES: [&str; 4] = [
    "(programming language)",
    "(software)",
    "(technology)",
    "(person)",
];

fn type_suffix(entity_type: EntityType) -> Option<&'static str> {
    match entity_type {
        EntityType::Technology | EntityType::Concept => Some("technology"),
        EntityType::Event => Some("incident"),
        EntityType::Person => Some("biography"),
        _ => None,
    }
}

fn is_covered(entity: &Entity, titles: &[String]) -> bool {
    let needles: Vec<String> = std::iter::once(&entity.name)
        .chain(entity.aliases.iter())
        .map(|n| n.trim().to_lowercase())
        .filter(|n| !n.is_empty())
        .collect();
    titles
        .iter()
        .any(|title| needles.iter().any(|needle| title.contains(needle.as_str())))
}

fn suggestions_for(entity: &Entity) -> impl Iterator<Item = String> + '_ {
    let name = entity.name.trim();
    std::iter::once(name.to_string())
        .chain(
            DISAMBIGUATION_SUFFIXES
                .iter()
                .map(move |suffix| format!("{name} {suffix}")),
        )
        .chain(type_suffix(entity.entity_type).map(|suffix| format!("{name} {suffix}")))
}

/// Check `selected` articles against the entities of `entity_info`.
///
/// `covered` and `missing` partition the distinct non-blank entity names in
/// their original order.
pub fn verify_coverage<T: Titled>(entity_info: &EntityInfo, selected: &[T]) -> CoverageResult {
    let titles: Vec<String> = selected
        .iter()
        .map(|a| a.title().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    let mut covered: Vec<String> = Vec::new();
    let mut missing: Vec<&Entity> = Vec::new();

    for entity in &entity_info.entities {
        let name = entity.name.trim();
        if name.is_empty()
            || covered.iter().any(|c| c == name)
            || missing.iter().any(|m| m.name.trim() == name)
        {
            continue;
        }
        if is_covered(entity, &titles) {
            covered.push(name.to_string());
        } else {
            missing.push(entity);
        }
    }

    let suggested_searches: Vec<String> = missing
        .iter()
        .flat_map(|entity| suggestions_for(entity))
        .take(MAX_SUGGESTED_SEARCHES)
        .collect();

    let missing: Vec<String> = missing.iter().map(|e| e.name.trim().to_string()).collect();

    tracing::debug!(
        joint = "coverage_verifier",
        covered = covered.len(),
        missing = ?missing,
        "Coverage checked"
    );

    CoverageResult {
        complete: missing.is_empty(),
        covered,
        missing,
        suggested_searches,
    }
}
