//! Batch generation and characterization of named variants.

use std::fs;
use std::path::Path;

use arcstr::ArcStr;
use indexmap::IndexMap;

use crate::error::Result;
use crate::evaluate::{Evaluate, Evaluation};
use crate::variant::VariantSpec;

/// Named variant specifications, in generation order.
pub type Variants = IndexMap<ArcStr, VariantSpec>;

/// Loads named variant specifications from a JSON file.
pub fn load_variants(path: impl AsRef<Path>) -> Result<Variants> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// Generates and simulates every variant, keyed by variant name.
///
/// Stops at the first variant that cannot be generated.
pub fn build_and_simulate_variants<E: Evaluate>(
    evaluator: &mut E,
    variants: &Variants,
) -> Result<IndexMap<ArcStr, Evaluation>> {
    let mut results = IndexMap::new();
    for (name, spec) in variants {
        tracing::info!(%name, short = %spec.short, "characterizing variant");
        let evaluation = evaluator.evaluate(name, spec)?;
        results.insert(name.clone(), evaluation);
    }
    Ok(results)
}
