//! Bulk load: a JSON object whose values are recipe records replaces the
//! whole collection.

use std::path::Path;

use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::recipes::model::RecipeDocument;
use crate::store::RecipeStore;

lazy_static! {
    // Bare non-finite literals emitted by some JSON writers.
    static ref NON_FINITE_RE: Regex = Regex::new(r":\s*(?:NaN|-?Infinity)\b").unwrap();
}

/// Parses the export format into normalized documents, keeping the order
/// in which records appear.
pub fn parse_recipes(raw: &str) -> anyhow::Result<Vec<RecipeDocument>> {
    let cleaned = NON_FINITE_RE.replace_all(raw, ": null");
    let value: Value = serde_json::from_str(&cleaned).context("parse recipes json")?;
    let Value::Object(records) = value else {
        anyhow::bail!("expected a JSON object of recipes at the top level");
    };
    Ok(records.values().map(normalize_record).collect())
}

/// Maps one loosely-typed record onto the stored shape: empty text becomes
/// null, non-numeric or non-finite numbers become null.
pub fn normalize_record(record: &Value) -> RecipeDocument {
    let empty = Map::new();
    let obj = record.as_object().unwrap_or(&empty);
    RecipeDocument {
        cuisine: text(obj, "cuisine"),
        title: text(obj, "title"),
        rating: number(obj, "rating"),
        prep_time: number(obj, "prep_time"),
        cook_time: number(obj, "cook_time"),
        total_time: number(obj, "total_time"),
        description: text(obj, "description"),
        serves: text(obj, "serves"),
        continent: text(obj, "Contient").or_else(|| text(obj, "continent")),
        country_state: text(obj, "Country_State").or_else(|| text(obj, "country_state")),
        url: text(obj, "URL").or_else(|| text(obj, "url")),
        ingredients: strings(obj, "ingredients"),
        instructions: strings(obj, "instructions"),
        nutrients: obj
            .get("nutrients")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
    }
}

fn text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    obj.get(key)?.as_f64().filter(|v| v.is_finite())
}

fn strings(obj: &Map<String, Value>, key: &str) -> Vec<String> {
    obj.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Replaces the collection with `docs`. An empty input leaves the store
/// untouched.
pub async fn import_recipes(
    store: &dyn RecipeStore,
    docs: Vec<RecipeDocument>,
    batch_size: usize,
) -> anyhow::Result<u64> {
    if docs.is_empty() {
        warn!("no recipes found in input; store left untouched");
        return Ok(0);
    }
    info!(count = docs.len(), batch_size, "importing recipes");
    let inserted = store
        .replace_all(docs, batch_size)
        .await
        .context("replace recipe collection")?;
    info!(inserted, "import finished");
    Ok(inserted)
}

pub async fn import_file(
    store: &dyn RecipeStore,
    path: impl AsRef<Path>,
    batch_size: usize,
) -> anyhow::Result<u64> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    let docs = parse_recipes(&raw)?;
    info!(path = %path.display(), found = docs.len(), "parsed recipe file");
    import_recipes(store, docs, batch_size).await
}
