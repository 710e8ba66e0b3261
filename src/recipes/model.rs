use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Stored recipe document. Every field is optional; numeric fields are
/// finite or null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeDocument {
    #[serde(default)]
    pub cuisine: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub prep_time: Option<f64>,
    #[serde(default)]
    pub cook_time: Option<f64>,
    #[serde(default)]
    pub total_time: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub serves: Option<String>,
    #[serde(default)]
    pub continent: Option<String>,
    #[serde(default)]
    pub country_state: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default)]
    pub nutrients: Map<String, Value>,
}

/// A recipe as returned to clients: the store-assigned id plus the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(flatten)]
    pub doc: RecipeDocument,
}

impl Recipe {
    pub fn new(id: Uuid, doc: RecipeDocument) -> Self {
        Self { id, doc }
    }
}

/// Derived calorie count: the leading whitespace-delimited token of
/// `nutrients.calories` parsed as a double. Anything else yields 0.
pub fn calories_numeric(doc: &RecipeDocument) -> f64 {
    match doc.nutrients.get("calories") {
        Some(Value::String(text)) => text
            .split_whitespace()
            .next()
            .and_then(|token| token.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(0.0),
        Some(Value::Number(n)) => n.as_f64().filter(|v| v.is_finite()).unwrap_or(0.0),
        _ => 0.0,
    }
}
