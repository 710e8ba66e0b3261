use std::cmp::Ordering;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use super::{parse_id, RecipeStore, StoreError};
use crate::recipes::filter::{CompareOp, Field, Predicate, PredicateSet};
use crate::recipes::model::{calories_numeric, Recipe, RecipeDocument};
use crate::recipes::pipeline::{Pipeline, Stage};

/// In-process document store. Documents keep their insertion order, which
/// is the tie-breaker for the stable sort.
#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<Vec<Recipe>>,
}

struct Row<'a> {
    recipe: &'a Recipe,
    calories: Option<f64>,
}

enum Matcher {
    Text(Field, Regex),
    Number(Field, CompareOp, f64),
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }
}

fn run<'a>(docs: &'a [Recipe], stages: &[Stage]) -> Result<Vec<Row<'a>>, StoreError> {
    let mut rows: Vec<Row<'a>> = docs
        .iter()
        .map(|recipe| Row {
            recipe,
            calories: None,
        })
        .collect();

    for stage in stages {
        match stage {
            Stage::DeriveCalories => {
                for row in rows.iter_mut() {
                    row.calories = Some(calories_numeric(&row.recipe.doc));
                }
            }
            Stage::Filter(predicates) => {
                let matchers = matchers(predicates)?;
                let mut kept = Vec::with_capacity(rows.len());
                for row in rows {
                    if row_matches(&row, &matchers)? {
                        kept.push(row);
                    }
                }
                rows = kept;
            }
            Stage::Sort => {
                if rows.iter().any(|r| r.calories.is_none()) {
                    return Err(StoreError::Pipeline("sort before derive".into()));
                }
                rows.sort_by(compare_rows);
            }
            Stage::Skip(n) => {
                let n = usize::try_from(*n).unwrap_or(usize::MAX).min(rows.len());
                rows.drain(..n);
            }
            Stage::Limit(n) => {
                rows.truncate(usize::try_from(*n).unwrap_or(usize::MAX));
            }
            // Rows are turned back into plain `Recipe`s, which carry no
            // derived fields.
            Stage::Project => {}
        }
    }
    Ok(rows)
}

fn matchers(predicates: &PredicateSet) -> Result<Vec<Matcher>, StoreError> {
    predicates
        .iter()
        .map(|p| match &p.predicate {
            Predicate::Contains(pattern) => RegexBuilder::new(&regex::escape(pattern))
                .case_insensitive(true)
                .build()
                .map(|re| Matcher::Text(p.field, re))
                .map_err(|e| StoreError::Pipeline(e.to_string())),
            Predicate::Compare { op, value } => Ok(Matcher::Number(p.field, *op, *value)),
        })
        .collect()
}

fn row_matches(row: &Row<'_>, matchers: &[Matcher]) -> Result<bool, StoreError> {
    for m in matchers {
        let ok = match m {
            Matcher::Text(field, re) => text_field(&row.recipe.doc, *field)
                .map(|v| re.is_match(v))
                .unwrap_or(false),
            Matcher::Number(Field::CaloriesNumeric, op, value) => {
                let calories = row.calories.ok_or_else(|| {
                    StoreError::Pipeline("caloriesNumeric filtered before derive".into())
                })?;
                op.test(calories, *value)
            }
            Matcher::Number(field, op, value) => numeric_field(&row.recipe.doc, *field)
                .map(|v| op.test(v, *value))
                .unwrap_or(false),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn text_field(doc: &RecipeDocument, field: Field) -> Option<&str> {
    match field {
        Field::Title => doc.title.as_deref(),
        Field::Cuisine => doc.cuisine.as_deref(),
        Field::Serves => doc.serves.as_deref(),
        _ => None,
    }
}

fn numeric_field(doc: &RecipeDocument, field: Field) -> Option<f64> {
    match field {
        Field::Rating => doc.rating,
        Field::TotalTime => doc.total_time,
        Field::PrepTime => doc.prep_time,
        Field::CookTime => doc.cook_time,
        _ => None,
    }
}

fn compare_rows(a: &Row<'_>, b: &Row<'_>) -> Ordering {
    let by_rating = match (a.recipe.doc.rating, b.recipe.doc.rating) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_rating.then_with(|| {
        let (x, y) = (a.calories.unwrap_or(0.0), b.calories.unwrap_or(0.0));
        y.total_cmp(&x)
    })
}

#[async_trait]
impl RecipeStore for MemoryStore {
    async fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<Recipe>, StoreError> {
        let docs = self.docs.read().await;
        let rows = run(&docs, pipeline.stages())?;
        Ok(rows.into_iter().map(|r| r.recipe.clone()).collect())
    }

    async fn count(&self, pipeline: &Pipeline) -> Result<u64, StoreError> {
        if !pipeline.is_candidate_only() {
            return Err(StoreError::Pipeline(
                "count accepts only derive and filter stages".into(),
            ));
        }
        let docs = self.docs.read().await;
        Ok(run(&docs, pipeline.stages())?.len() as u64)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Recipe>, StoreError> {
        let id = parse_id(id)?;
        let docs = self.docs.read().await;
        Ok(docs.iter().find(|r| r.id == id).cloned())
    }

    async fn replace_all(
        &self,
        docs: Vec<RecipeDocument>,
        batch_size: usize,
    ) -> Result<u64, StoreError> {
        let batch_size = batch_size.max(1);
        let batches = docs.len().div_ceil(batch_size);
        let mut guard = self.docs.write().await;
        guard.clear();
        info!("cleared existing recipes");
        let mut inserted = 0u64;
        let mut docs = docs.into_iter().peekable();
        let mut batch_no = 0;
        while docs.peek().is_some() {
            batch_no += 1;
            let batch: Vec<Recipe> = docs
                .by_ref()
                .take(batch_size)
                .map(|doc| Recipe::new(Uuid::new_v4(), doc))
                .collect();
            inserted += batch.len() as u64;
            info!(batch = batch_no, batches, size = batch.len(), "imported batch");
            guard.extend(batch);
        }
        Ok(inserted)
    }

    async fn close(&self) {}
}
