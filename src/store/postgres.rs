use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, types::Json, FromRow, PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};
use uuid::Uuid;

use super::{parse_id, RecipeStore, StoreError};
use crate::recipes::filter::{Field, Predicate, PredicateSet};
use crate::recipes::model::{Recipe, RecipeDocument};
use crate::recipes::pipeline::{Pipeline, Stage};

/// Leading whitespace-delimited token of `nutrients.calories` as a double;
/// 0 when it is not a decimal literal or does not fit a `float8`. See
/// `migrations/0002_safe_calories.sql`.
const CALORIES_SQL: &str = "safe_calories(doc->'nutrients'->>'calories')";

const RATING_SQL: &str = "CASE WHEN jsonb_typeof(doc->'rating') = 'number' \
                          THEN (doc->>'rating')::float8 END";

#[derive(Debug, FromRow)]
struct RecipeRow {
    id: Uuid,
    doc: Json<RecipeDocument>,
}

impl From<RecipeRow> for Recipe {
    fn from(r: RecipeRow) -> Self {
        Recipe::new(r.id, r.doc.0)
    }
}

/// Recipes stored as JSONB documents in `recipes(id, seq, doc)`. `seq` is the
/// insertion order and never leaves the store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Stage list split by kind, after checking the stages appear in
/// canonical order.
#[derive(Debug, Default)]
struct Plan<'a> {
    derived: bool,
    filters: Vec<&'a PredicateSet>,
    sorted: bool,
    skip: Option<u64>,
    limit: Option<u64>,
}

impl<'a> Plan<'a> {
    fn from_pipeline(pipeline: &'a Pipeline) -> Result<Self, StoreError> {
        let mut plan = Plan::default();
        let mut last_rank = 0u8;
        for stage in pipeline.stages() {
            if stage.rank() < last_rank {
                return Err(StoreError::Pipeline(format!("{stage:?} out of order")));
            }
            last_rank = stage.rank();
            match stage {
                Stage::DeriveCalories => plan.derived = true,
                Stage::Filter(set) => {
                    if set.references_derived() && !plan.derived {
                        return Err(StoreError::Pipeline(
                            "caloriesNumeric filtered before derive".into(),
                        ));
                    }
                    plan.filters.push(set);
                }
                Stage::Sort => {
                    if !plan.derived {
                        return Err(StoreError::Pipeline("sort before derive".into()));
                    }
                    plan.sorted = true;
                }
                Stage::Skip(n) => plan.skip = Some(plan.skip.unwrap_or(0).saturating_add(*n)),
                Stage::Limit(n) => plan.limit = Some(plan.limit.map_or(*n, |l| l.min(*n))),
                // Only `id` and `doc` are ever selected.
                Stage::Project => {}
            }
        }
        Ok(plan)
    }
}

#[derive(Debug, Clone, Copy)]
enum Select {
    Documents,
    Count,
}

fn build_query<'a>(plan: &Plan<'_>, select: Select) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new("WITH derived AS (SELECT id, seq, doc, ");
    if plan.derived {
        qb.push(CALORIES_SQL);
    } else {
        qb.push("NULL::float8");
    }
    qb.push(" AS calories_numeric FROM recipes) ");

    match select {
        Select::Documents => qb.push("SELECT id, doc FROM derived WHERE TRUE"),
        Select::Count => qb.push("SELECT COUNT(*) FROM derived WHERE TRUE"),
    };

    for set in &plan.filters {
        for p in set.iter() {
            qb.push(" AND ");
            match &p.predicate {
                Predicate::Contains(pattern) => {
                    qb.push(format!("doc->>'{}' ILIKE ", p.field.name()));
                    qb.push_bind(format!("%{}%", escape_like(pattern)));
                    qb.push(r" ESCAPE '\'");
                }
                Predicate::Compare { op, value } => {
                    qb.push(numeric_sql(p.field));
                    qb.push(format!(" {} ", op.as_sql()));
                    qb.push_bind(*value);
                }
            }
        }
    }

    if let Select::Documents = select {
        if plan.sorted {
            qb.push(format!(
                " ORDER BY {RATING_SQL} DESC NULLS LAST, calories_numeric DESC, seq ASC"
            ));
        } else {
            qb.push(" ORDER BY seq ASC");
        }
        if let Some(skip) = plan.skip {
            qb.push(" OFFSET ");
            qb.push_bind(i64::try_from(skip).unwrap_or(i64::MAX));
        }
        if let Some(limit) = plan.limit {
            qb.push(" LIMIT ");
            qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }
    }
    qb
}

fn numeric_sql(field: Field) -> String {
    match field {
        Field::CaloriesNumeric => "calories_numeric".to_string(),
        f => format!(
            "(CASE WHEN jsonb_typeof(doc->'{0}') = 'number' THEN (doc->>'{0}')::float8 END)",
            f.name()
        ),
    }
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[async_trait]
impl RecipeStore for PgStore {
    async fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<Recipe>, StoreError> {
        let plan = Plan::from_pipeline(pipeline)?;
        let mut qb = build_query(&plan, Select::Documents);
        debug!(sql = qb.sql(), "aggregate");
        let rows = qb
            .build_query_as::<RecipeRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Recipe::from).collect())
    }

    async fn count(&self, pipeline: &Pipeline) -> Result<u64, StoreError> {
        if !pipeline.is_candidate_only() {
            return Err(StoreError::Pipeline(
                "count accepts only derive and filter stages".into(),
            ));
        }
        let plan = Plan::from_pipeline(pipeline)?;
        let mut qb = build_query(&plan, Select::Count);
        let total: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(total.max(0) as u64)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Recipe>, StoreError> {
        let id = parse_id(id)?;
        let row = sqlx::query_as::<_, RecipeRow>(
            r#"
            SELECT id, doc
            FROM recipes
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Recipe::from))
    }

    async fn replace_all(
        &self,
        docs: Vec<RecipeDocument>,
        batch_size: usize,
    ) -> Result<u64, StoreError> {
        let batch_size = batch_size.max(1);
        let batches = docs.len().div_ceil(batch_size);
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM recipes").execute(&mut *tx).await?;
        info!("cleared existing recipes");

        let mut inserted = 0u64;
        for (i, chunk) in docs.chunks(batch_size).enumerate() {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO recipes (id, doc) ");
            qb.push_values(chunk, |mut b, doc| {
                b.push_bind(Uuid::new_v4()).push_bind(Json(doc.clone()));
            });
            let done = qb.build().execute(&mut *tx).await?;
            inserted += done.rows_affected();
            info!(batch = i + 1, batches, size = chunk.len(), "imported batch");
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
