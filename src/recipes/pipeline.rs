//! Query pipeline: derive → filter → sort → (count) → paginate → project.
//!
//! The executor functions build a [`Pipeline`] and hand it to the injected
//! [`RecipeStore`]. The total and the page are fetched in two independent
//! round-trips, so under concurrent imports `total` is best-effort.

use tracing::debug;

use crate::error::ApiError;
use crate::recipes::dto::PageResponse;
use crate::recipes::filter::PredicateSet;
use crate::recipes::model::Recipe;
use crate::store::RecipeStore;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 50;
/// Cap for the unpaginated `GET /recipes` lookup.
pub const NAME_LOOKUP_LIMIT: u64 = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Adds `caloriesNumeric` to every candidate.
    DeriveCalories,
    Filter(PredicateSet),
    /// Rating desc (missing last), then caloriesNumeric desc; stable.
    Sort,
    Skip(u64),
    Limit(u64),
    /// Drops derived and bookkeeping fields.
    Project,
}

impl Stage {
    /// Position of the stage kind in the canonical order.
    pub fn rank(&self) -> u8 {
        match self {
            Stage::DeriveCalories => 0,
            Stage::Filter(_) => 1,
            Stage::Sort => 2,
            Stage::Skip(_) => 3,
            Stage::Limit(_) => 4,
            Stage::Project => 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Derive and filter: the stages that define the candidate set.
    pub fn candidates(predicates: PredicateSet) -> Self {
        Self {
            stages: vec![Stage::DeriveCalories, Stage::Filter(predicates)],
        }
    }

    /// Raw stage list; stores reject orders they cannot execute.
    pub fn from_stages(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    pub fn sorted(mut self) -> Self {
        self.stages.push(Stage::Sort);
        self
    }

    pub fn paginate(mut self, page: PageRequest) -> Self {
        if page.skip() > 0 {
            self.stages.push(Stage::Skip(page.skip()));
        }
        self.stages.push(Stage::Limit(page.limit as u64));
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.stages.push(Stage::Limit(n));
        self
    }

    pub fn project(mut self) -> Self {
        self.stages.push(Stage::Project);
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// True when the pipeline only derives and filters.
    pub fn is_candidate_only(&self) -> bool {
        self.stages
            .iter()
            .all(|s| matches!(s, Stage::DeriveCalories | Stage::Filter(_)))
    }
}

/// Clamped, 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(DEFAULT_PAGE).max(1),
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        }
    }

    pub fn skip(&self) -> u64 {
        ((self.page - 1) as u64).saturating_mul(self.limit as u64)
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(self.limit as u64)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Sorted, unfiltered page; `total` is the collection size.
pub async fn list_recipes(
    store: &dyn RecipeStore,
    page: PageRequest,
) -> Result<PageResponse<Recipe>, ApiError> {
    run_paged(store, PredicateSet::default(), page).await
}

/// Sorted page of the candidates matching `predicates`; `total` is the
/// filtered count.
pub async fn search_recipes(
    store: &dyn RecipeStore,
    predicates: &PredicateSet,
    page: PageRequest,
) -> Result<PageResponse<Recipe>, ApiError> {
    run_paged(store, predicates.clone(), page).await
}

async fn run_paged(
    store: &dyn RecipeStore,
    predicates: PredicateSet,
    page: PageRequest,
) -> Result<PageResponse<Recipe>, ApiError> {
    let candidates = Pipeline::candidates(predicates);
    let total = store.count(&candidates).await?;
    let data = store
        .aggregate(&candidates.sorted().paginate(page).project())
        .await?;
    debug!(
        total,
        page = page.page,
        limit = page.limit,
        returned = data.len(),
        "recipe page"
    );
    Ok(PageResponse {
        page: page.page,
        limit: page.limit,
        total,
        total_pages: page.total_pages(total),
        data,
    })
}

/// Unsorted title lookup backing `GET /recipes`, capped at
/// [`NAME_LOOKUP_LIMIT`] documents.
pub async fn find_by_name(
    store: &dyn RecipeStore,
    predicates: PredicateSet,
) -> Result<Vec<Recipe>, ApiError> {
    let pipeline = Pipeline::candidates(predicates)
        .limit(NAME_LOOKUP_LIMIT)
        .project();
    Ok(store.aggregate(&pipeline).await?)
}

/// Full stored document. A malformed id is an operational failure, a
/// well-formed but unknown one is `NotFound`.
pub async fn get_by_id(store: &dyn RecipeStore, id: &str) -> Result<Recipe, ApiError> {
    store.find_by_id(id).await?.ok_or(ApiError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipes::filter::{compile, compile_name, FilterParams};
    use crate::recipes::model::{calories_numeric, RecipeDocument};
    use crate::store::MemoryStore;
    use serde_json::json;
    use uuid::Uuid;

    fn doc(title: &str, rating: Option<f64>, calories: Option<&str>) -> RecipeDocument {
        let mut d = RecipeDocument {
            title: Some(title.into()),
            rating,
            ..Default::default()
        };
        if let Some(c) = calories {
            d.nutrients.insert("calories".into(), json!(c));
        }
        d
    }

    async fn store_with(docs: Vec<RecipeDocument>) -> MemoryStore {
        let store = MemoryStore::new();
        store.replace_all(docs, 2).await.unwrap();
        store
    }

    fn titles(recipes: &[Recipe]) -> Vec<String> {
        recipes
            .iter()
            .map(|r| r.doc.title.clone().unwrap_or_default())
            .collect()
    }

    #[test]
    fn page_request_clamps() {
        assert_eq!(PageRequest::new(None, None), PageRequest { page: 1, limit: 10 });
        assert_eq!(PageRequest::new(Some(0), Some(0)), PageRequest { page: 1, limit: 1 });
        assert_eq!(PageRequest::new(Some(-4), Some(500)), PageRequest { page: 1, limit: 50 });
        assert_eq!(PageRequest::new(Some(3), Some(20)).skip(), 40);
    }

    #[test]
    fn total_pages_rounds_up() {
        let p = PageRequest::new(None, Some(2));
        assert_eq!(p.total_pages(0), 0);
        assert_eq!(p.total_pages(3), 2);
        assert_eq!(p.total_pages(4), 2);
    }

    #[test]
    fn pipeline_stage_order() {
        let p = Pipeline::candidates(PredicateSet::default())
            .sorted()
            .paginate(PageRequest::new(Some(2), Some(5)))
            .project();
        let ranks: Vec<u8> = p.stages().iter().map(Stage::rank).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3, 4, 5]);
        assert!(!p.is_candidate_only());
        assert!(Pipeline::candidates(PredicateSet::default()).is_candidate_only());
    }

    #[tokio::test]
    async fn ratings_sort_and_page_boundaries() {
        let store = store_with(vec![
            doc("none", None, Some("900 kcal")),
            doc("low-cal top", Some(4.8), Some("200 kcal")),
            doc("mid", Some(4.2), Some("100 kcal")),
            doc("high-cal top", Some(4.8), Some("650 kcal")),
        ])
        .await;

        let first = list_recipes(&store, PageRequest::new(Some(1), Some(2)))
            .await
            .unwrap();
        assert_eq!(first.total, 4);
        assert_eq!(first.total_pages, 2);
        assert_eq!(titles(&first.data), vec!["high-cal top", "low-cal top"]);

        let second = list_recipes(&store, PageRequest::new(Some(2), Some(2)))
            .await
            .unwrap();
        assert_eq!(titles(&second.data), vec!["mid", "none"]);
    }

    #[tokio::test]
    async fn pages_reconstruct_the_sorted_set_once() {
        let docs: Vec<RecipeDocument> = (0..23)
            .map(|i| {
                let rating = if i % 5 == 0 { None } else { Some((i % 4) as f64 + 1.5) };
                let calories = format!("{} kcal", (i * 37) % 11);
                doc(&format!("r{i}"), rating, Some(calories.as_str()))
            })
            .collect();
        let store = store_with(docs).await;

        let whole = list_recipes(&store, PageRequest::new(Some(1), Some(50)))
            .await
            .unwrap();
        assert_eq!(whole.data.len(), 23);

        for size in [1, 3, 7, 10] {
            let mut seen: Vec<Uuid> = Vec::new();
            let first = list_recipes(&store, PageRequest::new(Some(1), Some(size)))
                .await
                .unwrap();
            for page in 1..=first.total_pages as i64 {
                let resp = list_recipes(&store, PageRequest::new(Some(page), Some(size)))
                    .await
                    .unwrap();
                assert!(resp.data.len() as i64 <= size);
                seen.extend(resp.data.iter().map(|r| r.id));
            }
            let expected: Vec<Uuid> = whole.data.iter().map(|r| r.id).collect();
            assert_eq!(seen, expected, "page size {size}");
        }

        for pair in whole.data.windows(2) {
            let (a, b) = (&pair[0].doc, &pair[1].doc);
            let calories_desc = calories_numeric(a) >= calories_numeric(b);
            match (a.rating, b.rating) {
                (Some(x), Some(y)) => assert!(x > y || (x == y && calories_desc)),
                (Some(_), None) => {}
                (None, None) => assert!(calories_desc),
                (None, Some(_)) => panic!("missing rating sorted before a present one"),
            }
        }
    }

    #[tokio::test]
    async fn ties_keep_insertion_order_across_pages() {
        let mut docs = vec![doc("top", Some(5.0), Some("10 kcal"))];
        docs.extend((0..12).map(|i| doc(&format!("tie {i:02}"), Some(4.0), Some("300 kcal"))));
        docs.insert(6, doc("unrated", None, Some("900 kcal")));
        let store = store_with(docs).await;

        let mut seen = Vec::new();
        for page in 1..=3 {
            let resp = list_recipes(&store, PageRequest::new(Some(page), Some(5)))
                .await
                .unwrap();
            seen.extend(titles(&resp.data));
        }
        let mut expected = vec!["top".to_string()];
        expected.extend((0..12).map(|i| format!("tie {i:02}")));
        expected.push("unrated".into());
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn empty_search_matches_listing() {
        let store = store_with(vec![
            doc("a", Some(3.0), None),
            doc("b", Some(5.0), Some("10 kcal")),
            doc("c", None, None),
            doc("d", Some(5.0), Some("20 kcal")),
        ])
        .await;
        let page = PageRequest::new(Some(1), Some(3));
        let listed = list_recipes(&store, page).await.unwrap();
        let searched = search_recipes(&store, &compile(&FilterParams::default()), page)
            .await
            .unwrap();
        assert_eq!(listed.data, searched.data);
        assert_eq!(listed.total, searched.total);
    }

    #[tokio::test]
    async fn search_counts_filtered_candidates() {
        let store = store_with(vec![
            doc("Chicken Soup", Some(4.6), Some("389 kcal")),
            doc("Beef Stew", Some(4.9), Some("720 kcal")),
            doc("chicken wings", Some(4.1), Some("450 kcal")),
            doc("Salad", None, Some("kcal")),
        ])
        .await;

        let params = FilterParams {
            calories: Some("<=400".into()),
            ..Default::default()
        };
        let resp = search_recipes(&store, &compile(&params), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(resp.total, 2);
        assert_eq!(titles(&resp.data), vec!["Chicken Soup", "Salad"]);

        let params = FilterParams {
            title: Some("CHICKEN".into()),
            rating: Some(">=4.5".into()),
            ..Default::default()
        };
        let resp = search_recipes(&store, &compile(&params), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(resp.total, 1);
        assert_eq!(resp.total_pages, 1);
        assert_eq!(titles(&resp.data), vec!["Chicken Soup"]);
    }

    #[tokio::test]
    async fn get_by_id_distinguishes_missing_from_malformed() {
        let store = store_with(vec![doc("only", Some(1.0), None)]).await;
        let listed = list_recipes(&store, PageRequest::default()).await.unwrap();
        let id = listed.data[0].id.to_string();

        assert_eq!(get_by_id(&store, &id).await.unwrap().id, listed.data[0].id);
        assert!(matches!(
            get_by_id(&store, &Uuid::new_v4().to_string()).await,
            Err(ApiError::NotFound)
        ));
        assert!(matches!(
            get_by_id(&store, "not-an-id").await,
            Err(ApiError::Operational(_))
        ));
    }

    #[tokio::test]
    async fn name_lookup_caps_results() {
        let docs = (0..120).map(|i| doc(&format!("Pie {i}"), None, None)).collect();
        let store = store_with(docs).await;
        let found = find_by_name(&store, compile_name(Some("pie")))
            .await
            .unwrap();
        assert_eq!(found.len(), NAME_LOOKUP_LIMIT as usize);
        assert_eq!(found[0].doc.title.as_deref(), Some("Pie 0"));
    }
}
