use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use tracing::instrument;

use crate::{
    error::ApiError,
    recipes::{
        dto::{NameQuery, PageResponse, Pagination, SearchQuery},
        filter::{compile, compile_name},
        model::Recipe,
        pipeline,
    },
    state::AppState,
};

// --- public routers ---

/// Original lookup routes: title substring only, no paging or operators.
pub fn lookup_routes() -> Router<AppState> {
    Router::new()
        .route("/recipes", get(find_recipes))
        .route("/recipes/:id", get(get_recipe))
}

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/recipes", get(list_recipes))
        .route("/api/recipes/search", get(search_recipes))
}

// --- handlers ---

#[instrument(skip(state))]
pub async fn find_recipes(
    State(state): State<AppState>,
    Query(q): Query<NameQuery>,
) -> Result<Json<Vec<Recipe>>, ApiError> {
    let predicates = compile_name(q.name.as_deref());
    let recipes = pipeline::find_by_name(state.store.as_ref(), predicates).await?;
    Ok(Json(recipes))
}

#[instrument(skip(state))]
pub async fn get_recipe(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Recipe>, ApiError> {
    let recipe = pipeline::get_by_id(state.store.as_ref(), &id).await?;
    Ok(Json(recipe))
}

#[instrument(skip(state))]
pub async fn list_recipes(
    State(state): State<AppState>,
    Query(p): Query<Pagination>,
) -> Result<Json<PageResponse<Recipe>>, ApiError> {
    let page = pipeline::list_recipes(state.store.as_ref(), p.to_request()).await?;
    Ok(Json(page))
}

#[instrument(skip(state))]
pub async fn search_recipes(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<PageResponse<Recipe>>, ApiError> {
    let predicates = compile(&q.filters);
    let page = pipeline::search_recipes(
        state.store.as_ref(),
        &predicates,
        q.pagination.to_request(),
    )
    .await?;
    Ok(Json(page))
}
