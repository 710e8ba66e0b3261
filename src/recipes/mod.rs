pub mod dto;
pub mod filter;
pub mod handlers;
pub mod import;
pub mod model;
pub mod pipeline;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::lookup_routes())
        .merge(handlers::api_routes())
}
