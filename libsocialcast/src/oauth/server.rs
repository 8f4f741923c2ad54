//! HTTP listener for the provider's redirect

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};

use super::{CallbackQuery, OAuthEngine};

pub(crate) fn router(engine: Arc<OAuthEngine>) -> Router {
    Router::new()
        .route("/callback", get(handle_callback))
        .with_state(engine)
}

async fn handle_callback(
    State(engine): State<Arc<OAuthEngine>>,
    Query(query): Query<CallbackQuery>,
) -> impl IntoResponse {
    let page = engine.handle_callback(query).await;
    (page.status, page.body)
}
