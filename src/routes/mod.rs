pub mod estimation;
pub mod health;

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::app::AppState;

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        // Bills of quantities
        .route(
            "/estimation/boq",
            get(estimation::list_boqs).post(estimation::create_boq),
        )
        .route(
            "/estimation/boq/:boq_id",
            get(estimation::get_boq)
                .patch(estimation::update_boq)
                .delete(estimation::delete_boq),
        )
        .route("/estimation/boq/:boq_id/items", get(estimation::list_boq_items))
        .route(
            "/estimation/boq/:boq_id/summary",
            get(estimation::get_boq_summary),
        )
}
