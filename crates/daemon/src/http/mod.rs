// SPDX-License-Identifier: MIT

//! The axum HTTP surface. Thin glue only: every route but the heartbeat
//! and the static result stream submits a [`inferd_engine::JobRequest`]
//! onto the scheduler and either blocks for its result (`wrap_sync`) or
//! returns the job descriptor immediately (`wrap_async`), giving every
//! endpoint a synchronous and an asynchronous twin.

pub mod error;
pub mod heartbeat;
pub mod jobs;
pub mod package;
pub mod respond;
pub mod result;
pub mod run;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full router: every endpoint plus each route's `/async/...`
/// twin.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(heartbeat::heartbeat))
        .route("/run/:pkg/:fn", post(run::call_sync))
        .route("/async/run/:pkg/:fn", post(run::call_async))
        .route("/_run/:pkg/:model", post(run::call_raw_sync))
        .route("/async/_run/:pkg/:model", post(run::call_raw_async))
        .route("/result/:name", get(result::get_result))
        .route("/async/get/:uid", get(jobs::async_get))
        .route("/async/cancel/:uid", get(jobs::async_cancel))
        .route("/package/install", post(package::install_sync))
        .route("/async/package/install", post(package::install_async))
        .route("/package/fetch", post(package::fetch_sync))
        .route("/async/package/fetch", post(package::fetch_async))
        .route("/package/activate", post(package::activate_sync))
        .route("/async/package/activate", post(package::activate_async))
        .route("/package/deactivate", post(package::deactivate_sync))
        .route("/async/package/deactivate", post(package::deactivate_async))
        .route("/package/remove", post(package::remove_sync))
        .route("/async/package/remove", post(package::remove_async))
        .route("/package/search", post(package::search_sync))
        .route("/async/package/search", post(package::search_async))
        .route("/package/list", get(package::list_sync))
        .route("/async/package/list", get(package::list_async))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
