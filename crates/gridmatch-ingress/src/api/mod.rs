//! HTTP surface of a node.
//!
//! | Route | Handler |
//! |---|---|
//! | `POST /v1/orders` | submit an order |
//! | `GET /v1/orders/{id}` | read an order |
//! | `DELETE /v1/orders/{id}` | cancel an order |
//! | `GET /v1/markets/{market}/book` | aggregated book depth |
//! | `GET /v1/settlement/{round}/{group}/{role}` | committed sorted result |
//! | `POST /v1/settlement/readings` | stage meter readings |
//! | `GET /v1/ws` | live feed (websocket) |
//! | `GET /health` | liveness |

pub mod error;
pub mod handlers;
pub mod state;
pub mod ws;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use state::AppState;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/orders", post(handlers::submit_order))
        .route(
            "/orders/{id}",
            get(handlers::get_order).delete(handlers::cancel_order),
        )
        .route("/markets/{market}/book", get(handlers::book))
        .route(
            "/settlement/{round}/{group}/{role}",
            get(handlers::sorted_result),
        )
        .route("/settlement/readings", post(handlers::stage_readings))
        .route("/ws", get(ws::ws_handler));

    Router::new()
        .nest("/v1", api)
        .route("/health", get(handlers::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
