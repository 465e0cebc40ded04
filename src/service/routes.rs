//! Router assembly (SPEC_FULL.md §6.1, §10.4).
//!
//! Grounded on `amoljassal-sis-kernel-showcase/apps/daemon/src/api/
//! routes.rs`'s `create_router`: one `Router` merging the resource tree with
//! the events WebSocket route, `TraceLayer` and `CorsLayer` applied on top.
//! The daemon also wires `utoipa_swagger_ui`; that crate isn't declared here
//! (see DESIGN.md), so this router is plain `axum` composition.

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::core::session::SessionManager;
use crate::service::handlers;

/// Shared application state handed to every handler.
pub struct AppState {
    pub sessions: Arc<SessionManager>,
}

pub fn create_router(sessions: Arc<SessionManager>) -> Router {
    let state = Arc::new(AppState { sessions });

    Router::new()
        .route("/health", get(handlers::health))
        .route("/sessions", post(handlers::create_session))
        .route("/sessions/:id", delete(handlers::destroy_session))
        .route("/sessions/:id/program", post(handlers::load_program))
        .route("/sessions/:id/registers", get(handlers::get_registers))
        .route("/sessions/:id/memory", get(handlers::read_memory).post(handlers::write_memory))
        .route("/sessions/:id/disassembly", get(handlers::get_disassembly))
        .route("/sessions/:id/step", post(handlers::step))
        .route("/sessions/:id/step_over", post(handlers::step_over))
        .route("/sessions/:id/step_out", post(handlers::step_out))
        .route("/sessions/:id/continue", post(handlers::continue_run))
        .route("/sessions/:id/stop", post(handlers::stop))
        .route("/sessions/:id/reset", post(handlers::reset))
        .route("/sessions/:id/breakpoints", post(handlers::add_breakpoint))
        .route("/sessions/:id/breakpoints/:bp_id", delete(handlers::remove_breakpoint))
        .route("/sessions/:id/watchpoints", post(handlers::add_watchpoint))
        .route("/sessions/:id/watchpoints/:watch_id", delete(handlers::remove_watchpoint))
        .route("/sessions/:id/evaluate", post(handlers::evaluate))
        .route("/sessions/:id/stdin", post(handlers::send_stdin))
        .route("/sessions/:id/events", get(crate::service::ws::events_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
