//! HTTP/WebSocket service layer (SPEC_FULL.md C7 / §4.7 / §6 / §10.4).
//!
//! Grounded on `amoljassal-sis-kernel-showcase/apps/daemon/src/api/` (
//! `routes.rs`'s `create_router`, `handlers.rs`'s per-endpoint handler shape,
//! `ws.rs`'s `events_handler`) and `.../src/config.rs`'s `DaemonConfig`, with
//! `utoipa`/OpenAPI generation deliberately not carried over — neither crate
//! is in this crate's dependency table (see DESIGN.md).

pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod ws;

pub use routes::create_router;
