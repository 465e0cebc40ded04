//! End-to-end tests for the HTTP/WebSocket surface (SPEC_FULL.md §6.1,
//! §10.7): drives the `axum::Router` in-process via `tower::ServiceExt::
//! oneshot`, no bound socket, the way `wilsonzlin-aero/crates/
//! aero-storage-server/tests/readiness.rs` exercises its router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use arm2vm::core::session::SessionManager;
use arm2vm::core::syscall::SyscallConfig;
use arm2vm::service::create_router;

fn test_sandbox() -> SyscallConfig {
    SyscallConfig { sandbox_root: std::env::temp_dir(), heap_base: 0x0040_0000, heap_size: 0x10_000 }
}

fn app() -> axum::Router {
    let sessions = Arc::new(SessionManager::new(0xFFFF_0000, 0x1_0000, test_sandbox()));
    create_router(sessions)
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// `MOV R0,#42 ; MOV R1,#10 ; ADD R2,R0,R1 ; SWI #0x00`, encoded little-endian,
/// matching the S1 scenario covered at the core level in `core::cpu::tests`.
fn s1_program_bytes() -> Vec<u8> {
    let words: [u32; 4] = [0xE3A0002A, 0xE3A0100A, 0xE0802001, 0xEF000000];
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

#[tokio::test]
async fn health_reports_ok() {
    let app = app();
    let resp = app.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn unknown_session_returns_not_found() {
    let app = app();
    let resp = app
        .oneshot(Request::builder().uri("/sessions/00000000-0000-0000-0000-000000000000/registers").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp).await;
    assert!(body["code"].is_string());
}

#[tokio::test]
async fn s1_basic_arithmetic_over_http() {
    let app = app();

    let resp = app.clone().oneshot(Request::builder().method("POST").uri("/sessions").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let created = body_json(resp).await;
    let id = created["id"].as_str().unwrap();

    let program = json!({
        "segments": [{ "kind": "code", "base": 0x8000, "bytes": s1_program_bytes() }],
        "symbols": [{ "name": "_start", "addr": 0x8000 }],
        "line_map": [],
    });
    let resp = app
        .clone()
        .oneshot(json_request("POST", &format!("/sessions/{id}/program"), program))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    for _ in 0..3 {
        let resp = app.clone().oneshot(Request::builder().method("POST").uri(format!("/sessions/{id}/step")).body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = app.clone().oneshot(Request::builder().uri(format!("/sessions/{id}/registers")).body(Body::empty()).unwrap()).await.unwrap();
    let regs = body_json(resp).await;
    assert_eq!(regs["r"][0], 42);
    assert_eq!(regs["r"][1], 10);
    assert_eq!(regs["r"][2], 52);
    assert_eq!(regs["state"], "paused");

    let resp = app.clone().oneshot(Request::builder().method("POST").uri(format!("/sessions/{id}/step")).body(Body::empty()).unwrap()).await.unwrap();
    let state = body_json(resp).await;
    assert_eq!(state["state"], "halted");

    let resp = app.oneshot(Request::builder().method("DELETE").uri(format!("/sessions/{id}")).body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn breakpoint_crud_round_trips() {
    let app = app();
    let resp = app.clone().oneshot(Request::builder().method("POST").uri("/sessions").body(Body::empty()).unwrap()).await.unwrap();
    let created = body_json(resp).await;
    let id = created["id"].as_str().unwrap();

    let resp = app
        .clone()
        .oneshot(json_request("POST", &format!("/sessions/{id}/breakpoints"), json!({ "addr": 0x8004 })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let created_bp = body_json(resp).await;
    let bp_id = created_bp["id"].as_u64().unwrap();

    let resp = app
        .clone()
        .oneshot(Request::builder().method("DELETE").uri(format!("/sessions/{id}/breakpoints/{bp_id}")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // Double-remove is idempotent at the protocol boundary: it surfaces as a
    // typed not-found error rather than a panic or a silent 200 (§8).
    let resp = app
        .oneshot(Request::builder().method("DELETE").uri(format!("/sessions/{id}/breakpoints/{bp_id}")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn evaluate_reads_registers_and_memory() {
    let app = app();
    let resp = app.clone().oneshot(Request::builder().method("POST").uri("/sessions").body(Body::empty()).unwrap()).await.unwrap();
    let created = body_json(resp).await;
    let id = created["id"].as_str().unwrap();

    let program = json!({
        "segments": [{ "kind": "code", "base": 0x8000, "bytes": s1_program_bytes() }],
        "symbols": [{ "name": "_start", "addr": 0x8000 }],
        "line_map": [],
    });
    app.clone().oneshot(json_request("POST", &format!("/sessions/{id}/program"), program)).await.unwrap();
    app.clone().oneshot(Request::builder().method("POST").uri(format!("/sessions/{id}/step")).body(Body::empty()).unwrap()).await.unwrap();

    let resp = app
        .oneshot(json_request("POST", &format!("/sessions/{id}/evaluate"), json!({ "expr": "R0 == 42" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let result = body_json(resp).await;
    assert_eq!(result["value"], 1);
    assert_eq!(result["divide_by_zero"], false);
}
