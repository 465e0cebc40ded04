//! RPC handlers (SPEC_FULL.md §6.1).
//!
//! Grounded on `amoljassal-sis-kernel-showcase/apps/daemon/src/api/
//! handlers.rs`'s per-endpoint handler shape (`State<Arc<_>>` extractor,
//! `Result<Json<_>, ApiError>` return, session lookup mapped to a typed
//! not-found error) — without that file's `utoipa` annotations and RFC-7807
//! `ErrorResponse`, which this crate does not carry (see DESIGN.md).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::core::breakpoint::{WatchMode, WatchTarget};
use crate::core::image::{ProgramImage, Segment, SegmentKind};
use crate::core::session::{Session, StdinOutcome};
use crate::service::dto::*;
use crate::service::error::ApiError;
use crate::service::routes::AppState;

type SharedState = Arc<AppState>;

async fn find_session(state: &SharedState, id: Uuid) -> Result<Arc<Session>, ApiError> {
    state.sessions.get(id).await.ok_or(ApiError::NoSuchSession(id))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

#[instrument(skip(state))]
pub async fn create_session(State(state): State<SharedState>) -> Json<CreateSessionResponse> {
    let session = state.sessions.create().await;
    info!(session_id = %session.id, "session created");
    Json(CreateSessionResponse { id: session.id, version: session.version() })
}

pub async fn destroy_session(State(state): State<SharedState>, Path(id): Path<Uuid>) -> Result<Json<serde_json::Value>, ApiError> {
    if state.sessions.destroy(id).await {
        Ok(Json(serde_json::json!({ "destroyed": true })))
    } else {
        Err(ApiError::NoSuchSession(id))
    }
}

pub async fn load_program(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(body): Json<LoadProgramRequest>,
) -> Result<Json<StateResponse>, ApiError> {
    let session = find_session(&state, id).await?;
    let mut image = ProgramImage::default();
    for seg in body.segments {
        let kind = match seg.kind {
            SegmentKindDto::Code => SegmentKind::Code,
            SegmentKindDto::Data => SegmentKind::Data,
        };
        image.segments.push(Segment { kind, base: seg.base, bytes: seg.bytes });
    }
    for sym in body.symbols {
        image.symbols.insert(sym.name, sym.addr);
    }
    for line in body.line_map {
        image.line_to_addr.insert(line.line, line.addr);
        image.addr_to_line.insert(line.addr, line.line);
    }
    session
        .load_program(
            image,
            state.sessions.default_syscall_config.clone(),
            state.sessions.default_stack_base,
            state.sessions.default_stack_size,
        )
        .await?;
    state_response(&session).await
}

async fn state_response(session: &Session) -> Result<Json<StateResponse>, ApiError> {
    let (state, version) = session.with_controller(|c| (c.state(), c.version())).await?;
    Ok(Json(StateResponse { state, version }))
}

pub async fn get_registers(State(state): State<SharedState>, Path(id): Path<Uuid>) -> Result<Json<RegistersResponse>, ApiError> {
    let session = find_session(&state, id).await?;
    let resp = session
        .with_controller(|c| RegistersResponse {
            r: *c.registers(),
            cpsr: CpsrDto { n: c.cpsr().n, z: c.cpsr().z, c: c.cpsr().c, v: c.cpsr().v },
            cycles: c.cycles(),
            pc: c.registers()[crate::core::cpu::PC],
            state: c.state(),
            version: c.version(),
        })
        .await?;
    Ok(Json(resp))
}

pub async fn read_memory(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<MemoryReadQuery>,
) -> Result<Json<MemoryReadResponse>, ApiError> {
    let session = find_session(&state, id).await?;
    let bytes = session
        .with_controller(|c| c.read_memory(query.addr, query.len).map_err(crate::core::error::ControllerError::from))
        .await??;
    Ok(Json(MemoryReadResponse { base: query.addr, bytes_base64: B64.encode(bytes) }))
}

pub async fn write_memory(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(body): Json<MemoryWriteRequest>,
) -> Result<Json<StateResponse>, ApiError> {
    let session = find_session(&state, id).await?;
    let bytes = B64.decode(body.bytes_base64).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    session
        .with_controller_mut(|c| c.write_memory(body.addr, &bytes).map_err(crate::core::error::ControllerError::from))
        .await??;
    state_response(&session).await
}

pub async fn get_disassembly(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<DisassemblyQuery>,
) -> Result<Json<Vec<DisassembledInstruction>>, ApiError> {
    let session = find_session(&state, id).await?;
    let rows = session
        .with_controller(|c| {
            c.disassemble_range(query.addr, query.count)
                .into_iter()
                .map(|d| DisassembledInstruction {
                    addr: d.address,
                    raw: d.raw,
                    mnemonic: d.formatted,
                    symbol: c.image().symbol_at(d.address).map(str::to_string),
                })
                .collect::<Vec<_>>()
        })
        .await?;
    Ok(Json(rows))
}

#[instrument(skip(state))]
pub async fn step(State(state): State<SharedState>, Path(id): Path<Uuid>) -> Result<Json<StateResponse>, ApiError> {
    let session = find_session(&state, id).await?;
    session.step().await?;
    session.drain_stdout().await?;
    state_response(&session).await
}

pub async fn step_over(State(state): State<SharedState>, Path(id): Path<Uuid>) -> Result<Json<StateResponse>, ApiError> {
    let session = find_session(&state, id).await?;
    session.step_over().await?;
    session.drain_stdout().await?;
    state_response(&session).await
}

pub async fn step_out(State(state): State<SharedState>, Path(id): Path<Uuid>) -> Result<Json<StateResponse>, ApiError> {
    let session = find_session(&state, id).await?;
    session.step_out().await?;
    session.drain_stdout().await?;
    state_response(&session).await
}

#[instrument(skip(state))]
pub async fn continue_run(State(state): State<SharedState>, Path(id): Path<Uuid>) -> Result<Json<StateResponse>, ApiError> {
    let session = find_session(&state, id).await?;
    session.continue_run().await?;
    session.drain_stdout().await?;
    state_response(&session).await
}

pub async fn stop(State(state): State<SharedState>, Path(id): Path<Uuid>) -> Result<Json<StateResponse>, ApiError> {
    let session = find_session(&state, id).await?;
    session.stop().await?;
    state_response(&session).await
}

pub async fn reset(State(state): State<SharedState>, Path(id): Path<Uuid>) -> Result<Json<StateResponse>, ApiError> {
    let session = find_session(&state, id).await?;
    session.reset(state.sessions.default_syscall_config.clone()).await?;
    state_response(&session).await
}

pub async fn add_breakpoint(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(body): Json<AddBreakpointRequest>,
) -> Result<Json<IdResponse>, ApiError> {
    let session = find_session(&state, id).await?;
    let bp_id = session.with_controller_mut(|c| c.add_breakpoint(body.addr, body.condition, body.temporary)).await?;
    Ok(Json(IdResponse { id: bp_id }))
}

pub async fn remove_breakpoint(
    State(state): State<SharedState>,
    Path((id, bp_id)): Path<(Uuid, u32)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = find_session(&state, id).await?;
    session.with_controller_mut(|c| c.remove_breakpoint(bp_id)).await??;
    Ok(Json(serde_json::json!({ "removed": true })))
}

pub async fn add_watchpoint(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(body): Json<AddWatchpointRequest>,
) -> Result<Json<IdResponse>, ApiError> {
    let session = find_session(&state, id).await?;
    let target = match body.target {
        WatchTargetDto::Register { index } => WatchTarget::Register(index),
        WatchTargetDto::Memory { addr, len } => WatchTarget::Memory { addr, len },
    };
    let mode = match body.mode {
        WatchModeDto::Read => WatchMode::Read,
        WatchModeDto::Write => WatchMode::Write,
        WatchModeDto::ReadWrite => WatchMode::ReadWrite,
    };
    let watch_id = session.with_controller_mut(|c| c.add_watchpoint(target, mode, body.condition)).await?;
    Ok(Json(IdResponse { id: watch_id }))
}

pub async fn remove_watchpoint(
    State(state): State<SharedState>,
    Path((id, watch_id)): Path<(Uuid, u32)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = find_session(&state, id).await?;
    session.with_controller_mut(|c| c.remove_watchpoint(watch_id)).await??;
    Ok(Json(serde_json::json!({ "removed": true })))
}

pub async fn evaluate(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(body): Json<EvaluateRequest>,
) -> Result<Json<EvaluateResponse>, ApiError> {
    let session = find_session(&state, id).await?;
    let outcome = session.with_controller(|c| c.evaluate(&body.expr)).await??;
    let char = char::from_u32(outcome.value & 0xFF).filter(|c| !c.is_control());
    Ok(Json(EvaluateResponse {
        value: outcome.value,
        display: EvaluateDisplay { hex: format!("0x{:08X}", outcome.value), dec: outcome.value.to_string(), char },
        divide_by_zero: outcome.divide_by_zero,
    }))
}

/// `send_stdin`: the single endpoint §9's "double-step after input" fix
/// hinges on. The response's `buffered_or_delivered` tells the client
/// whether a follow-up `step` is its responsibility (buffered) or already
/// happened as part of this request (delivered).
pub async fn send_stdin(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(body): Json<StdinRequest>,
) -> Result<Json<StdinResponse>, ApiError> {
    let session = find_session(&state, id).await?;
    let outcome = session.send_stdin(body.data.as_bytes()).await?;
    if outcome == StdinOutcome::Delivered {
        session.drain_stdout().await?;
    }
    Ok(Json(StdinResponse {
        success: true,
        buffered_or_delivered: match outcome {
            StdinOutcome::Delivered => "delivered",
            StdinOutcome::Buffered => "buffered",
        },
    }))
}
