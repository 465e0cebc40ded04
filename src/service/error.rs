//! Service-tier error type and its single canonical JSON error envelope
//! (SPEC_FULL.md §6.1, §7, §9, §10.2).
//!
//! Grounded on `amoljassal-sis-kernel-showcase/apps/daemon/src/api/
//! handlers.rs`'s `ErrorResponse` + `IntoResponse`-at-the-boundary idiom,
//! collapsed to the single `{code, message}` shape SPEC_FULL.md §6.1/§9
//! requires (the daemon's RFC-7807 `ErrorResponse` is richer than this
//! spec calls for; "exactly one error body shape" rules out carrying that
//! extra structure over unchanged).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::core::error::{ControllerError, CpuFault, DecodeError, EvalError, MemoryFault, SyscallError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] ControllerError),
    #[error("no such session {0}")]
    NoSuchSession(uuid::Uuid),
    #[error("could not acquire session lock before the deadline")]
    Busy,
    #[error("request exceeded its deadline")]
    Timeout,
    #[error("invalid request: {0}")]
    BadRequest(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

fn status_and_code(err: &ApiError) -> (StatusCode, &'static str) {
    match err {
        ApiError::Core(ControllerError::InvalidState { .. }) => (StatusCode::CONFLICT, "invalid_state"),
        ApiError::Core(ControllerError::NoSuchBreakpoint(_)) => (StatusCode::NOT_FOUND, "no_such_breakpoint"),
        ApiError::Core(ControllerError::NoSuchWatchpoint(_)) => (StatusCode::NOT_FOUND, "no_such_watchpoint"),
        ApiError::Core(ControllerError::Eval(EvalError::UnknownIdentifier(_))) => (StatusCode::BAD_REQUEST, "unknown_symbol"),
        ApiError::Core(ControllerError::Eval(EvalError::SyntaxError(_))) => (StatusCode::BAD_REQUEST, "syntax_error"),
        ApiError::Core(ControllerError::Eval(EvalError::Memory(_))) => (StatusCode::BAD_REQUEST, "access_fault"),
        ApiError::Core(ControllerError::Fault(CpuFault::Decode(DecodeError::IllegalInstruction { .. }))) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "illegal_instruction")
        }
        ApiError::Core(ControllerError::Fault(CpuFault::Memory(MemoryFault::AlignmentFault { .. }))) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "alignment_fault")
        }
        ApiError::Core(ControllerError::Fault(CpuFault::Memory(MemoryFault::AccessFault { .. }))) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "access_fault")
        }
        ApiError::Core(ControllerError::Fault(CpuFault::Syscall(SyscallError::UnknownSyscall { .. }))) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "unknown_syscall")
        }
        ApiError::Core(ControllerError::Fault(CpuFault::Syscall(SyscallError::Memory(_)))) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "access_fault")
        }
        ApiError::Core(ControllerError::Fault(CpuFault::Syscall(SyscallError::Io(_)))) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "io_error")
        }
        ApiError::Core(ControllerError::Memory(MemoryFault::AlignmentFault { .. })) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "alignment_fault")
        }
        ApiError::Core(ControllerError::Memory(MemoryFault::AccessFault { .. })) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "access_fault")
        }
        ApiError::Core(ControllerError::Busy) | ApiError::Busy => (StatusCode::SERVICE_UNAVAILABLE, "busy"),
        ApiError::NoSuchSession(_) => (StatusCode::NOT_FOUND, "no_such_session"),
        ApiError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = status_and_code(&self);
        let body = ErrorBody { code, message: self.to_string() };
        (status, Json(body)).into_response()
    }
}
