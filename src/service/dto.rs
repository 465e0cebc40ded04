//! Request/response DTOs for the RPC surface (SPEC_FULL.md §6.1).
//!
//! Grounded on `amoljassal-sis-kernel-showcase/apps/daemon/src/api/
//! handlers.rs`'s request/response struct shapes (plain `serde`
//! `Deserialize`/`Serialize` structs, one per endpoint, no shared envelope
//! beyond the error body) — here field names follow SPEC_FULL.md §6.1's
//! wire contract literally rather than the daemon's `camelCase` convention,
//! since the spec names fields explicitly.

use serde::{Deserialize, Serialize};

use crate::core::debugger::VmState;

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub id: uuid::Uuid,
    pub version: u64,
}

#[derive(Debug, Deserialize)]
pub struct SymbolEntry {
    pub name: String,
    pub addr: u32,
}

#[derive(Debug, Deserialize)]
pub struct LineEntry {
    pub line: u32,
    pub addr: u32,
}

#[derive(Debug, Deserialize)]
pub struct SegmentEntry {
    pub kind: SegmentKindDto,
    pub base: u32,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKindDto {
    Code,
    Data,
}

#[derive(Debug, Deserialize)]
pub struct LoadProgramRequest {
    pub segments: Vec<SegmentEntry>,
    pub symbols: Vec<SymbolEntry>,
    pub line_map: Vec<LineEntry>,
}

#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub state: VmState,
    pub version: u64,
}

#[derive(Debug, Serialize)]
pub struct RegistersResponse {
    pub r: [u32; 16],
    pub cpsr: CpsrDto,
    pub cycles: u64,
    pub pc: u32,
    pub state: VmState,
    pub version: u64,
}

#[derive(Debug, Serialize)]
pub struct CpsrDto {
    pub n: bool,
    pub z: bool,
    pub c: bool,
    pub v: bool,
}

#[derive(Debug, Deserialize)]
pub struct MemoryReadQuery {
    pub addr: u32,
    pub len: u32,
}

#[derive(Debug, Serialize)]
pub struct MemoryReadResponse {
    pub base: u32,
    pub bytes_base64: String,
}

#[derive(Debug, Deserialize)]
pub struct MemoryWriteRequest {
    pub addr: u32,
    pub bytes_base64: String,
}

#[derive(Debug, Deserialize)]
pub struct DisassemblyQuery {
    pub addr: u32,
    pub count: u32,
}

#[derive(Debug, Serialize)]
pub struct DisassembledInstruction {
    pub addr: u32,
    pub raw: u32,
    pub mnemonic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddBreakpointRequest {
    pub addr: u32,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub temporary: bool,
}

#[derive(Debug, Serialize)]
pub struct IdResponse {
    pub id: u32,
}

#[derive(Debug, Deserialize)]
pub struct AddWatchpointRequest {
    pub target: WatchTargetDto,
    pub mode: WatchModeDto,
    #[serde(default)]
    pub condition: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WatchTargetDto {
    Register { index: u8 },
    Memory { addr: u32, len: u32 },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchModeDto {
    Read,
    Write,
    ReadWrite,
}

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub expr: String,
}

#[derive(Debug, Serialize)]
pub struct EvaluateResponse {
    pub value: u32,
    pub display: EvaluateDisplay,
    pub divide_by_zero: bool,
}

#[derive(Debug, Serialize)]
pub struct EvaluateDisplay {
    pub hex: String,
    pub dec: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub char: Option<char>,
}

#[derive(Debug, Deserialize)]
pub struct StdinRequest {
    pub data: String,
}

#[derive(Debug, Serialize)]
pub struct StdinResponse {
    pub success: bool,
    pub buffered_or_delivered: &'static str,
}
