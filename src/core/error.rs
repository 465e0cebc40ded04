use thiserror::Error;

use crate::core::eval::EvalError;

/// Memory-access faults. Fatal at the CPU level; the controller converts
/// either into a transition to `Faulted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MemoryFault {
    #[error("unaligned access of width {width} at {addr:#010x}")]
    AlignmentFault { addr: u32, width: u32 },
    #[error("access outside mapped memory at {addr:#010x} (len {len})")]
    AccessFault { addr: u32, len: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("illegal instruction encoding {raw:#010x} at {addr:#010x}")]
    IllegalInstruction { addr: u32, raw: u32 },
}

#[derive(Debug, Error)]
pub enum SyscallError {
    #[error("unknown SWI immediate {imm:#x}")]
    UnknownSyscall { imm: u32 },
    #[error(transparent)]
    Memory(#[from] MemoryFault),
    #[error("I/O error: {0}")]
    Io(String),
}

/// A single fault surfaced by `step()`. Any variant here drives the VM to
/// `Faulted` except where noted.
#[derive(Debug, Error)]
pub enum CpuFault {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Memory(#[from] MemoryFault),
    #[error(transparent)]
    Syscall(#[from] SyscallError),
}

/// Errors raised by the debugger controller. Most are non-fatal and are
/// surfaced to the RPC caller as-is; `Fault` carries a `CpuFault` that has
/// already driven the VM to `Faulted`.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("operation not valid in current state {state:?}")]
    InvalidState { state: crate::core::debugger::VmState },
    #[error("no breakpoint with id {0}")]
    NoSuchBreakpoint(u32),
    #[error("no watchpoint with id {0}")]
    NoSuchWatchpoint(u32),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("program fault: {0}")]
    Fault(#[from] CpuFault),
    /// A direct memory read/write RPC (not instruction execution) hit an
    /// unmapped or misaligned address. Non-fatal: unlike `Fault`, this never
    /// drives the VM to `Faulted`.
    #[error(transparent)]
    Memory(#[from] MemoryFault),
    #[error("could not acquire session lock before the deadline")]
    Busy,
}
