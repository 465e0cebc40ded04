//! Debugger controller: the VM state machine and run loop (SPEC_FULL.md C6
//! / §3.7 / §4.6).
//!
//! Grounded on `examples/abbruzze-r-ps1/src/core/emu/mod.rs`'s
//! `Emulator::emulate`/`debug` run loop (check breakpoints/run-mode before
//! executing, dispatch per mode, yield at boundaries) and `core/debugger/
//! mod.rs`'s `RunMode`/command turn-taking, translated from the teacher's
//! thread+mpsc mechanism into the plain synchronous state machine
//! SPEC_FULL.md §5 wraps in an async mutex one level up, in `core::session`.

use std::collections::HashMap;

use crate::core::breakpoint::{AccessKind, BreakpointTable, WatchHit, WatchMode, WatchTarget};
use crate::core::cpu::disasm::{self, Disassembled};
use crate::core::cpu::instruction::{decode, Decoded};
use crate::core::cpu::{Cpu, StepEffect};
use crate::core::error::{ControllerError, MemoryFault};
use crate::core::eval::{evaluate, EvalContext, EvalOutcome};
use crate::core::image::ProgramImage;
use crate::core::memory::Memory;
use crate::core::syscall::{SyscallConfig, SyscallDispatcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VmState {
    Loaded,
    Running,
    Paused,
    WaitingForInput,
    Halted,
    Faulted,
}

#[derive(Debug, Clone)]
pub struct StepReport {
    pub state: VmState,
    pub breakpoint_hit: Option<u32>,
    pub watch_hits: Vec<WatchHit>,
    /// Set when the retired instruction (or a successful input syscall)
    /// recorded a write, so the service layer can publish `memory_written`
    /// for UI highlighting (SPEC_FULL.md §4.8) without re-reading `Memory`'s
    /// write-tracking fields after they may have been cleared by a
    /// subsequent step.
    pub memory_write: Option<(u32, u32)>,
}

#[derive(Debug)]
pub enum StepOverOutcome {
    /// A temporary breakpoint was installed and the controller entered
    /// `Running`; the caller must drive `run_batch` to completion.
    Continuing,
    Done(StepReport),
}

pub struct Controller {
    cpu: Cpu,
    memory: Memory,
    syscalls: SyscallDispatcher,
    breakpoints: BreakpointTable,
    state: VmState,
    callstack: Vec<u32>,
    image: ProgramImage,
    symbols: HashMap<String, u32>,
    version: u64,
    pub exit_code: Option<u32>,
    stack_base: u32,
    stack_size: u32,
}

impl Controller {
    pub fn new(image: ProgramImage, syscall_config: SyscallConfig, stack_base: u32, stack_size: u32) -> Self {
        let mut memory = Memory::with_heap(stack_base, stack_size, syscall_config.heap_base, syscall_config.heap_size);
        let load_base = image.apply_to(&mut memory);
        let mut cpu = Cpu::new();
        cpu.set_pc(image.entry_point().unwrap_or(load_base));
        cpu.regs[crate::core::cpu::SP] = memory.stack_top();
        let symbols = image.symbols.clone();
        Self {
            cpu,
            memory,
            syscalls: SyscallDispatcher::new(syscall_config),
            breakpoints: BreakpointTable::new(),
            state: VmState::Loaded,
            callstack: Vec::new(),
            image,
            symbols,
            version: 0,
            exit_code: None,
            stack_base,
            stack_size,
        }
    }

    pub fn state(&self) -> VmState {
        self.state
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn registers(&self) -> &[u32; 16] {
        &self.cpu.regs
    }

    pub fn cpsr(&self) -> crate::core::cpu::Cpsr {
        self.cpu.cpsr
    }

    pub fn cycles(&self) -> u64 {
        self.cpu.cycles
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn image(&self) -> &ProgramImage {
        &self.image
    }

    pub fn breakpoints(&self) -> &BreakpointTable {
        &self.breakpoints
    }

    pub fn callstack(&self) -> &[u32] {
        &self.callstack
    }

    fn bump_version(&mut self) {
        self.version += 1;
    }

    fn set_state(&mut self, state: VmState) {
        self.state = state;
        self.bump_version();
    }

    fn ensure_steppable(&self) -> Result<(), ControllerError> {
        match self.state {
            VmState::Loaded | VmState::Paused => Ok(()),
            other => Err(ControllerError::InvalidState { state: other }),
        }
    }

    /// Re-applies the stored image and resets registers; breakpoints and
    /// watchpoints survive (§3.8, §4.6). The syscall dispatcher (heap, open
    /// files, stdin queue) is rebuilt fresh, matching a cold reload.
    pub fn reset(&mut self, syscall_config: SyscallConfig) {
        self.memory = Memory::with_heap(self.stack_base, self.stack_size, syscall_config.heap_base, syscall_config.heap_size);
        let load_base = self.image.apply_to(&mut self.memory);
        self.cpu = Cpu::new();
        self.cpu.set_pc(self.image.entry_point().unwrap_or(load_base));
        self.cpu.regs[crate::core::cpu::SP] = self.memory.stack_top();
        self.syscalls = SyscallDispatcher::new(syscall_config);
        self.callstack.clear();
        self.exit_code = None;
        self.set_state(VmState::Loaded);
    }

    fn eval_condition(regs: &[u32; 16], cpsr: crate::core::cpu::Cpsr, symbols: &HashMap<String, u32>, memory: &Memory, expr: &str) -> bool {
        match evaluate(expr, &EvalContext { regs, cpsr, symbols, memory }) {
            Ok(outcome) => outcome.value != 0,
            Err(_) => false,
        }
    }

    fn decoded_at(&self, addr: u32) -> Option<Decoded> {
        let word = self.memory.read_word(addr).ok()?;
        decode(addr, word).ok()
    }

    /// Best-effort callstack maintenance (§4.6): BL pushes the return
    /// address; a retiring instruction that wrote PC from LR or from memory
    /// (MOV PC,LR / POP-style LDM / LDR PC,...) pops.
    fn track_callstack(&mut self, pc_before: u32, new_pc: u32) {
        let Some(decoded) = self.decoded_at(pc_before) else { return };
        match decoded {
            Decoded::Branch(b) if b.link => {
                self.callstack.push(pc_before.wrapping_add(4));
            }
            Decoded::DataProcessing(d) if d.rd == 15 => {
                if let crate::core::cpu::instruction::Operand2::Register(r) = d.operand2 {
                    if r.rm == crate::core::cpu::LR as u8 {
                        self.callstack.pop();
                    }
                }
            }
            Decoded::SingleTransfer(s) if s.load && s.rd == 15 => {
                self.callstack.pop();
            }
            Decoded::BlockTransfer(b) if b.load && (b.register_list & (1 << 15)) != 0 => {
                self.callstack.pop();
            }
            _ => {
                let _ = new_pc;
            }
        }
    }

    /// Pure mechanism: no precondition check (callers gate when this is
    /// legal to invoke). `pause_on_plain_retire` distinguishes a one-shot
    /// `step()` (always pauses) from a `continue()` batch (keeps running
    /// through ordinary retirements, only pausing on a hit).
    fn do_step(&mut self, pause_on_plain_retire: bool) -> Result<StepReport, ControllerError> {
        let pc = self.cpu.pc();
        let regs = self.cpu.regs;
        let cpsr = self.cpu.cpsr;
        let symbols = &self.symbols;
        let memory = &self.memory;
        if let Some(bp_id) = self.breakpoints.check_pc(pc, |expr| Self::eval_condition(&regs, cpsr, symbols, memory, expr)) {
            self.set_state(VmState::Paused);
            return Ok(StepReport { state: self.state, breakpoint_hit: Some(bp_id), watch_hits: Vec::new(), memory_write: None });
        }

        self.memory.clear_last_write();
        self.cpu.last_read = None;
        let effect = self.cpu.step(&mut self.memory, &mut self.syscalls);
        match effect {
            Ok(StepEffect::WaitingForInput) => {
                self.set_state(VmState::WaitingForInput);
                Ok(StepReport { state: self.state, breakpoint_hit: None, watch_hits: Vec::new(), memory_write: None })
            }
            Ok(StepEffect::Exited(code)) => {
                self.exit_code = Some(code);
                self.set_state(VmState::Halted);
                Ok(StepReport { state: self.state, breakpoint_hit: None, watch_hits: Vec::new(), memory_write: None })
            }
            Ok(StepEffect::Retired) => {
                let new_pc = self.cpu.pc();
                self.track_callstack(pc, new_pc);
                let mut hits = Vec::new();
                let memory_write = if self.memory.has_last_write {
                    hits.extend(self.breakpoints.check_memory_access(self.memory.last_write_addr, self.memory.last_write_size, AccessKind::Write));
                    Some((self.memory.last_write_addr, self.memory.last_write_size))
                } else {
                    None
                };
                if let Some((addr, len)) = self.cpu.last_read {
                    hits.extend(self.breakpoints.check_memory_access(addr, len, AccessKind::Read));
                }
                if let Some(reg) = self.cpu.last_reg_write {
                    hits.extend(self.breakpoints.check_register_write(reg));
                }
                if !hits.is_empty() || pause_on_plain_retire {
                    self.set_state(VmState::Paused);
                } else {
                    self.bump_version();
                }
                Ok(StepReport { state: self.state, breakpoint_hit: None, watch_hits: hits, memory_write })
            }
            Err(fault) => {
                self.set_state(VmState::Faulted);
                Err(ControllerError::Fault(fault))
            }
        }
    }

    pub fn step(&mut self) -> Result<StepReport, ControllerError> {
        self.ensure_steppable()?;
        self.do_step(true)
    }

    pub fn step_over(&mut self) -> Result<StepOverOutcome, ControllerError> {
        self.ensure_steppable()?;
        let pc = self.cpu.pc();
        if matches!(self.decoded_at(pc), Some(Decoded::Branch(b)) if b.link) {
            let return_addr = pc.wrapping_add(4);
            self.breakpoints.add_breakpoint(return_addr, None, true);
            self.set_state(VmState::Running);
            Ok(StepOverOutcome::Continuing)
        } else {
            Ok(StepOverOutcome::Done(self.do_step(true)?))
        }
    }

    pub fn step_out(&mut self) -> Result<StepOverOutcome, ControllerError> {
        self.ensure_steppable()?;
        match self.callstack.last().copied() {
            Some(return_addr) => {
                self.breakpoints.add_breakpoint(return_addr, None, true);
                self.set_state(VmState::Running);
                Ok(StepOverOutcome::Continuing)
            }
            None => Ok(StepOverOutcome::Done(self.do_step(true)?)),
        }
    }

    /// Precondition check plus the `Running` transition `continue()` starts
    /// with; the caller then drives `run_batch` to completion.
    pub fn begin_continue(&mut self) -> Result<(), ControllerError> {
        self.ensure_steppable()?;
        self.set_state(VmState::Running);
        Ok(())
    }

    /// Runs up to `max_steps` retirements or until a non-`Running` state is
    /// reached, whichever comes first. The caller (session.rs) calls this
    /// repeatedly, yielding and re-checking a stop request between calls, so
    /// no single call monopolizes the session lock (SPEC_FULL.md §5).
    pub fn run_batch(&mut self, max_steps: u32) -> Result<StepReport, ControllerError> {
        let mut last = StepReport { state: self.state, breakpoint_hit: None, watch_hits: Vec::new(), memory_write: None };
        for _ in 0..max_steps {
            if self.state != VmState::Running {
                break;
            }
            last = self.do_step(false)?;
        }
        Ok(last)
    }

    /// `stop()`: graceful transition to Paused at the next yield point
    /// (§5). A no-op if not currently running.
    pub fn request_stop(&mut self) {
        if self.state == VmState::Running {
            self.set_state(VmState::Paused);
        }
    }

    pub fn is_waiting_for_input(&self) -> bool {
        self.state == VmState::WaitingForInput
    }

    pub fn push_stdin(&mut self, data: &[u8]) {
        self.syscalls.push_stdin(data);
    }

    /// Completes the SWI that suspended the VM. Always resumes to `Paused`
    /// (never back into an unattended `Running` batch loop, since nothing
    /// would be left driving it) — the client must issue a fresh `continue`
    /// if it wants execution to proceed further. Documented in DESIGN.md.
    pub fn resume_after_input(&mut self) -> Result<StepReport, ControllerError> {
        if self.state != VmState::WaitingForInput {
            return Err(ControllerError::InvalidState { state: self.state });
        }
        self.do_step(true)
    }

    pub fn take_stdout(&mut self) -> Vec<u8> {
        self.syscalls.take_stdout()
    }

    pub fn evaluate(&self, expr: &str) -> Result<EvalOutcome, ControllerError> {
        let ctx = EvalContext { regs: &self.cpu.regs, cpsr: self.cpu.cpsr, symbols: &self.symbols, memory: &self.memory };
        Ok(evaluate(expr, &ctx)?)
    }

    pub fn add_breakpoint(&mut self, addr: u32, condition: Option<String>, temporary: bool) -> u32 {
        let id = self.breakpoints.add_breakpoint(addr, condition, temporary);
        self.bump_version();
        id
    }

    pub fn remove_breakpoint(&mut self, id: u32) -> Result<(), ControllerError> {
        if self.breakpoints.remove_breakpoint(id) {
            self.bump_version();
            Ok(())
        } else {
            Err(ControllerError::NoSuchBreakpoint(id))
        }
    }

    pub fn set_breakpoint_enabled(&mut self, id: u32, enabled: bool) -> Result<(), ControllerError> {
        if self.breakpoints.set_breakpoint_enabled(id, enabled) {
            self.bump_version();
            Ok(())
        } else {
            Err(ControllerError::NoSuchBreakpoint(id))
        }
    }

    pub fn add_watchpoint(&mut self, target: WatchTarget, mode: WatchMode, condition: Option<String>) -> u32 {
        let id = self.breakpoints.add_watchpoint(target, mode, condition);
        self.bump_version();
        id
    }

    pub fn remove_watchpoint(&mut self, id: u32) -> Result<(), ControllerError> {
        if self.breakpoints.remove_watchpoint(id) {
            self.bump_version();
            Ok(())
        } else {
            Err(ControllerError::NoSuchWatchpoint(id))
        }
    }

    pub fn read_memory(&self, addr: u32, len: u32) -> Result<Vec<u8>, MemoryFault> {
        self.memory.read_bytes(addr, len)
    }

    pub fn write_memory(&mut self, addr: u32, bytes: &[u8]) -> Result<(), MemoryFault> {
        self.memory.write_bytes(addr, bytes)?;
        self.bump_version();
        Ok(())
    }

    /// `count` consecutive 4-byte-aligned instructions starting at `addr`.
    /// An unreadable word (outside mapped memory) yields a `"???"` record
    /// rather than aborting the whole range, matching the disassembler's
    /// own treatment of illegal encodings (`cpu::disasm`).
    pub fn disassemble_range(&self, addr: u32, count: u32) -> Vec<Disassembled> {
        (0..count)
            .map(|i| {
                let a = addr.wrapping_add(i * 4);
                match self.memory.read_word(a) {
                    Ok(word) => disasm::disassemble(a, word),
                    Err(_) => Disassembled { address: a, raw: 0, mnemonic: "???".to_string(), formatted: "???".to_string() },
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::image::{Segment, SegmentKind};

    fn assemble(words: &[u32]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for w in words {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        bytes
    }

    fn image_with(words: &[u32]) -> ProgramImage {
        let mut image = ProgramImage {
            segments: vec![Segment { kind: SegmentKind::Code, base: 0x8000, bytes: assemble(words) }],
            ..Default::default()
        };
        image.symbols.insert("_start".to_string(), 0x8000);
        image
    }

    const AL: u32 = 0xE;
    fn mov_imm(rd: u32, imm: u32) -> u32 {
        (AL << 28) | (1 << 25) | (0b1101 << 21) | (rd << 12) | imm
    }
    fn add_reg(rd: u32, rn: u32, rm: u32) -> u32 {
        (AL << 28) | (0b0100 << 21) | (rn << 16) | (rd << 12) | rm
    }
    fn swi(imm: u32) -> u32 {
        (AL << 28) | (0b1111 << 24) | imm
    }

    #[test]
    fn s1_basic_arithmetic_reaches_halted() {
        let image = image_with(&[mov_imm(0, 42), mov_imm(1, 10), add_reg(2, 0, 1), swi(0)]);
        let mut c = Controller::new(image, SyscallConfig::default(), 0xFFFF_0000, 0x1000);
        for _ in 0..4 {
            c.step().unwrap();
        }
        assert_eq!(c.registers()[2], 52);
        assert_eq!(c.state(), VmState::Halted);
        assert_eq!(c.exit_code, Some(42));
    }

    #[test]
    fn breakpoint_pauses_without_retiring() {
        let image = image_with(&[mov_imm(0, 1), mov_imm(1, 2), swi(0)]);
        let mut c = Controller::new(image, SyscallConfig::default(), 0xFFFF_0000, 0x1000);
        c.add_breakpoint(0x8004, None, false);
        c.step().unwrap(); // executes MOV R0,#1
        let report = c.step().unwrap(); // should hit the breakpoint instead of executing MOV R1,#2
        assert_eq!(c.state(), VmState::Paused);
        assert!(report.breakpoint_hit.is_some());
        assert_eq!(c.registers()[1], 0, "instruction at the breakpoint must not retire");
    }

    #[test]
    fn version_is_monotonic_across_operations() {
        let image = image_with(&[mov_imm(0, 1), swi(0)]);
        let mut c = Controller::new(image, SyscallConfig::default(), 0xFFFF_0000, 0x1000);
        let v0 = c.version();
        c.step().unwrap();
        let v1 = c.version();
        assert!(v1 > v0);
        c.add_breakpoint(0x8000, None, false);
        assert!(c.version() > v1);
    }

    #[test]
    fn reset_reapplies_image_and_keeps_breakpoints() {
        let image = image_with(&[mov_imm(0, 7), swi(0)]);
        let mut c = Controller::new(image, SyscallConfig::default(), 0xFFFF_0000, 0x1000);
        let id = c.add_breakpoint(0x8004, None, false);
        c.step().unwrap();
        assert_eq!(c.registers()[0], 7);
        c.reset(SyscallConfig::default());
        assert_eq!(c.registers()[0], 0);
        assert_eq!(c.state(), VmState::Loaded);
        assert!(c.breakpoints().breakpoint_at(0x8004).is_some());
        assert_eq!(c.breakpoints().breakpoint_at(0x8004).unwrap().id, id);
    }

    #[test]
    fn double_remove_breakpoint_is_reported_and_idempotent() {
        let image = image_with(&[swi(0)]);
        let mut c = Controller::new(image, SyscallConfig::default(), 0xFFFF_0000, 0x1000);
        let id = c.add_breakpoint(0x8000, None, false);
        c.remove_breakpoint(id).unwrap();
        assert!(matches!(c.remove_breakpoint(id), Err(ControllerError::NoSuchBreakpoint(_))));
    }

    #[test]
    fn register_watchpoint_pauses_after_the_write_retires() {
        let image = image_with(&[mov_imm(0, 1), mov_imm(2, 99), swi(0)]);
        let mut c = Controller::new(image, SyscallConfig::default(), 0xFFFF_0000, 0x1000);
        let watch_id = c.add_watchpoint(WatchTarget::Register(2), WatchMode::Write, None);
        let first = c.step().unwrap(); // MOV R0,#1: untouched register, no hit
        assert!(first.watch_hits.is_empty());
        let report = c.step().unwrap(); // MOV R2,#99: watched register
        assert_eq!(c.registers()[2], 99, "the write itself must still retire before the watch pauses");
        assert_eq!(c.state(), VmState::Paused);
        assert_eq!(report.watch_hits.len(), 1);
        assert_eq!(report.watch_hits[0].watch_id, watch_id);
        assert_eq!(report.watch_hits[0].kind, AccessKind::Write);
    }
}
