//! Session: the async façade around a synchronous [`Controller`]
//! (SPEC_FULL.md C7 / §3.8 / §5).
//!
//! Grounded on `amoljassal-sis-kernel-showcase/apps/daemon/src/qemu/
//! supervisor.rs`'s `QemuSupervisor` (`Arc<RwLock<SupervisorState>>` plus an
//! `Arc<AtomicBool>` busy flag guarding long-running operations) — here
//! specialized to `tokio::sync::Mutex<Controller>` since every session
//! operation needs exclusive access, with the busy-flag idea reused as the
//! `Busy` error on a timed lock acquisition (§5, §7) rather than a plain
//! bool, since the controller itself is synchronous and cooperative
//! yielding happens inside `continue_to_pause`, not via a separate flag.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::core::debugger::{Controller, StepOverOutcome, StepReport, VmState};
use crate::core::error::ControllerError;
use crate::core::events::{Event, EventBus};
use crate::core::image::ProgramImage;
use crate::core::syscall::SyscallConfig;

/// Number of instructions a single `run_batch` call is allowed to retire
/// before `Session::continue_to_pause` releases and reacquires the lock
/// (SPEC_FULL.md §5's "every K instructions or every I/O boundary").
const CONTINUE_BATCH_SIZE: u32 = 2048;

/// How long an RPC handler waits to acquire the session lock before
/// returning `Busy` (§5, §7) rather than hanging.
pub const LOCK_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdinOutcome {
    Delivered,
    Buffered,
}

pub struct Session {
    pub id: Uuid,
    controller: Mutex<Controller>,
    version: AtomicU64,
    pub events: EventBus,
}

impl Session {
    pub fn new(image: ProgramImage, syscall_config: SyscallConfig, stack_base: u32, stack_size: u32) -> Self {
        let controller = Controller::new(image, syscall_config, stack_base, stack_size);
        Self {
            id: Uuid::new_v4(),
            controller: Mutex::new(controller),
            version: AtomicU64::new(0),
            events: EventBus::new(),
        }
    }

    /// Acquires the session lock within [`LOCK_DEADLINE`], or `Busy`
    /// (§5's "defense in depth" timeout).
    async fn lock(&self) -> Result<tokio::sync::MutexGuard<'_, Controller>, ControllerError> {
        match tokio::time::timeout(LOCK_DEADLINE, self.controller.lock()).await {
            Ok(guard) => Ok(guard),
            Err(_) => Err(ControllerError::Busy),
        }
    }

    fn publish_state(&self, controller: &Controller) {
        self.version.store(controller.version(), Ordering::SeqCst);
        self.events.publish(Event::StateChanged {
            state: controller.state(),
            pc: controller.registers()[crate::core::cpu::PC],
            version: controller.version(),
        });
        match controller.state() {
            VmState::Halted => self.events.publish(Event::Halted { exit_code: controller.exit_code.unwrap_or(0) }),
            VmState::WaitingForInput => {
                self.events.publish(Event::WaitingForInput { pc: controller.registers()[crate::core::cpu::PC] })
            }
            _ => {}
        }
    }

    fn publish_report(&self, controller: &Controller, report: &StepReport) {
        self.publish_state(controller);
        if let Some(bp_id) = report.breakpoint_hit {
            self.events.publish(Event::BreakpointHit { breakpoint_id: bp_id, pc: controller.registers()[crate::core::cpu::PC] });
        }
        for hit in &report.watch_hits {
            self.events.publish(Event::WatchpointHit { watch_id: hit.watch_id, kind: hit.kind });
        }
        if let Some((addr, size)) = report.memory_write {
            self.events.publish(Event::MemoryWritten { addr, size });
        }
    }

    /// Drains bytes the program has written via WRITE_* syscalls since the
    /// last drain and republishes them as a `console_output` event. Called
    /// by `service::handlers` after any operation that may have executed
    /// WRITE_* (separate from `publish_report` since draining needs `&mut`).
    pub async fn drain_stdout(&self) -> Result<Vec<u8>, ControllerError> {
        let bytes = self.with_controller_mut(|c| c.take_stdout()).await?;
        if !bytes.is_empty() {
            self.events.publish(Event::ConsoleOutput { bytes: bytes.clone() });
        }
        Ok(bytes)
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub async fn step(&self) -> Result<StepReport, ControllerError> {
        let mut guard = self.lock().await?;
        let report = guard.step()?;
        self.publish_report(&guard, &report);
        Ok(report)
    }

    pub async fn step_over(&self) -> Result<StepReport, ControllerError> {
        let mut guard = self.lock().await?;
        match guard.step_over()? {
            StepOverOutcome::Done(report) => {
                self.publish_report(&guard, &report);
                Ok(report)
            }
            StepOverOutcome::Continuing => {
                self.publish_state(&guard);
                drop(guard);
                self.drive_batches().await
            }
        }
    }

    pub async fn step_out(&self) -> Result<StepReport, ControllerError> {
        let mut guard = self.lock().await?;
        match guard.step_out()? {
            StepOverOutcome::Done(report) => {
                self.publish_report(&guard, &report);
                Ok(report)
            }
            StepOverOutcome::Continuing => {
                self.publish_state(&guard);
                drop(guard);
                self.drive_batches().await
            }
        }
    }

    /// `continue()`: starts the run loop, then repeatedly hands control
    /// back to the async runtime between batches so `stop`/`add_breakpoint`/
    /// `send_stdin` can interleave (SPEC_FULL.md §5).
    pub async fn continue_run(&self) -> Result<StepReport, ControllerError> {
        {
            let mut guard = self.lock().await?;
            guard.begin_continue()?;
            self.publish_state(&guard);
        }
        self.drive_batches().await
    }

    /// Repeatedly runs a bounded batch of instructions, releasing the lock
    /// between batches, until the controller leaves `Running`.
    async fn drive_batches(&self) -> Result<StepReport, ControllerError> {
        loop {
            let (report, still_running) = {
                let mut guard = self.lock().await?;
                let report = guard.run_batch(CONTINUE_BATCH_SIZE)?;
                self.publish_report(&guard, &report);
                (report, guard.state() == VmState::Running)
            };
            if !still_running {
                return Ok(report);
            }
            tokio::task::yield_now().await;
        }
    }

    pub async fn stop(&self) -> Result<(), ControllerError> {
        let mut guard = self.lock().await?;
        guard.request_stop();
        self.publish_state(&guard);
        Ok(())
    }

    pub async fn reset(&self, syscall_config: SyscallConfig) -> Result<(), ControllerError> {
        let mut guard = self.lock().await?;
        guard.reset(syscall_config);
        self.publish_state(&guard);
        Ok(())
    }

    /// Replaces this session's controller wholesale with one built from a
    /// freshly loaded image (`POST /sessions/{id}/program`, SPEC_FULL.md
    /// §6.1). Unlike `reset`, which reapplies the image already stored in
    /// the controller, this swaps in a new program entirely.
    pub async fn load_program(
        &self,
        image: ProgramImage,
        syscall_config: SyscallConfig,
        stack_base: u32,
        stack_size: u32,
    ) -> Result<(), ControllerError> {
        let mut guard = self.lock().await?;
        *guard = Controller::new(image, syscall_config, stack_base, stack_size);
        self.publish_state(&guard);
        Ok(())
    }

    /// `send_stdin`: delivers directly if the VM is currently blocked,
    /// otherwise buffers for whichever SWI consumes it next (SPEC_FULL.md
    /// §4.3, §4.7, §9). Never drives execution itself beyond completing the
    /// one suspended instruction.
    pub async fn send_stdin(&self, data: &[u8]) -> Result<StdinOutcome, ControllerError> {
        let mut guard = self.lock().await?;
        if guard.is_waiting_for_input() {
            guard.push_stdin(data);
            let report = guard.resume_after_input()?;
            self.publish_report(&guard, &report);
            Ok(StdinOutcome::Delivered)
        } else {
            guard.push_stdin(data);
            Ok(StdinOutcome::Buffered)
        }
    }

    pub async fn with_controller<T>(&self, f: impl FnOnce(&Controller) -> T) -> Result<T, ControllerError> {
        let guard = self.lock().await?;
        Ok(f(&guard))
    }

    pub async fn with_controller_mut<T>(&self, f: impl FnOnce(&mut Controller) -> T) -> Result<T, ControllerError> {
        let mut guard = self.lock().await?;
        let out = f(&mut guard);
        self.version.store(guard.version(), Ordering::SeqCst);
        Ok(out)
    }
}

/// In-process registry of all live sessions (SPEC_FULL.md §3.8, §6.1).
pub struct SessionManager {
    sessions: Mutex<std::collections::HashMap<Uuid, Arc<Session>>>,
    pub default_stack_base: u32,
    pub default_stack_size: u32,
    pub default_syscall_config: SyscallConfig,
}

impl SessionManager {
    pub fn new(default_stack_base: u32, default_stack_size: u32, default_syscall_config: SyscallConfig) -> Self {
        Self {
            sessions: Mutex::new(std::collections::HashMap::new()),
            default_stack_base,
            default_stack_size,
            default_syscall_config,
        }
    }

    pub async fn create(&self) -> Arc<Session> {
        let session = Arc::new(Session::new(
            ProgramImage::default(),
            self.default_syscall_config.clone(),
            self.default_stack_base,
            self.default_stack_size,
        ));
        self.sessions.lock().await.insert(session.id, session.clone());
        session
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<Session>> {
        self.sessions.lock().await.get(&id).cloned()
    }

    pub async fn destroy(&self, id: Uuid) -> bool {
        self.sessions.lock().await.remove(&id).is_some()
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
    fn swi(imm: u32) -> u32 {
        (AL << 28) | (0b1111 << 24) | imm
    }

    #[tokio::test]
    async fn continue_run_reaches_halted() {
        let session = Session::new(image_with(&[mov_imm(0, 5), swi(0)]), SyscallConfig::default(), 0xFFFF_0000, 0x1000);
        let report = session.continue_run().await.unwrap();
        assert_eq!(report.state, VmState::Halted);
    }

    #[tokio::test]
    async fn stdin_buffers_when_not_waiting() {
        let session = Session::new(image_with(&[swi(0)]), SyscallConfig::default(), 0xFFFF_0000, 0x1000);
        let outcome = session.send_stdin(b"hi\n").await.unwrap();
        assert_eq!(outcome, StdinOutcome::Buffered);
    }

    #[tokio::test]
    async fn stdin_delivers_when_waiting() {
        // SWI #0x04 is READ_CHAR; with an empty stdin queue the VM suspends.
        let session = Session::new(image_with(&[swi(0x04), swi(0x00)]), SyscallConfig::default(), 0xFFFF_0000, 0x1000);
        let report = session.step().await.unwrap();
        assert_eq!(report.state, VmState::WaitingForInput);
        let outcome = session.send_stdin(b"x").await.unwrap();
        assert_eq!(outcome, StdinOutcome::Delivered);
    }

    #[tokio::test]
    async fn session_manager_create_get_destroy() {
        let manager = SessionManager::new(0xFFFF_0000, 0x1000, SyscallConfig::default());
        let session = manager.create().await;
        assert!(manager.get(session.id).await.is_some());
        assert!(manager.destroy(session.id).await);
        assert!(manager.get(session.id).await.is_none());
    }
}
