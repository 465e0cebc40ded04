//! Breakpoint/watchpoint engine (SPEC_FULL.md C4 / §3.5 / §3.6 / §4.4).
//!
//! Grounded on `examples/abbruzze-r-ps1/src/core/cpu/cop0.rs`'s
//! `is_at_pc_breakpoint`/`is_at_rw_breakpoint` (enable-bit + address check
//! split into a pre-fetch PC check and a post-access R/W check) and
//! `core/debugger/mod.rs`'s `BreakPoints` struct (one small collection per
//! kind), restructured here into an address-indexed map plus two watch lists
//! per SPEC_FULL.md §4.4 instead of folded into a coprocessor register file.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    Read,
    Write,
    ReadWrite,
}

impl WatchMode {
    fn matches_access(self, is_write: bool) -> bool {
        match self {
            WatchMode::Read => !is_write,
            WatchMode::Write => is_write,
            WatchMode::ReadWrite => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Breakpoint {
    pub id: u32,
    pub addr: u32,
    pub enabled: bool,
    pub hit_count: u32,
    pub condition: Option<String>,
    pub temporary: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchTarget {
    Register(u8),
    Memory { addr: u32, len: u32 },
}

#[derive(Debug, Clone)]
pub struct Watchpoint {
    pub id: u32,
    pub target: WatchTarget,
    pub mode: WatchMode,
    pub enabled: bool,
    pub hit_count: u32,
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    Read,
    Write,
}

#[derive(Debug, Clone)]
pub struct WatchHit {
    pub watch_id: u32,
    pub kind: AccessKind,
}

/// Address-indexed breakpoints plus linear register/memory watch lists.
#[derive(Debug, Default)]
pub struct BreakpointTable {
    breakpoints: HashMap<u32, Breakpoint>,
    watchpoints: Vec<Watchpoint>,
    next_id: u32,
}

fn ranges_overlap(a_addr: u32, a_len: u32, b_addr: u32, b_len: u32) -> bool {
    let a_end = a_addr as u64 + a_len as u64;
    let b_end = b_addr as u64 + b_len as u64;
    (a_addr as u64) < b_end && (b_addr as u64) < a_end
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn add_breakpoint(&mut self, addr: u32, condition: Option<String>, temporary: bool) -> u32 {
        let id = self.alloc_id();
        self.breakpoints.insert(
            addr,
            Breakpoint { id, addr, enabled: true, hit_count: 0, condition, temporary },
        );
        id
    }

    /// The breakpoint installed by `step_over`/`step_out` at a fixed address,
    /// looked up by id for later removal.
    pub fn remove_breakpoint(&mut self, id: u32) -> bool {
        let addr = self.breakpoints.iter().find(|(_, b)| b.id == id).map(|(a, _)| *a);
        match addr {
            Some(a) => {
                self.breakpoints.remove(&a);
                true
            }
            None => false,
        }
    }

    pub fn set_breakpoint_enabled(&mut self, id: u32, enabled: bool) -> bool {
        if let Some(bp) = self.breakpoints.values_mut().find(|b| b.id == id) {
            bp.enabled = enabled;
            true
        } else {
            false
        }
    }

    pub fn breakpoint_at(&self, addr: u32) -> Option<&Breakpoint> {
        self.breakpoints.get(&addr)
    }

    pub fn breakpoint_at_mut(&mut self, addr: u32) -> Option<&mut Breakpoint> {
        self.breakpoints.get_mut(&addr)
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.values()
    }

    /// Pre-fetch check (SPEC_FULL.md §4.4): called before `Cpu::step` with
    /// the current PC. Returns the breakpoint that should pause execution,
    /// if any, after evaluating its condition via the supplied closure.
    /// Temporary breakpoints are removed on hit.
    pub fn check_pc<F: FnOnce(&str) -> bool>(&mut self, pc: u32, eval_condition: F) -> Option<u32> {
        let hit = {
            let bp = self.breakpoints.get(&pc)?;
            if !bp.enabled {
                return None;
            }
            match &bp.condition {
                Some(expr) => eval_condition(expr),
                None => true,
            }
        };
        if !hit {
            return None;
        }
        let bp = self.breakpoints.get_mut(&pc)?;
        bp.hit_count += 1;
        let id = bp.id;
        let temporary = bp.temporary;
        if temporary {
            self.breakpoints.remove(&pc);
        }
        Some(id)
    }

    pub fn add_watchpoint(&mut self, target: WatchTarget, mode: WatchMode, condition: Option<String>) -> u32 {
        let id = self.alloc_id();
        self.watchpoints.push(Watchpoint { id, target, mode, enabled: true, hit_count: 0, condition });
        id
    }

    pub fn remove_watchpoint(&mut self, id: u32) -> bool {
        let before = self.watchpoints.len();
        self.watchpoints.retain(|w| w.id != id);
        self.watchpoints.len() != before
    }

    pub fn set_watchpoint_enabled(&mut self, id: u32, enabled: bool) -> bool {
        if let Some(w) = self.watchpoints.iter_mut().find(|w| w.id == id) {
            w.enabled = enabled;
            true
        } else {
            false
        }
    }

    pub fn watchpoints(&self) -> impl Iterator<Item = &Watchpoint> {
        self.watchpoints.iter()
    }

    /// Post-retirement check (SPEC_FULL.md §4.4): called with the write that
    /// just retired (if any) and the read-hook left by a load-class
    /// instruction (if any). Register writes are checked by the caller via
    /// `check_register_write` since they are not routed through `Memory`.
    pub fn check_memory_access(&mut self, addr: u32, len: u32, kind: AccessKind) -> Vec<WatchHit> {
        let mut hits = Vec::new();
        for w in self.watchpoints.iter_mut() {
            if !w.enabled {
                continue;
            }
            let WatchTarget::Memory { addr: w_addr, len: w_len } = w.target else { continue };
            if !ranges_overlap(addr, len, w_addr, w_len) {
                continue;
            }
            let is_write = matches!(kind, AccessKind::Write);
            if !w.mode.matches_access(is_write) {
                continue;
            }
            w.hit_count += 1;
            hits.push(WatchHit { watch_id: w.id, kind });
        }
        hits
    }

    pub fn check_register_write(&mut self, reg: u8) -> Vec<WatchHit> {
        let mut hits = Vec::new();
        for w in self.watchpoints.iter_mut() {
            if !w.enabled {
                continue;
            }
            if w.target == WatchTarget::Register(reg) && w.mode.matches_access(true) {
                w.hit_count += 1;
                hits.push(WatchHit { watch_id: w.id, kind: AccessKind::Write });
            }
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakpoint_without_condition_always_hits() {
        let mut t = BreakpointTable::new();
        let id = t.add_breakpoint(0x8004, None, false);
        assert_eq!(t.check_pc(0x8004, |_| true), Some(id));
        assert_eq!(t.breakpoint_at(0x8004).unwrap().hit_count, 1);
    }

    #[test]
    fn temporary_breakpoint_removed_on_hit() {
        let mut t = BreakpointTable::new();
        t.add_breakpoint(0x8008, None, true);
        assert!(t.check_pc(0x8008, |_| true).is_some());
        assert!(t.breakpoint_at(0x8008).is_none());
    }

    #[test]
    fn disabled_breakpoint_does_not_hit() {
        let mut t = BreakpointTable::new();
        let id = t.add_breakpoint(0x800C, None, false);
        t.set_breakpoint_enabled(id, false);
        assert_eq!(t.check_pc(0x800C, |_| true), None);
    }

    #[test]
    fn double_remove_is_idempotent() {
        let mut t = BreakpointTable::new();
        let id = t.add_breakpoint(0x8000, None, false);
        assert!(t.remove_breakpoint(id));
        assert!(!t.remove_breakpoint(id));
    }

    #[test]
    fn memory_watch_matches_overlapping_write() {
        let mut t = BreakpointTable::new();
        let id = t.add_watchpoint(WatchTarget::Memory { addr: 0x9000, len: 4 }, WatchMode::Write, None);
        let hits = t.check_memory_access(0x9002, 4, AccessKind::Write);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].watch_id, id);
    }

    #[test]
    fn read_only_watch_ignores_write_access() {
        let mut t = BreakpointTable::new();
        t.add_watchpoint(WatchTarget::Memory { addr: 0x9000, len: 4 }, WatchMode::Read, None);
        let hits = t.check_memory_access(0x9000, 4, AccessKind::Write);
        assert!(hits.is_empty());
    }
}
