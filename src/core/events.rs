//! Event bus (SPEC_FULL.md C8 / §4.8 / §10.6): fan-out of state-change,
//! console-output, and breakpoint/watchpoint-hit events to subscribers.
//!
//! Grounded on `amoljassal-sis-kernel-showcase/apps/daemon/src/qemu/
//! supervisor.rs`'s `QemuEvent` enum plus `broadcast::channel(CAPACITY)` +
//! `subscribe()` pattern. `tokio::sync::broadcast`'s lagging-receiver
//! semantics already implement the "oldest-drop on overflow" policy
//! SPEC_FULL.md §4.8/§5 calls for, so no custom bounded-queue type is needed.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::core::breakpoint::AccessKind;
use crate::core::debugger::VmState;

/// Subscriber queue depth before the broadcast channel starts dropping the
/// oldest unread event for a lagging receiver.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    StateChanged { state: VmState, pc: u32, version: u64 },
    ConsoleOutput { bytes: Vec<u8> },
    MemoryWritten { addr: u32, size: u32 },
    BreakpointHit { breakpoint_id: u32, pc: u32 },
    WatchpointHit { watch_id: u32, kind: AccessKind },
    WaitingForInput { pc: u32 },
    Halted { exit_code: u32 },
}

/// One broadcast channel per session. Publishing never blocks on a slow
/// subscriber; a subscriber that falls more than [`EVENT_CHANNEL_CAPACITY`]
/// events behind silently loses the oldest ones (`RecvError::Lagged`), which
/// the WebSocket handler (`service::ws`) treats as a cue to resync via
/// `GET /registers` rather than a fatal error.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: Event) {
        // No subscribers is not an error: a session may run with nobody
        // watching its event stream.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(Event::Halted { exit_code: 42 });
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, Event::Halted { exit_code: 42 }));
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(Event::Halted { exit_code: 0 });
    }
}
