//! Runtime-reloadable logging (SPEC_FULL.md §10.5).
//!
//! Carried over in spirit, almost unchanged, from
//! `examples/abbruzze-r-ps1/src/log/mod.rs`'s `Logger` wrapping a
//! `tracing_subscriber::reload::Handle`: the server can change its log
//! verbosity at runtime without restarting.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

pub struct Logger {
    reload_handle: reload::Handle<EnvFilter, Registry>,
}

impl Logger {
    pub fn new(initial_level: &str) -> Self {
        let filter = EnvFilter::new(initial_level);
        let (filter_layer, reload_handle) = reload::Layer::new(filter);

        tracing_subscriber::registry().with(filter_layer).with(fmt::layer()).init();

        Self { reload_handle }
    }

    pub fn set_log_level(&self, level: &str) {
        let _ = self.reload_handle.modify(|f| *f = EnvFilter::new(level));
    }
}
