//! Service configuration (SPEC_FULL.md §10.3): layered env → YAML file →
//! CLI-flag overrides of a `Default`.
//!
//! Grounded on `amoljassal-sis-kernel-showcase/apps/daemon/src/config.rs`'s
//! `DaemonConfig::from_env` (env-var overrides of a `Default` struct),
//! enriched with the teacher's own declared `serde_yaml`/`clap` dependencies
//! for the file and CLI layers the daemon's config does not itself need.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::core::memory::{DEFAULT_HEAP_BASE, DEFAULT_HEAP_SIZE, DEFAULT_STACK_BASE, DEFAULT_STACK_SIZE};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub stack_base: u32,
    pub stack_size: u32,
    pub heap_base: u32,
    pub heap_size: u32,
    pub sandbox_root: PathBuf,
    pub log_level: String,
    pub session_idle_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7878".to_string(),
            stack_base: DEFAULT_STACK_BASE,
            stack_size: DEFAULT_STACK_SIZE,
            heap_base: DEFAULT_HEAP_BASE,
            heap_size: DEFAULT_HEAP_SIZE,
            sandbox_root: PathBuf::from("."),
            log_level: "info".to_string(),
            session_idle_timeout_secs: 3600,
        }
    }
}

impl ServiceConfig {
    /// Layer 1: environment variables over the built-in default.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("ARM2_BIND") {
            config.bind_addr = v;
        }
        if let Ok(v) = std::env::var("ARM2_LOG") {
            config.log_level = v;
        }
        if let Ok(v) = std::env::var("ARM2_STACK_BASE") {
            if let Ok(parsed) = parse_u32(&v) {
                config.stack_base = parsed;
            }
        }
        if let Ok(v) = std::env::var("ARM2_STACK_SIZE") {
            if let Ok(parsed) = parse_u32(&v) {
                config.stack_size = parsed;
            }
        }
        if let Ok(v) = std::env::var("ARM2_SANDBOX_ROOT") {
            config.sandbox_root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ARM2_IDLE_TIMEOUT_SECS") {
            if let Ok(parsed) = v.parse() {
                config.session_idle_timeout_secs = parsed;
            }
        }
        config
    }

    /// Layer 2: an optional YAML file, merged over whatever came from env.
    pub fn merge_yaml_file(&mut self, path: &std::path::Path) -> anyhow::Result<()> {
        let text = std::fs::read_to_string(path)?;
        let from_file: ServiceConfig = serde_yaml::from_str(&text)?;
        *self = from_file;
        Ok(())
    }

    /// Layer 3: CLI flags, taking final precedence.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(v) = &cli.bind {
            self.bind_addr = v.clone();
        }
        if let Some(v) = &cli.log {
            self.log_level = v.clone();
        }
        if let Some(v) = &cli.sandbox_root {
            self.sandbox_root = v.clone();
        }
    }
}

fn parse_u32(s: &str) -> Result<u32, std::num::ParseIntError> {
    if let Some(hex) = s.strip_prefix("0x") {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse()
    }
}

/// Command-line flags (final override layer). `clap`'s derive API, already
/// a teacher dependency.
#[derive(Debug, Parser)]
#[command(name = "arm2vmd", about = "ARM2-class CPU emulator debugger service")]
pub struct Cli {
    /// Address to bind the HTTP/WebSocket server to.
    #[arg(long)]
    pub bind: Option<String>,
    /// Log level (overrides ARM2_LOG and any config file).
    #[arg(long)]
    pub log: Option<String>,
    /// Root directory sandboxed SWI file I/O is confined to.
    #[arg(long)]
    pub sandbox_root: Option<PathBuf>,
    /// Optional YAML config file, merged between env and CLI overrides.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_bind_addr() {
        assert_eq!(ServiceConfig::default().bind_addr, "127.0.0.1:7878");
    }

    #[test]
    fn cli_override_takes_precedence() {
        let mut config = ServiceConfig::default();
        let cli = Cli { bind: Some("0.0.0.0:9000".to_string()), log: None, sandbox_root: None, config: None };
        config.apply_cli(&cli);
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
    }
}
