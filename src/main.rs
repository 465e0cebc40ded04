//! Binary entry point (SPEC_FULL.md §10.4): parses CLI flags, layers config,
//! builds the session registry, and serves the HTTP/WebSocket API.
//!
//! Grounded on `examples/abbruzze-r-ps1/src/main.rs`'s shape (`Logger::new`
//! then an info! banner before entering the run loop), replacing the
//! teacher's `renderer::pixels::run_loop` GUI event loop with an axum HTTP
//! server per SPEC_FULL.md §6 and `amoljassal-sis-kernel-showcase/apps/
//! daemon`'s `main.rs` (parse CLI, load config, bind, serve).

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use arm2vm::core::session::SessionManager;
use arm2vm::core::syscall::SyscallConfig;
use arm2vm::log::Logger;
use arm2vm::service::config::{Cli, ServiceConfig};
use arm2vm::service::create_router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ServiceConfig::from_env();
    if let Some(path) = &cli.config {
        config.merge_yaml_file(path)?;
    }
    config.apply_cli(&cli);

    let _logger = Logger::new(&config.log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.bind_addr,
        "arm2vmd starting"
    );

    let syscall_config = SyscallConfig {
        sandbox_root: config.sandbox_root.clone(),
        heap_base: config.heap_base,
        heap_size: config.heap_size,
    };
    let sessions = Arc::new(SessionManager::new(config.stack_base, config.stack_size, syscall_config));

    let app = create_router(sessions);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
