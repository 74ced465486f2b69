// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! vad-ingest - sensor ingestion daemon.
//!
//! Binds the selected transport, runs the pipeline until SIGINT/SIGTERM,
//! and exits non-zero on any startup failure.

use clap::Parser;
use colored::Colorize;
use vad_ingest::{Config, Pipeline, Shutdown};

fn main() {
    env_logger::init();

    let config = Config::parse();

    if let Err(e) = run(config) {
        eprintln!("{}: {e}", "Error".red().bold());
        std::process::exit(1);
    }
}

fn run(config: Config) -> vad_ingest::Result<()> {
    let shutdown = Shutdown::new();
    let handler_flag = shutdown.clone();
    ctrlc::set_handler(move || handler_flag.request_stop())
        .map_err(|e| vad_ingest::Error::Signal(e.to_string()))?;

    log::info!("=== vad-ingest ===");
    log::info!("transport:      {}", config.transport);
    match config.transport {
        vad_ingest::Transport::Mqtt => {
            log::info!(
                "broker:         {}:{} topic={}",
                config.mqtt_host,
                config.mqtt_port,
                config.mqtt_topic
            );
        }
        _ => log::info!("listen:         {}", config.listen_addr()),
    }
    log::info!("recv threads:   {}", config.resolved_recv_threads());
    log::info!("proc threads:   {}", config.resolved_proc_threads());
    log::info!("ring capacity:  {}", config.ring_cap);
    log::info!("stats interval: {}s", config.stats_interval);

    let pipeline = Pipeline::new(config, shutdown)?;
    pipeline.run()?;

    log::info!("shutdown complete");
    Ok(())
}
