// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runtime configuration.
//!
//! One transport is selected per invocation so back-pressure, drops, and
//! CPU cost are attributable to that transport alone.

use clap::Parser;

/// Hard cap on datagram receiver threads.
pub const MAX_RECV_THREADS: usize = 32;

/// Hard cap on processor threads.
pub const MAX_PROC_THREADS: usize = 16;

/// Which receiver feeds the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
    Mqtt,
}

impl Transport {
    /// Label used in the `[STATS]` line.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Transport::Udp => "UDP",
            Transport::Tcp => "TCP",
            Transport::Mqtt => "MQTT",
        }
    }
}

impl std::str::FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "udp" => Ok(Transport::Udp),
            "tcp" => Ok(Transport::Tcp),
            "mqtt" => Ok(Transport::Mqtt),
            _ => Err(format!("unknown transport: {s} (expected udp|tcp|mqtt)")),
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// High-throughput sensor ingestion pipeline with VAD computation.
#[derive(Parser, Debug, Clone)]
#[command(name = "vad-ingest")]
#[command(version, about)]
pub struct Config {
    /// Ingestion transport: udp, tcp, or mqtt
    #[arg(long, default_value = "udp")]
    pub transport: Transport,

    /// Listen port for udp/tcp transports
    #[arg(long, default_value_t = 9000)]
    pub port: u16,

    /// MQTT broker host
    #[arg(long, default_value = "127.0.0.1")]
    pub mqtt_host: String,

    /// MQTT broker port
    #[arg(long, default_value_t = 1883)]
    pub mqtt_port: u16,

    /// MQTT subscription topic (wildcards allowed)
    #[arg(long, default_value = "vad/sensors/+")]
    pub mqtt_topic: String,

    /// Datagram receiver threads (0 = number of CPUs); udp only
    #[arg(long, default_value_t = 4)]
    pub recv_threads: usize,

    /// VAD processor threads (0 = number of CPUs)
    #[arg(long, default_value_t = 2)]
    pub proc_threads: usize,

    /// Ring capacity in slots (rounded up to the next power of two)
    #[arg(long, default_value_t = 262_144)]
    pub ring_cap: usize,

    /// Socket receive buffer size (SO_RCVBUF) in bytes
    #[arg(long, default_value_t = 4 * 1024 * 1024)]
    pub recv_buf: usize,

    /// Stats report interval in seconds (0 = disabled)
    #[arg(long, default_value_t = 5)]
    pub stats_interval: u64,
}

impl Config {
    /// Receiver thread count with the zero-means-nproc rule and the [1, 32]
    /// clamp applied.
    #[must_use]
    pub fn resolved_recv_threads(&self) -> usize {
        resolve_threads(self.recv_threads, MAX_RECV_THREADS)
    }

    /// Processor thread count with the zero-means-nproc rule and the
    /// [1, 16] clamp applied.
    #[must_use]
    pub fn resolved_proc_threads(&self) -> usize {
        resolve_threads(self.proc_threads, MAX_PROC_THREADS)
    }

    /// Listen address for the udp/tcp transports.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn resolve_threads(requested: usize, max: usize) -> usize {
    let n = if requested == 0 { num_cpus() } else { requested };
    n.clamp(1, max)
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::parse_from(std::iter::once("vad-ingest").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let cfg = parse(&[]);
        assert_eq!(cfg.transport, Transport::Udp);
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.mqtt_host, "127.0.0.1");
        assert_eq!(cfg.mqtt_port, 1883);
        assert_eq!(cfg.mqtt_topic, "vad/sensors/+");
        assert_eq!(cfg.recv_threads, 4);
        assert_eq!(cfg.proc_threads, 2);
        assert_eq!(cfg.ring_cap, 262_144);
        assert_eq!(cfg.recv_buf, 4 * 1024 * 1024);
        assert_eq!(cfg.stats_interval, 5);
    }

    #[test]
    fn test_transport_parsing() {
        assert_eq!(parse(&["--transport", "tcp"]).transport, Transport::Tcp);
        assert_eq!(parse(&["--transport", "MQTT"]).transport, Transport::Mqtt);
        assert!("quic".parse::<Transport>().is_err());
    }

    #[test]
    fn test_thread_clamping() {
        let cfg = parse(&["--recv-threads", "99", "--proc-threads", "99"]);
        assert_eq!(cfg.resolved_recv_threads(), MAX_RECV_THREADS);
        assert_eq!(cfg.resolved_proc_threads(), MAX_PROC_THREADS);
    }

    #[test]
    fn test_zero_threads_resolve_to_cpus() {
        let cfg = parse(&["--recv-threads", "0", "--proc-threads", "0"]);
        assert!(cfg.resolved_recv_threads() >= 1);
        assert!(cfg.resolved_proc_threads() >= 1);
        assert!(cfg.resolved_recv_threads() <= MAX_RECV_THREADS);
        assert!(cfg.resolved_proc_threads() <= MAX_PROC_THREADS);
    }

    #[test]
    fn test_transport_labels() {
        assert_eq!(Transport::Udp.label(), "UDP");
        assert_eq!(Transport::Tcp.label(), "TCP");
        assert_eq!(Transport::Mqtt.label(), "MQTT");
    }
}
