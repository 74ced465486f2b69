// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! vad-loadgen - synthetic sensor traffic generator.
//!
//! Blasts encoded sensor packets at a vad-ingest endpoint over UDP or TCP
//! at a target rate and prints the achieved throughput. Pair it with the
//! pipeline's `[STATS]` output to measure end-to-end loss per transport.

use clap::Parser;
use colored::Colorize;
use std::io::Write;
use std::net::{TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use vad_ingest::{SensorPacket, Transport};

/// Synthetic sensor traffic generator for vad-ingest
#[derive(Parser, Debug)]
#[command(name = "vad-loadgen")]
#[command(version, about)]
struct Args {
    /// Target transport: udp or tcp
    #[arg(long, default_value = "udp")]
    transport: Transport,

    /// Target host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Target port
    #[arg(long, default_value_t = 9000)]
    port: u16,

    /// Packets per second (0 = unpaced)
    #[arg(long, default_value_t = 100_000)]
    rate: u64,

    /// Total packets to send (0 = until Ctrl-C)
    #[arg(long, default_value_t = 1_000_000)]
    count: u64,

    /// Audio payload size in bytes (even; two bytes per sample)
    #[arg(long, default_value_t = 320)]
    payload: usize,

    /// Send emotional sensor vectors instead of audio
    #[arg(long)]
    emotional: bool,

    /// Number of distinct sensor ids to rotate through
    #[arg(long, default_value_t = 16)]
    sensors: u32,
}

fn main() {
    env_logger::init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("{}: {e}", "Error".red().bold());
        std::process::exit(1);
    }
}

enum Sink {
    Udp(UdpSocket, String),
    Tcp(TcpStream),
}

impl Sink {
    fn send(&mut self, wire: &[u8], frame: &mut Vec<u8>) -> std::io::Result<()> {
        match self {
            Sink::Udp(socket, target) => {
                socket.send_to(wire, target.as_str())?;
            }
            Sink::Tcp(stream) => {
                frame.clear();
                frame.extend_from_slice(&(wire.len() as u32).to_le_bytes());
                frame.extend_from_slice(wire);
                stream.write_all(frame)?;
            }
        }
        Ok(())
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))?;

    let target = format!("{}:{}", args.host, args.port);
    let mut sink = match args.transport {
        Transport::Udp => Sink::Udp(UdpSocket::bind("0.0.0.0:0")?, target.clone()),
        Transport::Tcp => {
            let stream = TcpStream::connect(&target)?;
            stream.set_nodelay(true)?;
            Sink::Tcp(stream)
        }
        Transport::Mqtt => {
            return Err("loadgen speaks udp and tcp; publish via your broker for mqtt".into());
        }
    };

    eprintln!(
        "{} {} -> {} ({}, {} B payload, rate {})",
        ">>>".green().bold(),
        "vad-loadgen",
        target,
        args.transport,
        if args.emotional { 40 } else { args.payload },
        if args.rate == 0 {
            "unpaced".to_string()
        } else {
            format!("{}/s", args.rate)
        },
    );

    let mut packet = SensorPacket::new();
    packet.data_type = if args.emotional {
        vad_ingest::wire::DATA_TYPE_SENSOR_VECTOR
    } else {
        vad_ingest::wire::DATA_TYPE_AUDIO
    };
    set_synthetic_payload(&mut packet, args);

    let mut wire = vec![0u8; packet.encoded_len()];
    let mut frame = Vec::with_capacity(wire.len() + 4);

    let pace = if args.rate > 0 {
        Some(Duration::from_secs(1).div_f64(args.rate as f64))
    } else {
        None
    };

    let start = Instant::now();
    let mut sent = 0u64;
    let mut next_send = Instant::now();

    while running.load(Ordering::SeqCst) && (args.count == 0 || sent < args.count) {
        packet.sensor_id = (sent % args.sensors.max(1) as u64) as u32;
        packet.seq = sent;
        packet.timestamp_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64;

        let n = packet.encode_into(&mut wire).expect("wire buffer sized");
        sink.send(&wire[..n], &mut frame)?;
        sent += 1;

        if let Some(interval) = pace {
            next_send += interval;
            let now = Instant::now();
            if next_send > now {
                std::thread::sleep(next_send - now);
            } else if now - next_send > Duration::from_millis(100) {
                // Fell badly behind; resynchronize rather than burst.
                next_send = now;
            }
        }
    }

    let elapsed = start.elapsed().as_secs_f64().max(0.001);
    let bytes = sent * (packet.encoded_len() as u64);
    println!(
        "sent {} packets in {:.2}s: {:.0} pps, {:.2} Mbps",
        sent,
        elapsed,
        sent as f64 / elapsed,
        bytes as f64 * 8.0 / (elapsed * 1e6)
    );

    Ok(())
}

/// Fill the payload with something the VAD kernels react to: a loud
/// square-ish audio wave, or a mid-activation emotional vector.
fn set_synthetic_payload(packet: &mut SensorPacket, args: &Args) {
    if args.emotional {
        let channels: [f32; 10] = [0.1, 0.6, 0.8, 0.0, 0.0, 0.0, 0.2, 0.5, 0.6, 0.4];
        let mut payload = Vec::with_capacity(40);
        for v in channels {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        packet.set_payload(&payload);
    } else {
        let n_samples = args.payload.min(vad_ingest::MAX_PAYLOAD) / 2;
        let mut payload = Vec::with_capacity(n_samples * 2);
        for i in 0..n_samples {
            let sample: i16 = if i % 2 == 0 { 2000 } else { -2000 };
            payload.extend_from_slice(&sample.to_le_bytes());
        }
        packet.set_payload(&payload);
    }
}
