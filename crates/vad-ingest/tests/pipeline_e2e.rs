// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end scenarios through real sockets: a running pipeline, wire
//! bytes in, counters out.

use clap::Parser;
use std::io::Write;
use std::net::{TcpListener, TcpStream, UdpSocket};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use vad_ingest::{Config, Pipeline, Shutdown, Stats};

/// 36-byte audio packet from the seed scenarios: sensor 1, seq 1,
/// data_type 1, payload_len 4, two samples of `sample_value`.
fn audio_seed_packet(sample_value: i16) -> Vec<u8> {
    let s = sample_value.to_le_bytes();
    let mut pkt = vec![
        0x01, 0x00, 0x00, 0x00, // sensor_id = 1
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // timestamp_us = 0
        0x01, // data_type = audio
        0x00, 0x00, 0x00, // reserved
        0x04, 0x00, // payload_len = 4
        0x00, 0x00, // reserved
        0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // seq = 1
        0x00, 0x00, 0x00, 0x00, // padding
    ];
    pkt.extend_from_slice(&[s[0], s[1], s[0], s[1]]);
    pkt
}

/// 72-byte emotional packet: data_type 2, payload = ten f32 LE zeros.
fn emotional_seed_packet() -> Vec<u8> {
    let mut pkt = audio_seed_packet(0);
    pkt.truncate(32);
    pkt[12] = 0x02; // data_type = sensor vector
    pkt[16..18].copy_from_slice(&40u16.to_le_bytes());
    pkt.extend_from_slice(&[0u8; 40]);
    pkt
}

struct TestPipeline {
    shutdown: Shutdown,
    stats: Arc<Stats>,
    handle: JoinHandle<vad_ingest::Result<()>>,
}

impl TestPipeline {
    fn start(transport: &str, port: u16) -> Self {
        let port_s = port.to_string();
        let config = Config::parse_from([
            "vad-ingest",
            "--transport",
            transport,
            "--port",
            port_s.as_str(),
            "--recv-threads",
            "1",
            "--proc-threads",
            "2",
            "--ring-cap",
            "1024",
            "--stats-interval",
            "0",
        ]);
        let shutdown = Shutdown::new();
        let pipeline = Pipeline::new(config, shutdown.clone()).expect("pipeline alloc");
        let stats = pipeline.stats();
        let handle = std::thread::spawn(move || pipeline.run());
        Self {
            shutdown,
            stats,
            handle,
        }
    }

    fn stop(self) {
        self.shutdown.request_stop();
        self.handle
            .join()
            .expect("pipeline thread")
            .expect("pipeline run");
    }
}

fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}

fn free_udp_port() -> u16 {
    let sock = UdpSocket::bind("127.0.0.1:0").expect("probe bind");
    sock.local_addr().expect("probe addr").port()
}

fn free_tcp_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("probe bind");
    listener.local_addr().expect("probe addr").port()
}

/// Poke the pipeline's UDP port with single-byte datagrams until one is
/// counted, proving the receiver is bound and draining. The pokes
/// themselves count as recv + parse errors, so callers measure deltas
/// from the returned baseline.
fn warm_up_udp(sender: &UdpSocket, port: u16, stats: &Stats) -> Baseline {
    let target = format!("127.0.0.1:{port}");
    let ready = wait_until(Duration::from_secs(10), || {
        sender.send_to(&[0u8], &target).expect("warm-up send");
        stats.recv_packets() > 0
    });
    assert!(ready, "UDP receiver never came up");

    // Let stragglers land so the baseline is stable.
    std::thread::sleep(Duration::from_millis(200));
    Baseline::capture(stats)
}

#[derive(Debug, Clone, Copy)]
struct Baseline {
    recv_packets: u64,
    recv_bytes: u64,
    processed: u64,
    active: u64,
    parse_errors: u64,
}

impl Baseline {
    fn capture(stats: &Stats) -> Self {
        Self {
            recv_packets: stats.recv_packets(),
            recv_bytes: stats.recv_bytes(),
            processed: stats.processed(),
            active: stats.vad_active(),
            parse_errors: stats.parse_errors(),
        }
    }
}

#[test]
fn test_e1_audio_packet_above_threshold_via_udp() {
    let port = free_udp_port();
    let pipeline = TestPipeline::start("udp", port);
    let sender = UdpSocket::bind("127.0.0.1:0").expect("sender bind");
    let base = warm_up_udp(&sender, port, &pipeline.stats);

    let pkt = audio_seed_packet(31);
    sender
        .send_to(&pkt, format!("127.0.0.1:{port}"))
        .expect("send");

    let stats = Arc::clone(&pipeline.stats);
    assert!(
        wait_until(Duration::from_secs(5), || stats.processed()
            >= base.processed + 1),
        "packet never processed"
    );

    assert_eq!(stats.recv_packets(), base.recv_packets + 1);
    assert_eq!(stats.recv_bytes(), base.recv_bytes + pkt.len() as u64);
    assert_eq!(stats.processed(), base.processed + 1);
    assert_eq!(stats.vad_active(), base.active + 1, "energy 31 > 30 is active");
    assert_eq!(stats.parse_errors(), base.parse_errors);

    pipeline.stop();
}

#[test]
fn test_e2_audio_packet_below_threshold_via_udp() {
    let port = free_udp_port();
    let pipeline = TestPipeline::start("udp", port);
    let sender = UdpSocket::bind("127.0.0.1:0").expect("sender bind");
    let base = warm_up_udp(&sender, port, &pipeline.stats);

    sender
        .send_to(&audio_seed_packet(30), format!("127.0.0.1:{port}"))
        .expect("send");

    let stats = Arc::clone(&pipeline.stats);
    assert!(
        wait_until(Duration::from_secs(5), || stats.processed()
            >= base.processed + 1),
        "packet never processed"
    );

    assert_eq!(stats.vad_active(), base.active, "energy 30 is not active");

    pipeline.stop();
}

#[test]
fn test_e3_emotional_packet_via_udp() {
    let port = free_udp_port();
    let pipeline = TestPipeline::start("udp", port);
    let sender = UdpSocket::bind("127.0.0.1:0").expect("sender bind");
    let base = warm_up_udp(&sender, port, &pipeline.stats);

    sender
        .send_to(&emotional_seed_packet(), format!("127.0.0.1:{port}"))
        .expect("send");

    let stats = Arc::clone(&pipeline.stats);
    assert!(
        wait_until(Duration::from_secs(5), || stats.processed()
            >= base.processed + 1),
        "packet never processed"
    );

    // All-zero channels leave each axis at its bias; the arousal bias
    // (0.10) is below the 0.35 activity threshold.
    assert_eq!(stats.vad_active(), base.active);
    assert_eq!(stats.parse_errors(), base.parse_errors);

    pipeline.stop();
}

#[test]
fn test_e4_stream_framing_via_tcp() {
    let port = free_tcp_port();
    let pipeline = TestPipeline::start("tcp", port);

    // Connect retry doubles as the readiness probe.
    let mut stream = {
        let mut attempt = None;
        let ok = wait_until(Duration::from_secs(10), || {
            match TcpStream::connect(("127.0.0.1", port)) {
                Ok(s) => {
                    attempt = Some(s);
                    true
                }
                Err(_) => false,
            }
        });
        assert!(ok, "TCP listener never came up");
        attempt.expect("connected stream")
    };

    let base = Baseline::capture(&pipeline.stats);

    // Two framed copies of the E1 packet back to back.
    let pkt = audio_seed_packet(31);
    let mut wire = Vec::new();
    for _ in 0..2 {
        wire.extend_from_slice(&(pkt.len() as u32).to_le_bytes());
        wire.extend_from_slice(&pkt);
    }
    stream.write_all(&wire).expect("write frames");
    stream.flush().expect("flush");

    let stats = Arc::clone(&pipeline.stats);
    assert!(
        wait_until(Duration::from_secs(5), || stats.processed()
            >= base.processed + 2),
        "frames never processed"
    );

    assert_eq!(stats.recv_packets(), base.recv_packets + 2);
    assert_eq!(
        stats.recv_bytes(),
        base.recv_bytes + 2 * (pkt.len() as u64 + 4),
        "byte accounting includes the length prefixes"
    );
    assert_eq!(stats.vad_active(), base.active + 2);

    drop(stream);
    pipeline.stop();
}

#[test]
fn test_e6_short_datagram_counts_parse_error_and_pipeline_survives() {
    let port = free_udp_port();
    let pipeline = TestPipeline::start("udp", port);
    let sender = UdpSocket::bind("127.0.0.1:0").expect("sender bind");
    let base = warm_up_udp(&sender, port, &pipeline.stats);

    // 16 bytes: shorter than the header.
    sender
        .send_to(&[0u8; 16], format!("127.0.0.1:{port}"))
        .expect("send runt");

    let stats = Arc::clone(&pipeline.stats);
    assert!(
        wait_until(Duration::from_secs(5), || stats.parse_errors()
            >= base.parse_errors + 1),
        "parse error never counted"
    );
    assert_eq!(stats.recv_packets(), base.recv_packets + 1);
    assert_eq!(stats.processed(), base.processed, "no VAD for a runt");

    // The processor must still be alive: a valid packet goes through.
    sender
        .send_to(&audio_seed_packet(31), format!("127.0.0.1:{port}"))
        .expect("send valid");
    assert!(
        wait_until(Duration::from_secs(5), || stats.processed()
            >= base.processed + 1),
        "processor died after the parse error"
    );

    pipeline.stop();
}
