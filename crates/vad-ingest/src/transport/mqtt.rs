// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker subscriber: one thread driving a synchronous MQTT client.
//!
//! The broker delivers complete wire packets (32-byte header + payload) as
//! message payloads with no extra framing; the subscriber copies each
//! payload into the ring exactly like the socket transports do.
//!
//! Startup blocks until the first `ConnAck` (bounded wait); an unreachable
//! broker is a fatal startup error. After that, reconnection belongs to the
//! client library: the event-loop iterator re-establishes the session and a
//! fresh `ConnAck` triggers re-subscription. Shutdown goes through
//! [`Client::disconnect`], which wakes the loop immediately.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ring::Ring;
use crate::shutdown::Shutdown;
use crate::stats::Stats;
use crate::transport::push_or_count;
use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

/// Fixed client id; brokers use it to pair session state across reconnects.
const CLIENT_ID: &str = "vad-ingest";

/// How long startup waits for the first `ConnAck`.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Pacing sleep after a post-startup connection error.
const RECONNECT_PACE: Duration = Duration::from_secs(1);

/// Handle to the running subscriber thread.
pub struct MqttReceiver {
    client: Client,
    handle: JoinHandle<()>,
}

impl MqttReceiver {
    /// Connect, wait for the broker to acknowledge, and start the
    /// subscriber thread.
    ///
    /// # Errors
    ///
    /// [`Error::BrokerConnect`] if the broker does not acknowledge within
    /// [`CONNECT_TIMEOUT`].
    pub fn start(
        config: &Config,
        ring: Arc<Ring>,
        stats: Arc<Stats>,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let mut opts = MqttOptions::new(CLIENT_ID, &config.mqtt_host, config.mqtt_port);
        opts.set_keep_alive(Duration::from_secs(30));
        opts.set_clean_session(true);

        let (client, connection) = Client::new(opts, 1024);
        let (ready_tx, ready_rx) = mpsc::channel::<std::result::Result<(), String>>();

        let topic = config.mqtt_topic.clone();
        let loop_client = client.clone();
        let handle = std::thread::Builder::new()
            .name("mqtt-recv".to_string())
            .spawn(move || {
                event_loop(connection, loop_client, &topic, &ring, &stats, &shutdown, ready_tx);
            })?;

        let startup = ready_rx.recv_timeout(CONNECT_TIMEOUT);
        let reason = match startup {
            Ok(Ok(())) => {
                log::info!(
                    "[MQTT] connected to {}:{}",
                    config.mqtt_host,
                    config.mqtt_port
                );
                return Ok(Self { client, handle });
            }
            Ok(Err(reason)) => reason,
            Err(_) => format!("no ConnAck within {}s", CONNECT_TIMEOUT.as_secs()),
        };

        // Tear the thread down before reporting the fatal error.
        let _ = client.disconnect();
        let _ = handle.join();
        Err(Error::BrokerConnect {
            host: config.mqtt_host.clone(),
            port: config.mqtt_port,
            reason,
        })
    }

    /// Stop the network loop via the client's disconnect primitive and join
    /// the subscriber thread.
    pub fn stop(self) {
        let _ = self.client.disconnect();
        let _ = self.handle.join();
    }
}

fn event_loop(
    mut connection: Connection,
    client: Client,
    topic: &str,
    ring: &Ring,
    stats: &Stats,
    shutdown: &Shutdown,
    ready_tx: mpsc::Sender<std::result::Result<(), String>>,
) {
    // Consumed on the first ConnAck (or first pre-ConnAck error).
    let mut ready_tx = Some(ready_tx);

    for event in connection.iter() {
        if shutdown.is_stopped() {
            break;
        }

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(Ok(()));
                }
                // (Re-)subscribe on every ConnAck: with a clean session the
                // broker forgets subscriptions across reconnects.
                match client.subscribe(topic, QoS::AtMostOnce) {
                    Ok(()) => log::info!("[MQTT] subscribing to {topic} (QoS 0)"),
                    Err(e) => log::warn!("[MQTT] subscribe request failed: {e}"),
                }
            }
            Ok(Event::Incoming(Packet::SubAck(_))) => {
                log::info!("[MQTT] subscription confirmed");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                handle_publish(&publish.payload, ring, stats);
            }
            Ok(_) => {}
            Err(e) => {
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(Err(e.to_string()));
                    break;
                }
                log::warn!("[MQTT] connection error (library will reconnect): {e}");
                stats.record_recv_error();
                std::thread::sleep(RECONNECT_PACE);
            }
        }
    }

    log::debug!("[MQTT] subscriber stopped");
}

/// Count and enqueue one broker message.
#[inline]
fn handle_publish(payload: &[u8], ring: &Ring, stats: &Stats) {
    stats.record_recv(payload.len());
    push_or_count(ring, stats, payload);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::SLOT_BODY;

    #[test]
    fn test_publish_payload_lands_in_ring() {
        let ring = Ring::with_capacity(4).expect("alloc");
        let stats = Stats::new();

        handle_publish(b"wire bytes", &ring, &stats);

        let mut buf = [0u8; SLOT_BODY];
        let len = ring.try_pop(&mut buf).expect("message in ring");
        assert_eq!(&buf[..len], b"wire bytes");

        let snap = stats.snapshot_and_reset(Duration::from_secs(1));
        assert_eq!(snap.pps, 1.0);
    }

    #[test]
    fn test_publish_full_ring_counts_drop() {
        let ring = Ring::with_capacity(2).expect("alloc");
        let stats = Stats::new();

        handle_publish(b"a", &ring, &stats);
        handle_publish(b"b", &ring, &stats);
        handle_publish(b"c", &ring, &stats);

        assert_eq!(stats.drops(), 1);
    }
}
