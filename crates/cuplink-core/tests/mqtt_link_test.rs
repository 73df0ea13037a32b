#![allow(clippy::unwrap_used)]
// `TransportConnector` over a real `MqttSession` against a minimal
// in-process MQTT 3.1.1 broker that can drop a client's link on demand.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use cuplink_api::{BrokerConfig, BrokerSession, InboundMessage, MqttSession};
use cuplink_core::{ConnectionState, ConnectorConfig, InboundHandler, TransportConnector};

// ── Helpers ─────────────────────────────────────────────────────────

const CONNECT: u8 = 1;
const PUBLISH: u8 = 3;
const SUBSCRIBE: u8 = 8;
const PINGREQ: u8 = 12;
const DISCONNECT: u8 = 14;

const DEVICE_TOPIC: &str = "iotserver/alice/connectedcup/cup-1/publisher";

/// Counts what clients send. The first connection is dropped right after
/// its subscription is acknowledged; later ones receive one device
/// message once subscribed.
#[derive(Default)]
struct FakeBroker {
    connections: AtomicU32,
    subscribes: AtomicU32,
    publishes: AtomicU32,
}

impl FakeBroker {
    async fn start() -> (Arc<Self>, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let broker = Arc::new(Self::default());

        let accepting = Arc::clone(&broker);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let n = accepting.connections.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::spawn(Arc::clone(&accepting).serve(stream, n == 1));
            }
        });
        (broker, port)
    }

    async fn serve(self: Arc<Self>, mut stream: TcpStream, drop_after_subscribe: bool) {
        while let Ok((kind, body)) = read_packet(&mut stream).await {
            match kind {
                CONNECT => stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap(),
                SUBSCRIBE => {
                    self.subscribes.fetch_add(1, Ordering::SeqCst);
                    stream
                        .write_all(&[0x90, 0x03, body[0], body[1], 0x00])
                        .await
                        .unwrap();
                    if drop_after_subscribe {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        return;
                    }
                    stream.write_all(&device_publish(DEVICE_TOPIC, b"LEVEL:42")).await.unwrap();
                }
                PUBLISH => {
                    self.publishes.fetch_add(1, Ordering::SeqCst);
                }
                PINGREQ => stream.write_all(&[0xD0, 0x00]).await.unwrap(),
                DISCONNECT => return,
                _ => {}
            }
        }
    }

    fn subscribes(&self) -> u32 {
        self.subscribes.load(Ordering::SeqCst)
    }
}

/// Packet type and body of the next control packet.
async fn read_packet(stream: &mut TcpStream) -> std::io::Result<(u8, Vec<u8>)> {
    let header = stream.read_u8().await?;
    let mut remaining = 0_usize;
    let mut shift = 0;
    loop {
        let byte = stream.read_u8().await?;
        remaining |= usize::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    let mut body = vec![0; remaining];
    stream.read_exact(&mut body).await?;
    Ok((header >> 4, body))
}

/// QoS 0 PUBLISH; short topics and payloads only.
fn device_publish(topic: &str, payload: &[u8]) -> Vec<u8> {
    let topic_len = u16::try_from(topic.len()).unwrap();
    let remaining = u8::try_from(2 + topic.len() + payload.len()).unwrap();
    let mut packet = vec![0x30, remaining];
    packet.extend_from_slice(&topic_len.to_be_bytes());
    packet.extend_from_slice(topic.as_bytes());
    packet.extend_from_slice(payload);
    packet
}

struct Forwarding(mpsc::UnboundedSender<InboundMessage>);

impl InboundHandler for Forwarding {
    fn handle(&self, message: &InboundMessage) {
        self.0.send(message.clone()).ok();
    }
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

// ── Link loss ───────────────────────────────────────────────────────

#[tokio::test]
async fn dropped_link_is_reopened_and_resubscribed() {
    let (broker, port) = FakeBroker::start().await;
    let config = BrokerConfig::new(format!("mqtt://127.0.0.1:{port}").parse().unwrap());
    let session: Arc<dyn BrokerSession> = Arc::new(MqttSession::new(config).unwrap());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let connector = TransportConnector::with_handler(
        ConnectorConfig {
            retry_interval: Duration::from_millis(100),
            ..ConnectorConfig::default()
        },
        Arc::clone(&session),
        Arc::new(Forwarding(tx)),
    );

    connector.connect();
    eventually("resubscribe after link loss", || broker.subscribes() >= 2).await;
    assert_eq!(broker.subscribes(), 2);
    assert_eq!(broker.connections.load(Ordering::SeqCst), 2);

    tokio::time::timeout(Duration::from_secs(10), connector.wait_for(ConnectionState::Connected))
        .await
        .unwrap();
    assert!(session.is_connected());

    // Deliveries flow again on the new link, in both directions.
    let received = tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.topic, DEVICE_TOPIC);
    assert_eq!(received.payload.as_ref(), b"LEVEL:42");

    connector.publish("alice", "cup-1", "LEVEL", "").await.unwrap();
    eventually("publish on new link", || broker.publishes.load(Ordering::SeqCst) == 1).await;

    connector.shutdown().await;
}
