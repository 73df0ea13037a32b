//! `rumqttc`-backed [`BrokerSession`].
//!
//! [`MqttSession::open`] builds a fresh `AsyncClient`/`EventLoop` pair and
//! drives the event loop until the broker acknowledges the connection.
//! After that a background task keeps polling the event loop, forwarding
//! inbound PUBLISH packets to the connector. A dropped link ends the task
//! and is reported as [`SessionEvent::LinkLost`].
//!
//! ```rust,ignore
//! use cuplink_api::mqtt::{BrokerConfig, MqttSession};
//!
//! let config = BrokerConfig::new("mqtt://localhost:1883".parse()?);
//! let session = MqttSession::new(config)?;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use url::Url;

use crate::envelope::{PublishEnvelope, Qos};
use crate::error::Error;
use crate::session::{BrokerSession, InboundMessage, SessionEvent};

// ── Tuning ───────────────────────────────────────────────────────────

const DEFAULT_PORT: u16 = 1883;
const REQUEST_CHANNEL_CAPACITY: usize = 64;
const CLIENT_ID_LEN: usize = 5;
/// How long `close` lets the event loop flush queued requests and the
/// DISCONNECT packet before aborting it.
const DISCONNECT_DRAIN: Duration = Duration::from_secs(2);

// ── BrokerConfig ─────────────────────────────────────────────────────

/// How to reach the broker.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// `mqtt://host[:port]` or `tcp://host[:port]`.
    pub url: Url,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub keep_alive: Duration,
}

impl BrokerConfig {
    /// Config with a random short client id and no credentials.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            client_id: random_client_id(),
            username: None,
            password: None,
            keep_alive: Duration::from_secs(60),
        }
    }

    /// Broker host and port; the port defaults to 1883.
    pub fn host_and_port(&self) -> Result<(String, u16), Error> {
        match self.url.scheme() {
            "mqtt" | "tcp" => {}
            other => {
                return Err(Error::InvalidBrokerUrl(format!(
                    "unsupported scheme '{other}' in {}",
                    self.url
                )));
            }
        }
        let host = self
            .url
            .host_str()
            .ok_or_else(|| Error::InvalidBrokerUrl(format!("missing host in {}", self.url)))?;
        Ok((host.to_owned(), self.url.port().unwrap_or(DEFAULT_PORT)))
    }

    fn mqtt_options(&self) -> Result<MqttOptions, Error> {
        let (host, port) = self.host_and_port()?;
        let mut options = MqttOptions::new(self.client_id.clone(), host, port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        if let Some(ref username) = self.username {
            let password = self
                .password
                .as_ref()
                .map(|p| p.expose_secret().to_owned())
                .unwrap_or_default();
            options.set_credentials(username.clone(), password);
        }
        Ok(options)
    }
}

/// First five characters of a v4 UUID, matching the short subscriber ids
/// devices already expect to see on the broker.
pub fn random_client_id() -> String {
    uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(CLIENT_ID_LEN)
        .collect()
}

// ── MqttSession ──────────────────────────────────────────────────────

/// A single MQTT session. Safe to share; all state is behind `Mutex`/atomics.
///
/// The session never reconnects by itself: when the link drops the poll
/// task reports [`SessionEvent::LinkLost`] and stops, and the owner opens
/// and subscribes again.
pub struct MqttSession {
    config: BrokerConfig,
    options: MqttOptions,
    link: Mutex<Option<Link>>,
    connected: Arc<AtomicBool>,
}

/// The client handle and the task polling its event loop. Stored and
/// taken together so one never outlives the other.
struct Link {
    client: AsyncClient,
    poller: JoinHandle<()>,
}

impl MqttSession {
    /// Validate `config` and prepare a session. Does NOT connect.
    pub fn new(config: BrokerConfig) -> Result<Self, Error> {
        let options = config.mqtt_options()?;
        Ok(Self {
            config,
            options,
            link: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        })
    }

    async fn connected_client(&self) -> Result<AsyncClient, Error> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.link
            .lock()
            .await
            .as_ref()
            .map(|link| link.client.clone())
            .ok_or(Error::NotConnected)
    }
}

#[async_trait]
impl BrokerSession for MqttSession {
    async fn open(&self, events: mpsc::Sender<SessionEvent>) -> Result<(), Error> {
        let (client, mut eventloop) =
            AsyncClient::new(self.options.clone(), REQUEST_CHANNEL_CAPACITY);

        await_connack(&mut eventloop, &self.endpoint()).await?;

        let mut link = self.link.lock().await;
        if let Some(previous) = link.take() {
            previous.poller.abort();
        }
        // No await between spawning the poller and storing it.
        self.connected.store(true, Ordering::SeqCst);
        let poller = tokio::spawn(poll_loop(eventloop, events, Arc::clone(&self.connected)));
        *link = Some(Link { client, poller });
        drop(link);

        tracing::info!(endpoint = %self.endpoint(), client_id = %self.config.client_id, "MQTT session open");
        Ok(())
    }

    async fn subscribe(&self, filter: &str, qos: Qos) -> Result<(), Error> {
        let client = self.connected_client().await?;
        client
            .subscribe(filter, qos.into())
            .await
            .map_err(|e| Error::Subscribe {
                filter: filter.to_owned(),
                reason: e.to_string(),
            })?;
        tracing::debug!(filter, qos = qos.level(), "subscribed");
        Ok(())
    }

    async fn publish(&self, envelope: PublishEnvelope) -> Result<(), Error> {
        let client = self.connected_client().await?;
        let PublishEnvelope {
            topic,
            payload,
            qos,
            retained,
        } = envelope;
        client
            .publish(topic.clone(), qos.into(), retained, payload.to_vec())
            .await
            .map_err(|e| Error::Publish {
                topic,
                reason: e.to_string(),
            })
    }

    async fn close(&self) -> Result<(), Error> {
        let link = self.link.lock().await.take();
        if let Some(Link { client, mut poller }) = link {
            // The request channel only closes once the event loop is gone,
            // so a failed DISCONNECT means there is nothing left to close.
            if let Err(e) = client.disconnect().await {
                tracing::debug!(error = %e, "event loop already stopped");
            }
            if tokio::time::timeout(DISCONNECT_DRAIN, &mut poller).await.is_err() {
                poller.abort();
            }
        }
        self.connected.store(false, Ordering::SeqCst);
        tracing::info!(endpoint = %self.endpoint(), "MQTT session closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn endpoint(&self) -> String {
        self.config.url.to_string()
    }
}

// ── Event loop driving ───────────────────────────────────────────────

/// Poll until the broker answers CONNECT.
async fn await_connack(eventloop: &mut EventLoop, endpoint: &str) -> Result<(), Error> {
    loop {
        let event = eventloop.poll().await.map_err(|e| Error::Connect {
            endpoint: endpoint.to_owned(),
            reason: e.to_string(),
        })?;

        if let Event::Incoming(Packet::ConnAck(ack)) = event {
            if ack.code == ConnectReturnCode::Success {
                return Ok(());
            }
            return Err(Error::Connect {
                endpoint: endpoint.to_owned(),
                reason: format!("broker refused connection: {:?}", ack.code),
            });
        }
    }
}

/// Keep the event loop turning and forward inbound publishes until the
/// DISCONNECT request goes out or the link drops.
async fn poll_loop(
    mut eventloop: EventLoop,
    events: mpsc::Sender<SessionEvent>,
    connected: Arc<AtomicBool>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage {
                    topic: publish.topic,
                    payload: publish.payload,
                };
                if events.try_send(SessionEvent::Message(message)).is_err() {
                    tracing::debug!("inbound channel full or closed, dropping message");
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("DISCONNECT sent, event loop stopped");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                connected.store(false, Ordering::SeqCst);
                tracing::warn!(error = %e, "MQTT link lost");
                let lost = SessionEvent::LinkLost {
                    reason: e.to_string(),
                };
                if events.send(lost).await.is_err() {
                    tracing::debug!("session owner gone, link loss not reported");
                }
                break;
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config(url: &str) -> BrokerConfig {
        BrokerConfig::new(url.parse().unwrap())
    }

    #[test]
    fn client_id_is_five_chars() {
        let id = random_client_id();
        assert_eq!(id.len(), CLIENT_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn host_and_port_defaults_port() {
        let (host, port) = config("mqtt://broker.local").host_and_port().unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 1883);

        let (_, port) = config("tcp://10.0.0.2:2883").host_and_port().unwrap();
        assert_eq!(port, 2883);
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        let err = MqttSession::new(config("https://broker.local")).err().unwrap();
        assert!(matches!(err, Error::InvalidBrokerUrl(_)));
    }

    #[tokio::test]
    async fn publish_before_open_is_not_connected() {
        let session = MqttSession::new(config("mqtt://localhost:1883")).unwrap();
        assert!(!session.is_connected());

        let envelope = PublishEnvelope {
            topic: "iotserver/admin/connectedcup/cup-1".into(),
            payload: bytes::Bytes::from_static(b"LEVEL:"),
            qos: Qos::AtMostOnce,
            retained: false,
        };
        let err = session.publish(envelope).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn close_after_event_loop_dropped_is_ok() {
        let session = MqttSession::new(config("mqtt://localhost:1883")).unwrap();
        let (client, eventloop) = AsyncClient::new(session.options.clone(), 1);
        drop(eventloop);
        *session.link.lock().await = Some(Link {
            client,
            poller: tokio::spawn(async {}),
        });
        session.connected.store(true, Ordering::SeqCst);

        session.close().await.unwrap();
        assert!(!session.is_connected());
        assert!(session.link.lock().await.is_none());
    }

    #[tokio::test]
    async fn dropped_link_is_reported_and_polling_stops() {
        // Port 1 refuses connections, so the first poll fails.
        let options = MqttOptions::new("cup01", "127.0.0.1", 1);
        let (_client, eventloop) = AsyncClient::new(options, 1);
        let (tx, mut rx) = mpsc::channel(4);
        let connected = Arc::new(AtomicBool::new(true));

        let poller = tokio::spawn(poll_loop(eventloop, tx, Arc::clone(&connected)));
        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(event, SessionEvent::LinkLost { .. }), "got {event:?}");
        assert!(!connected.load(Ordering::SeqCst));
        tokio::time::timeout(Duration::from_secs(10), poller)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn close_without_open_is_ok() {
        let session = MqttSession::new(config("mqtt://localhost:1883")).unwrap();
        session.close().await.unwrap();
        assert!(!session.is_connected());
    }
}
