//! TCP connectivity provider with automatic reconnection

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracker_shared::{
    codec::{self, FrameDecoder},
    frame, Frame, FrameworkError, FrameworkResult, Qos,
};

use super::provider::{ConnectionEvent, ConnectivityProvider, OutboundPublication};

/// Configuration for the TCP connectivity provider
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Client id presented to the broker
    pub client_id: String,
    /// Broker address (`host:port`)
    pub broker_address: String,
    /// Reconnection delay (initial)
    pub reconnect_delay: Duration,
    /// Maximum reconnection delay
    pub max_reconnect_delay: Duration,
    /// Connection timeout, also bounds the wait for the broker's answer
    pub connect_timeout: Duration,
    /// Interval between keep-alive pings
    pub keep_alive: Duration,
    /// Silence after which the session is considered dead
    pub read_timeout: Duration,
    /// How long a subscribe waits for its acknowledgement
    pub subscribe_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            client_id: "tracker-001".into(),
            broker_address: "127.0.0.1:1883".into(),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            keep_alive: Duration::from_secs(10),
            read_timeout: Duration::from_secs(25), // > two keep-alives
            subscribe_timeout: Duration::from_secs(5),
        }
    }
}

type PendingSubAcks = Mutex<HashMap<String, oneshot::Sender<bool>>>;

/// State shared between the provider handle and its connection loop
struct Shared {
    config: ConnectionConfig,
    connected: AtomicBool,
    event_tx: mpsc::Sender<ConnectionEvent>,
    outbound_rx: tokio::sync::Mutex<mpsc::Receiver<Frame>>,
    pending: PendingSubAcks,
}

impl Shared {
    async fn emit(&self, event: ConnectionEvent) {
        let _ = self.event_tx.send(event).await;
    }

    fn resolve_sub_ack(&self, topic: &str, accepted: bool) {
        let waiter = self
            .pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(topic);
        match waiter {
            Some(tx) => {
                let _ = tx.send(accepted);
            }
            None => debug!("unsolicited SubAck for {}", topic),
        }
    }
}

/// Connectivity provider speaking the framed protocol to a broker over TCP
pub struct TcpConnectivity {
    shared: Arc<Shared>,
    outbound_tx: mpsc::Sender<Frame>,
    session: Mutex<Option<CancellationToken>>,
}

impl TcpConnectivity {
    /// Create the provider and the channel its events arrive on
    pub fn new(config: ConnectionConfig) -> (Self, mpsc::Receiver<ConnectionEvent>) {
        let (outbound_tx, outbound_rx) = mpsc::channel::<Frame>(100);
        let (event_tx, event_rx) = mpsc::channel::<ConnectionEvent>(100);

        let shared = Arc::new(Shared {
            config,
            connected: AtomicBool::new(false),
            event_tx,
            outbound_rx: tokio::sync::Mutex::new(outbound_rx),
            pending: Mutex::new(HashMap::new()),
        });

        let provider = Self {
            shared,
            outbound_tx,
            session: Mutex::new(None),
        };
        (provider, event_rx)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    fn queue(&self, frame: Frame) -> FrameworkResult {
        self.outbound_tx
            .try_send(frame)
            .map_err(|_| FrameworkError::transient("outbound queue is full"))
    }
}

#[async_trait]
impl ConnectivityProvider for TcpConnectivity {
    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> FrameworkResult {
        let mut session = self.session.lock().unwrap_or_else(|p| p.into_inner());
        if session.as_ref().is_some_and(|token| !token.is_cancelled()) {
            return Ok(());
        }

        let cancel = CancellationToken::new();
        *session = Some(cancel.clone());

        let shared = self.shared.clone();
        tokio::spawn(async move {
            connection_loop(shared, cancel).await;
        });
        Ok(())
    }

    async fn publish(&self, publication: &OutboundPublication) -> FrameworkResult {
        if !self.is_connected() {
            return Err(FrameworkError::transient("not connected"));
        }

        self.queue(Frame::publish(
            publication.topic.clone(),
            publication.payload.clone(),
            publication.qos,
            publication.retain,
        ))
    }

    async fn subscribe(&self, topic: &str, qos: Qos) -> FrameworkResult {
        if !self.is_connected() {
            return Err(FrameworkError::transient("not connected"));
        }

        let (tx, rx) = oneshot::channel();
        self.shared
            .pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(topic.to_string(), tx);

        self.queue(Frame::subscribe(topic, qos))?;

        match timeout(self.shared.config.subscribe_timeout, rx).await {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(FrameworkError::transient(format!(
                "broker refused subscription to {}",
                topic
            ))),
            Ok(Err(_)) => Err(FrameworkError::transient("session closed before SubAck")),
            Err(_) => {
                self.shared
                    .pending
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .remove(topic);
                Err(FrameworkError::transient(format!(
                    "no SubAck for {} within {:?}",
                    topic, self.shared.config.subscribe_timeout
                )))
            }
        }
    }

    async fn disconnect(&self) {
        let session = self
            .session
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(cancel) = session {
            cancel.cancel();
        }
        self.shared.connected.store(false, Ordering::SeqCst);
    }
}

/// Connection loop with reconnection logic
async fn connection_loop(shared: Arc<Shared>, cancel: CancellationToken) {
    let config = &shared.config;
    let mut outbound_rx = shared.outbound_rx.lock().await;
    let mut reconnect_delay = config.reconnect_delay;

    while !cancel.is_cancelled() {
        match timeout(config.connect_timeout, TcpStream::connect(&config.broker_address)).await {
            Ok(Ok(stream)) => {
                // Connected successfully
                reconnect_delay = config.reconnect_delay;

                let result = handle_connection(stream, &shared, &mut outbound_rx, &cancel).await;
                let was_connected = shared.connected.swap(false, Ordering::SeqCst);

                match result {
                    Ok(()) => break,
                    Err(reason) => {
                        warn!("session with {} ended: {}", config.broker_address, reason);
                        if was_connected {
                            shared
                                .emit(ConnectionEvent::Disconnected {
                                    reason: reason.to_string(),
                                })
                                .await;
                        }
                    }
                }
            }
            Ok(Err(e)) => {
                warn!("connect to {} failed: {}", config.broker_address, e);
            }
            Err(_) => {
                warn!("connect to {} timed out", config.broker_address);
            }
        }

        // Wait before reconnecting
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(reconnect_delay) => {}
        }

        // Exponential backoff
        reconnect_delay = std::cmp::min(reconnect_delay * 2, config.max_reconnect_delay);
    }

    // Frames queued for a session that no longer exists
    while outbound_rx.try_recv().is_ok() {}
    shared.connected.store(false, Ordering::SeqCst);
    debug!("connection loop for {} finished", config.broker_address);
}

/// Wait for the broker's answer to our Connect frame
async fn await_conn_ack(reader: &mut OwnedReadHalf, decoder: &mut FrameDecoder) -> Result<()> {
    let mut read_buf = vec![0u8; 1024];

    loop {
        if let Some(frame) = decoder.decode_next()? {
            return match frame.body {
                Some(frame::Body::ConnAck(ack)) if ack.accepted => Ok(()),
                Some(frame::Body::ConnAck(ack)) => Err(anyhow!("broker refused: {}", ack.reason)),
                other => Err(anyhow!("expected ConnAck, got {:?}", other)),
            };
        }

        let n = reader.read(&mut read_buf).await?;
        if n == 0 {
            return Err(anyhow!("broker closed connection"));
        }
        decoder.extend(&read_buf[..n]);
    }
}

/// Handle an active connection
///
/// Returns `Ok` only when the session was cancelled locally.
async fn handle_connection(
    stream: TcpStream,
    shared: &Shared,
    outbound_rx: &mut mpsc::Receiver<Frame>,
    cancel: &CancellationToken,
) -> Result<()> {
    let config = &shared.config;
    let (mut reader, mut writer) = stream.into_split();
    let mut decoder = FrameDecoder::new();

    writer
        .write_all(&codec::encode(&Frame::connect(config.client_id.clone()))?)
        .await?;
    timeout(config.connect_timeout, await_conn_ack(&mut reader, &mut decoder))
        .await
        .map_err(|_| anyhow!("no ConnAck within {:?}", config.connect_timeout))??;

    info!("connected to broker {} as {}", config.broker_address, config.client_id);
    shared.connected.store(true, Ordering::SeqCst);
    shared.emit(ConnectionEvent::Connected).await;

    let mut read_buf = vec![0u8; 4096];
    let mut keep_alive = interval(config.keep_alive);
    let mut last_heard = Instant::now();

    // Frames decoded along with the ConnAck
    while let Some(frame) = decoder.decode_next()? {
        dispatch_frame(frame, shared).await;
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = writer.shutdown().await;
                return Ok(());
            }

            // Keep-alive
            _ = keep_alive.tick() => {
                if last_heard.elapsed() > config.read_timeout {
                    return Err(anyhow!("broker silent for {:?}", last_heard.elapsed()));
                }
                writer.write_all(&codec::encode(&Frame::ping())?).await?;
            }

            // Send outbound frames
            Some(frame) = outbound_rx.recv() => {
                writer.write_all(&codec::encode(&frame)?).await?;
            }

            // Read incoming frames
            result = reader.read(&mut read_buf) => {
                let n = result?;
                if n == 0 {
                    return Err(anyhow!("broker closed connection"));
                }
                last_heard = Instant::now();
                decoder.extend(&read_buf[..n]);

                while let Some(frame) = decoder.decode_next()? {
                    dispatch_frame(frame, shared).await;
                }
            }
        }
    }
}

async fn dispatch_frame(frame: Frame, shared: &Shared) {
    match frame.body {
        Some(frame::Body::Publish(publish)) => {
            let payload = publish.payload_text();
            shared
                .emit(ConnectionEvent::Message {
                    topic: publish.topic,
                    payload,
                })
                .await;
        }
        Some(frame::Body::SubAck(ack)) => shared.resolve_sub_ack(&ack.topic, ack.accepted),
        Some(frame::Body::Pong(pong)) => {
            debug!("pong, rtt {} ms", tracker_shared::now_ms().saturating_sub(pong.timestamp_ms));
        }
        other => debug!("ignoring frame {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Accept one client, acknowledge it and every subscription, then push
    /// one publication on the first subscribed topic
    async fn one_shot_broker(listener: TcpListener) {
        let (stream, _) = listener.accept().await.unwrap();
        let (mut reader, mut writer) = stream.into_split();
        let mut decoder = FrameDecoder::new();
        let mut buf = vec![0u8; 1024];

        loop {
            let n = reader.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            decoder.extend(&buf[..n]);

            while let Some(frame) = decoder.decode_next().unwrap() {
                let replies = match frame.body {
                    Some(frame::Body::Connect(_)) => vec![Frame::conn_ack(true, "")],
                    Some(frame::Body::Subscribe(sub)) => vec![
                        Frame::sub_ack(sub.topic.clone(), true),
                        Frame::publish(sub.topic, "MEASURE_NOW", Qos::AtMostOnce, false),
                    ],
                    Some(frame::Body::Ping(ping)) => vec![Frame::pong(ping.timestamp_ms)],
                    _ => vec![],
                };
                for reply in replies {
                    writer.write_all(&codec::encode(&reply).unwrap()).await.unwrap();
                }
            }
        }
    }

    #[tokio::test]
    async fn test_connect_subscribe_and_receive() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(one_shot_broker(listener));

        let (provider, mut events) = TcpConnectivity::new(ConnectionConfig {
            broker_address: address,
            ..Default::default()
        });

        provider.connect().await.unwrap();
        assert_eq!(events.recv().await, Some(ConnectionEvent::Connected));
        assert!(provider.is_connected());

        provider
            .subscribe("/dev-1/SensorControl", Qos::AtMostOnce)
            .await
            .unwrap();

        assert_eq!(
            events.recv().await,
            Some(ConnectionEvent::Message {
                topic: "/dev-1/SensorControl".into(),
                payload: "MEASURE_NOW".into(),
            })
        );

        provider.disconnect().await;
        assert!(!provider.is_connected());
    }

    #[tokio::test]
    async fn test_operations_fail_fast_when_not_connected() {
        let (provider, _events) = TcpConnectivity::new(ConnectionConfig::default());

        let publication = OutboundPublication::new("/dev-1/Sensor", "{}", Qos::AtMostOnce, false);
        assert!(provider.publish(&publication).await.unwrap_err().is_transient());
        assert!(provider
            .subscribe("/dev-1/AppControl", Qos::AtMostOnce)
            .await
            .unwrap_err()
            .is_transient());
    }

    #[tokio::test]
    async fn test_refused_session_is_not_reported_connected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 256];
            let _ = stream.read(&mut buf).await.unwrap();
            let refusal = codec::encode(&Frame::conn_ack(false, "duplicate client id")).unwrap();
            stream.write_all(&refusal).await.unwrap();
        });

        let (provider, mut events) = TcpConnectivity::new(ConnectionConfig {
            broker_address: address,
            reconnect_delay: Duration::from_secs(60),
            ..Default::default()
        });

        provider.connect().await.unwrap();
        let next = timeout(Duration::from_millis(300), events.recv()).await;

        assert!(next.is_err(), "no event expected, got {:?}", next);
        assert!(!provider.is_connected());
        provider.disconnect().await;
    }
}
