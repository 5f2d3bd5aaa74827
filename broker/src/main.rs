//! Publish/subscribe broker for tracker nodes

mod console;
mod session;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use session::{ClientSession, SessionManager};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tracker_shared::{frame, Frame, Qos};

const DEFAULT_LISTEN: &str = "0.0.0.0:1883";

/// A client must send Connect this soon after the TCP accept
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Sessions silent for this long are dropped; nodes ping well within it
const IDLE_TIMEOUT: Duration = Duration::from_secs(45);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let listen = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_LISTEN.to_string());
    let listener = TcpListener::bind(&listen).await?;
    info!("Broker listening on {}", listen);

    let sessions = Arc::new(SessionManager::new());
    tokio::spawn(console::run(sessions.clone()));

    serve(listener, sessions).await
}

async fn serve(listener: TcpListener, sessions: Arc<SessionManager>) -> anyhow::Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        debug!("Connection from: {}", addr);

        let sessions = sessions.clone();
        tokio::spawn(async move {
            handle_client(stream, addr, sessions).await;
        });
    }
}

async fn handle_client(stream: TcpStream, addr: SocketAddr, sessions: Arc<SessionManager>) {
    let mut session = ClientSession::new(stream, addr, sessions.next_session_id());

    let client_id = match timeout(CONNECT_TIMEOUT, session.recv()).await {
        Ok(Some(Frame {
            body: Some(frame::Body::Connect(connect)),
        })) => connect.client_id,
        Ok(Some(other)) => {
            warn!("{} sent {:?} before Connect", addr, other.body);
            return;
        }
        Ok(None) => return,
        Err(_) => {
            warn!("{} did not connect within {:?}", addr, CONNECT_TIMEOUT);
            return;
        }
    };

    if client_id.is_empty() {
        let _ = session.handle.send(&Frame::conn_ack(false, "empty client id")).await;
        return;
    }

    session.handle.client_id = client_id.clone();
    sessions.register(session.handle.clone()).await;
    if session.handle.send(&Frame::conn_ack(true, "")).await.is_err() {
        sessions.unregister(&client_id, session.handle.session_id).await;
        return;
    }
    info!("{} connected from {} ({} client(s))", client_id, addr, sessions.count().await);

    loop {
        let frame = match timeout(IDLE_TIMEOUT, session.recv()).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(_) => {
                warn!("{} idle for {:?}, dropping", client_id, IDLE_TIMEOUT);
                break;
            }
        };

        if let Err(e) = handle_frame(&session, &sessions, frame).await {
            warn!("{}: {}", client_id, e);
            break;
        }
    }

    sessions.unregister(&client_id, session.handle.session_id).await;
    info!(
        "{} disconnected after {:?}",
        client_id,
        session.handle.connected_at.elapsed()
    );
}

async fn handle_frame(
    session: &ClientSession,
    sessions: &SessionManager,
    frame: Frame,
) -> anyhow::Result<()> {
    let client_id = session.client_id();

    match frame.body {
        Some(frame::Body::Subscribe(sub)) => {
            let retained = sessions.subscribe(client_id, &sub.topic).await;
            session.handle.send(&Frame::sub_ack(sub.topic.clone(), true)).await?;
            if let Some(publish) = retained {
                session
                    .handle
                    .send(&Frame::publish(
                        publish.topic,
                        publish.payload,
                        Qos::from_wire(publish.qos),
                        true,
                    ))
                    .await?;
            }
        }
        Some(frame::Body::Publish(publish)) => {
            let delivered = sessions.publish(&publish).await;
            debug!(
                "[{}] {} ({} bytes) -> {} subscriber(s)",
                client_id,
                publish.topic,
                publish.payload.len(),
                delivered
            );
        }
        Some(frame::Body::Ping(ping)) => {
            session.handle.send(&Frame::pong(ping.timestamp_ms)).await?;
        }
        Some(frame::Body::Connect(_)) => warn!("{} sent a second Connect", client_id),
        other => debug!("{} sent unexpected {:?}", client_id, other),
    }
    Ok(())
}
