//! Session manager: connected clients, subscriptions and retained messages

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use tracker_shared::{Frame, Publish, Qos};

use super::connection::SessionHandle;

/// Manages all active client sessions and their subscriptions
pub struct SessionManager {
    /// client id -> session handle
    sessions: RwLock<HashMap<String, SessionHandle>>,
    /// topic -> subscribed client ids
    subscriptions: RwLock<HashMap<String, HashSet<String>>>,
    /// topic -> last retained publication
    retained: RwLock<HashMap<String, Publish>>,
    next_session: AtomicU64,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            retained: RwLock::new(HashMap::new()),
            next_session: AtomicU64::new(1),
        }
    }

    /// Id for the next accepted connection
    pub fn next_session_id(&self) -> u64 {
        self.next_session.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a session, taking over any session with the same client id
    pub async fn register(&self, handle: SessionHandle) {
        let client_id = handle.client_id.clone();
        let previous = self.sessions.write().await.insert(client_id.clone(), handle);

        if let Some(old) = previous {
            info!("{} reconnected from a new session, closing {}", client_id, old.addr);
            self.drop_subscriptions(&client_id).await;
            old.close().await;
        }
    }

    /// Remove a session if it is still the registered one for its client id
    pub async fn unregister(&self, client_id: &str, session_id: u64) {
        let removed = {
            let mut sessions = self.sessions.write().await;
            match sessions.get(client_id) {
                Some(handle) if handle.session_id == session_id => sessions.remove(client_id).is_some(),
                _ => false,
            }
        };

        if removed {
            self.drop_subscriptions(client_id).await;
        }
    }

    async fn drop_subscriptions(&self, client_id: &str) {
        let mut subscriptions = self.subscriptions.write().await;
        for subscribers in subscriptions.values_mut() {
            subscribers.remove(client_id);
        }
        subscriptions.retain(|_, subscribers| !subscribers.is_empty());
    }

    /// Subscribe a client to an exact topic
    ///
    /// Returns the retained publication for the topic, if any.
    pub async fn subscribe(&self, client_id: &str, topic: &str) -> Option<Publish> {
        self.subscriptions
            .write()
            .await
            .entry(topic.to_string())
            .or_default()
            .insert(client_id.to_string());
        debug!("{} subscribed to {}", client_id, topic);

        self.retained.read().await.get(topic).cloned()
    }

    /// Route a publication to every subscriber of its topic
    ///
    /// A retained publication replaces the topic's retained message; an
    /// empty retained payload clears it. Returns the number of subscribers
    /// the publication was delivered to.
    pub async fn publish(&self, publish: &Publish) -> usize {
        if publish.retain {
            let mut retained = self.retained.write().await;
            if publish.payload.is_empty() {
                retained.remove(&publish.topic);
            } else {
                retained.insert(publish.topic.clone(), publish.clone());
            }
        }

        let targets: Vec<SessionHandle> = {
            let subscriptions = self.subscriptions.read().await;
            let Some(subscribers) = subscriptions.get(&publish.topic) else {
                return 0;
            };
            let sessions = self.sessions.read().await;
            subscribers
                .iter()
                .filter_map(|id| sessions.get(id).cloned())
                .collect()
        };

        // Deliveries never carry the retain flag
        let frame = Frame::publish(
            publish.topic.clone(),
            publish.payload.clone(),
            Qos::from_wire(publish.qos),
            false,
        );

        let results = join_all(targets.iter().map(|handle| handle.send(&frame))).await;
        let mut delivered = 0;
        for (handle, result) in targets.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => warn!("failed to deliver {} to {}: {}", publish.topic, handle.client_id, e),
            }
        }
        delivered
    }

    /// Get list of all connected client ids
    pub async fn connected_clients(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Get the number of connected clients
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ClientSession;
    use tokio::net::{TcpListener, TcpStream};

    /// A registered session plus the client end of its socket
    async fn session(manager: &SessionManager, client_id: &str) -> (ClientSession, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, peer) = listener.accept().await.unwrap();

        let mut session = ClientSession::new(server, peer, manager.next_session_id());
        session.handle.client_id = client_id.to_string();
        manager.register(session.handle.clone()).await;
        (session, client)
    }

    fn publication(topic: &str, payload: &str, retain: bool) -> Publish {
        Publish {
            topic: topic.to_string(),
            payload: payload.as_bytes().to_vec(),
            qos: Qos::AtMostOnce.into(),
            retain,
        }
    }

    #[tokio::test]
    async fn test_exact_topic_fan_out() {
        let manager = SessionManager::new();
        let (_a, _ca) = session(&manager, "node-a").await;
        let (_b, _cb) = session(&manager, "node-b").await;

        manager.subscribe("node-a", "/node-a/SensorControl").await;
        manager.subscribe("node-b", "/node-a/SensorControl").await;
        manager.subscribe("node-b", "/node-b/SensorControl").await;

        assert_eq!(manager.publish(&publication("/node-a/SensorControl", "MEASURE_NOW", false)).await, 2);
        assert_eq!(manager.publish(&publication("/node-a/Sensor", "{}", false)).await, 0);
        assert_eq!(manager.publish(&publication("/node-a/SensorControl/x", "{}", false)).await, 0);
    }

    #[tokio::test]
    async fn test_retained_delivered_on_subscribe() {
        let manager = SessionManager::new();
        manager.publish(&publication("/dev-1/AppControl", "SET_DWELL_TIME 10000", true)).await;

        let retained = manager.subscribe("dev-1", "/dev-1/AppControl").await.unwrap();
        assert_eq!(retained.payload_text(), "SET_DWELL_TIME 10000");

        manager.publish(&publication("/dev-1/AppControl", "", true)).await;
        assert!(manager.subscribe("dev-1", "/dev-1/AppControl").await.is_none());
    }

    #[tokio::test]
    async fn test_unregister_drops_subscriptions() {
        let manager = SessionManager::new();
        let (session, _client) = session(&manager, "node-a").await;
        manager.subscribe("node-a", "/node-a/LocationControl").await;

        manager.unregister("node-a", session.handle.session_id).await;

        assert_eq!(manager.count().await, 0);
        assert_eq!(manager.publish(&publication("/node-a/LocationControl", "LOCATION_NOW", false)).await, 0);
    }

    #[tokio::test]
    async fn test_takeover_keeps_new_session() {
        let manager = SessionManager::new();
        let (old, _c1) = session(&manager, "node-a").await;
        let (new, _c2) = session(&manager, "node-a").await;
        manager.subscribe("node-a", "/node-a/AppControl").await;

        // The replaced session's reader ends later and unregisters itself
        manager.unregister("node-a", old.handle.session_id).await;

        assert_eq!(manager.connected_clients().await, vec!["node-a"]);
        assert_eq!(manager.publish(&publication("/node-a/AppControl", "SET_LOG_LEVEL 2", false)).await, 1);

        manager.unregister("node-a", new.handle.session_id).await;
        assert_eq!(manager.count().await, 0);
    }
}
