//! Alert flooding over TCP.
//!
//! Peers exchange newline-delimited JSON frames. Every node remembers which
//! `(alert id, cancelled)` versions it has seen and forwards each version at
//! most once, bumping `propagationCount` on the way out.

use mycelial_strike::{DefenseEngine, Error, GateOutcome, Result, WarlordAlert};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

/// One line on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Hello { node_id: String, addr: String },
    WarlordAlert { alert: WarlordAlert },
}

impl Frame {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)? + "\n")
    }

    pub fn decode(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line.trim_end())?)
    }
}

/// Outbound flood channel plus the seen set shared by every connection.
#[derive(Clone)]
pub struct Flood {
    tx: broadcast::Sender<WarlordAlert>,
    seen: Arc<Mutex<HashSet<(String, bool)>>>,
}

impl Flood {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            seen: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WarlordAlert> {
        self.tx.subscribe()
    }

    /// Record this version of the alert; false if it was already seen.
    pub fn mark_seen(&self, alert: &WarlordAlert) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((alert.id.clone(), alert.cancelled))
    }

    /// Drop a version from the seen set so a redelivery is processed again.
    pub fn forget(&self, alert: &WarlordAlert) {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(alert.id.clone(), alert.cancelled));
    }

    /// Send an alert that originated on this node.
    pub fn publish(&self, alert: WarlordAlert) {
        self.mark_seen(&alert);
        self.send(alert);
    }

    fn forward(&self, mut alert: WarlordAlert) {
        alert.propagation_count = alert.propagation_count.saturating_add(1);
        self.send(alert);
    }

    fn send(&self, alert: WarlordAlert) {
        let id = alert.id.clone();
        // No subscribers just means no peers are connected yet.
        if self.tx.send(alert).is_err() {
            debug!("No peers connected for alert {}", id);
        }
    }
}

/// Hand a received alert to the engine and forward it if it is new.
///
/// Returns `None` for a version already seen. Alerts the engine rejects as
/// malformed are not forwarded. If ingestion fails the version is not
/// remembered, so the next redelivery is processed.
pub fn deliver(engine: &DefenseEngine, flood: &Flood, alert: WarlordAlert) -> Result<Option<GateOutcome>> {
    deliver_with(flood, alert, |alert| engine.ingest_alert(alert))
}

fn deliver_with(
    flood: &Flood,
    alert: WarlordAlert,
    ingest: impl FnOnce(WarlordAlert) -> Result<GateOutcome>,
) -> Result<Option<GateOutcome>> {
    alert.validate()?;
    if !flood.mark_seen(&alert) {
        return Ok(None);
    }
    match ingest(alert.clone()) {
        Ok(outcome) => {
            flood.forward(alert);
            Ok(Some(outcome))
        }
        Err(e) => {
            flood.forget(&alert);
            Err(e)
        }
    }
}

/// TCP flood transport.
pub struct GossipService {
    listen_addr: SocketAddr,
    bootstrap_peers: Vec<String>,
    engine: DefenseEngine,
    flood: Flood,
    node_id: String,
}

impl GossipService {
    pub fn new(
        listen_addr: SocketAddr,
        bootstrap_peers: Vec<String>,
        engine: DefenseEngine,
        flood: Flood,
        node_id: String,
    ) -> Self {
        Self {
            listen_addr,
            bootstrap_peers,
            engine,
            flood,
            node_id,
        }
    }

    /// Run the flood transport.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(self.listen_addr).await?;
        info!("Alert gossip listening on {}", self.listen_addr);

        let self_clone = Arc::clone(&self);
        tokio::spawn(async move {
            self_clone.connect_to_bootstrap_peers().await;
        });

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!("Incoming gossip connection from {}", addr);
                    let self_clone = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = self_clone.handle_connection(stream, addr).await {
                            warn!("Connection error from {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }

    async fn connect_to_bootstrap_peers(self: &Arc<Self>) {
        for peer_addr in &self.bootstrap_peers {
            info!("Connecting to bootstrap peer: {}", peer_addr);

            match TcpStream::connect(peer_addr).await {
                Ok(stream) => {
                    let addr = match stream.peer_addr() {
                        Ok(a) => a,
                        Err(e) => {
                            warn!("Failed to get peer addr: {}", e);
                            continue;
                        }
                    };
                    info!("Connected to bootstrap peer {} at {}", peer_addr, addr);

                    let self_clone = Arc::clone(self);
                    tokio::spawn(async move {
                        if let Err(e) = self_clone.handle_connection(stream, addr).await {
                            warn!("Bootstrap peer {} error: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    warn!("Failed to connect to bootstrap peer {}: {}", peer_addr, e);
                }
            }
        }
    }

    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        let mut peer_id = format!("peer-{}", addr);
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let hello = Frame::Hello {
            node_id: self.node_id.clone(),
            addr: self.listen_addr.to_string(),
        };
        writer.write_all(hello.encode()?.as_bytes()).await?;

        let mut flood_rx = self.flood.subscribe();
        // Only cleared after a full line: a cancelled read_line keeps its partial data.
        let mut line = String::new();
        loop {
            tokio::select! {
                read_result = reader.read_line(&mut line) => {
                    match read_result {
                        Ok(0) => {
                            info!("Peer {} disconnected", peer_id);
                            break;
                        }
                        Ok(_) => {
                            if let Some(id) = self.handle_line(&peer_id, &line) {
                                peer_id = id;
                            }
                            line.clear();
                        }
                        Err(e) => {
                            warn!("Read error from {}: {}", peer_id, e);
                            break;
                        }
                    }
                }
                flood_result = flood_rx.recv() => {
                    match flood_result {
                        Ok(alert) => {
                            let frame = Frame::WarlordAlert { alert };
                            writer.write_all(frame.encode()?.as_bytes()).await?;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("Peer {} lagged; {} alert(s) not forwarded", peer_id, skipped);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        }

        Ok(())
    }

    /// Returns the peer's node id when the line was its hello.
    fn handle_line(&self, peer_id: &str, line: &str) -> Option<String> {
        match Frame::decode(line) {
            Ok(Frame::Hello { node_id, addr }) => {
                info!("Peer {} identified as {} (listening on {})", peer_id, node_id, addr);
                Some(node_id)
            }
            Ok(Frame::WarlordAlert { alert }) => {
                let alert_id = alert.id.clone();
                match deliver(&self.engine, &self.flood, alert) {
                    Ok(Some(outcome)) => {
                        debug!("Alert {} from {}: {:?}", alert_id, peer_id, outcome);
                    }
                    Ok(None) => {}
                    Err(Error::Validation(e)) => {
                        warn!("Rejected alert {} from {}: {}", alert_id, peer_id, e);
                    }
                    Err(e) => {
                        error!("Failed to ingest alert {} from {}: {}", alert_id, peer_id, e);
                    }
                }
                None
            }
            Err(e) => {
                warn!("Malformed frame from {}: {}", peer_id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mycelial_strike::{AbuseType, Evidence, FixedTrust, Severity, Storage};
    use tempfile::tempdir;

    fn alert(id: &str) -> WarlordAlert {
        let now = Utc::now();
        WarlordAlert {
            id: id.into(),
            target_user_id: "warlord".into(),
            severity: Severity::new(5).unwrap(),
            abuse_type: AbuseType::Spam,
            evidence: vec![Evidence::new("listing-flood", "90 listings in an hour", 0.8)],
            reporting_node_fingerprint: "node-a".into(),
            reporting_user_id: None,
            trusted_source: true,
            propagation_count: 1,
            created_at: now,
            expires_at: WarlordAlert::expiry_for(now),
            cancelled: false,
            cancelled_by: None,
            cancellation_reason: None,
            cancelled_at: None,
        }
    }

    fn engine() -> (tempfile::TempDir, DefenseEngine) {
        let dir = tempdir().unwrap();
        let storage = Arc::new(Storage::open(dir.path()).unwrap());
        (dir, DefenseEngine::new(storage, Arc::new(FixedTrust(0.9))))
    }

    #[test]
    fn alert_frame_wire_format() {
        let frame = Frame::WarlordAlert { alert: alert("a1") };
        let line = frame.encode().unwrap();
        assert!(line.ends_with('\n'));

        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "warlord_alert");
        assert_eq!(value["alert"]["targetUserId"], "warlord");
        assert_eq!(value["alert"]["propagationCount"], 1);
        assert_eq!(Frame::decode(&line).unwrap(), frame);
    }

    #[test]
    fn malformed_frames_rejected() {
        assert!(Frame::decode("not json").is_err());
        assert!(Frame::decode(r#"{"type":"unknown"}"#).is_err());
        let incomplete = r#"{"type":"warlord_alert","alert":{"id":"a1"}}"#;
        assert!(Frame::decode(incomplete).is_err());
    }

    #[tokio::test]
    async fn deliver_forwards_each_version_once() {
        let (_dir, engine) = engine();
        let flood = Flood::new(16);
        let mut rx = flood.subscribe();

        let first = deliver(&engine, &flood, alert("a1")).unwrap();
        assert!(first.unwrap().strike().is_some());
        let forwarded = rx.recv().await.unwrap();
        assert_eq!(forwarded.propagation_count, 2);

        assert!(deliver(&engine, &flood, alert("a1")).unwrap().is_none());
        assert!(rx.try_recv().is_err());

        let mut cancelled = alert("a1");
        cancelled.cancel("steward", "withdrawn", Utc::now());
        let outcome = deliver(&engine, &flood, cancelled).unwrap().unwrap();
        assert!(matches!(outcome, GateOutcome::Cancelled { .. }));
        assert!(rx.recv().await.unwrap().cancelled);
        assert!(engine.get_active_strikes("warlord").unwrap().is_empty());
    }

    #[tokio::test]
    async fn published_alert_is_not_reingested() {
        let (_dir, engine) = engine();
        let flood = Flood::new(16);
        let mut rx = flood.subscribe();

        flood.publish(alert("a1"));
        assert_eq!(rx.recv().await.unwrap().propagation_count, 1);
        assert!(deliver(&engine, &flood, alert("a1")).unwrap().is_none());
        assert!(engine.get_alert("a1").unwrap().is_none());
    }

    #[test]
    fn invalid_alert_not_forwarded() {
        let (_dir, engine) = engine();
        let flood = Flood::new(16);
        let mut rx = flood.subscribe();
        let mut bad = alert("a1");
        bad.evidence.clear();
        assert!(deliver(&engine, &flood, bad).is_err());
        assert!(rx.try_recv().is_err());
        assert!(deliver(&engine, &flood, alert("a1")).unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_ingest_is_retried_on_redelivery() {
        let (_dir, engine) = engine();
        let flood = Flood::new(16);
        let mut rx = flood.subscribe();

        let failed = deliver_with(&flood, alert("a1"), |_| Err(Error::Storage("disk full".into())));
        assert!(matches!(failed, Err(Error::Storage(_))));
        assert!(rx.try_recv().is_err());

        let retried = deliver(&engine, &flood, alert("a1")).unwrap();
        assert!(retried.unwrap().strike().is_some());
        assert!(engine.get_alert("a1").unwrap().is_some());
        assert_eq!(rx.recv().await.unwrap().propagation_count, 2);
    }
}
