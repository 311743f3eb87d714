use crate::metrics::{CONNECTED_VIEWERS, DELIVERY_FAILURES_TOTAL};
use crate::model::StoredReading;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Opaque identity of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How a connection announced itself on the live channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Dashboard client; receives every broadcast frame.
    Viewer,
    /// Directly-attached sensor bridge; a message source, never a recipient.
    RawRelay,
}

/// Outbound frames are handed to each viewer's writer task through an
/// unbounded channel, so fan-out never blocks on a slow socket.
pub type ViewerSender = mpsc::UnboundedSender<String>;

/// Owns the live set of viewer connections. All mutation and iteration goes
/// through the internal lock, so a connection mid-removal is never sent to.
pub struct BroadcastHub {
    viewers: Mutex<HashMap<ConnectionId, ViewerSender>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            viewers: Mutex::new(HashMap::new()),
        }
    }

    /// Adds a connection to the recipient set if its role is `Viewer`.
    /// Relay-role connections are acknowledged but never receive broadcasts.
    pub fn register(&self, id: ConnectionId, role: Role, tx: ViewerSender) {
        match role {
            Role::Viewer => {
                let mut viewers = self.viewers.lock().expect("viewer registry lock poisoned");
                if viewers.insert(id, tx).is_none() {
                    CONNECTED_VIEWERS.inc();
                }
                debug!(connection = %id, viewers = viewers.len(), "viewer registered");
            }
            Role::RawRelay => {
                debug!(connection = %id, "relay source announced, not added to recipients");
            }
        }
    }

    /// Removes a connection. Safe to call repeatedly and for connections
    /// that were never registered.
    pub fn unregister(&self, id: ConnectionId) {
        let mut viewers = self.viewers.lock().expect("viewer registry lock poisoned");
        if viewers.remove(&id).is_some() {
            CONNECTED_VIEWERS.dec();
            debug!(connection = %id, viewers = viewers.len(), "viewer unregistered");
        }
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers
            .lock()
            .expect("viewer registry lock poisoned")
            .len()
    }

    /// Delivers a persisted reading to every registered viewer. Returns the
    /// number of successful deliveries; failed connections are dropped from
    /// the registry without affecting the rest.
    pub fn publish(&self, reading: &StoredReading) -> usize {
        match serde_json::to_string(reading) {
            Ok(frame) => self.fan_out(frame),
            Err(e) => {
                error!(seq = reading.seq, "failed to serialize reading: {}", e);
                0
            }
        }
    }

    /// Fans out an arbitrary payload from a relay-role connection,
    /// bypassing validation and persistence.
    pub fn relay_raw(&self, payload: &Value) -> usize {
        self.fan_out(payload.to_string())
    }

    fn fan_out(&self, frame: String) -> usize {
        let mut delivered = 0;
        let mut failed = Vec::new();

        {
            let viewers = self.viewers.lock().expect("viewer registry lock poisoned");
            for (id, tx) in viewers.iter() {
                // Each send result is captured; one dead viewer cannot
                // stall or drop the frame for the others.
                match tx.send(frame.clone()) {
                    Ok(()) => delivered += 1,
                    Err(_) => failed.push(*id),
                }
            }
        }

        for id in failed {
            DELIVERY_FAILURES_TOTAL.inc();
            warn!(connection = %id, "viewer send failed, dropping connection");
            self.unregister(id);
        }

        delivered
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}
