//! Connection lifecycle ownership.
//!
//! Every terminal path on a connection funnels into
//! [`ConnectionManager::stop`], exactly once per connection; the manager is
//! the single owner of lifecycle extinction and is responsible for
//! idempotence. [`ConnectionRegistry`] is the default implementation: a
//! keyed set of live connections where removal doubles as the
//! only-stop-once guard.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::connection::connection::Connection;

/// Owns connection shutdown. `stop` may be called from any task (read loop,
/// write completion, timer fire) and must tolerate repeats.
pub trait ConnectionManager: Send + Sync + 'static {
    fn stop(&self, connection: &Arc<Connection>);
}

/// The default manager: a registry of live connections.
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<u64, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(ConnectionRegistry { connections: Mutex::new(HashMap::new()) })
    }

    /// Registers the connection and starts driving it.
    pub fn start(&self, connection: Arc<Connection>) {
        self.connections
            .lock()
            .unwrap()
            .insert(connection.id(), Arc::clone(&connection));
        tokio::spawn(connection.start());
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops every live connection.
    pub fn stop_all(&self) {
        let connections: Vec<Arc<Connection>> =
            self.connections.lock().unwrap().drain().map(|(_, c)| c).collect();
        for connection in connections {
            tokio::spawn(async move { connection.stop().await });
        }
    }
}

impl ConnectionManager for ConnectionRegistry {
    fn stop(&self, connection: &Arc<Connection>) {
        // removal is the idempotence guard: only the caller that actually
        // removed the entry runs the shutdown
        let removed = self.connections.lock().unwrap().remove(&connection.id());
        if removed.is_some() {
            let connection = Arc::clone(connection);
            tokio::spawn(async move { connection.stop().await });
        }
    }
}
