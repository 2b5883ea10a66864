//! The accept loop.
//!
//! Binds a listener, wraps every accepted socket in a [`Connection`] and
//! hands it to the [`ConnectionRegistry`]. Everything interesting happens
//! inside the connection; the server only feeds it.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, ToSocketAddrs};
use tokio_rustls::TlsAcceptor;

use hearth_log::{logger, Level};

use crate::connection::{Connection, ConnectionRegistry};
use crate::handler::{RequestHandler, WebsocketSessionFactory};

/// Per-server connection settings.
#[derive(Clone)]
pub struct ServerConfig {
    /// Idle bound between reads on one connection; also advertised as the
    /// `timeout=` parameter of keep-alive responses.
    pub read_timeout: Duration,
    /// When set, every accepted socket is wrapped in a server-side TLS
    /// stream before any HTTP is spoken.
    pub tls: Option<TlsAcceptor>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig { read_timeout: Duration::from_secs(20), tls: None }
    }
}

pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    handler: Arc<dyn RequestHandler>,
    ws_factory: Option<Arc<dyn WebsocketSessionFactory>>,
}

impl Server {
    /// Binds the listener. The server does not accept until [`Server::run`].
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        config: ServerConfig,
        handler: Arc<dyn RequestHandler>,
        ws_factory: Option<Arc<dyn WebsocketSessionFactory>>,
    ) -> io::Result<Server> {
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                logger().log(Level::Error, format!("Error binding listening socket: {e}"));
                return Err(e);
            }
        };
        Ok(Server {
            listener,
            config,
            registry: ConnectionRegistry::new(),
            handler,
            ws_factory,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Accepts connections until the task is dropped.
    pub async fn run(self) {
        loop {
            let (stream, _remote_addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    logger().log(Level::Error, format!("Error accepting connection: {e}"));
                    continue;
                }
            };

            let connection = Connection::new(
                stream,
                self.config.tls.clone(),
                self.config.read_timeout,
                self.registry.clone(),
                Arc::clone(&self.handler),
                self.ws_factory.clone(),
            );
            self.registry.start(connection);
        }
    }
}
