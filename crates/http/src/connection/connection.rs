//! The per-connection state machine.
//!
//! A [`Connection`] owns one peer session end to end: it captures the
//! endpoints, drives the optional TLS handshake, pumps reads through the
//! request parser or the websocket session, serializes handler replies onto
//! the write queue, and enforces the read and abandoned timeouts. Every
//! terminal path funnels through the connection manager, which guarantees
//! the shutdown runs once.
//!
//! # Task model
//!
//! One spawned task per connection runs the read loop; each submitted write
//! runs in its own short-lived task serialized by the writer lock; the two
//! timers live in their own tasks holding only weak references. Every
//! spawned operation captures a strong reference to the connection, so the
//! connection outlives all of its pending work.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use chrono::{DateTime, Local};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

use hearth_log::{logger, DebugFlag, Level};

use crate::connection::file_sender::FileSender;
use crate::connection::manager::ConnectionManager;
use crate::connection::timer::ConnTimer;
use crate::connection::writer::WriteQueue;
use crate::handler::{RequestHandler, WebsocketSession, WebsocketSessionFactory};
use crate::protocol::{ParseResult, Reply, Request, RequestParser, StatusCode};
use crate::transport::{Transport, TransportReader, TransportWriter};
use crate::utils::{http_date, strip_ipv4_mapped};
use crate::mime;

/// Reads are performed in chunks of at most this many bytes.
const READ_CHUNK_SIZE: usize = 4096;

/// Idle bound across activity events, independent of the read timeout.
const DEFAULT_ABANDONED_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Advertised `max=` parameter of the `Keep-Alive` response header.
const DEFAULT_MAX_REQUESTS: usize = 20;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Where the connection is in its I/O cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Initializing,
    WaitingHandshake,
    EndingHandshake,
    WaitingRead,
    Reading,
    WaitingWrite,
    EndingWrite,
}

/// Which protocol the connection is speaking. The transitions
/// `Http -> Websocket -> WebsocketClosing` are one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Http,
    Websocket,
    WebsocketClosing,
}

#[derive(Debug, Default, Clone)]
struct Endpoints {
    remote_address: String,
    remote_port: String,
    local_address: String,
    local_port: String,
}

struct PendingTransport {
    stream: TcpStream,
    tls: Option<TlsAcceptor>,
}

struct State {
    status: Status,
    kind: Kind,
}

/// Enqueues already-framed bytes onto the owning connection's write queue.
/// Held by the websocket session; the reference is weak so a session never
/// keeps a dead connection alive.
#[derive(Clone)]
pub struct FrameWriter {
    connection: Weak<Connection>,
}

impl FrameWriter {
    pub(crate) fn new(connection: Weak<Connection>) -> Self {
        FrameWriter { connection }
    }

    pub fn send(&self, frame: Bytes) {
        if let Some(connection) = self.connection.upgrade() {
            connection.enqueue(frame);
        }
    }
}

/// A single peer session over a plain or TLS transport.
pub struct Connection {
    id: u64,
    weak_self: Weak<Connection>,
    secure: bool,
    read_timeout: Duration,
    abandoned_timeout: Duration,
    max_requests: usize,

    pending: Mutex<Option<PendingTransport>>,
    writer: tokio::sync::Mutex<Option<TransportWriter>>,
    write_queue: Mutex<WriteQueue>,

    state: Mutex<State>,
    keepalive: AtomicBool,
    endpoints: Mutex<Endpoints>,
    last_request_uri: Mutex<String>,

    read_timer: ConnTimer,
    abandoned_timer: ConnTimer,
    stop_token: CancellationToken,

    manager: Arc<dyn ConnectionManager>,
    handler: Arc<dyn RequestHandler>,
    ws_factory: Option<Arc<dyn WebsocketSessionFactory>>,
    ws: Mutex<Option<Arc<dyn WebsocketSession>>>,
}

impl Connection {
    pub fn new(
        stream: TcpStream,
        tls: Option<TlsAcceptor>,
        read_timeout: Duration,
        manager: Arc<dyn ConnectionManager>,
        handler: Arc<dyn RequestHandler>,
        ws_factory: Option<Arc<dyn WebsocketSessionFactory>>,
    ) -> Arc<Connection> {
        let secure = tls.is_some();
        Arc::new_cyclic(|weak| Connection {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            weak_self: weak.clone(),
            secure,
            read_timeout,
            abandoned_timeout: DEFAULT_ABANDONED_TIMEOUT,
            max_requests: DEFAULT_MAX_REQUESTS,
            pending: Mutex::new(Some(PendingTransport { stream, tls })),
            writer: tokio::sync::Mutex::new(None),
            write_queue: Mutex::new(WriteQueue::new()),
            state: Mutex::new(State { status: Status::Initializing, kind: Kind::Http }),
            keepalive: AtomicBool::new(false),
            endpoints: Mutex::new(Endpoints::default()),
            last_request_uri: Mutex::new(String::new()),
            read_timer: ConnTimer::new(),
            abandoned_timer: ConnTimer::new(),
            stop_token: CancellationToken::new(),
            manager,
            handler,
            ws_factory,
            ws: Mutex::new(None),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn status(&self) -> Status {
        self.state.lock().unwrap().status
    }

    pub fn kind(&self) -> Kind {
        self.state.lock().unwrap().kind
    }

    pub fn remote_address(&self) -> String {
        self.endpoints.lock().unwrap().remote_address.clone()
    }

    /// URI of the most recent request, for diagnostics.
    pub fn last_request_uri(&self) -> String {
        self.last_request_uri.lock().unwrap().clone()
    }

    pub(crate) fn writer(&self) -> &tokio::sync::Mutex<Option<TransportWriter>> {
        &self.writer
    }

    pub(crate) fn manager(&self) -> &Arc<dyn ConnectionManager> {
        &self.manager
    }

    fn set_status(&self, status: Status) {
        self.state.lock().unwrap().status = status;
    }

    fn set_kind(&self, kind: Kind) {
        self.state.lock().unwrap().kind = kind;
    }

    fn request_stop(&self) {
        if let Some(connection) = self.weak_self.upgrade() {
            self.manager.stop(&connection);
        }
    }

    // ---- lifecycle -------------------------------------------------------

    /// Drives the connection: endpoint capture, optional TLS handshake, then
    /// the read loop. Runs as the connection's own task.
    pub async fn start(self: Arc<Self>) {
        let pending = match self.pending.lock().unwrap().take() {
            Some(pending) => pending,
            None => return,
        };

        let remote = match pending.stream.peer_addr() {
            Ok(addr) => addr,
            Err(e) => {
                logger().log(
                    Level::Error,
                    format!("Getting error '{e}' while getting the remote endpoint of a new connection"),
                );
                self.request_stop();
                return;
            }
        };
        let local = match pending.stream.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                logger().log(
                    Level::Error,
                    format!("Getting error '{e}' while getting the local endpoint of a new connection"),
                );
                self.request_stop();
                return;
            }
        };
        {
            let mut endpoints = self.endpoints.lock().unwrap();
            endpoints.remote_address = strip_ipv4_mapped(&remote.ip().to_string()).to_string();
            endpoints.remote_port = remote.port().to_string();
            endpoints.local_address = strip_ipv4_mapped(&local.ip().to_string()).to_string();
            endpoints.local_port = local.port().to_string();
        }

        self.arm_abandoned_timer();

        let transport = match pending.tls {
            Some(acceptor) => {
                self.set_status(Status::WaitingHandshake);
                let accepted = tokio::select! {
                    biased;
                    _ = self.stop_token.cancelled() => return,
                    accepted = acceptor.accept(pending.stream) => accepted,
                };
                self.set_status(Status::EndingHandshake);
                match accepted {
                    Ok(stream) => Transport::Tls(Box::new(stream)),
                    Err(e) => {
                        logger().debug(
                            DebugFlag::Webserver,
                            format!("TLS handshake failed: {e}"),
                        );
                        self.request_stop();
                        return;
                    }
                }
            }
            None => Transport::Plain(pending.stream),
        };

        let (reader, writer) = transport.split();
        *self.writer.lock().await = Some(writer);
        self.read_loop(reader).await;
    }

    /// Runs the shutdown sequence. Called exactly once, by the manager.
    pub(crate) async fn stop(&self) {
        match self.kind() {
            Kind::Websocket | Kind::WebsocketClosing => {
                let session = self.ws.lock().unwrap().clone();
                if let Some(session) = session {
                    session.stop();
                }
            }
            Kind::Http => {}
        }
        self.abandoned_timer.cancel();
        self.read_timer.cancel();
        self.stop_token.cancel();

        // taking the writer lock lets an in-flight write finish first;
        // shutdown before drop gives the peer a graceful FIN
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            writer.shutdown().await;
        }
    }

    // ---- read path -------------------------------------------------------

    async fn read_loop(&self, mut reader: TransportReader) {
        let mut buffer = BytesMut::with_capacity(READ_CHUNK_SIZE);
        let mut parser = RequestParser::new();

        loop {
            self.set_status(Status::WaitingRead);
            self.arm_read_timer();
            buffer.reserve(READ_CHUNK_SIZE);

            let read = tokio::select! {
                biased;
                // a deliberate cancellation: the stop path owns cleanup
                _ = self.stop_token.cancelled() => return,
                read = reader.read_buf(&mut buffer) => read,
            };

            self.set_status(Status::Reading);
            // the timer may already have fired; its callback re-checks state
            self.read_timer.cancel();

            match read {
                Ok(0) => {
                    self.request_stop();
                    return;
                }
                Ok(_) => {
                    let proceed = match self.kind() {
                        Kind::Http => self.handle_http(&mut buffer, &mut parser).await,
                        Kind::Websocket | Kind::WebsocketClosing => {
                            self.handle_websocket(&mut buffer)
                        }
                    };
                    if !proceed {
                        return;
                    }
                }
                Err(_) => {
                    self.request_stop();
                    return;
                }
            }
        }
    }

    /// One HTTP read cycle. Returns false when the read loop should end.
    async fn handle_http(&self, buffer: &mut BytesMut, parser: &mut RequestParser) -> bool {
        parser.reset();
        match parser.parse(&buffer[..]) {
            ParseResult::Partial => true,
            ParseResult::Malformed(_) => {
                logger().log(
                    Level::Error,
                    format!("Error parsing http request address: {}", self.remote_address()),
                );
                self.keepalive.store(false, Ordering::SeqCst);
                let reply = Reply::stock_reply(StatusCode::BadRequest);
                self.enqueue(reply.to_bytes("GET"));
                // the 400 drains through the write queue, whose completion
                // stops the connection
                false
            }
            ParseResult::Complete { request, consumed } => {
                buffer.advance(consumed);
                self.dispatch_request(request).await
            }
        }
    }

    /// Dispatches one complete request to the handler and routes the reply.
    /// Returns false when the read loop should end.
    async fn dispatch_request(&self, mut request: Request) -> bool {
        let keepalive = request
            .header("Connection")
            .is_some_and(|v| v.eq_ignore_ascii_case("Keep-Alive"));
        self.keepalive.store(keepalive, Ordering::SeqCst);
        request.keep_alive = keepalive;

        {
            let endpoints = self.endpoints.lock().unwrap();
            request.remote_address = endpoints.remote_address.clone();
            request.remote_port = endpoints.remote_port.clone();
            request.local_address = endpoints.local_address.clone();
            request.local_port = endpoints.local_port.clone();
        }
        *self.last_request_uri.lock().unwrap() = request.uri.clone();

        // wall clock is taken before dispatch so the access log carries the
        // arrival time, not the completion time
        let aclf_received = if logger().is_aclf_enabled() { Some(Local::now()) } else { None };

        let mut reply = Reply::default();
        self.handler.handle_request(&request, &mut reply);

        if let Some(received) = aclf_received {
            logger().aclf(aclf_line(&request, &reply, received));
        }

        if reply.status == StatusCode::SwitchingProtocols {
            // the 101 must serialize as HTTP, so it is queued before the
            // connection flips to websocket
            self.enqueue(reply.to_bytes(&request.method));
            self.upgrade_to_websocket(&request, &reply);
            self.keepalive.store(true, Ordering::SeqCst);
            self.set_status(Status::WaitingWrite);
            return true;
        }

        if reply.status == StatusCode::DownloadFile {
            let content = String::from_utf8_lossy(&reply.content).into_owned();
            match content.split_once("\r\n") {
                Some((path, attachment)) => {
                    let path = path.to_string();
                    let attachment = attachment.to_string();
                    if self.send_file(&path, &attachment, &mut reply).await {
                        // the file sender owns the connection from here on
                        return false;
                    }
                }
                None => reply = Reply::stock_reply(StatusCode::InternalServerError),
            }
        }

        if request.keep_alive
            && matches!(
                reply.status,
                StatusCode::Ok | StatusCode::NoContent | StatusCode::NotModified
            )
        {
            // the handler may have set these itself (but should not)
            reply.add_header_if_absent("Connection", "Keep-Alive");
            reply.add_header_if_absent(
                "Keep-Alive",
                &format!("max={}, timeout={}", self.max_requests, self.read_timeout.as_secs()),
            );
        }

        self.enqueue(reply.to_bytes(&request.method));
        self.set_status(Status::WaitingWrite);

        // with keepalive the next request overlaps the write drain
        keepalive
    }

    fn upgrade_to_websocket(&self, request: &Request, reply: &Reply) {
        self.set_kind(Kind::Websocket);
        match &self.ws_factory {
            Some(factory) => {
                let session = factory.create(FrameWriter::new(self.weak_self.clone()));
                session.start();
                session.store_session_id(request, reply);
                *self.ws.lock().unwrap() = Some(session);
            }
            None => {
                logger().log(
                    Level::Error,
                    format!(
                        "{} -> protocol switch requested but no websocket support is registered",
                        self.remote_address()
                    ),
                );
            }
        }
    }

    /// One websocket read cycle. Returns false when the read loop should
    /// end (a close control frame was received).
    fn handle_websocket(&self, buffer: &mut BytesMut) -> bool {
        let session = self.ws.lock().unwrap().clone();
        let session = match session {
            Some(session) => session,
            None => {
                self.request_stop();
                return false;
            }
        };

        let outcome = session.parse(&buffer[..]);
        buffer.advance(outcome.consumed.min(buffer.len()));
        self.keepalive.store(outcome.keepalive, Ordering::SeqCst);

        if outcome.complete && !outcome.keepalive {
            // close received: no new payload goes out, the queued close
            // reply drains and its completion stops the connection
            self.set_kind(Kind::WebsocketClosing);
            return false;
        }
        true
    }

    // ---- write path ------------------------------------------------------

    /// Queues bytes for transmission, preserving enqueue order. Safe to call
    /// from any task.
    pub fn enqueue(&self, buf: Bytes) {
        if self.kind() == Kind::WebsocketClosing {
            return;
        }
        let submit = self.write_queue.lock().unwrap().push(buf);
        if let Some(buf) = submit {
            self.spawn_write(buf);
        }
    }

    fn spawn_write(&self, buf: Bytes) {
        let connection = match self.weak_self.upgrade() {
            Some(connection) => connection,
            None => return,
        };
        tokio::spawn(async move {
            let result = {
                let mut writer = connection.writer.lock().await;
                match writer.as_mut() {
                    Some(writer) => writer.write_all(&buf).await,
                    None => Err(std::io::Error::new(
                        std::io::ErrorKind::NotConnected,
                        "transport closed",
                    )),
                }
            };
            connection.on_write_complete(result);
        });
    }

    fn on_write_complete(&self, result: std::io::Result<()>) {
        {
            let mut queue = self.write_queue.lock().unwrap();
            queue.finish();
            if result.is_ok() {
                if let Some(buf) = queue.next() {
                    self.spawn_write(buf);
                    if self.keepalive.load(Ordering::SeqCst) {
                        self.arm_abandoned_timer();
                    }
                    return;
                }
            }
        }
        // the queue lock must be released before any stop: the stop path
        // can re-enter the write machinery (websocket push)
        if result.is_err() {
            self.request_stop();
        } else if self.keepalive.load(Ordering::SeqCst) {
            self.set_status(Status::EndingWrite);
            self.arm_abandoned_timer();
        } else {
            // everything has been sent, close the connection
            self.request_stop();
        }
    }

    // ---- file downloads --------------------------------------------------

    /// Starts streaming a file as an attachment download. On open failure
    /// the reply becomes a 404 stock reply and the caller answers normally.
    async fn send_file(&self, path: &str, attachment: &str, reply: &mut Reply) -> bool {
        let (sender, total_size, modified) = match FileSender::open(path).await {
            Ok(opened) => opened,
            Err(_) => {
                *reply = Reply::stock_reply(StatusCode::NotFound);
                return false;
            }
        };

        *reply = Reply { status: StatusCode::Ok, ..Default::default() };
        reply.add_header("Cache-Control", "max-age=0, private");
        reply.add_header("Accept-Ranges", "bytes");
        reply.add_header("Date", &http_date(std::time::SystemTime::now()));
        reply.add_header("Last-Modified", &http_date(modified));
        reply.add_header("Server", "Apache/2.2.22");
        if let Some((_, extension)) = path.rsplit_once('.') {
            reply.add_header("Content-Type", mime::extension_to_type(extension));
        }
        reply.add_header(
            "Content-Disposition",
            &format!("attachment; filename=\"{attachment}\""),
        );
        reply.add_header("Content-Length", &total_size.to_string());

        let connection = match self.weak_self.upgrade() {
            Some(connection) => connection,
            None => return false,
        };
        let head = reply.to_bytes("GET");
        tokio::spawn(sender.run(connection, head));
        true
    }

    // ---- timers ----------------------------------------------------------

    fn arm_read_timer(&self) {
        let weak = self.weak_self.clone();
        self.read_timer.arm(self.read_timeout, move || {
            if let Some(connection) = weak.upgrade() {
                connection.on_read_timeout();
            }
        });
    }

    /// Read-timeout fire: an idle WebSocket peer with keepalive gets a
    /// server Ping, everyone else is closed.
    fn on_read_timeout(&self) {
        if self.keepalive.load(Ordering::SeqCst) && self.kind() == Kind::Websocket {
            let session = self.ws.lock().unwrap().clone();
            if let Some(session) = session {
                session.send_ping();
            }
        } else {
            self.request_stop();
        }
    }

    fn arm_abandoned_timer(&self) {
        let weak = self.weak_self.clone();
        self.abandoned_timer.arm(self.abandoned_timeout, move || {
            if let Some(connection) = weak.upgrade() {
                connection.on_abandoned_timeout();
            }
        });
    }

    fn on_abandoned_timeout(&self) {
        logger().log(
            Level::Status,
            format!(
                "{} -> handle abandoned timeout (status={:?})",
                self.remote_address(),
                self.status()
            ),
        );
        self.request_stop();
    }
}

/// Builds one Apache Combined Log Format line:
/// `%h %l %u [%d/%b/%Y:%H:%M:%S.%ms %z] "%r" %>s %b "%{Referer}i" "%{User-agent}i"`.
pub(crate) fn aclf_line(request: &Request, reply: &Reply, received: DateTime<Local>) -> String {
    let host = if reply.origin_host.is_empty() {
        request.remote_address.as_str()
    } else {
        reply.origin_host.as_str()
    };
    let minor = if request.http_version_minor != 0 {
        format!(".{}", request.http_version_minor)
    } else {
        String::new()
    };
    let request_line = format!(
        "{} {} HTTP/{}{}",
        request.method, request.uri, request.http_version_major, minor
    );
    let referer = match request.header("Referer") {
        Some(value) => format!("\"{value}\""),
        None => "-".to_string(),
    };
    let user_agent = match request.header("User-Agent") {
        Some(value) => format!("\"{value}\""),
        None => "-".to_string(),
    };
    format!(
        "{} - {} [{}.{:03} {}] \"{}\" {} {} {} {}",
        host,
        "-",
        received.format("%d/%b/%Y:%H:%M:%S"),
        received.timestamp_subsec_millis(),
        received.format("%z"),
        request_line,
        reply.status.code(),
        reply.content.len(),
        referer,
        user_agent,
    )
}
