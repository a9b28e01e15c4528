//! The gateway RPC client: connection lifecycle, correlated request/response
//! dispatch, and server-push event delivery over one WebSocket.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    async_stream::{stream, try_stream},
    futures::{
        SinkExt, Stream, StreamExt,
        stream::{SplitSink, SplitStream},
    },
    secrecy::{ExposeSecret, SecretString},
    tokio::{
        net::TcpStream,
        sync::{Mutex, mpsc, oneshot},
        task::JoinHandle,
        time::{Instant, sleep_until, timeout},
    },
    tokio_tungstenite::{
        MaybeTlsStream, WebSocketStream, connect_async,
        tungstenite::{Message, client::IntoClientRequest},
    },
    tracing::{debug, info, warn},
};

use hypercli_protocol::{
    ClientInfo, ConnectParams, EVENT_CHALLENGE, EventFrame, GatewayFrame, HelloPayload,
    METHOD_CONNECT, RequestFrame, ResponseFrame, error_codes,
};

use crate::error::{Error, GatewayError, Result};

// ── Defaults ─────────────────────────────────────────────────────────────────

/// Default deadline for unary RPC calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default deadline for streaming calls; chat generation can be slow.
pub const CHAT_TIMEOUT: Duration = Duration::from_secs(300);

/// Version string advertised in the connect handshake.
const CLIENT_VERSION: &str = "hypercli-sdk";

/// The gateway checks this token for presence only; Traefik ForwardAuth on
/// the upgrade request is the real authentication layer.
const DEFAULT_GATEWAY_TOKEN: &str = "traefik-forwarded-auth-not-used";

// ── Types ────────────────────────────────────────────────────────────────────

/// Stream type returned by `tokio_tungstenite::connect_async`.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type WsSink = SplitSink<WsStream, Message>;
type PendingMap = HashMap<String, oneshot::Sender<ResponseFrame>>;

/// Connection options for [`GatewayClient`].
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// WebSocket URL (`wss://openclaw-{name}.hyperclaw.app`).
    pub url: String,
    /// JWT presented to the reverse proxy on the upgrade request.
    pub token: SecretString,
    /// Protocol-level auth token for the connect handshake.
    pub gateway_token: String,
    pub client_id: String,
    pub client_mode: String,
    /// Default deadline for unary RPC calls.
    pub timeout: Duration,
}

impl GatewayOptions {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: SecretString::new(token.into()),
            gateway_token: DEFAULT_GATEWAY_TOKEN.into(),
            client_id: "gateway-client".into(),
            client_mode: "backend".into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_gateway_token(mut self, token: impl Into<String>) -> Self {
        self.gateway_token = token.into();
        self
    }

    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }

    pub fn with_client_mode(mut self, mode: impl Into<String>) -> Self {
        self.client_mode = mode.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ── Client ───────────────────────────────────────────────────────────────────

/// Async WebSocket client for the OpenClaw gateway protocol v3.
///
/// One instance owns one connection: its socket, pending-request table, and
/// event queue. Instances are independent; nothing is process-global. A
/// client whose `connect()` failed, or that has been closed, is not
/// reusable — construct a fresh one.
pub struct GatewayClient {
    opts: GatewayOptions,
    connected: Arc<AtomicBool>,
    pending: Arc<Mutex<PendingMap>>,
    sink: Arc<Mutex<Option<WsSink>>>,
    events_tx: mpsc::UnboundedSender<EventFrame>,
    events_rx: Mutex<mpsc::UnboundedReceiver<EventFrame>>,
    reader: Option<JoinHandle<()>>,
    version: Option<String>,
    protocol: Option<u32>,
}

impl GatewayClient {
    pub fn new(opts: GatewayOptions) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            opts,
            connected: Arc::new(AtomicBool::new(false)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            sink: Arc::new(Mutex::new(None)),
            events_tx,
            events_rx: Mutex::new(events_rx),
            reader: None,
            version: None,
            protocol: None,
        }
    }

    /// Server version reported in the connect response.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Negotiated protocol version.
    pub fn protocol(&self) -> Option<u32> {
        self.protocol
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    // ── Connection lifecycle ─────────────────────────────────────────────

    /// Connect and perform the challenge-response handshake.
    pub async fn connect(&mut self) -> Result<()> {
        let mut request = self.opts.url.as_str().into_client_request()?;
        let bearer = format!("Bearer {}", self.opts.token.expose_secret());
        request
            .headers_mut()
            .insert(http::header::AUTHORIZATION, bearer.parse()?);

        let (mut ws, _) = connect_async(request).await?;

        // The server speaks first: exactly one challenge event.
        let raw = next_text_frame(&mut ws, self.opts.timeout).await?;
        match GatewayFrame::parse(&raw)? {
            GatewayFrame::Event(ev) if ev.event == EVENT_CHALLENGE => {},
            other => {
                return Err(GatewayError::protocol(format!(
                    "expected {EVENT_CHALLENGE}, got {other:?}"
                ))
                .into());
            },
        }

        let connect_id = uuid::Uuid::new_v4().to_string();
        let params = ConnectParams::operator(
            ClientInfo {
                id: self.opts.client_id.clone(),
                version: CLIENT_VERSION.into(),
                platform: std::env::consts::OS.into(),
                mode: self.opts.client_mode.clone(),
            },
            self.opts.gateway_token.clone(),
        );
        let frame = RequestFrame::new(&connect_id, METHOD_CONNECT, Some(serde_json::to_value(&params)?));
        ws.send(Message::Text(serde_json::to_string(&frame)?.into()))
            .await?;

        let raw = next_text_frame(&mut ws, self.opts.timeout).await?;
        let res = match GatewayFrame::parse(&raw)? {
            GatewayFrame::Response(res) => res,
            other => {
                return Err(GatewayError::protocol(format!(
                    "expected connect response, got {other:?}"
                ))
                .into());
            },
        };
        if !res.ok {
            return Err(GatewayError::from_shape_or(
                res.error,
                error_codes::CONNECT_FAILED,
                "Connection rejected",
            )
            .into());
        }

        let hello: HelloPayload = res
            .payload
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        self.version = hello.version;
        self.protocol = hello.protocol;
        self.connected.store(true, Ordering::SeqCst);

        let (sink, stream) = ws.split();
        *self.sink.lock().await = Some(sink);
        self.reader = Some(tokio::spawn(reader_loop(
            stream,
            Arc::clone(&self.pending),
            self.events_tx.clone(),
            Arc::clone(&self.connected),
        )));
        info!(version = ?self.version, protocol = self.protocol, "gateway connected");
        Ok(())
    }

    /// Close the connection. Idempotent.
    ///
    /// The connected flag is cleared before the socket is touched, so
    /// concurrent callers observe "not connected" rather than racing the
    /// teardown. In-flight calls fail with `NOT_CONNECTED` instead of
    /// hanging until their own timeouts.
    pub async fn close(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(reader) = self.reader.take() {
            reader.abort();
            let _ = reader.await;
        }
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.close().await;
        }
        self.pending.lock().await.clear();
        debug!("gateway connection closed");
    }

    // ── Low-level RPC ────────────────────────────────────────────────────

    /// Send an RPC request and wait for its response.
    ///
    /// Returns the response payload on success (`Null` when the server sent
    /// none); fails with the server's error, or `TIMEOUT` after the default
    /// deadline.
    pub async fn call(&self, method: &str, params: Option<serde_json::Value>) -> Result<serde_json::Value> {
        self.call_with_timeout(method, params, self.opts.timeout).await
    }

    /// [`call`](Self::call) with an explicit deadline.
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        deadline: Duration,
    ) -> Result<serde_json::Value> {
        let (id, rx) = self.send_request(method, params).await?;
        let res = match timeout(deadline, rx).await {
            Ok(Ok(res)) => res,
            // Sender dropped: the connection was torn down under us.
            Ok(Err(_)) => return Err(GatewayError::not_connected().into()),
            Err(_) => {
                // Forget the request so a late response is dropped by the
                // reader instead of resolving a slot nobody awaits.
                self.pending.lock().await.remove(&id);
                return Err(GatewayError::rpc_timeout(method, deadline).into());
            },
        };
        if !res.ok {
            return Err(GatewayError::from_shape_or(
                res.error,
                error_codes::RPC_ERROR,
                format!("RPC {method} failed"),
            )
            .into());
        }
        Ok(res.payload.unwrap_or(serde_json::Value::Null))
    }

    /// Send an RPC request and yield events until the final response.
    ///
    /// Used for methods like `chat.send` that emit a stream of events while
    /// the request is outstanding. Events whose name does not start with
    /// `event_filter` are consumed and dropped. The sequence is finite and
    /// not restartable; a failed final response surfaces as the last item.
    /// Abandoning the stream does not cancel the server-side operation.
    pub fn call_streaming(
        &self,
        method: impl Into<String>,
        params: serde_json::Value,
        event_filter: Option<String>,
        deadline: Duration,
    ) -> impl Stream<Item = Result<EventFrame>> + '_ {
        let method = method.into();
        try_stream! {
            let (id, mut rx) = self.send_request(&method, Some(params)).await?;
            let timeout_sleep = sleep_until(Instant::now() + deadline);
            tokio::pin!(timeout_sleep);

            // The queue lock is held for the life of the stream: during a
            // streaming call this client is the sole event consumer.
            let mut events = self.events_rx.lock().await;
            loop {
                // `Ok(Some(_))` is a queued event, `Ok(None)` the successful
                // final response ending the sequence.
                let next: Result<Option<EventFrame>> = tokio::select! {
                    // Queued events drain before the final response is
                    // observed, so nothing sent ahead of it is lost.
                    biased;
                    ev = events.recv() => match ev {
                        Some(ev) => Ok(Some(ev)),
                        None => Err(GatewayError::not_connected().into()),
                    },
                    res = &mut rx => match res {
                        Ok(res) if res.ok => Ok(None),
                        Ok(res) => Err(GatewayError::from_shape_or(
                            res.error,
                            error_codes::RPC_ERROR,
                            format!("RPC {method} failed"),
                        )
                        .into()),
                        Err(_) => Err(GatewayError::not_connected().into()),
                    },
                    () = &mut timeout_sleep => {
                        self.pending.lock().await.remove(&id);
                        Err(GatewayError::stream_timeout(&method, deadline).into())
                    },
                };
                match next? {
                    Some(ev) => {
                        if event_filter.as_deref().is_none_or(|f| ev.event.starts_with(f)) {
                            yield ev;
                        }
                    },
                    None => break,
                }
            }
        }
    }

    // ── Events ───────────────────────────────────────────────────────────

    /// Next server-push event, or `None` when `wait` (default: the client
    /// timeout) elapses without one.
    pub async fn next_event(&self, wait: Option<Duration>) -> Option<EventFrame> {
        let wait = wait.unwrap_or(self.opts.timeout);
        let mut events = self.events_rx.lock().await;
        timeout(wait, events.recv()).await.ok().flatten()
    }

    /// Iterate over server-push events. Ends after `idle_timeout` passes
    /// with no events, or when the connection goes away.
    pub fn events(&self, idle_timeout: Duration) -> impl Stream<Item = EventFrame> + '_ {
        stream! {
            while self.is_connected() {
                match self.next_event(Some(idle_timeout)).await {
                    Some(ev) => yield ev,
                    None => break,
                }
            }
        }
    }

    // ── Internals ────────────────────────────────────────────────────────

    /// Register a result slot and send the request frame.
    async fn send_request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(String, oneshot::Receiver<ResponseFrame>)> {
        if !self.is_connected() {
            return Err(GatewayError::not_connected().into());
        }

        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        let frame = RequestFrame::new(&id, method, params);
        let text = serde_json::to_string(&frame)?;
        let sent = {
            let mut sink = self.sink.lock().await;
            match sink.as_mut() {
                Some(sink) => sink
                    .send(Message::Text(text.into()))
                    .await
                    .map_err(Error::from),
                None => Err(GatewayError::not_connected().into()),
            }
        };
        if let Err(err) = sent {
            self.pending.lock().await.remove(&id);
            return Err(err);
        }
        Ok((id, rx))
    }
}

impl Drop for GatewayClient {
    fn drop(&mut self) {
        if let Some(reader) = &self.reader {
            reader.abort();
        }
    }
}

// ── Background reader ────────────────────────────────────────────────────────

/// Sole reader of the socket once the handshake is done. Routes `res` frames
/// to their pending slot and `event` frames to the queue; anything else is
/// ignored. One malformed frame must not take down the connection, so
/// per-frame parse errors are logged and skipped.
async fn reader_loop(
    mut stream: SplitStream<WsStream>,
    pending: Arc<Mutex<PendingMap>>,
    events: mpsc::UnboundedSender<EventFrame>,
    connected: Arc<AtomicBool>,
) {
    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                debug!("gateway socket error: {err}");
                break;
            },
        };
        match GatewayFrame::parse(&text) {
            Ok(GatewayFrame::Response(res)) => {
                let slot = pending.lock().await.remove(&res.id);
                match slot {
                    // The receiver may be gone (timed-out caller); ignore.
                    Some(tx) => {
                        let _ = tx.send(res);
                    },
                    None => debug!(id = %res.id, "dropping response with no pending call"),
                }
            },
            Ok(GatewayFrame::Event(ev)) => {
                let _ = events.send(ev);
            },
            Ok(_) => {},
            Err(err) => warn!("ignoring malformed gateway frame: {err}"),
        }
    }
    connected.store(false, Ordering::SeqCst);
    // Fail in-flight calls instead of leaving them to their own timeouts.
    pending.lock().await.clear();
    debug!("gateway reader stopped");
}

/// Await the next text frame during the handshake, before the reader exists.
async fn next_text_frame(ws: &mut WsStream, deadline: Duration) -> Result<String> {
    let recv = async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
                Some(Ok(Message::Close(_))) | None => {
                    return Err(Error::from(GatewayError::protocol(
                        "connection closed during handshake",
                    )));
                },
                Some(Ok(_)) => continue,
                Some(Err(err)) => return Err(err.into()),
            }
        }
    };
    match timeout(deadline, recv).await {
        Ok(res) => res,
        Err(_) => Err(GatewayError::handshake_timeout(deadline).into()),
    }
}
