use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex as StdMutex};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use secrecy::SecretString;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::events::{EventContext, EventDispatcher, SlackEnvelope};
use crate::web::SlackWebClient;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const SEEN_EVENT_CAPACITY: usize = 512;
const MAX_CONNECT_RESPONSE_BYTES: usize = 8 * 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("socket mode gave up after {attempts} failed connection attempts: {last}")]
    RetriesExhausted { attempts: u32, last: TransportError },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    /// Next inbound envelope; `Ok(None)` means the stream ended cleanly.
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Pulls envelopes off the transport, acknowledges each one, and handles it
/// on its own task.
pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: Arc<EventDispatcher>,
    reconnect_policy: ReconnectPolicy,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: Arc<EventDispatcher>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, reconnect_policy }
    }

    /// Runs until the transport ends cleanly or consecutive connection
    /// failures exceed the policy. A dropped stream after a successful
    /// connect reconnects with the failure count reset.
    pub async fn start(&self) -> Result<(), SocketError> {
        let mut tasks = JoinSet::new();
        let mut failures = 0_u32;

        let outcome = loop {
            info!(attempt = failures, "opening socket mode transport connection");
            if let Err(transport_error) = self.transport.connect().await {
                failures += 1;
                warn!(
                    attempt = failures,
                    max_retries = self.reconnect_policy.max_retries,
                    error = %transport_error,
                    "socket mode transport failed to connect"
                );
                if failures > self.reconnect_policy.max_retries {
                    break Err(SocketError::RetriesExhausted {
                        attempts: failures,
                        last: transport_error,
                    });
                }
                self.pause(failures - 1).await;
                continue;
            }

            failures = 0;
            info!("socket mode transport connected");
            match self.pump(&mut tasks).await {
                Ok(()) => break Ok(()),
                Err(transport_error) => {
                    warn!(error = %transport_error, "socket mode stream dropped; reconnecting");
                    if let Err(disconnect_error) = self.transport.disconnect().await {
                        debug!(error = %disconnect_error, "disconnect after stream drop failed");
                    }
                    self.pause(0).await;
                }
            }
        };

        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }
        outcome
    }

    async fn pause(&self, attempt: u32) {
        let delay = self.reconnect_policy.backoff(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    async fn pump(&self, tasks: &mut JoinSet<()>) -> Result<(), TransportError> {
        loop {
            while let Some(joined) = tasks.try_join_next() {
                log_join(joined);
            }

            let Some(envelope) = self.transport.next_envelope().await? else {
                info!("socket mode transport stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };
            let thread_id = envelope.event.thread_key().unwrap_or("unknown").to_owned();

            info!(
                event_name = "ingress.slack.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                thread_id = %thread_id,
                "received slack envelope"
            );

            if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
                warn!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    thread_id = %thread_id,
                    error = %error,
                    "failed to acknowledge slack envelope"
                );
            } else {
                debug!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    thread_id = %thread_id,
                    "acknowledged slack envelope"
                );
            }

            let dispatcher = self.dispatcher.clone();
            tasks.spawn(async move {
                let context = EventContext { correlation_id: envelope.envelope_id.clone() };
                if let Err(error) = dispatcher.dispatch(&envelope, &context).await {
                    warn!(
                        envelope_id = %envelope.envelope_id,
                        correlation_id = %envelope.envelope_id,
                        thread_id = %thread_id,
                        error = %error,
                        "event dispatch failed; continuing socket loop"
                    );
                }
            });
        }
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(join_error) = joined {
        error!(error = %join_error, "event handler task failed");
    }
}

enum Frame {
    Envelope(SlackEnvelope),
    Disconnected(String),
}

#[derive(Default)]
struct Connection {
    frames: Option<mpsc::UnboundedReceiver<Frame>>,
}

/// Socket Mode websocket driven from a dedicated thread. Frames are handed
/// to the async side over a channel; acknowledgements go back the other way
/// and are written between reads.
pub struct SlackSocketTransport {
    web: Arc<SlackWebClient>,
    app_token: SecretString,
    https_proxy: Option<String>,
    connection: Mutex<Connection>,
    acks: StdMutex<Option<std_mpsc::Sender<String>>>,
    stop: StdMutex<Option<Arc<AtomicBool>>>,
}

impl SlackSocketTransport {
    pub fn new(web: Arc<SlackWebClient>, app_token: SecretString) -> Self {
        Self {
            web,
            app_token,
            https_proxy: None,
            connection: Mutex::new(Connection::default()),
            acks: StdMutex::new(None),
            stop: StdMutex::new(None),
        }
    }

    /// Tunnels the websocket through an HTTP proxy with `CONNECT`.
    pub fn with_proxy(mut self, https_proxy: Option<&str>) -> Self {
        self.https_proxy =
            https_proxy.map(str::trim).filter(|proxy| !proxy.is_empty()).map(str::to_owned);
        self
    }

    fn stop_listener(&self) {
        if let Some(stop) = self.stop.lock().ok().and_then(|mut stop| stop.take()) {
            stop.store(true, Ordering::Relaxed);
        }
        if let Ok(mut acks) = self.acks.lock() {
            acks.take();
        }
    }
}

#[async_trait]
impl SocketTransport for SlackSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.stop_listener();
        let url = self
            .web
            .open_socket_url(&self.app_token)
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (ack_tx, ack_rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let stop = Arc::new(AtomicBool::new(false));

        let listener_stop = stop.clone();
        let proxy = self.https_proxy.clone();
        thread::Builder::new()
            .name("slack-socket".to_owned())
            .spawn(move || listen(url, proxy, frame_tx, ack_rx, listener_stop, ready_tx))
            .map_err(|error| TransportError::Connect(error.to_string()))?;

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => return Err(TransportError::Connect(reason)),
            Err(_) => return Err(TransportError::Connect("socket listener exited".to_owned())),
        }

        self.connection.lock().await.frames = Some(frame_rx);
        if let Ok(mut acks) = self.acks.lock() {
            *acks = Some(ack_tx);
        }
        if let Ok(mut slot) = self.stop.lock() {
            *slot = Some(stop);
        }
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        let mut connection = self.connection.lock().await;
        let Some(frames) = connection.frames.as_mut() else {
            return Err(TransportError::Receive("not connected".to_owned()));
        };

        match frames.recv().await {
            Some(Frame::Envelope(envelope)) => Ok(Some(envelope)),
            Some(Frame::Disconnected(reason)) => {
                connection.frames = None;
                Err(TransportError::Receive(reason))
            }
            None => {
                connection.frames = None;
                Err(TransportError::Receive("socket listener stopped".to_owned()))
            }
        }
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        let acks =
            self.acks.lock().map_err(|error| TransportError::Acknowledge(error.to_string()))?;
        let Some(acks) = acks.as_ref() else {
            return Err(TransportError::Acknowledge("not connected".to_owned()));
        };
        acks.send(envelope_id.to_owned())
            .map_err(|_| TransportError::Acknowledge("socket listener stopped".to_owned()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.stop_listener();
        self.connection.lock().await.frames = None;
        Ok(())
    }
}

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

fn listen(
    url: String,
    proxy: Option<String>,
    frames: mpsc::UnboundedSender<Frame>,
    acks: std_mpsc::Receiver<String>,
    stop: Arc<AtomicBool>,
    ready: oneshot::Sender<Result<(), String>>,
) {
    let mut socket = match open_websocket(&url, proxy.as_deref()) {
        Ok(socket) => socket,
        Err(reason) => {
            let _ = ready.send(Err(reason));
            return;
        }
    };
    if let Err(error) = set_read_timeout(&socket, POLL_INTERVAL) {
        let _ = ready.send(Err(format!("could not configure websocket stream: {error}")));
        return;
    }
    let _ = ready.send(Ok(()));

    let mut seen = VecDeque::new();
    while !stop.load(Ordering::Relaxed) {
        while let Ok(envelope_id) = acks.try_recv() {
            if let Err(error) = send_ack(&mut socket, &envelope_id) {
                let _ = frames.send(Frame::Disconnected(format!("ack write failed: {error}")));
                return;
            }
        }

        let message = match socket.read() {
            Ok(message) => message,
            Err(tungstenite::Error::Io(io_error))
                if matches!(
                    io_error.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                continue;
            }
            Err(error) => {
                let _ = frames.send(Frame::Disconnected(format!("read error: {error}")));
                return;
            }
        };

        let text = match &message {
            Message::Text(text) => text.as_str().to_owned(),
            Message::Binary(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => text.to_owned(),
                Err(_) => continue,
            },
            Message::Close(frame) => {
                let reason = frame
                    .as_ref()
                    .map(|frame| frame.reason.to_string())
                    .unwrap_or_else(|| "socket closed".to_owned());
                let _ = frames.send(Frame::Disconnected(format!("close: {reason}")));
                return;
            }
            _ => continue,
        };

        let frame = match serde_json::from_str::<Value>(&text) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(error = %error, "slack socket payload parse error");
                continue;
            }
        };

        match frame.get("type").and_then(Value::as_str) {
            Some("hello") => {
                debug!("slack socket mode session ready");
                continue;
            }
            Some("disconnect") => {
                let reason = frame.get("reason").and_then(Value::as_str).unwrap_or("unknown");
                let _ =
                    frames.send(Frame::Disconnected(format!("slack requested reconnect: {reason}")));
                break;
            }
            _ => {}
        }

        let duplicate = SlackEnvelope::event_id(&frame)
            .is_some_and(|event_id| is_duplicate_event(&mut seen, event_id));
        let envelope = if duplicate { None } else { SlackEnvelope::from_frame(&frame) };

        match envelope {
            Some(envelope) => {
                if frames.send(Frame::Envelope(envelope)).is_err() {
                    break;
                }
            }
            None => {
                if let Some(envelope_id) = frame.get("envelope_id").and_then(Value::as_str) {
                    if duplicate {
                        debug!(envelope_id, "dropping redelivered slack event");
                    }
                    if let Err(error) = send_ack(&mut socket, envelope_id) {
                        let _ =
                            frames.send(Frame::Disconnected(format!("ack write failed: {error}")));
                        return;
                    }
                }
            }
        }
    }

    let _ = socket.close(None);
    let _ = socket.flush();
}

fn open_websocket(url: &str, proxy: Option<&str>) -> Result<Socket, String> {
    let Some(proxy) = proxy else {
        return tungstenite::connect(url)
            .map(|(socket, _)| socket)
            .map_err(|error| format!("websocket handshake failed: {error}"));
    };

    let stream = tunnel(url, proxy)?;
    tungstenite::client_tls(url, stream)
        .map(|(socket, _)| socket)
        .map_err(|error| format!("websocket handshake through proxy failed: {error}"))
}

/// Opens a TCP stream to the websocket host through `proxy`.
fn tunnel(url: &str, proxy: &str) -> Result<TcpStream, String> {
    let target = Url::parse(url).map_err(|error| format!("invalid socket url: {error}"))?;
    let host = target.host_str().ok_or_else(|| "socket url has no host".to_owned())?;
    let port = target.port_or_known_default().unwrap_or(443);

    let proxy_url = Url::parse(proxy).map_err(|error| format!("invalid proxy url: {error}"))?;
    let proxy_host = proxy_url.host_str().ok_or_else(|| "proxy url has no host".to_owned())?;
    let proxy_port = proxy_url.port_or_known_default().unwrap_or(80);

    let mut stream = TcpStream::connect((proxy_host, proxy_port))
        .map_err(|error| format!("could not reach proxy {proxy_host}:{proxy_port}: {error}"))?;
    write!(stream, "CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n\r\n")
        .map_err(|error| format!("proxy CONNECT write failed: {error}"))?;

    let head = read_response_head(&mut stream)?;
    let status = head.split_whitespace().nth(1).unwrap_or_default();
    if status != "200" {
        let status_line = head.lines().next().unwrap_or_default();
        return Err(format!("proxy refused CONNECT to {host}:{port}: {status_line}"));
    }
    Ok(stream)
}

/// Reads up to the blank line ending the proxy's response head, one byte at
/// a time so no tunnelled bytes are consumed.
fn read_response_head(stream: &mut TcpStream) -> Result<String, String> {
    let mut head = Vec::new();
    let mut byte = [0_u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_CONNECT_RESPONSE_BYTES {
            return Err("proxy response head too large".to_owned());
        }
        match stream.read(&mut byte) {
            Ok(0) => return Err("proxy closed the connection during CONNECT".to_owned()),
            Ok(_) => head.push(byte[0]),
            Err(error) => return Err(format!("proxy CONNECT read failed: {error}")),
        }
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}

fn send_ack(socket: &mut Socket, envelope_id: &str) -> Result<(), tungstenite::Error> {
    socket.send(Message::text(json!({ "envelope_id": envelope_id }).to_string()))
}

fn set_read_timeout(socket: &Socket, timeout: Duration) -> std::io::Result<()> {
    match socket.get_ref() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(Some(timeout)),
        MaybeTlsStream::Rustls(stream) => stream.get_ref().set_read_timeout(Some(timeout)),
        _ => Ok(()),
    }
}

/// Remembers the last few event ids; Slack redelivers events it considers
/// unacknowledged.
fn is_duplicate_event(seen: &mut VecDeque<String>, event_id: &str) -> bool {
    if seen.iter().any(|item| item == event_id) {
        return true;
    }
    seen.push_back(event_id.to_owned());
    while seen.len() > SEEN_EVENT_CAPACITY {
        seen.pop_front();
    }
    false
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::{Read, Write};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use secrecy::SecretString;

    use super::{
        is_duplicate_event, tunnel, ReconnectPolicy, SlackSocketTransport, SocketError,
        SocketModeRunner, SocketTransport, TransportError,
    };
    use crate::events::{
        EventContext, EventDispatcher, EventHandler, EventHandlerError, HandlerResult,
        SlackEnvelope, SlackEvent, SlackEventType,
    };
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        envelopes: VecDeque<Result<Option<SlackEnvelope>, TransportError>>,
        connect_attempts: usize,
        acknowledgements: Vec<String>,
        disconnect_calls: usize,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            envelopes: Vec<Result<Option<SlackEnvelope>, TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    envelopes: envelopes.into(),
                    ..ScriptedState::default()
                }),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn acknowledgements(&self) -> Vec<String> {
            self.state.lock().await.acknowledgements.clone()
        }

        async fn disconnect_calls(&self) -> usize {
            self.state.lock().await.disconnect_calls
        }
    }

    #[async_trait]
    impl SocketTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
            let mut state = self.state.lock().await;
            state.envelopes.pop_front().unwrap_or(Ok(None))
        }

        async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.acknowledgements.push(envelope_id.to_owned());
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            self.state.lock().await.disconnect_calls += 1;
            Ok(())
        }
    }

    struct CountingHandler {
        handled: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        fn event_type(&self) -> SlackEventType {
            SlackEventType::Unsupported
        }

        async fn handle(
            &self,
            _envelope: &SlackEnvelope,
            _ctx: &EventContext,
        ) -> Result<HandlerResult, EventHandlerError> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(HandlerResult::Ignored)
        }
    }

    fn envelope(id: &str) -> Result<Option<SlackEnvelope>, TransportError> {
        Ok(Some(SlackEnvelope {
            envelope_id: id.to_owned(),
            event: SlackEvent::Unsupported { event_type: "test".to_owned() },
        }))
    }

    fn instant_policy(max_retries: u32) -> ReconnectPolicy {
        ReconnectPolicy { max_retries, base_delay_ms: 0, max_delay_ms: 0 }
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![envelope("env-1"), Ok(None)],
        ));

        let runner = SocketModeRunner::new(
            transport.clone(),
            Arc::new(EventDispatcher::default()),
            instant_policy(2),
        );

        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.acknowledgements().await, vec!["env-1"]);
    }

    #[tokio::test]
    async fn exhausted_retries_are_reported() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
        ));

        let runner = SocketModeRunner::new(
            transport.clone(),
            Arc::new(EventDispatcher::default()),
            instant_policy(2),
        );

        let error = runner.start().await.expect_err("retries exhausted");
        assert!(matches!(error, SocketError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(transport.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn dropped_stream_reconnects_and_every_envelope_is_handled() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(()), Ok(())],
            vec![
                envelope("env-1"),
                Err(TransportError::Receive("slack requested reconnect: refresh".to_owned())),
                envelope("env-2"),
                envelope("env-3"),
                Ok(None),
            ],
        ));
        let handled = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(CountingHandler { handled: handled.clone() });

        let runner = SocketModeRunner::new(transport.clone(), Arc::new(dispatcher), instant_policy(0));
        runner.start().await.expect("clean shutdown");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.disconnect_calls().await, 2);
        assert_eq!(transport.acknowledgements().await, vec!["env-1", "env-2", "env-3"]);
        assert_eq!(handled.load(Ordering::SeqCst), 3);
    }

    fn fake_proxy(response: &'static str) -> (String, std::thread::JoinHandle<String>) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let address = listener.local_addr().expect("local addr");
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut request = Vec::new();
            let mut byte = [0_u8; 1];
            while !request.ends_with(b"\r\n\r\n") {
                stream.read_exact(&mut byte).expect("read request");
                request.push(byte[0]);
            }
            stream.write_all(response.as_bytes()).expect("write response");
            String::from_utf8(request).expect("utf8 request")
        });
        (format!("http://{address}"), handle)
    }

    #[test]
    fn tunnel_sends_connect_for_the_websocket_host() {
        let (proxy, handle) = fake_proxy("HTTP/1.1 200 Connection established\r\n\r\n");

        tunnel("wss://wss-primary.slack.com/link/?ticket=abc", &proxy).expect("tunnel opens");

        let request = handle.join().expect("proxy thread");
        assert!(request.starts_with("CONNECT wss-primary.slack.com:443 HTTP/1.1\r\n"));
        assert!(request.contains("Host: wss-primary.slack.com:443\r\n"));
    }

    #[test]
    fn tunnel_reports_a_refused_connect() {
        let (proxy, handle) =
            fake_proxy("HTTP/1.1 407 Proxy Authentication Required\r\nContent-Length: 0\r\n\r\n");

        let error = tunnel("wss://wss-primary.slack.com/link/", &proxy).expect_err("refused");

        handle.join().expect("proxy thread");
        assert!(error.contains("407 Proxy Authentication Required"), "{error}");
    }

    #[test]
    fn blank_proxy_settings_are_ignored() {
        let web = Arc::new(
            crate::web::SlackWebClient::new(SecretString::from("xoxb-test"), None).expect("client"),
        );
        let transport = SlackSocketTransport::new(web.clone(), SecretString::from("xapp-test"))
            .with_proxy(Some("  "));
        assert_eq!(transport.https_proxy, None);

        let transport = SlackSocketTransport::new(web, SecretString::from("xapp-test"))
            .with_proxy(Some(" http://proxy.internal:3128 "));
        assert_eq!(transport.https_proxy.as_deref(), Some("http://proxy.internal:3128"));
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.backoff(0).as_millis(), 250);
        assert_eq!(policy.backoff(2).as_millis(), 1_000);
        assert_eq!(policy.backoff(10).as_millis(), 5_000);
    }

    #[test]
    fn redelivered_event_ids_are_detected() {
        let mut seen = VecDeque::new();
        assert!(!is_duplicate_event(&mut seen, "Ev1"));
        assert!(is_duplicate_event(&mut seen, "Ev1"));

        for index in 0..super::SEEN_EVENT_CAPACITY {
            is_duplicate_event(&mut seen, &format!("Ev-fill-{index}"));
        }
        assert!(!is_duplicate_event(&mut seen, "Ev1"));
    }
}
