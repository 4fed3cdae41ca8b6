use crate::events::{self, EventRegistry, SubscriptionId};
use crate::protocol::{
    decode_frame, select_target, CdpCommand, CommandId, IncomingMessage, RuntimeKind,
    TargetDescriptor, DEBUGGER_PAUSED, DEBUGGER_RESUMED,
};
use crate::{CdpConfig, CdpError, Result};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Serialize;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot, Mutex},
    task::JoinHandle,
    time::timeout,
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;
type PendingMap = HashMap<CommandId, oneshot::Sender<Result<Value>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Connected,
    /// The peer went away; `close` has not been called yet.
    Disconnected,
    Closed,
}

#[derive(Debug, Clone, Default)]
struct PauseState {
    paused: bool,
    call_frames: Vec<Value>,
}

/// A live connection to one debug target.
///
/// Cloning is cheap and every clone drives the same socket, so concurrent
/// callers can issue commands independently; each waits only for its own id.
#[derive(Clone)]
pub struct CdpSession {
    config: CdpConfig,
    target: Option<TargetDescriptor>,
    runtime_kind: RuntimeKind,
    writer: Arc<Mutex<WsWriter>>,
    pending: Arc<parking_lot::Mutex<PendingMap>>,
    next_id: Arc<AtomicU64>,
    registry: Arc<parking_lot::Mutex<EventRegistry>>,
    pause: Arc<Mutex<PauseState>>,
    state: Arc<parking_lot::Mutex<SessionState>>,
    reader_task: Arc<parking_lot::Mutex<Option<JoinHandle<()>>>>,
}

/// A command that has been written to the socket but not yet answered.
///
/// Dropping the handle releases its response slot; a late answer is then
/// logged and discarded.
pub struct PendingCommand {
    id: CommandId,
    method: String,
    rx: oneshot::Receiver<Result<Value>>,
    pending: Arc<parking_lot::Mutex<PendingMap>>,
    limit: Duration,
}

impl PendingCommand {
    pub fn id(&self) -> CommandId {
        self.id
    }

    pub async fn wait(mut self) -> Result<Value> {
        let (id, limit) = (self.id, self.limit);
        let method = self.method.as_str();

        let outcome = match timeout(limit, &mut self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(CdpError::SessionClosed),
            Err(_) => Err(CdpError::Timeout(limit)),
        };

        match &outcome {
            Ok(_) => tracing::debug!("CDP command succeeded: method={}, id={}", method, id),
            Err(CdpError::Protocol { code, message, .. }) => tracing::warn!(
                "CDP command rejected: method={}, id={}, code={}, message={}",
                method,
                id,
                code,
                message
            ),
            Err(e) => tracing::debug!("CDP command failed: method={}, id={}: {}", method, id, e),
        }

        outcome
    }

    /// Non-blocking check for an answer that has already arrived.
    pub fn try_result(&mut self) -> Option<Result<Value>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(CdpError::SessionClosed)),
        }
    }
}

impl Drop for PendingCommand {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

impl CdpSession {
    /// Discovers the debug target behind `config.discovery_url()` and attaches to it.
    pub async fn connect(config: CdpConfig) -> Result<Self> {
        let targets = discover_targets(&config).await?;
        let target = select_target(targets, &config.discovery_url())?;
        let ws_url = target.web_socket_debugger_url.clone().unwrap_or_default();

        let runtime_kind = RuntimeKind::detect(&target);
        tracing::info!(
            "Discovered debug target '{}' ({:?}) at {}",
            target.title,
            runtime_kind,
            ws_url
        );

        Self::open(&ws_url, config, Some(target), runtime_kind).await
    }

    /// Attaches directly to a known socket address, skipping discovery.
    pub async fn connect_to(ws_url: &str, config: CdpConfig) -> Result<Self> {
        Self::open(ws_url, config, None, RuntimeKind::Unknown).await
    }

    async fn open(
        ws_url: &str,
        config: CdpConfig,
        target: Option<TargetDescriptor>,
        runtime_kind: RuntimeKind,
    ) -> Result<Self> {
        let (stream, _response) = connect_async(ws_url).await?;
        let (writer, reader) = stream.split();

        let pending = Arc::new(parking_lot::Mutex::new(HashMap::new()));
        let registry = Arc::new(parking_lot::Mutex::new(EventRegistry::new()));
        let pause = Arc::new(Mutex::new(PauseState::default()));
        let state = Arc::new(parking_lot::Mutex::new(SessionState::Connected));

        let reader_task = tokio::spawn(receive_loop(
            reader,
            pending.clone(),
            registry.clone(),
            pause.clone(),
            state.clone(),
        ));

        tracing::info!("Connected to inspector socket {}", ws_url);

        Ok(Self {
            config,
            target,
            runtime_kind,
            writer: Arc::new(Mutex::new(writer)),
            pending,
            next_id: Arc::new(AtomicU64::new(1)),
            registry,
            pause,
            state,
            reader_task: Arc::new(parking_lot::Mutex::new(Some(reader_task))),
        })
    }

    /// Sends a command and waits for its correlated response.
    pub async fn send(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.send_begin(method, params).await?.wait().await
    }

    /// Writes a command and returns a handle to its eventual response
    /// without waiting for it.
    pub async fn send_begin(&self, method: &str, params: Option<Value>) -> Result<PendingCommand> {
        if !self.is_open() {
            return Err(CdpError::SessionClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = CdpCommand::new(id, method, params).encode()?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        // close() flips the state before draining, so re-checking here
        // guarantees the slot is either drained or never left behind.
        if !self.is_open() {
            self.pending.lock().remove(&id);
            return Err(CdpError::SessionClosed);
        }

        tracing::debug!("Sending CDP command: method={}, id={}", method, id);

        let write_result = {
            let mut writer = self.writer.lock().await;
            writer.send(Message::Text(body.into())).await
        };
        if let Err(e) = write_result {
            self.pending.lock().remove(&id);
            return Err(e.into());
        }

        Ok(PendingCommand {
            id,
            method: method.to_string(),
            rx,
            pending: self.pending.clone(),
            limit: self.config.command_timeout,
        })
    }

    pub fn subscribe<F>(&self, method: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.registry.lock().subscribe(method, handler)
    }

    pub fn subscribe_channel(
        &self,
        method: impl Into<String>,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<Value>) {
        self.registry.lock().subscribe_channel(method)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.lock().unsubscribe(id)
    }

    pub(crate) fn registry(&self) -> Arc<parking_lot::Mutex<EventRegistry>> {
        self.registry.clone()
    }

    pub async fn is_paused(&self) -> bool {
        self.pause.lock().await.paused
    }

    /// Call frames from the most recent `Debugger.paused`, empty while running.
    pub async fn call_frames(&self) -> Vec<Value> {
        self.pause.lock().await.call_frames.clone()
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub fn runtime_kind(&self) -> RuntimeKind {
        self.runtime_kind
    }

    pub fn target(&self) -> Option<&TargetDescriptor> {
        self.target.as_ref()
    }

    pub fn config(&self) -> &CdpConfig {
        &self.config
    }

    /// Closes the socket and fails every outstanding command with
    /// `SessionClosed`. Calling it again is a no-op.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Closed {
                return;
            }
            *state = SessionState::Closed;
        }

        tracing::info!("Closing CDP session");

        {
            let mut writer = self.writer.lock().await;
            let _ = timeout(CLOSE_TIMEOUT, writer.close()).await;
        }

        if let Some(task) = self.reader_task.lock().take() {
            task.abort();
        }

        fail_pending(&self.pending);
    }

    #[cfg(test)]
    pub(crate) fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

async fn discover_targets(config: &CdpConfig) -> Result<Vec<TargetDescriptor>> {
    let url = config.discovery_url();
    tracing::debug!("Querying debug targets at {}", url);

    let http_client = reqwest::Client::builder()
        .timeout(config.discovery_timeout)
        .build()?;

    let response = http_client.get(&url).send().await?;
    if !response.status().is_success() {
        return Err(CdpError::Connection(format!(
            "discovery endpoint {} answered HTTP {}",
            url,
            response.status()
        )));
    }

    Ok(response.json::<Vec<TargetDescriptor>>().await?)
}

async fn receive_loop(
    mut reader: WsReader,
    pending: Arc<parking_lot::Mutex<PendingMap>>,
    registry: Arc<parking_lot::Mutex<EventRegistry>>,
    pause: Arc<Mutex<PauseState>>,
    state: Arc<parking_lot::Mutex<SessionState>>,
) {
    while let Some(frame) = reader.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                route_frame(text.as_str(), &pending, &registry, &pause).await;
            }
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => route_frame(text, &pending, &registry, &pause).await,
                Err(e) => tracing::warn!("Dropping non-UTF-8 binary frame: {}", e),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Inspector socket read failed: {}", e);
                break;
            }
        }
    }

    {
        let mut state = state.lock();
        if *state == SessionState::Connected {
            *state = SessionState::Disconnected;
        }
    }
    tracing::info!("Inspector socket closed by peer");
    fail_pending(&pending);
}

async fn route_frame(
    text: &str,
    pending: &Arc<parking_lot::Mutex<PendingMap>>,
    registry: &Arc<parking_lot::Mutex<EventRegistry>>,
    pause: &Arc<Mutex<PauseState>>,
) {
    let message = match decode_frame(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!("Ignoring undecodable frame: {}", e);
            return;
        }
    };

    match message {
        IncomingMessage::Response(response) => {
            let slot = pending.lock().remove(&response.id);
            match slot {
                Some(tx) => {
                    let _ = tx.send(response.into_result());
                }
                None => tracing::debug!("Response for unknown command id={}", response.id),
            }
        }
        IncomingMessage::Event(event) => {
            if event.method == DEBUGGER_PAUSED {
                let mut pause = pause.lock().await;
                pause.paused = true;
                pause.call_frames = event
                    .params
                    .get("callFrames")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
            } else if event.method == DEBUGGER_RESUMED {
                let mut pause = pause.lock().await;
                pause.paused = false;
                pause.call_frames.clear();
            }

            let subscribers = registry.lock().subscribers_for(&event.method);
            events::dispatch(subscribers, &event.method, &event.params);
        }
    }
}

fn fail_pending(pending: &parking_lot::Mutex<PendingMap>) {
    let drained: Vec<_> = pending.lock().drain().collect();
    if !drained.is_empty() {
        tracing::debug!("Failing {} outstanding command(s)", drained.len());
    }
    for (_, tx) in drained {
        let _ = tx.send(Err(CdpError::SessionClosed));
    }
}
