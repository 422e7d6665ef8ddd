//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::{any, post};
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinHandle;

use relay_console::relay::{ChannelEvent, ChannelEventSender};
use relay_console::session::{DeviceAction, DeviceCommand, SwitchPosition};
use relay_console::voice::{CaptureEvent, CaptureEventSender};
use relay_console::{
    CaptureSource, ChannelState, CommandChannel, CommandConnector, Components, Error,
    InferenceClient, InferenceReply, OrchestratorHandle, PlaybackSink, SessionConfig,
    SessionState, TurnOrchestrator, Utterance,
};

/// How long a test waits for the session to reach a state
pub const WAIT: Duration = Duration::from_secs(3);

/// Inference backend answering from a script
///
/// When gated, each request waits for [`FakeInference::release`].
#[derive(Default)]
pub struct FakeInference {
    replies: Mutex<VecDeque<relay_console::Result<InferenceReply>>>,
    gate: Option<Semaphore>,
    calls: AtomicUsize,
    inputs: Mutex<Vec<String>>,
}

impl FakeInference {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        })
    }

    pub fn reply(&self, text: &str, action: Option<DeviceAction>) {
        self.replies.lock().unwrap().push_back(Ok(InferenceReply {
            text: text.to_string(),
            action,
        }));
    }

    pub fn fail(&self, error: Error) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    /// Let one gated request finish
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceClient for FakeInference {
    async fn infer(&self, utterance: &Utterance) -> relay_console::Result<InferenceReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(utterance.text().to_string());

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(InferenceReply {
                    text: "ok".to_string(),
                    action: None,
                })
            })
    }
}

/// Playback that remembers what it was asked to say
#[derive(Default)]
pub struct RecordingPlayback {
    spoken: Mutex<Vec<String>>,
}

impl RecordingPlayback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

impl PlaybackSink for RecordingPlayback {
    fn speak(&self, text: &str) {
        self.spoken.lock().unwrap().push(text.to_string());
    }
}

/// Test-side view of a [`FakeCapture`]
#[derive(Default)]
pub struct CaptureProbe {
    starts: AtomicUsize,
    stops: AtomicUsize,
    active: AtomicBool,
    unavailable: AtomicBool,
    sender: Mutex<Option<CaptureEventSender>>,
}

impl CaptureProbe {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Report a recognised phrase from the current activation
    pub fn say(&self, text: &str) {
        self.emit(CaptureEvent::Utterance(Utterance::voice(text)));
    }

    /// End the current activation without a phrase
    pub fn end(&self, error: Option<Error>) {
        self.emit(CaptureEvent::Ended(error));
    }

    fn emit(&self, event: CaptureEvent) {
        let sender = self.sender.lock().unwrap().clone();
        sender
            .expect("capture not started")
            .send(event)
            .expect("orchestrator gone");
    }
}

/// Capture source driven by the test through its [`CaptureProbe`]
pub struct FakeCapture {
    probe: Arc<CaptureProbe>,
}

impl FakeCapture {
    pub fn new() -> (Box<dyn CaptureSource>, Arc<CaptureProbe>) {
        let probe = Arc::new(CaptureProbe::default());
        (
            Box::new(Self {
                probe: Arc::clone(&probe),
            }),
            probe,
        )
    }

    /// A platform without speech capture
    pub fn unavailable() -> (Box<dyn CaptureSource>, Arc<CaptureProbe>) {
        let (capture, probe) = Self::new();
        probe.unavailable.store(true, Ordering::SeqCst);
        (capture, probe)
    }
}

impl CaptureSource for FakeCapture {
    fn start(&mut self, events: CaptureEventSender) -> relay_console::Result<()> {
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        if self.probe.unavailable.load(Ordering::SeqCst) {
            return Err(Error::CaptureUnavailable("no microphone".to_string()));
        }

        self.probe.active.store(true, Ordering::SeqCst);
        *self.probe.sender.lock().unwrap() = Some(events);
        Ok(())
    }

    fn stop(&mut self) {
        self.probe.stops.fetch_add(1, Ordering::SeqCst);
        self.probe.active.store(false, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.probe.is_active()
    }
}

/// Test-side view of a [`FakeConnector`] and the channels it opens
pub struct ChannelProbe {
    initial: ChannelState,
    connects: AtomicUsize,
    closes: AtomicUsize,
    state: Mutex<ChannelState>,
    sent: Mutex<Vec<DeviceCommand>>,
    events: Mutex<Option<ChannelEventSender>>,
}

impl ChannelProbe {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<DeviceCommand> {
        self.sent.lock().unwrap().clone()
    }

    /// Change the state of the latest channel and report it
    pub fn set_state(&self, state: ChannelState) {
        *self.state.lock().unwrap() = state;
        self.emit(ChannelEvent::State(state));
    }

    /// Report a switch position from the device
    pub fn report(&self, position: SwitchPosition) {
        self.emit(ChannelEvent::Switch(position));
    }

    fn emit(&self, event: ChannelEvent) {
        if let Some(events) = self.events.lock().unwrap().as_ref() {
            let _ = events.send(event);
        }
    }
}

/// Connector handing out in-memory channels
pub struct FakeConnector {
    probe: Arc<ChannelProbe>,
}

impl FakeConnector {
    /// Channels start in `initial`
    pub fn new(initial: ChannelState) -> (Arc<dyn CommandConnector>, Arc<ChannelProbe>) {
        let probe = Arc::new(ChannelProbe {
            initial,
            connects: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            state: Mutex::new(initial),
            sent: Mutex::new(Vec::new()),
            events: Mutex::new(None),
        });
        (
            Arc::new(Self {
                probe: Arc::clone(&probe),
            }),
            probe,
        )
    }
}

impl CommandConnector for FakeConnector {
    fn connect(&self, events: ChannelEventSender) -> Box<dyn CommandChannel> {
        self.probe.connects.fetch_add(1, Ordering::SeqCst);
        *self.probe.state.lock().unwrap() = self.probe.initial;
        *self.probe.events.lock().unwrap() = Some(events);
        Box::new(FakeChannel {
            probe: Arc::clone(&self.probe),
            closed: false,
        })
    }
}

struct FakeChannel {
    probe: Arc<ChannelProbe>,
    closed: bool,
}

impl CommandChannel for FakeChannel {
    fn state(&self) -> ChannelState {
        if self.closed {
            ChannelState::Closed
        } else {
            *self.probe.state.lock().unwrap()
        }
    }

    fn dispatch(&self, command: DeviceCommand) -> relay_console::Result<()> {
        match self.state() {
            ChannelState::Open => {
                self.probe.sent.lock().unwrap().push(command);
                Ok(())
            }
            state => Err(Error::ChannelUnavailable(state)),
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.probe.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// A running orchestrator plus the fakes behind it
pub struct Harness {
    pub handle: OrchestratorHandle,
    pub task: JoinHandle<()>,
    pub inference: Arc<FakeInference>,
    pub playback: Arc<RecordingPlayback>,
    pub capture: Option<Arc<CaptureProbe>>,
    pub channel: Arc<ChannelProbe>,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    pub fn capture(&self) -> &CaptureProbe {
        self.capture.as_deref().expect("harness has no capture")
    }

    /// Wait until the published session state satisfies `predicate`
    pub async fn wait_for(&self, predicate: impl FnMut(&SessionState) -> bool) -> SessionState {
        let mut rx = self.handle.subscribe_session();
        let state = tokio::time::timeout(WAIT, rx.wait_for(predicate))
            .await
            .expect("timed out waiting for session state")
            .expect("orchestrator stopped");
        *state
    }

    /// Wait for the in-flight turn to finish
    pub async fn wait_idle(&self) -> SessionState {
        self.wait_for(|s| !s.thinking).await
    }

    /// Let forwarders drain, then round-trip the queue so every queued
    /// event has been handled
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = self.handle.submit_text("").await;
    }

    pub async fn stop(self) {
        self.handle.shutdown();
        tokio::time::timeout(WAIT, self.task)
            .await
            .expect("orchestrator did not stop")
            .expect("orchestrator panicked");
    }
}

pub struct HarnessBuilder {
    config: SessionConfig,
    inference: Arc<FakeInference>,
    capture: Option<(Box<dyn CaptureSource>, Arc<CaptureProbe>)>,
    channel_state: ChannelState,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            config: SessionConfig::default(),
            inference: FakeInference::new(),
            capture: None,
            channel_state: ChannelState::Open,
        }
    }
}

impl HarnessBuilder {
    pub fn inference(mut self, inference: Arc<FakeInference>) -> Self {
        self.inference = inference;
        self
    }

    pub fn with_capture(mut self) -> Self {
        self.capture = Some(FakeCapture::new());
        self
    }

    pub fn with_unavailable_capture(mut self) -> Self {
        self.capture = Some(FakeCapture::unavailable());
        self
    }

    pub fn channel_state(mut self, state: ChannelState) -> Self {
        self.channel_state = state;
        self
    }

    pub fn auto_listen(mut self, auto_listen: bool) -> Self {
        self.config.auto_listen = auto_listen;
        self
    }

    pub fn continuous(mut self, continuous: bool) -> Self {
        self.config.continuous = continuous;
        self
    }

    pub fn start(self) -> Harness {
        let playback = RecordingPlayback::new();
        let (connector, channel) = FakeConnector::new(self.channel_state);
        let (capture, capture_probe) = match self.capture {
            Some((capture, probe)) => (Some(capture), Some(probe)),
            None => (None, None),
        };

        let components = Components {
            capture,
            inference: self.inference.clone(),
            playback: playback.clone(),
            connector,
        };
        let (orchestrator, handle) = TurnOrchestrator::new(components, self.config);
        let task = tokio::spawn(orchestrator.run());

        Harness {
            handle,
            task,
            inference: self.inference,
            playback,
            capture: capture_probe,
            channel,
        }
    }
}

/// Serve `router` on an ephemeral local port
pub async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test server");
    let addr = listener.local_addr().expect("no local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server failed");
    });
    addr
}

/// Reasoning backend that always answers with `body`
pub fn inference_router(body: serde_json::Value) -> Router {
    Router::new().route(
        "/aiLoad",
        post(move |axum::Json(_request): axum::Json<serde_json::Value>| {
            let body = body.clone();
            async move { axum::Json(body) }
        }),
    )
}

/// Relay endpoint that acknowledges actions with a `switch_control` frame
///
/// Every text frame received is forwarded to `received`.
pub fn relay_router(received: mpsc::UnboundedSender<String>) -> Router {
    Router::new()
        .route("/ws/switch-control/", any(relay_upgrade))
        .with_state(received)
}

async fn relay_upgrade(
    State(received): State<mpsc::UnboundedSender<String>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| relay_socket(socket, received))
}

async fn relay_socket(mut socket: WebSocket, received: mpsc::UnboundedSender<String>) {
    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Text(text) => {
                let text = text.as_str().to_owned();
                let command: serde_json::Value =
                    serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);
                let token = match command["action"].as_str() {
                    Some("turn_on") => Some("Yes"),
                    Some("turn_off") => Some("No"),
                    _ => None,
                };
                let _ = received.send(text);

                if let Some(token) = token {
                    let ack = serde_json::json!({ "switch_control": token }).to_string();
                    if socket.send(Message::Text(ack.into())).await.is_err() {
                        break;
                    }
                }
            }
            Message::Close(_) => {
                let _ = received.send("<close>".to_string());
                break;
            }
            _ => {}
        }
    }
}

/// Wait for the next value on a watch channel that satisfies `predicate`
pub async fn wait_watch<T>(rx: &mut watch::Receiver<T>, predicate: impl FnMut(&T) -> bool) {
    tokio::time::timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("timed out waiting for watch value")
        .expect("sender dropped");
}
