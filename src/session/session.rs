use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config::SessionConfig;
use super::devices::{AudioDevices, SystemAudio};
use super::phase::ConnectionPhase;
use super::stats::SessionStats;
use super::status::{AgentEvent, AgentSnapshot, AgentStatus};
use super::transcript::{Speaker, TranscriptEntry, TranscriptLog};
use crate::audio::{
    decode_audio_samples, decode_inbound, CapturePipeline, EncodedChunk, FrameSink, PlaybackId,
    PlaybackListener, PlaybackScheduler,
};
use crate::error::AgentError;
use crate::live::{
    ClientMessage, FunctionCall, LiveClient, LiveConnection, LiveTransport, ServerContent,
    ServerMessage, TransportListener,
};
use crate::onboarding::{handle_tool_call, OnboardingStage, StageTracker};

/// Buffered discrete events per subscriber before the oldest are dropped
const EVENT_CAPACITY: usize = 256;

enum Command {
    Connect(oneshot::Sender<Result<(), AgentError>>),
    Disconnect(oneshot::Sender<()>),
    NextStage(oneshot::Sender<OnboardingStage>),
    PrevStage(oneshot::Sender<OnboardingStage>),
    Stats(oneshot::Sender<SessionStats>),
    Shutdown(oneshot::Sender<()>),
}

/// Everything that happens to a session, from any source
enum SessionEvent {
    Opened {
        connection: Box<dyn LiveConnection>,
        capture: CapturePipeline,
    },
    OpenFailed(AgentError),
    Message(ServerMessage),
    RemoteError(String),
    RemoteClosed(Option<String>),
    PlaybackEnded(PlaybackId),
    Captured(EncodedChunk),
}

struct Tagged {
    session: Uuid,
    event: SessionEvent,
}

/// Callback adapter handed to the transport, the output device and the
/// capture pipeline. Posts everything back to the actor, tagged with the
/// session it belongs to.
struct SessionLink {
    session: Uuid,
    events: mpsc::UnboundedSender<Tagged>,
}

impl SessionLink {
    fn post(&self, event: SessionEvent) {
        let tagged = Tagged {
            session: self.session,
            event,
        };
        if self.events.send(tagged).is_err() {
            debug!("Agent stopped, dropping event for session {}", self.session);
        }
    }
}

impl TransportListener for SessionLink {
    fn on_message(&self, message: ServerMessage) {
        self.post(SessionEvent::Message(message));
    }

    fn on_error(&self, error: String) {
        self.post(SessionEvent::RemoteError(error));
    }

    fn on_close(&self, reason: Option<String>) {
        self.post(SessionEvent::RemoteClosed(reason));
    }
}

impl PlaybackListener for SessionLink {
    fn chunk_ended(&self, id: PlaybackId) {
        self.post(SessionEvent::PlaybackEnded(id));
    }
}

impl FrameSink for SessionLink {
    fn forward(&self, chunk: EncodedChunk) {
        self.post(SessionEvent::Captured(chunk));
    }
}

/// Resources of the one pending or open session
struct ActiveSession {
    id: Uuid,
    connection: Option<Box<dyn LiveConnection>>,
    capture: CapturePipeline,
    playback: PlaybackScheduler,
    /// Messages produced before the connection was handed over
    pending: Vec<ClientMessage>,
}

/// Session state, owned by the actor task
struct SessionMachine {
    config: SessionConfig,
    transport: Arc<dyn LiveTransport>,
    devices: Arc<dyn AudioDevices>,
    event_tx: mpsc::UnboundedSender<Tagged>,
    /// Id of the session an open task may still hand resources to
    active_id: watch::Sender<Option<Uuid>>,

    phase: ConnectionPhase,
    session: Option<ActiveSession>,
    status: AgentStatus,
    connected: bool,
    last_error: Option<String>,
    transcripts: TranscriptLog,
    stages: StageTracker,
    stats: SessionStats,

    snapshot: watch::Sender<AgentSnapshot>,
    events: broadcast::Sender<AgentEvent>,
}

impl SessionMachine {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<Tagged>,
    ) {
        info!("Voice agent started");

        loop {
            tokio::select! {
                // Session events first: a command observes every event posted before it
                biased;

                Some(tagged) = events.recv() => self.handle_event(tagged).await,

                command = commands.recv() => match command {
                    Some(Command::Shutdown(reply)) => {
                        self.teardown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.teardown().await;
                        break;
                    }
                },
            }
        }

        info!("Voice agent stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(reply) => {
                let result = self.connect().await;
                let _ = reply.send(result);
            }
            Command::Disconnect(reply) => {
                self.teardown().await;
                let _ = reply.send(());
            }
            Command::NextStage(reply) => {
                if self.stages.advance() {
                    self.stage_changed();
                }
                let _ = reply.send(self.stages.current());
            }
            Command::PrevStage(reply) => {
                if self.stages.go_back() {
                    self.stage_changed();
                }
                let _ = reply.send(self.stages.current());
            }
            Command::Stats(reply) => {
                let mut stats = self.stats.clone();
                if self.phase == ConnectionPhase::Connected {
                    stats.refresh_duration(Utc::now());
                }
                stats.transcript_entries = self.transcripts.len();
                let _ = reply.send(stats);
            }
            Command::Shutdown(reply) => {
                // Handled by the run loop
                let _ = reply.send(());
            }
        }
    }

    async fn connect(&mut self) -> Result<(), AgentError> {
        if self.phase != ConnectionPhase::Disconnected {
            info!("Connect ignored, session is {}", self.phase);
            return Ok(());
        }

        let api_key = match self.config.read_api_key() {
            Ok(key) => key,
            Err(e) => {
                error!("Cannot connect: {}", e);
                self.report_error(&e);
                self.set_status(AgentStatus::Idle);
                return Err(e);
            }
        };

        let id = Uuid::new_v4();
        info!("Connecting live session {} ({})", id, self.config.model);

        self.set_phase(ConnectionPhase::Connecting);
        self.active_id.send_replace(Some(id));
        self.stats = SessionStats::begin(id);
        self.last_error = None;
        self.set_status(AgentStatus::Connecting);
        self.transcripts.clear();
        self.transcripts_changed();

        let link = Arc::new(SessionLink {
            session: id,
            events: self.event_tx.clone(),
        });

        let acquired = match self.devices.output(&self.config, link.clone()).await {
            Ok(output) => self
                .devices
                .capture(&self.config)
                .map(|capture| (output, capture)),
            Err(e) => Err(e),
        };
        let (output, capture) = match acquired {
            Ok(devices) => devices,
            Err(e) => {
                let err = AgentError::DeviceAcquisition(format!("{:#}", e));
                error!("Cannot connect: {}", err);
                self.report_error(&err);
                self.teardown().await;
                return Err(err);
            }
        };

        self.session = Some(ActiveSession {
            id,
            connection: None,
            capture: CapturePipeline::new(),
            playback: PlaybackScheduler::new(output),
            pending: Vec::new(),
        });

        let transport = Arc::clone(&self.transport);
        let setup = self.config.setup_request();
        let mut active = self.active_id.subscribe();

        tokio::spawn(async move {
            let opened = tokio::select! {
                opened = transport.open(&api_key, setup, link.clone()) => opened,
                _ = active.wait_for(|current| *current != Some(id)) => {
                    info!("Session {} torn down while opening, abandoning it", id);
                    return;
                }
            };
            let mut connection = match opened {
                Ok(connection) => connection,
                Err(e) => {
                    link.post(SessionEvent::OpenFailed(e));
                    return;
                }
            };

            // Never start the microphone for a session that is already gone
            if *active.borrow() != Some(id) {
                info!("Session {} torn down while opening, releasing it", id);
                if let Err(e) = connection.close() {
                    warn!("Failed to close live session: {}", e);
                }
                return;
            }

            match CapturePipeline::activate(capture, link.clone()).await {
                Ok(capture) => link.post(SessionEvent::Opened {
                    connection,
                    capture,
                }),
                Err(e) => {
                    if let Err(close_err) = connection.close() {
                        warn!("Failed to close live session: {}", close_err);
                    }
                    link.post(SessionEvent::OpenFailed(AgentError::DeviceAcquisition(
                        format!("{:#}", e),
                    )));
                }
            }
        });

        Ok(())
    }

    async fn handle_event(&mut self, tagged: Tagged) {
        let Tagged { session, event } = tagged;
        let current = self.session.as_ref().is_some_and(|s| s.id == session);

        match event {
            SessionEvent::Opened {
                connection,
                capture,
            } => self.on_opened(session, connection, capture).await,

            _ if !current => debug!("Dropping event from stale session {}", session),

            SessionEvent::OpenFailed(e) => {
                error!("Failed to open live session: {}", e);
                self.report_error(&e);
                self.teardown().await;
            }

            SessionEvent::Message(message) => self.on_message(message),

            SessionEvent::RemoteError(message) => {
                let err = AgentError::Remote(message);
                error!("Live session error: {}", err);
                self.report_error(&err);
                self.teardown().await;
            }

            SessionEvent::RemoteClosed(reason) => {
                info!(
                    "Live session closed by server: {}",
                    reason.as_deref().unwrap_or("no reason given")
                );
                self.teardown().await;
            }

            SessionEvent::PlaybackEnded(id) => self.on_playback_ended(id),

            SessionEvent::Captured(chunk) => self.on_captured(chunk),
        }
    }

    async fn on_opened(
        &mut self,
        id: Uuid,
        mut connection: Box<dyn LiveConnection>,
        mut capture: CapturePipeline,
    ) {
        let session = match self.session.as_mut() {
            Some(session) if session.id == id && self.phase == ConnectionPhase::Connecting => {
                session
            }
            _ => {
                info!("Session {} opened after teardown, releasing it", id);
                if let Err(e) = connection.close() {
                    warn!("Failed to close live session: {}", e);
                }
                capture.deactivate().await;
                return;
            }
        };

        for message in session.pending.drain(..) {
            if let Err(e) = connection.send(message) {
                warn!("Failed to send queued message: {}", e);
            }
        }
        session.connection = Some(connection);
        session.capture = capture;

        self.set_phase(ConnectionPhase::Connected);
        self.stats.started_at = Some(Utc::now());
        self.set_status(AgentStatus::Listening);
        self.set_connected(true);
        info!("Live session {} connected", id);
    }

    fn on_message(&mut self, message: ServerMessage) {
        if message.setup_complete.is_some() {
            debug!("Setup acknowledged again by server");
        }

        if let Some(content) = message.server_content {
            self.on_server_content(content);
        }

        if let Some(tool_call) = message.tool_call {
            for call in &tool_call.function_calls {
                self.on_function_call(call);
            }
        }

        if let Some(cancellation) = message.tool_call_cancellation {
            info!("Server cancelled tool calls {:?}", cancellation.ids);
        }

        if let Some(go_away) = message.go_away {
            warn!(
                "Server will close the session soon (time left: {})",
                go_away.time_left.as_deref().unwrap_or("unknown")
            );
        }
    }

    fn on_server_content(&mut self, content: ServerContent) {
        let mut changed = false;
        if let Some(fragment) = &content.input_transcription {
            changed |= self
                .transcripts
                .apply_fragment(Speaker::User, &fragment.text, fragment.is_final);
        }
        if let Some(fragment) = &content.output_transcription {
            changed |= self
                .transcripts
                .apply_fragment(Speaker::Agent, &fragment.text, fragment.is_final);
        }
        if changed {
            self.transcripts_changed();
        }

        // Turn completion before audio: a final chunk riding on the same
        // message keeps the agent Speaking until it has played
        if content.turn_complete {
            if self.transcripts.finalize_trailing() > 0 {
                self.transcripts_changed();
            }
            self.set_status(AgentStatus::Listening);
        }

        for blob in content.audio_payloads() {
            let sample_rate =
                rate_from_mime(&blob.mime_type).unwrap_or(self.config.output_sample_rate);
            self.play_audio(&blob.data, sample_rate);
        }

        if content.interrupted {
            self.on_interrupted();
        }
    }

    fn play_audio(&mut self, payload: &str, sample_rate: u32) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let scheduled = decode_inbound(payload)
            .and_then(|bytes| decode_audio_samples(&bytes, sample_rate, 1))
            .map_err(anyhow::Error::from)
            .and_then(|buffer| session.playback.schedule_chunk(buffer));

        match scheduled {
            Ok(_) => {
                self.stats.chunks_scheduled += 1;
                self.set_status(AgentStatus::Speaking);
            }
            Err(e) => {
                warn!("Dropping inbound audio: {:#}", e);
                self.stats.chunks_rejected += 1;
            }
        }
    }

    fn on_playback_ended(&mut self, id: PlaybackId) {
        let idle = match self.session.as_mut() {
            Some(session) => session.playback.chunk_ended(id),
            None => false,
        };
        if idle && self.status == AgentStatus::Speaking {
            self.set_status(AgentStatus::Listening);
        }
    }

    fn on_interrupted(&mut self) {
        if let Some(session) = self.session.as_mut() {
            let stopped = session.playback.interrupt();
            info!("Agent interrupted, {} chunks stopped", stopped);
        }
        self.stats.interruptions += 1;
        self.set_status(AgentStatus::Listening);
    }

    fn on_function_call(&mut self, call: &FunctionCall) {
        let outcome = handle_tool_call(call);
        self.stats.tool_calls += 1;
        if outcome.selection.is_some() {
            self.stats.payment_option = outcome.selection;
        }

        if let Some(stage) = outcome.stage {
            if self.stages.set(stage) {
                self.stage_changed();
            }
        }

        self.send(ClientMessage::tool_response(outcome.response));
    }

    fn on_captured(&mut self, chunk: EncodedChunk) {
        let connection = match (&self.phase, &self.session) {
            (ConnectionPhase::Connected, Some(session)) => session.connection.as_ref(),
            _ => None,
        };
        let Some(connection) = connection else {
            self.stats.frames_dropped += 1;
            return;
        };

        match connection.send(ClientMessage::audio(&chunk)) {
            Ok(()) => self.stats.frames_sent += 1,
            Err(e) => {
                debug!("Dropping captured frame {}: {}", chunk.sequence, e);
                self.stats.frames_dropped += 1;
            }
        }
    }

    fn send(&mut self, message: ClientMessage) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match &session.connection {
            Some(connection) => {
                if let Err(e) = connection.send(message) {
                    warn!("Failed to send to live session: {}", e);
                }
            }
            None => session.pending.push(message),
        }
    }

    /// Release everything the session holds. Safe from any phase; only the
    /// first call after a connect does anything.
    async fn teardown(&mut self) {
        if !self.phase.is_active() {
            debug!("Teardown skipped, session is {}", self.phase);
            return;
        }

        self.set_phase(ConnectionPhase::Disconnecting);
        self.active_id.send_replace(None);

        if let Some(mut session) = self.session.take() {
            info!("Tearing down live session {}", session.id);

            if let Some(mut connection) = session.connection.take() {
                if let Err(e) = connection.close() {
                    warn!("Failed to close live session: {}", e);
                }
            }

            session.capture.deactivate().await;

            if let Err(e) = session.playback.close() {
                warn!("Failed to close playback device: {:#}", e);
            }
        }

        self.stats.refresh_duration(Utc::now());
        self.set_status(AgentStatus::Idle);
        self.set_connected(false);
        self.set_phase(ConnectionPhase::Disconnected);
    }

    fn set_phase(&mut self, next: ConnectionPhase) {
        match self.phase.transition(next) {
            Ok(()) => {
                self.stats.phase = next;
                debug!("Connection phase: {}", next);
            }
            Err(e) => error!("{}", e),
        }
    }

    fn report_error(&mut self, err: &AgentError) {
        let message = err.to_string();
        self.last_error = Some(message.clone());
        self.set_status(AgentStatus::Error);
        self.emit(AgentEvent::Error(message));
        self.publish();
    }

    fn set_status(&mut self, status: AgentStatus) {
        if self.status == status {
            return;
        }
        debug!("Status: {:?} -> {:?}", self.status, status);
        self.status = status;
        self.emit(AgentEvent::StatusChanged(status));
        self.publish();
    }

    fn set_connected(&mut self, connected: bool) {
        if self.connected == connected {
            return;
        }
        self.connected = connected;
        self.emit(AgentEvent::ConnectionChanged(connected));
        self.publish();
    }

    fn transcripts_changed(&mut self) {
        self.emit(AgentEvent::TranscriptUpdated(
            self.transcripts.entries().to_vec(),
        ));
        self.publish();
    }

    fn stage_changed(&mut self) {
        let stage = self.stages.current();
        info!("Onboarding stage: {}", stage);
        self.emit(AgentEvent::StageChanged(stage));
        self.publish();
    }

    fn emit(&self, event: AgentEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        self.snapshot.send_replace(AgentSnapshot {
            status: self.status,
            transcripts: self.transcripts.entries().to_vec(),
            stage: self.stages.current(),
            connected: self.connected,
            last_error: self.last_error.clone(),
        });
    }
}

/// Sample rate from a mime type such as "audio/pcm;rate=24000". A zero rate
/// counts as absent.
fn rate_from_mime(mime_type: &str) -> Option<u32> {
    mime_type
        .split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.parse::<u32>().ok().filter(|&rate| rate > 0))
}

/// Handle to the voice agent
///
/// Cheap to clone. The session runs on a background task that stops, tearing
/// down any open session, when `shutdown` is called or the last handle is dropped.
#[derive(Clone)]
pub struct VoiceAgent {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<AgentSnapshot>,
    events: broadcast::Sender<AgentEvent>,
}

impl VoiceAgent {
    /// Agent on the websocket transport and the configured audio devices.
    /// Must be called from within a tokio runtime.
    pub fn new(config: SessionConfig) -> Self {
        let transport = Arc::new(
            LiveClient::new(config.endpoint.clone()).with_setup_timeout(config.setup_timeout),
        );
        Self::with_parts(config, transport, Arc::new(SystemAudio))
    }

    /// Agent on a custom transport and device provider
    pub fn with_parts(
        config: SessionConfig,
        transport: Arc<dyn LiveTransport>,
        devices: Arc<dyn AudioDevices>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(AgentSnapshot::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (active_id, _) = watch::channel(None);

        let machine = SessionMachine {
            config,
            transport,
            devices,
            event_tx,
            active_id,
            phase: ConnectionPhase::Disconnected,
            session: None,
            status: AgentStatus::Idle,
            connected: false,
            last_error: None,
            transcripts: TranscriptLog::new(),
            stages: StageTracker::new(),
            stats: SessionStats::default(),
            snapshot: snapshot_tx,
            events: events.clone(),
        };

        tokio::spawn(machine.run(command_rx, event_rx));

        Self {
            commands: command_tx,
            snapshot: snapshot_rx,
            events,
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, AgentError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .map_err(|_| AgentError::Shutdown)?;
        reply_rx.await.map_err(|_| AgentError::Shutdown)
    }

    /// Start a session. Returns once the attempt has begun; watch `status()`
    /// or `subscribe()` for the outcome. No-op unless disconnected.
    pub async fn connect(&self) -> Result<(), AgentError> {
        self.request(Command::Connect).await?
    }

    /// End the session, from any state. Returns once teardown is complete.
    pub async fn disconnect(&self) -> Result<(), AgentError> {
        self.request(Command::Disconnect).await
    }

    pub async fn next_stage(&self) -> Result<OnboardingStage, AgentError> {
        self.request(Command::NextStage).await
    }

    pub async fn prev_stage(&self) -> Result<OnboardingStage, AgentError> {
        self.request(Command::PrevStage).await
    }

    pub async fn stats(&self) -> Result<SessionStats, AgentError> {
        self.request(Command::Stats).await
    }

    /// Tear down and stop the agent. Later calls on any handle fail with `Shutdown`.
    pub async fn shutdown(&self) -> Result<(), AgentError> {
        self.request(Command::Shutdown).await
    }

    pub fn status(&self) -> AgentStatus {
        self.snapshot.borrow().status
    }

    pub fn transcripts(&self) -> Vec<TranscriptEntry> {
        self.snapshot.borrow().transcripts.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.snapshot.borrow().connected
    }

    pub fn stage(&self) -> OnboardingStage {
        self.snapshot.borrow().stage
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Latest-state observable
    pub fn subscribe(&self) -> watch::Receiver<AgentSnapshot> {
        self.snapshot.clone()
    }

    /// Every change as it happens, including transient errors
    pub fn events(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }
}
