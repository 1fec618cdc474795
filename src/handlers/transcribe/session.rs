//! Per-connection transcription session state machine.
//!
//! A connection is either idle or transcribing. The controller owns the
//! active session's resources (bridge handle and event pump) and is only
//! ever driven from the connection's receive loop, so transitions are
//! serialized. Duplicate starts, stops while idle, and audio while idle are
//! expected races during startup/teardown and are dropped without error.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::audio::bridge;
use crate::core::stt::{RecognitionConfig, SpeechClient, SttError, TranscriptEvents};
use crate::core::transcript::TranscriptReconciler;

use super::messages::{MessageRoute, OutgoingMessage};

/// Buffer size for session lifecycle events.
const SESSION_EVENT_BUFFER_SIZE: usize = 8;

/// Lifecycle notification from a session's event pump.
///
/// Tagged with the session id so notifications from a torn-down session
/// cannot affect its successor.
#[derive(Debug)]
pub struct SessionEvent {
    id: u64,
    kind: SessionEventKind,
}

#[derive(Debug)]
enum SessionEventKind {
    /// The recognition stream ended on its own.
    Ended,
    /// The recognition stream failed mid-session.
    Failed(SttError),
}

/// One active transcription session's handles.
struct ActiveSession {
    id: u64,
    chunks: bridge::ChunkSender,
    pump: JoinHandle<()>,
}

/// Drives the idle/transcribing state machine for one connection.
pub struct TranscriptionController {
    speech: Arc<dyn SpeechClient>,
    recognition: RecognitionConfig,
    message_tx: mpsc::Sender<MessageRoute>,
    event_tx: mpsc::Sender<SessionEvent>,
    active: Option<ActiveSession>,
    next_session_id: u64,
}

impl TranscriptionController {
    /// Create an idle controller.
    ///
    /// The returned receiver delivers [`SessionEvent`]s that the owning
    /// loop must feed back through [`handle_session_event`]; that is how an
    /// upstream failure or end-of-stream returns the connection to idle.
    ///
    /// [`handle_session_event`]: Self::handle_session_event
    pub fn new(
        speech: Arc<dyn SpeechClient>,
        recognition: RecognitionConfig,
        message_tx: mpsc::Sender<MessageRoute>,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::channel(SESSION_EVENT_BUFFER_SIZE);
        (
            Self {
                speech,
                recognition,
                message_tx,
                event_tx,
                active: None,
                next_session_id: 0,
            },
            event_rx,
        )
    }

    /// Whether a transcription session is currently active.
    pub fn is_transcribing(&self) -> bool {
        self.active.is_some()
    }

    /// Handle `start_transcription`.
    ///
    /// Opens the upstream stream and spawns the event pump. A start while
    /// already transcribing leaves the existing session running. An
    /// upstream failure is reported to the client and the connection stays
    /// idle; the client may retry.
    pub async fn start(&mut self) {
        if self.active.is_some() {
            debug!("start_transcription while already transcribing, ignoring");
            return;
        }

        let (chunks, frames) = bridge::channel();
        match self
            .speech
            .start_stream(&self.recognition, Box::pin(frames))
            .await
        {
            Ok(events) => {
                let id = self.next_session_id;
                self.next_session_id += 1;

                let pump = tokio::spawn(pump_events(
                    id,
                    events,
                    self.message_tx.clone(),
                    self.event_tx.clone(),
                ));
                self.active = Some(ActiveSession { id, chunks, pump });
                info!(session = id, "transcription session started");
            }
            Err(e) => {
                warn!(error = %e, "failed to start transcription session");
                let _ = self
                    .message_tx
                    .send(MessageRoute::Outgoing(OutgoingMessage::Error {
                        message: format!("failed to start transcription: {e}"),
                    }))
                    .await;
            }
        }
    }

    /// Feed one audio chunk into the active session.
    ///
    /// Chunks arriving while idle (late sends after a stop) are dropped
    /// silently.
    pub async fn push_audio(&mut self, chunk: Bytes) {
        match &self.active {
            Some(session) => {
                if session.chunks.send(chunk).await.is_err() {
                    debug!("audio chunk dropped, upstream stream already closed");
                }
            }
            None => debug!("audio data while idle, dropping chunk"),
        }
    }

    /// Handle `stop_transcription` (and disconnect, which tears down the
    /// same way).
    ///
    /// Ends the frame stream, stops the event pump, and discards all
    /// session state including the reconciliation baseline. Idempotent.
    pub async fn stop(&mut self) {
        match self.active.take() {
            Some(session) => {
                session.chunks.close();
                session.pump.abort();
                info!(session = session.id, "transcription session stopped");
            }
            None => debug!("stop_transcription while idle, ignoring"),
        }
    }

    /// Fold a pump notification back into the state machine.
    ///
    /// A failure is relayed to the client as an `error` message; either
    /// way the session is gone and the connection returns to idle. Events
    /// from sessions that were already stopped are ignored.
    pub async fn handle_session_event(&mut self, event: SessionEvent) {
        match self.active.take() {
            Some(session) if session.id == event.id => {
                session.chunks.close();
                match event.kind {
                    SessionEventKind::Ended => {
                        info!(session = event.id, "transcription stream ended");
                    }
                    SessionEventKind::Failed(e) => {
                        warn!(session = event.id, error = %e, "transcription stream failed");
                        let _ = self
                            .message_tx
                            .send(MessageRoute::Outgoing(OutgoingMessage::Error {
                                message: format!("transcription error: {e}"),
                            }))
                            .await;
                    }
                }
            }
            Some(session) => {
                debug!(session = event.id, "ignoring event from replaced session");
                self.active = Some(session);
            }
            None => {
                debug!(session = event.id, "ignoring event from stopped session");
            }
        }
    }
}

/// Consume recognition events for one session: reconcile into deltas,
/// forward them to the connection's writer, and report how the stream
/// ended.
async fn pump_events(
    id: u64,
    mut events: TranscriptEvents,
    message_tx: mpsc::Sender<MessageRoute>,
    event_tx: mpsc::Sender<SessionEvent>,
) {
    let mut reconciler = TranscriptReconciler::new();

    while let Some(item) = events.recv().await {
        match item {
            Ok(event) => {
                if let Some(delta) = reconciler.reconcile(&event) {
                    let outgoing = OutgoingMessage::Transcription {
                        text: delta.text,
                        is_final: delta.is_final,
                    };
                    if message_tx
                        .send(MessageRoute::Outgoing(outgoing))
                        .await
                        .is_err()
                    {
                        // Writer gone: the connection is closing.
                        return;
                    }
                }
            }
            Err(e) => {
                let _ = event_tx
                    .send(SessionEvent {
                        id,
                        kind: SessionEventKind::Failed(e),
                    })
                    .await;
                return;
            }
        }
    }

    let _ = event_tx
        .send(SessionEvent {
            id,
            kind: SessionEventKind::Ended,
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stt::{AudioFrames, TranscriptEvent};
    use futures::StreamExt;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scripted recognition backend: counts stream opens, records the
    /// frames it is fed, and replays a fixed event script per session.
    struct MockSpeechClient {
        starts: AtomicUsize,
        script: Vec<Result<TranscriptEvent, SttError>>,
        hold_open: bool,
        held: Mutex<Vec<mpsc::Sender<Result<TranscriptEvent, SttError>>>>,
        frames: Arc<Mutex<Vec<Bytes>>>,
    }

    impl MockSpeechClient {
        fn new(script: Vec<Result<TranscriptEvent, SttError>>, hold_open: bool) -> Arc<Self> {
            Arc::new(Self {
                starts: AtomicUsize::new(0),
                script,
                hold_open,
                held: Mutex::new(Vec::new()),
                frames: Arc::new(Mutex::new(Vec::new())),
            })
        }

        fn start_count(&self) -> usize {
            self.starts.load(Ordering::SeqCst)
        }

        fn recorded_frames(&self) -> Vec<Bytes> {
            self.frames.lock().unwrap().clone()
        }
    }

    /// Backend whose streams never open.
    struct FailingSpeechClient;

    #[async_trait::async_trait]
    impl SpeechClient for FailingSpeechClient {
        async fn start_stream(
            &self,
            _config: &RecognitionConfig,
            _audio: AudioFrames,
        ) -> Result<TranscriptEvents, SttError> {
            Err(SttError::ConnectionFailed("stream rejected".to_string()))
        }
    }

    #[async_trait::async_trait]
    impl SpeechClient for MockSpeechClient {
        async fn start_stream(
            &self,
            _config: &RecognitionConfig,
            mut audio: AudioFrames,
        ) -> Result<TranscriptEvents, SttError> {
            self.starts.fetch_add(1, Ordering::SeqCst);

            let (tx, rx) = mpsc::channel(32);
            for item in self.script.clone() {
                tx.send(item).await.unwrap();
            }
            if self.hold_open {
                self.held.lock().unwrap().push(tx);
            }

            let frames = self.frames.clone();
            tokio::spawn(async move {
                while let Some(frame) = audio.next().await {
                    frames.lock().unwrap().push(frame);
                }
            });

            Ok(rx)
        }
    }

    fn partial(text: &str) -> Result<TranscriptEvent, SttError> {
        Ok(TranscriptEvent {
            transcript: text.to_string(),
            is_final: false,
        })
    }

    fn fin(text: &str) -> Result<TranscriptEvent, SttError> {
        Ok(TranscriptEvent {
            transcript: text.to_string(),
            is_final: true,
        })
    }

    fn controller_with(
        speech: Arc<dyn SpeechClient>,
    ) -> (
        TranscriptionController,
        mpsc::Receiver<SessionEvent>,
        mpsc::Receiver<MessageRoute>,
    ) {
        let (message_tx, message_rx) = mpsc::channel(64);
        let (controller, event_rx) =
            TranscriptionController::new(speech, RecognitionConfig::default(), message_tx);
        (controller, event_rx, message_rx)
    }

    async fn recv_outgoing(rx: &mut mpsc::Receiver<MessageRoute>) -> OutgoingMessage {
        let route = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for outgoing message")
            .expect("message channel closed");
        match route {
            MessageRoute::Outgoing(msg) => msg,
            MessageRoute::Close => panic!("unexpected close"),
        }
    }

    /// Poll until the mock has recorded `count` frames.
    async fn wait_for_frames(mock: &MockSpeechClient, count: usize) {
        for _ in 0..100 {
            if mock.recorded_frames().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {} frames, saw {}",
            count,
            mock.recorded_frames().len()
        );
    }

    #[tokio::test]
    async fn duplicate_start_does_not_open_second_stream() {
        let mock = MockSpeechClient::new(vec![], true);
        let (mut controller, _event_rx, _message_rx) = controller_with(mock.clone());

        controller.start().await;
        controller.start().await;

        assert_eq!(mock.start_count(), 1);
        assert!(controller.is_transcribing());
    }

    #[tokio::test]
    async fn start_failure_reports_error_and_stays_idle() {
        let (mut controller, _event_rx, mut message_rx) =
            controller_with(Arc::new(FailingSpeechClient));

        controller.start().await;

        assert!(!controller.is_transcribing());
        match recv_outgoing(&mut message_rx).await {
            OutgoingMessage::Error { message } => {
                assert!(message.contains("failed to start transcription"));
            }
            other => panic!("expected error message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn audio_while_idle_produces_no_upstream_traffic() {
        let mock = MockSpeechClient::new(vec![], true);
        let (mut controller, _event_rx, mut message_rx) = controller_with(mock.clone());

        controller
            .push_audio(Bytes::from(vec![0u8; crate::core::FRAME_SIZE * 2]))
            .await;

        assert_eq!(mock.start_count(), 0);
        assert!(mock.recorded_frames().is_empty());
        assert!(message_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn audio_is_framed_and_forwarded_in_order() {
        let mock = MockSpeechClient::new(vec![], true);
        let (mut controller, _event_rx, _message_rx) = controller_with(mock.clone());

        controller.start().await;

        let data: Vec<u8> = (0..crate::core::FRAME_SIZE * 2)
            .map(|i| (i % 256) as u8)
            .collect();
        controller
            .push_audio(Bytes::copy_from_slice(&data[..1500]))
            .await;
        controller
            .push_audio(Bytes::copy_from_slice(&data[1500..]))
            .await;

        wait_for_frames(&mock, 2).await;
        let frames = mock.recorded_frames();
        assert!(frames.iter().all(|f| f.len() == crate::core::FRAME_SIZE));
        let flattened: Vec<u8> = frames.iter().flat_map(|f| f.iter().copied()).collect();
        assert_eq!(flattened, data);
    }

    #[tokio::test]
    async fn deltas_are_relayed_to_client() {
        let mock = MockSpeechClient::new(
            vec![partial("hel"), partial("hello"), fin("hello world")],
            true,
        );
        let (mut controller, _event_rx, mut message_rx) = controller_with(mock);

        controller.start().await;

        let expected = [("hel", false), ("lo", false), ("hello world", true)];
        for (text, is_final) in expected {
            match recv_outgoing(&mut message_rx).await {
                OutgoingMessage::Transcription {
                    text: got,
                    is_final: got_final,
                } => {
                    assert_eq!(got, text);
                    assert_eq!(got_final, is_final);
                }
                other => panic!("expected transcription, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_clears_state() {
        let mock = MockSpeechClient::new(vec![], true);
        let (mut controller, _event_rx, mut message_rx) = controller_with(mock.clone());

        controller.start().await;
        assert!(controller.is_transcribing());

        controller.stop().await;
        controller.stop().await;

        assert!(!controller.is_transcribing());
        assert!(message_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn restart_after_stop_diffs_from_empty_baseline() {
        let mock = MockSpeechClient::new(vec![partial("hello")], true);
        let (mut controller, _event_rx, mut message_rx) = controller_with(mock.clone());

        controller.start().await;
        match recv_outgoing(&mut message_rx).await {
            OutgoingMessage::Transcription { text, .. } => assert_eq!(text, "hello"),
            other => panic!("expected transcription, got {other:?}"),
        }

        controller.stop().await;
        controller.start().await;

        // The same cumulative transcript comes through whole again: nothing
        // from the previous session survives as a diffing baseline.
        match recv_outgoing(&mut message_rx).await {
            OutgoingMessage::Transcription { text, .. } => assert_eq!(text, "hello"),
            other => panic!("expected transcription, got {other:?}"),
        }
        assert_eq!(mock.start_count(), 2);
    }

    #[tokio::test]
    async fn stream_failure_reports_error_and_returns_to_idle() {
        let mock = MockSpeechClient::new(
            vec![Err(SttError::ProviderError("bad audio".to_string()))],
            false,
        );
        let (mut controller, mut event_rx, mut message_rx) = controller_with(mock);

        controller.start().await;

        let event = tokio::time::timeout(Duration::from_secs(1), event_rx.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("event channel closed");
        controller.handle_session_event(event).await;

        assert!(!controller.is_transcribing());
        match recv_outgoing(&mut message_rx).await {
            OutgoingMessage::Error { message } => {
                assert!(message.contains("bad audio"));
            }
            other => panic!("expected error message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_end_returns_to_idle_without_error() {
        // hold_open = false: the script drains and the event channel closes.
        let mock = MockSpeechClient::new(vec![fin("done")], false);
        let (mut controller, mut event_rx, mut message_rx) = controller_with(mock);

        controller.start().await;

        let event = tokio::time::timeout(Duration::from_secs(1), event_rx.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("event channel closed");
        controller.handle_session_event(event).await;

        assert!(!controller.is_transcribing());
        match recv_outgoing(&mut message_rx).await {
            OutgoingMessage::Transcription { is_final, .. } => assert!(is_final),
            other => panic!("expected transcription, got {other:?}"),
        }
        assert!(message_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn event_from_stopped_session_is_ignored() {
        let mock = MockSpeechClient::new(vec![fin("leftover")], false);
        let (mut controller, mut event_rx, _message_rx) = controller_with(mock.clone());

        controller.start().await;
        let event = tokio::time::timeout(Duration::from_secs(1), event_rx.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("event channel closed");

        // The client stopped before the pump's notification was processed;
        // a fresh session is already running when it arrives.
        controller.stop().await;
        controller.start().await;
        assert!(controller.is_transcribing());

        controller.handle_session_event(event).await;
        assert!(controller.is_transcribing());
    }
}
