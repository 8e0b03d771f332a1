//! Speech recognizer adapter.
//!
//! A [`SpeechEngine`] produces finalized, single-utterance transcripts in
//! listening windows. [`RecognizerAdapter`] owns the engine, makes `start`/`stop`
//! idempotent, and tags every engine report with the window it came from so the
//! controller can tell live reports from leftovers.

use crate::controller::ControllerEvent;
use crate::error::VoiceResult;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What an engine reports during one listening window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerEvent {
    /// Audio capture began.
    Started,
    /// Finalized best hypothesis for the utterance. At most once per window.
    Result(String),
    /// Speech was heard but not understood.
    NoMatch,
    /// The window closed, for any reason.
    End,
    /// Recoverable failure (e.g. `no-speech`, network).
    Error(String),
    /// The engine cannot listen at all. Ends the session.
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WindowId(u64);

#[derive(Debug, Clone)]
pub struct RecognizerNotice {
    pub window: WindowId,
    pub event: RecognizerEvent,
}

/// Handle an engine reports through. Bound to one listening window.
#[derive(Clone)]
pub struct RecognizerSink {
    window: WindowId,
    tx: mpsc::UnboundedSender<ControllerEvent>,
}

impl RecognizerSink {
    pub fn window(&self) -> WindowId {
        self.window
    }

    /// Returns `false` once the controller has gone away.
    pub fn emit(&self, event: RecognizerEvent) -> bool {
        self.tx
            .send(ControllerEvent::Recognizer(RecognizerNotice {
                window: self.window,
                event,
            }))
            .is_ok()
    }
}

pub trait SpeechEngine: Send {
    /// Open a listening window. Reports go through `sink`: at most one `Result`,
    /// then `End`.
    fn begin(&mut self, sink: RecognizerSink) -> VoiceResult<()>;

    /// Close the current window early.
    fn abort(&mut self);
}

pub struct RecognizerAdapter {
    engine: Box<dyn SpeechEngine>,
    tx: mpsc::UnboundedSender<ControllerEvent>,
    window: WindowId,
    active: bool,
    /// Set when the current window was closed by `stop()` rather than by the engine.
    stopped_by_us: bool,
}

impl RecognizerAdapter {
    pub fn new(engine: Box<dyn SpeechEngine>, tx: mpsc::UnboundedSender<ControllerEvent>) -> Self {
        Self {
            engine,
            tx,
            window: WindowId(0),
            active: false,
            stopped_by_us: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    /// Opens a new listening window. No-op when one is already open.
    pub fn start(&mut self) -> VoiceResult<()> {
        if self.active {
            debug!("Recognizer already listening");
            return Ok(());
        }
        self.window = WindowId(self.window.0 + 1);
        let sink = RecognizerSink {
            window: self.window,
            tx: self.tx.clone(),
        };
        self.engine.begin(sink)?;
        self.active = true;
        self.stopped_by_us = false;
        debug!(window = self.window.0, "Recognizer started");
        Ok(())
    }

    /// Closes the current window. No-op when not listening.
    pub fn stop(&mut self) {
        if !self.active {
            return;
        }
        self.engine.abort();
        self.active = false;
        self.stopped_by_us = true;
        debug!(window = self.window.0, "Recognizer stopped");
    }

    /// Filters an engine report.
    ///
    /// Reports from earlier windows are dropped. After `stop()` the closing
    /// `End`/`Error`/`Started`/`NoMatch` of that window are swallowed, while a late
    /// `Result` is still passed on so the controller's reentrancy rule sees it.
    pub fn accept(&mut self, notice: RecognizerNotice) -> Option<RecognizerEvent> {
        if notice.window != self.window {
            debug!(window = notice.window.0, "Dropping report from a closed window");
            return None;
        }
        match notice.event {
            RecognizerEvent::Unavailable(_) => {
                self.active = false;
                Some(notice.event)
            }
            RecognizerEvent::Result(_) => Some(notice.event),
            event if self.stopped_by_us => {
                debug!(?event, "Ignoring report after stop");
                None
            }
            RecognizerEvent::End => {
                self.active = false;
                Some(RecognizerEvent::End)
            }
            event => Some(event),
        }
    }
}

/// Engine that reads one utterance per line from a text stream (stdin in headless runs).
///
/// Lines typed after the controller aborted a window (while a reply is pending or
/// playing) are discarded when the next window opens, never replayed as speech.
pub struct LineEngine {
    lines: Arc<Mutex<mpsc::Receiver<Option<String>>>>,
    reader: JoinHandle<()>,
    window: Option<JoinHandle<()>>,
    aborted: bool,
}

impl LineEngine {
    pub fn new<R>(input: R) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let (line_tx, line_rx) = mpsc::channel(16);
        let reader = tokio::spawn(async move {
            let mut lines = input.lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line_tx.send(Some(line)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        let _ = line_tx.send(None).await;
                        break;
                    }
                    Err(e) => {
                        warn!("Line input failed: {}", e);
                        let _ = line_tx.send(None).await;
                        break;
                    }
                }
            }
        });
        Self {
            lines: Arc::new(Mutex::new(line_rx)),
            reader,
            window: None,
            aborted: false,
        }
    }

    pub fn stdin() -> Self {
        Self::new(tokio::io::BufReader::new(tokio::io::stdin()))
    }
}

impl SpeechEngine for LineEngine {
    fn begin(&mut self, sink: RecognizerSink) -> VoiceResult<()> {
        let lines = Arc::clone(&self.lines);
        let drain = std::mem::take(&mut self.aborted);
        let handle = tokio::spawn(async move {
            let mut lines = lines.lock().await;
            if drain {
                let mut dropped = 0usize;
                loop {
                    match lines.try_recv() {
                        Ok(Some(_)) => dropped += 1,
                        Ok(None) | Err(mpsc::error::TryRecvError::Disconnected) => {
                            info!("Line input closed");
                            sink.emit(RecognizerEvent::Unavailable(
                                "speech input closed".to_string(),
                            ));
                            return;
                        }
                        Err(mpsc::error::TryRecvError::Empty) => break,
                    }
                }
                if dropped > 0 {
                    debug!(dropped, "Discarded lines typed while not listening");
                }
            }
            sink.emit(RecognizerEvent::Started);
            let next = lines.recv().await;
            match next {
                Some(Some(line)) => {
                    sink.emit(RecognizerEvent::Result(line));
                    sink.emit(RecognizerEvent::End);
                }
                Some(None) | None => {
                    info!("Line input closed");
                    sink.emit(RecognizerEvent::Unavailable(
                        "speech input closed".to_string(),
                    ));
                }
            }
        });
        if let Some(previous) = self.window.replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    fn abort(&mut self) {
        if let Some(window) = self.window.take() {
            window.abort();
        }
        self.aborted = true;
    }
}

impl Drop for LineEngine {
    fn drop(&mut self) {
        self.reader.abort();
        if let Some(window) = self.window.take() {
            window.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingEngine {
        begins: usize,
        aborts: usize,
    }

    struct Shared(std::sync::Arc<std::sync::Mutex<CountingEngine>>);

    impl SpeechEngine for Shared {
        fn begin(&mut self, _sink: RecognizerSink) -> VoiceResult<()> {
            self.0.lock().unwrap().begins += 1;
            Ok(())
        }

        fn abort(&mut self) {
            self.0.lock().unwrap().aborts += 1;
        }
    }

    fn adapter() -> (
        RecognizerAdapter,
        std::sync::Arc<std::sync::Mutex<CountingEngine>>,
        mpsc::UnboundedReceiver<ControllerEvent>,
    ) {
        let counts = std::sync::Arc::new(std::sync::Mutex::new(CountingEngine::default()));
        let (tx, rx) = mpsc::unbounded_channel();
        let adapter = RecognizerAdapter::new(Box::new(Shared(counts.clone())), tx);
        (adapter, counts, rx)
    }

    fn notice(window: WindowId, event: RecognizerEvent) -> RecognizerNotice {
        RecognizerNotice { window, event }
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let (mut adapter, counts, _rx) = adapter();
        adapter.start().unwrap();
        adapter.start().unwrap();
        assert_eq!(counts.lock().unwrap().begins, 1);

        adapter.stop();
        adapter.stop();
        assert_eq!(counts.lock().unwrap().aborts, 1);
        assert!(!adapter.is_active());
    }

    #[test]
    fn reports_from_old_windows_are_dropped() {
        let (mut adapter, _counts, _rx) = adapter();
        adapter.start().unwrap();
        let first = adapter.window();
        adapter.stop();
        adapter.start().unwrap();

        assert_eq!(
            adapter.accept(notice(first, RecognizerEvent::Result("古い".into()))),
            None
        );
        assert_eq!(
            adapter.accept(notice(adapter.window(), RecognizerEvent::Result("新しい".into()))),
            Some(RecognizerEvent::Result("新しい".into()))
        );
    }

    #[test]
    fn end_after_stop_is_swallowed_but_result_passes() {
        let (mut adapter, _counts, _rx) = adapter();
        adapter.start().unwrap();
        let window = adapter.window();
        adapter.stop();

        assert_eq!(adapter.accept(notice(window, RecognizerEvent::End)), None);
        assert_eq!(
            adapter.accept(notice(window, RecognizerEvent::Error("aborted".into()))),
            None
        );
        assert!(adapter
            .accept(notice(window, RecognizerEvent::Result("独り言".into())))
            .is_some());
    }

    #[test]
    fn natural_end_closes_the_window() {
        let (mut adapter, counts, _rx) = adapter();
        adapter.start().unwrap();
        let window = adapter.window();
        assert_eq!(
            adapter.accept(notice(window, RecognizerEvent::End)),
            Some(RecognizerEvent::End)
        );
        assert!(!adapter.is_active());
        adapter.start().unwrap();
        assert_eq!(counts.lock().unwrap().begins, 2);
    }

    #[tokio::test]
    async fn line_engine_reports_one_utterance_per_window() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let input = tokio::io::BufReader::new("おはよう\n".as_bytes());
        let mut adapter = RecognizerAdapter::new(Box::new(LineEngine::new(input)), tx);

        adapter.start().unwrap();
        let mut seen = Vec::new();
        while seen.len() < 3 {
            if let Some(ControllerEvent::Recognizer(n)) = rx.recv().await {
                if let Some(event) = adapter.accept(n) {
                    seen.push(event);
                }
            }
        }
        assert_eq!(
            seen,
            vec![
                RecognizerEvent::Started,
                RecognizerEvent::Result("おはよう".into()),
                RecognizerEvent::End,
            ]
        );

        adapter.start().unwrap();
        let mut closing = None;
        while closing.is_none() {
            if let Some(ControllerEvent::Recognizer(n)) = rx.recv().await {
                if let Some(RecognizerEvent::Unavailable(reason)) = adapter.accept(n) {
                    closing = Some(reason);
                }
            }
        }
        assert_eq!(closing.as_deref(), Some("speech input closed"));
    }

    async fn next_accepted(
        adapter: &mut RecognizerAdapter,
        rx: &mut mpsc::UnboundedReceiver<ControllerEvent>,
    ) -> RecognizerEvent {
        loop {
            if let Some(ControllerEvent::Recognizer(n)) = rx.recv().await {
                if let Some(event) = adapter.accept(n) {
                    return event;
                }
            }
        }
    }

    #[tokio::test]
    async fn lines_typed_while_stopped_are_not_replayed() {
        use tokio::io::AsyncWriteExt;

        let (mut writer, reader) = tokio::io::duplex(256);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = LineEngine::new(tokio::io::BufReader::new(reader));
        let mut adapter = RecognizerAdapter::new(Box::new(engine), tx);

        adapter.start().unwrap();
        assert_eq!(next_accepted(&mut adapter, &mut rx).await, RecognizerEvent::Started);
        writer.write_all("一\n".as_bytes()).await.unwrap();
        assert_eq!(
            next_accepted(&mut adapter, &mut rx).await,
            RecognizerEvent::Result("一".into())
        );
        adapter.stop();

        // Typed mid-turn; the reader queues it before listening resumes.
        writer.write_all("二\n".as_bytes()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        adapter.start().unwrap();
        assert_eq!(next_accepted(&mut adapter, &mut rx).await, RecognizerEvent::Started);
        writer.write_all("三\n".as_bytes()).await.unwrap();
        assert_eq!(
            next_accepted(&mut adapter, &mut rx).await,
            RecognizerEvent::Result("三".into())
        );
    }
}
