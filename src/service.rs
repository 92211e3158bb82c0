use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::document::{self, DocumentDecoder};
use crate::error::NarrationError;
use crate::narration::{CatalogConfig, NarrationController, NarrationSnapshot};
use crate::speech::{EventStream, SpeechBackend};

/// Owns one narration controller and pumps backend events into it.
///
/// Caller operations and backend events both go through the controller
/// mutex, so they are applied one at a time in arrival order. Every change is
/// published on a watch channel for the UI.
pub struct Narrator {
    controller: Arc<Mutex<NarrationController>>,
    backend: Arc<dyn SpeechBackend>,
    decoder: Arc<dyn DocumentDecoder>,
    snapshots: Arc<watch::Sender<NarrationSnapshot>>,
    pump: Option<JoinHandle<()>>,
}

impl Narrator {
    /// Subscribes to the backend, reads whatever voices it already knows, and
    /// starts the event pump on `runtime`.
    pub fn start(
        runtime: &Handle,
        backend: Arc<dyn SpeechBackend>,
        decoder: Arc<dyn DocumentDecoder>,
        config: CatalogConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        backend.set_event_sink(Some(tx));

        let mut controller = NarrationController::new(Arc::clone(&backend), config);
        controller.refresh_voices();
        let (snapshots, _) = watch::channel(controller.snapshot());

        let controller = Arc::new(Mutex::new(controller));
        let snapshots = Arc::new(snapshots);
        let pump = runtime.spawn(pump_events(rx, Arc::clone(&controller), Arc::clone(&snapshots)));

        tracing::info!("Narrator started with {} backend", backend.name());

        Self {
            controller,
            backend,
            decoder,
            snapshots,
            pump: Some(pump),
        }
    }

    fn with_controller<T>(&self, f: impl FnOnce(&mut NarrationController) -> T) -> T {
        let mut controller = lock(&self.controller);
        let result = f(&mut controller);
        self.snapshots.send_replace(controller.snapshot());
        result
    }

    pub fn load_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.with_controller(|c| c.load(text));
    }

    /// Decodes and loads a document. On decode failure the current session
    /// is left untouched.
    pub fn load_document(&self, bytes: &[u8], mime: &str) -> Result<(), NarrationError> {
        let text = self.decoder.decode(bytes, mime).map_err(|e| {
            tracing::warn!("Failed to decode {} document: {}", mime, e);
            e
        })?;
        self.load_text(text);
        Ok(())
    }

    pub fn open_file(&self, path: &Path) -> Result<(), NarrationError> {
        let (bytes, mime) = document::read_document(path)?;
        tracing::info!("Opening {}", path.display());
        self.load_document(&bytes, mime)
    }

    pub fn play(&self, text: Option<String>) -> Result<(), NarrationError> {
        self.with_controller(|c| c.play(text))
    }

    pub fn pause(&self) {
        self.with_controller(|c| c.pause());
    }

    pub fn stop(&self) {
        self.with_controller(|c| c.stop());
    }

    pub fn select_voice(&self, backend_id: &str) -> Result<(), NarrationError> {
        self.with_controller(|c| c.select_voice(backend_id))
    }

    pub fn refresh_voices(&self) {
        self.with_controller(|c| c.refresh_voices());
    }

    pub fn snapshot(&self) -> NarrationSnapshot {
        lock(&self.controller).snapshot()
    }

    /// Live view of the session, including the word being spoken
    pub fn subscribe(&self) -> watch::Receiver<NarrationSnapshot> {
        self.snapshots.subscribe()
    }

    /// Deregisters from the backend and halts any utterance. Safe to call twice.
    pub fn shutdown(&mut self) {
        let Some(pump) = self.pump.take() else {
            return;
        };
        self.backend.set_event_sink(None);
        self.with_controller(|c| c.stop());
        pump.abort();
        tracing::info!("Narrator shut down");
    }
}

impl Drop for Narrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn pump_events(
    mut events: EventStream,
    controller: Arc<Mutex<NarrationController>>,
    snapshots: Arc<watch::Sender<NarrationSnapshot>>,
) {
    while let Some(event) = events.recv().await {
        let mut controller = lock(&controller);
        if controller.handle_event(event) {
            snapshots.send_replace(controller.snapshot());
        }
    }
    tracing::debug!("Speech event stream closed");
}

// A panic while holding the lock leaves the controller usable: every
// operation re-establishes its own invariants.
fn lock(controller: &Mutex<NarrationController>) -> MutexGuard<'_, NarrationController> {
    controller.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
