use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use super::{
    BackendKind, BackendOptions, EventSink, RawVoice, SpeechBackend, SpeechEvent, UtteranceId,
    UtteranceIds,
};

type SharedSink = Arc<Mutex<Option<EventSink>>>;
type ActiveUtterances = Arc<Mutex<HashMap<UtteranceId, mpsc::UnboundedSender<Control>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Pause,
    Resume,
    Cancel,
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    Cancelled,
}

/// Speech backend that runs an installed speech program per utterance.
///
/// The programs report no word progress, so boundary events are paced from
/// the configured words-per-minute rate, one per word start.
pub struct SystemSpeechBackend {
    kind: BackendKind,
    program: PathBuf,
    options: BackendOptions,
    runtime: Handle,
    ids: UtteranceIds,
    voices: Arc<Mutex<Vec<RawVoice>>>,
    sink: SharedSink,
    active: ActiveUtterances,
}

impl SystemSpeechBackend {
    pub fn new(kind: BackendKind, program: PathBuf, options: BackendOptions, runtime: &Handle) -> Self {
        let backend = Self {
            kind,
            program,
            options,
            runtime: runtime.clone(),
            ids: UtteranceIds::default(),
            voices: Arc::new(Mutex::new(Vec::new())),
            sink: Arc::new(Mutex::new(None)),
            active: Arc::new(Mutex::new(HashMap::new())),
        };
        backend.spawn_voice_enumeration();
        backend
    }

    // Voices show up late: list_voices() is empty until this finishes,
    // then subscribers get VoicesChanged.
    fn spawn_voice_enumeration(&self) {
        let kind = self.kind;
        let program = self.program.clone();
        let voices = Arc::clone(&self.voices);
        let sink = Arc::clone(&self.sink);

        self.runtime.spawn(async move {
            match enumerate_voices(kind, &program).await {
                Ok(found) => {
                    tracing::info!("{} reported {} voices", kind.program(), found.len());
                    *voices.lock().unwrap() = found;
                    emit(&sink, SpeechEvent::VoicesChanged);
                }
                Err(e) => {
                    tracing::warn!("Failed to enumerate {} voices: {}", kind.program(), e);
                }
            }
        });
    }

    fn send_control(&self, utterance: UtteranceId, control: Control) {
        let active = self.active.lock().unwrap();
        match active.get(&utterance) {
            Some(tx) => {
                let _ = tx.send(control);
            }
            None => tracing::debug!("{:?} ignored for finished utterance {}", control, utterance),
        }
    }
}

impl SpeechBackend for SystemSpeechBackend {
    fn name(&self) -> &'static str {
        self.kind.program()
    }

    fn list_voices(&self) -> Vec<RawVoice> {
        self.voices.lock().unwrap().clone()
    }

    fn speak(&self, text: &str, voice_id: Option<String>) -> Result<UtteranceId> {
        let id = self.ids.next();
        let args = command_args(self.kind, self.options.rate_wpm, voice_id.as_deref());

        let child = {
            let _guard = self.runtime.enter();
            Command::new(&self.program)
                .args(&args)
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .with_context(|| format!("Failed to start {}", self.program.display()))?
        };

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        self.active.lock().unwrap().insert(id, control_tx);

        let pace = Duration::from_secs_f64(60.0 / self.options.rate_wpm.max(1) as f64);
        tracing::info!(
            "Speaking {} ({} chars, voice: {})",
            id,
            text.chars().count(),
            voice_id.as_deref().unwrap_or("default")
        );

        self.runtime.spawn(drive_utterance(
            id,
            child,
            text.to_string(),
            pace,
            control_rx,
            Arc::clone(&self.sink),
            Arc::clone(&self.active),
        ));

        Ok(id)
    }

    fn pause(&self, utterance: UtteranceId) {
        self.send_control(utterance, Control::Pause);
    }

    fn resume(&self, utterance: UtteranceId) {
        self.send_control(utterance, Control::Resume);
    }

    fn cancel_all(&self) {
        let drained: Vec<_> = self.active.lock().unwrap().drain().collect();
        for (id, tx) in drained {
            tracing::debug!("Cancelling {}", id);
            let _ = tx.send(Control::Cancel);
        }
    }

    fn set_event_sink(&self, sink: Option<EventSink>) {
        *self.sink.lock().unwrap() = sink;
    }
}

impl Drop for SystemSpeechBackend {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

async fn drive_utterance(
    id: UtteranceId,
    mut child: Child,
    text: String,
    pace: Duration,
    mut control: mpsc::UnboundedReceiver<Control>,
    sink: SharedSink,
    active: ActiveUtterances,
) {
    let offsets = word_start_offsets(&text);

    // Written from its own task so a full pipe never stalls pause/cancel handling
    if let Some(mut stdin) = child.stdin.take() {
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(text.as_bytes()).await {
                tracing::warn!("Failed to feed text to speech program: {}", e);
            }
        });
    }

    let pid = child.id();
    let mut ticker = tokio::time::interval(pace);
    let mut next_word = 0;
    let mut paused = false;

    let outcome = loop {
        tokio::select! {
            status = child.wait() => break Outcome::Exited(status),
            _ = ticker.tick(), if !paused && next_word < offsets.len() => {
                emit(&sink, SpeechEvent::boundary(id, offsets[next_word]));
                next_word += 1;
            }
            msg = control.recv() => match msg {
                Some(Control::Pause) => {
                    if suspend_process(pid) {
                        paused = true;
                    }
                }
                Some(Control::Resume) => {
                    if paused && resume_process(pid) {
                        paused = false;
                        ticker.reset();
                    }
                }
                Some(Control::Cancel) | None => break Outcome::Cancelled,
            }
        }
    };

    active.lock().unwrap().remove(&id);

    match outcome {
        Outcome::Cancelled => {
            if let Err(e) = child.kill().await {
                tracing::debug!("Speech process for {} already gone: {}", id, e);
            }
            tracing::debug!("{} cancelled", id);
        }
        Outcome::Exited(Ok(status)) if status.success() => {
            tracing::debug!("{} finished", id);
            emit(&sink, SpeechEvent::end(id));
        }
        Outcome::Exited(Ok(status)) => {
            tracing::warn!("{} speech program exited with {}", id, status);
            emit(&sink, SpeechEvent::error(id, format!("speech program exited with {}", status)));
        }
        Outcome::Exited(Err(e)) => {
            tracing::warn!("{} failed waiting on speech program: {}", id, e);
            emit(&sink, SpeechEvent::error(id, e.to_string()));
        }
    }
}

fn emit(sink: &SharedSink, event: SpeechEvent) {
    if let Some(tx) = sink.lock().unwrap().as_ref() {
        let _ = tx.send(event);
    }
}

#[cfg(unix)]
fn send_signal(pid: Option<u32>, signal: libc::c_int) -> bool {
    let Some(pid) = pid else {
        return false;
    };
    // Safety: plain kill(2) on a pid we spawned; no memory is shared.
    let rc = unsafe { libc::kill(pid as libc::pid_t, signal) };
    if rc != 0 {
        tracing::warn!("Failed to signal speech process {}: {}", pid, std::io::Error::last_os_error());
    }
    rc == 0
}

#[cfg(unix)]
fn suspend_process(pid: Option<u32>) -> bool {
    send_signal(pid, libc::SIGSTOP)
}

#[cfg(unix)]
fn resume_process(pid: Option<u32>) -> bool {
    send_signal(pid, libc::SIGCONT)
}

#[cfg(not(unix))]
fn suspend_process(_pid: Option<u32>) -> bool {
    tracing::warn!("Pausing speech is not supported on this platform");
    false
}

#[cfg(not(unix))]
fn resume_process(_pid: Option<u32>) -> bool {
    false
}

async fn enumerate_voices(kind: BackendKind, program: &Path) -> Result<Vec<RawVoice>> {
    let args: &[&str] = match kind {
        BackendKind::EspeakNg => &["--voices"],
        BackendKind::Say => &["-v", "?"],
    };
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("Failed to run {}", program.display()))?;

    if !output.status.success() {
        anyhow::bail!("{} exited with {}", program.display(), output.status);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(match kind {
        BackendKind::EspeakNg => parse_espeak_voices(&stdout),
        BackendKind::Say => parse_say_voices(&stdout),
    })
}

/// Command-line arguments for one utterance; the text itself goes on stdin
pub(crate) fn command_args(kind: BackendKind, rate_wpm: u32, voice_id: Option<&str>) -> Vec<String> {
    let mut args = Vec::new();
    match kind {
        BackendKind::EspeakNg => {
            args.extend(["-s".to_string(), rate_wpm.to_string()]);
            if let Some(voice) = voice_id {
                args.extend(["-v".to_string(), voice.to_string()]);
            }
            args.push("--stdin".to_string());
        }
        BackendKind::Say => {
            args.extend(["-r".to_string(), rate_wpm.to_string()]);
            if let Some(voice) = voice_id {
                args.extend(["-v".to_string(), voice.to_string()]);
            }
            args.extend(["-f".to_string(), "-".to_string()]);
        }
    }
    args
}

/// Parses `espeak-ng --voices`:
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  en-us           --/M      English_(America)  gmw/en-US            (en 3)
/// ```
pub(crate) fn parse_espeak_voices(output: &str) -> Vec<RawVoice> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 4 {
                return None;
            }
            Some(RawVoice {
                id: cols[1].to_string(),
                name: cols[3].replace('_', " "),
                language: cols[1].to_string(),
            })
        })
        .collect()
}

/// Parses `say -v ?`:
///
/// ```text
/// Alex                en_US    # Most people recognize me by my voice.
/// Bad News            en_US    # The light you see at the end of the tunnel...
/// ```
pub(crate) fn parse_say_voices(output: &str) -> Vec<RawVoice> {
    output
        .lines()
        .filter_map(|line| {
            let head = line.split_once('#').map(|(head, _)| head).unwrap_or(line).trim();
            let (name, locale) = head.rsplit_once(char::is_whitespace)?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(RawVoice {
                id: name.to_string(),
                name: name.to_string(),
                language: locale.replace('_', "-"),
            })
        })
        .collect()
}

/// Char offsets at which each whitespace-delimited word starts
pub(crate) fn word_start_offsets(text: &str) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut in_word = false;
    for (i, c) in text.chars().enumerate() {
        if c.is_whitespace() {
            in_word = false;
        } else if !in_word {
            offsets.push(i);
            in_word = true;
        }
    }
    offsets
}

/// Resolves an installed, executable speech program (`PATHEXT` aware on Windows)
pub(crate) fn program_on_path(program: &str) -> Option<PathBuf> {
    find_program(program, std::env::var_os("PATH"))
}

fn find_program<P: AsRef<OsStr>>(program: &str, search_path: Option<P>) -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    which::which_in(program, search_path, cwd).ok()
}
