//! Audible cues for newly reported incidents.
//!
//! [`AlertDispatcher`] queues cues to a background task so that playing a
//! sound never delays applying the next event. The task loads each cue's
//! playback handle through a [`CueBackend`] the first time that cue is
//! needed and reuses it afterwards.

use std::collections::BTreeMap;

use patrol_desk_case_models::MarkerCategory;
use strum_macros::{AsRefStr, Display, EnumString};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Which sound to play.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum Cue {
    /// High-priority siren for SOS calls.
    Siren,
    /// Standard notification chime.
    Notification,
}

impl Cue {
    /// Cue for a newly created incident of `category`.
    #[must_use]
    pub const fn for_category(category: MarkerCategory) -> Self {
        match category {
            MarkerCategory::Sos => Self::Siren,
            MarkerCategory::Collision | MarkerCategory::Robbery | MarkerCategory::Default => {
                Self::Notification
            }
        }
    }

    /// Sound asset path.
    #[must_use]
    pub const fn asset(self) -> &'static str {
        match self {
            Self::Siren => "sounds/siren.mp3",
            Self::Notification => "sounds/notification.mp3",
        }
    }
}

/// Errors raised while loading or playing a cue. Never propagated past
/// the dispatcher task; they are logged.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    /// The playback handle could not be created.
    #[error("Failed to load {cue} cue: {message}")]
    Load {
        /// Cue being loaded.
        cue: Cue,
        /// Description of what went wrong.
        message: String,
    },
    /// Playback failed.
    #[error("Failed to play {cue} cue: {message}")]
    Play {
        /// Cue being played.
        cue: Cue,
        /// Description of what went wrong.
        message: String,
    },
}

/// A loaded, replayable sound.
pub trait CueHandle: Send {
    /// Plays the sound once.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError::Play`] if playback fails.
    fn play(&mut self) -> Result<(), AlertError>;
}

/// Creates playback handles.
pub trait CueBackend: Send + 'static {
    /// Loads the handle for `cue`. Called at most once per cue unless it
    /// fails.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError::Load`] if the sound cannot be prepared.
    fn load(&mut self, cue: Cue) -> Result<Box<dyn CueHandle>, AlertError>;
}

/// Backend that only logs. Used where no audio device is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogBackend;

struct LogHandle(Cue);

impl CueHandle for LogHandle {
    fn play(&mut self) -> Result<(), AlertError> {
        match self.0 {
            Cue::Siren => log::warn!("SOS alert ({})", self.0.asset()),
            Cue::Notification => log::info!("New incident ({})", self.0.asset()),
        }
        Ok(())
    }
}

impl CueBackend for LogBackend {
    fn load(&mut self, cue: Cue) -> Result<Box<dyn CueHandle>, AlertError> {
        Ok(Box::new(LogHandle(cue)))
    }
}

/// Backend that rings the terminal bell.
#[derive(Debug, Clone, Copy, Default)]
pub struct BellBackend;

struct BellHandle(Cue);

impl CueHandle for BellHandle {
    fn play(&mut self) -> Result<(), AlertError> {
        use std::io::Write as _;

        let rings = match self.0 {
            Cue::Siren => "\x07\x07\x07",
            Cue::Notification => "\x07",
        };
        let mut stderr = std::io::stderr();
        stderr
            .write_all(rings.as_bytes())
            .and_then(|()| stderr.flush())
            .map_err(|e| AlertError::Play {
                cue: self.0,
                message: e.to_string(),
            })
    }
}

impl CueBackend for BellBackend {
    fn load(&mut self, cue: Cue) -> Result<Box<dyn CueHandle>, AlertError> {
        Ok(Box::new(BellHandle(cue)))
    }
}

/// Fire-and-forget cue queue.
///
/// Cloning is cheap; every clone feeds the same background task, which
/// exits once all clones are dropped.
#[derive(Debug, Clone)]
pub struct AlertDispatcher {
    tx: mpsc::UnboundedSender<Cue>,
}

impl AlertDispatcher {
    /// Spawns the playback task on the current runtime.
    ///
    /// The returned handle completes after the last dispatcher clone is
    /// dropped and every queued cue has been played.
    #[must_use]
    pub fn spawn(backend: impl CueBackend) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(backend, rx));
        (Self { tx }, handle)
    }

    /// Queues `cue`. Never blocks.
    pub fn dispatch(&self, cue: Cue) {
        if self.tx.send(cue).is_err() {
            log::warn!("Alert task is gone, dropping {cue} cue");
        }
    }
}

async fn run(mut backend: impl CueBackend, mut rx: mpsc::UnboundedReceiver<Cue>) {
    let mut handles: BTreeMap<Cue, Box<dyn CueHandle>> = BTreeMap::new();

    while let Some(cue) = rx.recv().await {
        if !handles.contains_key(&cue) {
            match backend.load(cue) {
                Ok(handle) => {
                    log::debug!("Loaded {cue} cue");
                    handles.insert(cue, handle);
                }
                Err(e) => {
                    log::error!("{e}");
                    continue;
                }
            }
        }
        if let Some(handle) = handles.get_mut(&cue)
            && let Err(e) = handle.play()
        {
            log::error!("{e}");
        }
    }

    log::debug!("Alert task finished");
}
