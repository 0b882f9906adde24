//! The audio engine: command mailbox, worker thread and status snapshots.
//!
//! The engine is an owned object. Construction spawns the worker thread,
//! which is the sole mutator of playback state; callers on any thread
//! submit commands through a bounded mailbox and read whole-struct status
//! snapshots. Dropping the engine shuts the worker and the ring drain
//! down.

pub mod queue;
mod worker;

pub use queue::{PlayQueue, QueueEntry, QUEUE_CAPACITY};

use std::path::Path;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::types::{OutputPort, Sample, SourceId};

/// Longest path accepted by [`AudioEngine::add_file`], in bytes.
pub const MAX_PATH_BYTES: usize = 240;

/// Longest filename published in [`PlayerStatus`], in bytes.
pub const MAX_STATUS_FILENAME: usize = 64;

/// External sample producer for the non-player sources. Fills the buffer
/// and returns the number of samples produced together with their sample
/// rate.
pub type ExternalFeed = Box<dyn FnMut(&mut [Sample]) -> (usize, u32) + Send>;

/// Commands applied by the worker, in send order per caller.
pub(crate) enum Command {
    Play,
    Pause,
    Stop,
    AddFile { entry: QueueEntry, front: bool },
    ClearQueue,
    Seek { sec: u32 },
    Forward { sec: u32 },
    Rewind { sec: u32 },
    Activate { src: SourceId },
    Deactivate { src: SourceId },
    SetVolume { src: SourceId, volume: u8 },
    SetSampleRate { rate: u32 },
    VolumeChanged,
    RegisterFeed { src: SourceId, priority: u8, feed: ExternalFeed },
    UnregisterFeed { src: SourceId },
    Shutdown,
}

/// Player status snapshot. Written only by the worker; readers receive a
/// consistent whole-struct copy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerStatus {
    /// Basename of the current track, at most [`MAX_STATUS_FILENAME`]
    /// bytes.
    pub filename: String,
    /// Playback position in seconds.
    pub position: u32,
    /// Track duration in seconds.
    pub duration: u32,
    /// `position * 100 / duration`, zero when the duration is unknown.
    pub percent: u8,
    pub playing: bool,
    pub paused: bool,
    /// A decoder is loaded and not exhausted.
    pub file_ready: bool,
}

/// Handle to the running engine.
pub struct AudioEngine {
    /// `None` only during shutdown; dropping the sender disconnects the
    /// worker's receive loop.
    cmd_tx: Option<Sender<Command>>,
    status: Arc<RwLock<PlayerStatus>>,
    current_source: Arc<AtomicU8>,
    queue_len: Arc<AtomicUsize>,
    send_timeout: Duration,
    worker: Option<JoinHandle<()>>,
}

impl AudioEngine {
    /// Start the engine: spawns the worker thread and the ring drain.
    pub fn new(config: EngineConfig) -> Self {
        let (cmd_tx, cmd_rx) = bounded(config.mailbox_depth);
        let status = Arc::new(RwLock::new(PlayerStatus::default()));
        let current_source = Arc::new(AtomicU8::new(SourceId::Disabled as u8));
        let queue_len = Arc::new(AtomicUsize::new(0));
        let send_timeout = Duration::from_millis(config.send_timeout_ms);

        let worker_status = Arc::clone(&status);
        let worker_current = Arc::clone(&current_source);
        let worker_queue_len = Arc::clone(&queue_len);
        let worker = std::thread::Builder::new()
            .name("audio-engine".into())
            .spawn(move || {
                worker::Worker::new(config, cmd_rx, worker_status, worker_current, worker_queue_len)
                    .run();
            })
            .expect("spawn audio engine worker");

        info!("audio engine started");
        Self {
            cmd_tx: Some(cmd_tx),
            status,
            current_source,
            queue_len,
            send_timeout,
            worker: Some(worker),
        }
    }

    /// Resume from pause, or start the first queued track when stopped.
    pub fn play(&self) {
        self.send(Command::Play);
    }

    pub fn pause(&self) {
        self.send(Command::Pause);
    }

    /// Stop playback and drop the current track.
    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    /// Append a track to the play queue. Paths longer than
    /// [`MAX_PATH_BYTES`] are rejected.
    pub fn add_file(&self, path: &Path, start_sec: u32, output: OutputPort) {
        self.enqueue_file(path, start_sec, output, false);
    }

    /// Drop the current track and play this one next, keeping the rest of
    /// the queue.
    pub fn add_file_front(&self, path: &Path, start_sec: u32, output: OutputPort) {
        self.enqueue_file(path, start_sec, output, true);
    }

    fn enqueue_file(&self, path: &Path, start_sec: u32, output: OutputPort, front: bool) {
        if path.as_os_str().len() > MAX_PATH_BYTES {
            warn!("rejecting over-long path ({} bytes)", path.as_os_str().len());
            return;
        }
        self.send(Command::AddFile {
            entry: QueueEntry {
                path: path.to_path_buf(),
                start_sec,
                output,
            },
            front,
        });
    }

    pub fn clear_queue(&self) {
        self.send(Command::ClearQueue);
    }

    /// Seek the current track to an absolute second.
    pub fn seek(&self, sec: u32) {
        self.send(Command::Seek { sec });
    }

    /// Skip forward by `sec` seconds.
    pub fn forward(&self, sec: u32) {
        self.send(Command::Forward { sec });
    }

    /// Skip backward by `sec` seconds, clamped at the start.
    pub fn rewind(&self, sec: u32) {
        self.send(Command::Rewind { sec });
    }

    /// Mark a source as wanting to play; the router switches on the next
    /// pass if it outranks the current source.
    pub fn activate(&self, src: SourceId) {
        self.send(Command::Activate { src });
    }

    pub fn deactivate(&self, src: SourceId) {
        self.send(Command::Deactivate { src });
    }

    /// Set a source's volume index, clamped to 0..=10.
    pub fn set_volume(&self, src: SourceId, volume: u8) {
        self.send(Command::SetVolume { src, volume });
    }

    /// Change the sink sample rate; the pipeline picks it up on the next
    /// tick.
    pub fn set_sample_rate(&self, rate: u32) {
        self.send(Command::SetSampleRate { rate });
    }

    /// Placeholder for a future volume rescan; accepted and ignored.
    pub fn volume_changed(&self) {
        self.send(Command::VolumeChanged);
    }

    /// Install an external feed callback and priority for a source.
    pub fn register_source(&self, src: SourceId, priority: u8, feed: ExternalFeed) {
        self.send(Command::RegisterFeed { src, priority, feed });
    }

    /// Remove a source's feed and clear its play request.
    pub fn unregister_source(&self, src: SourceId) {
        self.send(Command::UnregisterFeed { src });
    }

    /// Whole-struct copy of the current status.
    pub fn player_status(&self) -> PlayerStatus {
        self.status.read().clone()
    }

    /// The source currently feeding the sink.
    pub fn current_source(&self) -> SourceId {
        SourceId::from_index(self.current_source.load(Ordering::Acquire))
            .unwrap_or(SourceId::Disabled)
    }

    /// Tracks waiting in the play queue (excluding the one playing).
    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Acquire)
    }

    /// True while the worker thread is alive.
    pub fn is_initialized(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Block up to the configured send timeout, then drop the command with
    /// a warning. Callers of `stop` should retry on pathological mailbox
    /// pressure.
    fn send(&self, cmd: Command) {
        let Some(tx) = self.cmd_tx.as_ref() else {
            return;
        };
        match tx.send_timeout(cmd, self.send_timeout) {
            Ok(()) => {}
            Err(_) => warn!("command mailbox full, dropping command"),
        }
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        // Best effort: even with a full mailbox the worker still exits,
        // because dropping the sender disconnects its receive loop.
        if let Some(tx) = self.cmd_tx.take() {
            if let Err(TrySendError::Full(_)) = tx.try_send(Command::Shutdown) {
                warn!("mailbox full at shutdown, relying on disconnect");
            }
        }
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

/// A steady sine tone feed for the diagnostic source.
///
/// `amplitude` is the peak sample value. The phase advances by the exact
/// frequency/rate ratio, so the tone stays continuous across calls.
pub fn tone_feed(freq_hz: u32, sample_rate: u32, amplitude: i16) -> ExternalFeed {
    let mut phase = 0.0f32;
    let step = freq_hz as f32 / sample_rate.max(1) as f32;
    Box::new(move |buf: &mut [Sample]| {
        for s in buf.iter_mut() {
            *s = ((phase * std::f32::consts::TAU).sin() * f32::from(amplitude)) as Sample;
            phase += step;
            if phase >= 1.0 {
                phase -= 1.0;
            }
        }
        (buf.len(), sample_rate)
    })
}
