//! Engine worker: the single thread that owns all playback state.
//!
//! One loop pass drains the command mailbox, lets the router pick the
//! live source, publishes a status snapshot and, when a source is active,
//! runs one decode -> scale -> resample -> write pipeline tick.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use parking_lot::RwLock;
use tracing::{debug, info, trace, warn};

use crate::codec::{self, Decode, Decoder, DecoderStatus};
use crate::config::EngineConfig;
use crate::engine::queue::PlayQueue;
use crate::engine::{Command, ExternalFeed, PlayerStatus, MAX_STATUS_FILENAME};
use crate::resample::Resampler;
use crate::ring::HwRing;
use crate::stream::MediaStream;
use crate::types::{
    scale_q15, OutputPort, Sample, SourceId, VOLUME_PASSTHROUGH_INDEX, VOLUME_TABLE,
};

/// File-player state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlayerState {
    Stopped,
    /// Reserved for deferred track starts.
    #[allow(dead_code)]
    PlayWaiting,
    Playing,
    Paused,
}

/// Per-source routing state.
struct SourceInfo {
    priority: u8,
    want_play: bool,
    active: bool,
    volume: u8,
    output: OutputPort,
    feed: Option<ExternalFeed>,
}

pub(crate) struct Worker {
    cfg: EngineConfig,
    cmd_rx: Receiver<Command>,
    status: Arc<RwLock<PlayerStatus>>,
    current_atomic: Arc<AtomicU8>,
    queue_len: Arc<AtomicUsize>,
    sources: [SourceInfo; SourceId::COUNT],
    current: SourceId,
    player_state: PlayerState,
    queue: PlayQueue,
    stream: MediaStream,
    decoder: Option<Decoder>,
    resampler: Resampler,
    ring: HwRing,
    decode_buf: Vec<Sample>,
    current_filename: String,
    shutdown: bool,
}

impl Worker {
    pub(crate) fn new(
        cfg: EngineConfig,
        cmd_rx: Receiver<Command>,
        status: Arc<RwLock<PlayerStatus>>,
        current_atomic: Arc<AtomicU8>,
        queue_len: Arc<AtomicUsize>,
    ) -> Self {
        let sources = std::array::from_fn(|idx| {
            let id = SourceId::from_index(idx as u8).expect("source index in range");
            SourceInfo {
                priority: id.default_priority(),
                want_play: false,
                active: false,
                volume: 7,
                output: OutputPort::Front,
                feed: None,
            }
        });
        let decode_buf = vec![0; cfg.decode_chunk.max(1)];
        let stream = MediaStream::new(cfg.stream_buf_size);
        Self {
            cfg,
            cmd_rx,
            status,
            current_atomic,
            queue_len,
            sources,
            current: SourceId::Disabled,
            player_state: PlayerState::Stopped,
            queue: PlayQueue::new(),
            stream,
            decoder: None,
            resampler: Resampler::new(),
            ring: HwRing::new(),
            decode_buf,
            current_filename: String::new(),
            shutdown: false,
        }
    }

    pub(crate) fn run(mut self) {
        self.ring.set_sample_rate(self.cfg.default_sink_rate);
        self.ring.start();
        let idle = Duration::from_millis(self.cfg.idle_wait_ms);
        let tick = Duration::from_millis(self.cfg.tick_ms);

        loop {
            self.process_commands();
            if self.shutdown {
                break;
            }
            if self.current == SourceId::Disabled {
                // Idle until a command arrives or the wait elapses.
                match self.cmd_rx.recv_timeout(idle) {
                    Ok(cmd) => self.apply(cmd),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
                continue;
            }
            self.pipeline_tick();
            thread::sleep(tick);
        }

        self.destroy_decoder();
        self.stream.close();
        self.ring.stop();
        debug!("audio worker exited");
    }

    /// Drain the mailbox, then update routing and the published status.
    fn process_commands(&mut self) {
        loop {
            match self.cmd_rx.try_recv() {
                Ok(cmd) => self.apply(cmd),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.shutdown = true;
                    break;
                }
            }
        }
        self.router_update();
        self.publish_status();
    }

    fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::Play => match self.player_state {
                PlayerState::Paused => {
                    self.player_state = PlayerState::Playing;
                    self.source_mut(SourceId::Player).want_play = true;
                }
                PlayerState::Stopped if !self.queue.is_empty() => {
                    self.source_mut(SourceId::Player).want_play = true;
                    self.start_next_track();
                }
                _ => {}
            },

            Command::Pause => {
                if self.player_state == PlayerState::Playing {
                    self.player_state = PlayerState::Paused;
                }
            }

            Command::Stop => {
                self.destroy_decoder();
                self.stream.close();
                self.player_state = PlayerState::Stopped;
                self.source_mut(SourceId::Player).want_play = false;
                if self.current == SourceId::Player {
                    self.ring.flush(true);
                    self.set_current(SourceId::Disabled);
                }
            }

            Command::AddFile { entry, front: false } => {
                if !self.queue.push_back(entry) {
                    warn!("play queue full, dropping enqueue");
                }
                if self.player_state == PlayerState::Stopped {
                    self.source_mut(SourceId::Player).want_play = true;
                    self.start_next_track();
                }
            }

            Command::AddFile { entry, front: true } => {
                self.destroy_decoder();
                self.stream.close();
                if self.current == SourceId::Player {
                    // Soft-cut the interrupted track's pending samples.
                    self.ring.flush(true);
                }
                if !self.queue.push_front(entry) {
                    warn!("play queue full, dropping front insert");
                }
                self.source_mut(SourceId::Player).want_play = true;
                self.start_next_track();
            }

            Command::ClearQueue => {
                self.destroy_decoder();
                self.stream.close();
                self.queue.clear();
                self.player_state = PlayerState::Stopped;
                self.source_mut(SourceId::Player).want_play = false;
            }

            Command::Seek { sec } => {
                if let Some(dec) = self.decoder.as_mut() {
                    dec.seek(&mut self.stream, sec);
                }
            }

            Command::Forward { sec } => {
                if let Some(dec) = self.decoder.as_mut() {
                    let pos = dec.position_sec();
                    dec.seek(&mut self.stream, pos.saturating_add(sec));
                }
            }

            Command::Rewind { sec } => {
                if let Some(dec) = self.decoder.as_mut() {
                    let pos = dec.position_sec();
                    dec.seek(&mut self.stream, pos.saturating_sub(sec));
                }
            }

            Command::Activate { src } => {
                self.source_mut(src).want_play = true;
            }

            Command::Deactivate { src } => {
                let info = self.source_mut(src);
                info.want_play = false;
                info.active = false;
                if self.current == src {
                    self.ring.flush(true);
                    self.set_current(SourceId::Disabled);
                }
            }

            Command::SetVolume { src, volume } => {
                self.source_mut(src).volume = volume.min(10);
            }

            Command::SetSampleRate { rate } => {
                self.ring.set_sample_rate(rate);
            }

            Command::VolumeChanged => {
                // Placeholder command; accepted without effect.
            }

            Command::RegisterFeed { src, priority, feed } => {
                let info = self.source_mut(src);
                info.priority = priority;
                info.feed = Some(feed);
            }

            Command::UnregisterFeed { src } => {
                let info = self.source_mut(src);
                info.feed = None;
                info.want_play = false;
                info.active = false;
            }

            Command::Shutdown => {
                self.shutdown = true;
            }
        }
    }

    /// Pick the highest-priority source that wants to play. Ties go to the
    /// earlier id in enum order.
    fn router_update(&mut self) {
        let mut best = SourceId::Disabled;
        let mut best_priority = 0u8;
        for id in SourceId::ROUTABLE {
            let info = self.source(id);
            if info.want_play && info.priority > best_priority {
                best_priority = info.priority;
                best = id;
            }
        }
        if best != self.current {
            self.switch_source(best);
        }
    }

    fn switch_source(&mut self, new_id: SourceId) {
        debug!("source switch: {:?} -> {:?}", self.current, new_id);
        if self.current != SourceId::Disabled {
            let old = self.current;
            self.source_mut(old).active = false;
            if old == SourceId::Player && self.player_state == PlayerState::Playing {
                self.player_state = PlayerState::Paused;
            }
            self.ring.flush(true);
        }
        self.set_current(new_id);
        if new_id != SourceId::Disabled {
            self.source_mut(new_id).active = true;
            if new_id == SourceId::Player && self.player_state == PlayerState::Paused {
                self.player_state = PlayerState::Playing;
            }
        }
    }

    fn set_current(&mut self, id: SourceId) {
        self.current = id;
        self.current_atomic.store(id as u8, Ordering::Release);
    }

    fn destroy_decoder(&mut self) {
        if let Some(mut dec) = self.decoder.take() {
            dec.close();
        }
    }

    /// Pop queue entries until one opens and decodes, bounded by the queue
    /// length. An empty queue stops the player.
    fn start_next_track(&mut self) {
        loop {
            self.destroy_decoder();
            self.stream.close();

            let Some(entry) = self.queue.pop_front() else {
                self.player_state = PlayerState::Stopped;
                self.source_mut(SourceId::Player).want_play = false;
                return;
            };

            if let Err(e) = self.stream.open(&entry.path) {
                warn!("cannot open {}: {e}", entry.path.display());
                continue;
            }
            let kind = codec::detect(&mut self.stream);
            let Some(mut dec) = Decoder::for_codec(kind) else {
                warn!("unknown codec for {}", entry.path.display());
                continue;
            };
            if let Err(e) = dec.open(&mut self.stream) {
                warn!("cannot start {}: {e}", entry.path.display());
                continue;
            }
            if entry.start_sec > 0 {
                dec.seek(&mut self.stream, entry.start_sec);
            }

            self.decoder = Some(dec);
            self.player_state = PlayerState::Playing;
            self.source_mut(SourceId::Player).want_play = true;
            self.source_mut(SourceId::Player).output = entry.output;
            self.current_filename = truncate_name(&self.stream.name()).to_string();
            info!("now playing {} ({kind:?})", self.current_filename);
            return;
        }
    }

    /// One decode -> scale -> resample -> write pass.
    fn pipeline_tick(&mut self) {
        let sink_rate = self.ring.sample_rate();
        let chunk = self.cfg.decode_chunk.min(self.decode_buf.len());
        let mut src_rate = sink_rate;

        let decoded = if self.current == SourceId::Player {
            if self.player_state != PlayerState::Playing {
                return;
            }
            let Some(dec) = self.decoder.as_mut() else {
                return;
            };
            let n = dec.decode(&mut self.stream, &mut self.decode_buf[..chunk]);
            if n == 0 {
                // End of stream (or decoder gave up): move on.
                self.start_next_track();
                return;
            }
            src_rate = dec.sample_rate();
            n
        } else {
            let idx = self.current.index();
            let Some(feed) = self.sources[idx].feed.as_mut() else {
                return;
            };
            let (n, rate) = feed(&mut self.decode_buf[..chunk]);
            if n == 0 {
                return;
            }
            if rate > 0 {
                src_rate = rate;
            }
            n.min(chunk)
        };

        let volume = self.sources[self.current.index()].volume;
        if volume < VOLUME_PASSTHROUGH_INDEX {
            scale_q15(
                &mut self.decode_buf[..decoded],
                VOLUME_TABLE[usize::from(volume)],
            );
        }

        self.resampler.set_rates(src_rate, sink_rate);
        let out_len = self.resampler.output_length(decoded);
        if out_len == 0 {
            return;
        }

        let timeout = Duration::from_millis(self.cfg.acquire_timeout_ms);
        let region = self.ring.acquire_write(out_len, timeout);
        if region.is_empty() {
            trace!("ring acquire timed out, yielding this tick");
            return;
        }
        let written =
            self.resampler
                .process(&self.decode_buf[..decoded], region.first, region.second);
        self.ring.commit_write(written);
    }

    /// Publish a fresh status snapshot.
    fn publish_status(&mut self) {
        let (position, duration) = match self.decoder.as_ref() {
            Some(dec) => (dec.position_sec(), dec.duration_sec()),
            None => (0, 0),
        };
        let file_ready = self
            .decoder
            .as_ref()
            .is_some_and(|d| d.status() != DecoderStatus::Closed);

        let mut st = self.status.write();
        st.playing = self.player_state == PlayerState::Playing;
        st.paused = self.player_state == PlayerState::Paused;
        st.file_ready = file_ready;
        st.position = position;
        st.duration = duration;
        st.percent = if duration > 0 {
            ((u64::from(position) * 100 / u64::from(duration)).min(100)) as u8
        } else {
            0
        };
        if st.filename != self.current_filename {
            st.filename = self.current_filename.clone();
        }
        drop(st);
        self.queue_len.store(self.queue.len(), Ordering::Release);
    }

    fn source(&self, id: SourceId) -> &SourceInfo {
        &self.sources[id.index()]
    }

    fn source_mut(&mut self, id: SourceId) -> &mut SourceInfo {
        &mut self.sources[id.index()]
    }
}

/// Clamp a filename to the status field limit on a char boundary.
fn truncate_name(name: &str) -> &str {
    if name.len() <= MAX_STATUS_FILENAME {
        return name;
    }
    let mut end = MAX_STATUS_FILENAME;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}
