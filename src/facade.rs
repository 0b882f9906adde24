//! Legacy facade.
//!
//! The old caller talks to a process-wide engine through these free
//! functions and a packed status struct. The layout and the flag bits
//! mirror the legacy header exactly, including its quirks: `front` always
//! reports 1, and `play_autostarted` is never set.

use std::path::Path;

use once_cell::sync::OnceCell;

use crate::config::EngineConfig;
use crate::engine::AudioEngine;
use crate::types::{OutputPort, SourceId};

static ENGINE: OnceCell<AudioEngine> = OnceCell::new();

/// Sample-rate parameter table for [`ae_set_sample_rate_param`].
const SAMPLE_RATE_PARAMS: [u32; 4] = [128_000, 96_000, 88_200, 176_400];

/// Status flag bits, matching the legacy bitfield order.
pub const STATUS_FILE_READY: u8 = 1 << 0;
pub const STATUS_PLAYING: u8 = 1 << 1;
pub const STATUS_PAUSE: u8 = 1 << 2;
pub const STATUS_ONLINE: u8 = 1 << 3;
pub const STATUS_FRONT: u8 = 1 << 4;
pub const STATUS_PLAY_AUTOSTARTED: u8 = 1 << 5;

/// Packed player status, bit-compatible with the legacy caller.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct AePlayerStatus {
    /// NUL-terminated track basename.
    pub filename: [u8; 64],
    /// Track duration in seconds.
    pub duration: u32,
    /// Playback position in seconds.
    pub position: u32,
    /// 0..=100.
    pub position_percent: u8,
    /// Combination of the `STATUS_*` bits.
    pub flags: u8,
}

impl Default for AePlayerStatus {
    fn default() -> Self {
        Self {
            filename: [0; 64],
            duration: 0,
            position: 0,
            position_percent: 0,
            flags: 0,
        }
    }
}

fn engine() -> &'static AudioEngine {
    ENGINE.get_or_init(|| AudioEngine::new(EngineConfig::default()))
}

/// Idempotent engine construction.
pub fn ae_init() {
    let _ = engine();
}

/// Append a file to the play queue. `front` selects the front-speaker
/// output; the rear line-out otherwise.
pub fn ae_player_enqueue_file(path: &Path, front: bool) {
    let out = if front { OutputPort::Front } else { OutputPort::Rear };
    engine().add_file(path, 0, out);
}

/// Interrupt the current track and play this file next.
pub fn ae_player_play_file_immediately(path: &Path, front: bool) {
    let out = if front { OutputPort::Front } else { OutputPort::Rear };
    engine().add_file_front(path, 0, out);
}

pub fn ae_player_play() {
    engine().play();
}

pub fn ae_player_pause() {
    engine().pause();
}

pub fn ae_player_stop() {
    engine().stop();
}

/// Skip forward ten seconds.
pub fn ae_player_forward() {
    engine().forward(10);
}

/// Skip back ten seconds, clamped at the start.
pub fn ae_player_rewind() {
    engine().rewind(10);
}

/// Fill the packed status struct.
pub fn ae_player_status(out: &mut AePlayerStatus) {
    let engine = engine();
    let st = engine.player_status();

    *out = AePlayerStatus::default();
    let bytes = st.filename.as_bytes();
    let n = bytes.len().min(out.filename.len() - 1);
    out.filename[..n].copy_from_slice(&bytes[..n]);
    out.duration = st.duration;
    out.position = st.position;
    out.position_percent = st.percent;

    let mut flags = 0u8;
    if st.file_ready {
        flags |= STATUS_FILE_READY;
    }
    if st.playing {
        flags |= STATUS_PLAYING;
    }
    if st.paused {
        flags |= STATUS_PAUSE;
    }
    if engine.current_source() == SourceId::AdcDirect {
        flags |= STATUS_ONLINE;
    }
    // The legacy implementation never tracked the active output here.
    flags |= STATUS_FRONT;
    out.flags = flags;
}

/// Select a source pipe. Zero deactivates whatever is current; other ids
/// request activation. Returns false for an id outside the source table.
pub fn ae_select_pipe(id: u8) -> bool {
    let engine = engine();
    if id == 0 {
        let current = engine.current_source();
        if current != SourceId::Disabled {
            engine.deactivate(current);
        }
        return true;
    }
    match SourceId::from_index(id) {
        Some(src) => {
            engine.activate(src);
            true
        }
        None => false,
    }
}

/// Id of the source currently feeding the sink.
pub fn ae_current_pipe() -> u8 {
    engine().current_source() as u8
}

/// Map a legacy rate parameter to a sink sample rate: 0..=3 select
/// 128/96/88.2/176.4 kHz, anything else the default 128 kHz.
pub fn ae_set_sample_rate_param(param: i32) {
    let rate = usize::try_from(param)
        .ok()
        .and_then(|p| SAMPLE_RATE_PARAMS.get(p).copied())
        .unwrap_or(SAMPLE_RATE_PARAMS[0]);
    engine().set_sample_rate(rate);
}

/// Per-source volume, clamped to 0..=10. Unknown ids are ignored.
pub fn ae_set_volume(id: u8, volume: u8) {
    if let Some(src) = SourceId::from_index(id) {
        engine().set_volume(src, volume);
    }
}

/// Placeholder kept for the legacy caller; sends a no-op command.
pub fn ae_volume_changed() {
    engine().volume_changed();
}
