//! Engine configuration.
//!
//! All values default to the sizes and timeouts the engine was tuned for on
//! target hardware; tests shrink a few of them to keep fixtures small.

use serde::{Deserialize, Serialize};

/// Tunables for [`crate::engine::AudioEngine`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Byte-stream read buffer size.
    pub stream_buf_size: usize,

    /// Samples requested from the decoder (or feed callback) per tick.
    pub decode_chunk: usize,

    /// Sink sample rate applied at startup.
    pub default_sink_rate: u32,

    /// Command mailbox depth.
    pub mailbox_depth: usize,

    /// How long a sender blocks on a full mailbox before dropping.
    pub send_timeout_ms: u64,

    /// How long a pipeline tick waits for ring space.
    pub acquire_timeout_ms: u64,

    /// Worker sleep while no source is active. An arriving command wakes
    /// the worker early.
    pub idle_wait_ms: u64,

    /// Delay between pipeline ticks.
    pub tick_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stream_buf_size: 8192,
            decode_chunk: 1024,
            default_sink_rate: 128_000,
            mailbox_depth: 32,
            send_timeout_ms: 50,
            acquire_timeout_ms: 100,
            idle_wait_ms: 50,
            tick_ms: 1,
        }
    }
}
