//! # monopipe
//!
//! Embedded-style mono audio playback engine.
//!
//! A single worker thread routes one of several prioritized sources (file
//! player, ADC capture, external feed, diagnostics) through a decode ->
//! volume-scale -> resample pipeline into a hardware sample ring, which a
//! drain thread consumes at wall-clock rate. Callers on any thread drive
//! the engine through a bounded command mailbox and read whole-struct
//! status snapshots.
//!
//! **Formats:** WAV linear PCM (8/16/24/32-bit, any channel count), WAV
//! IMA-ADPCM, WAV A-law/u-law, and MP3 (MPEG 1/2/2.5 Layer 1/2/3 with
//! optional ID3v2 and Xing/Info headers). Everything is downmixed to mono
//! 16-bit.
//!
//! ```no_run
//! use monopipe::{AudioEngine, EngineConfig, OutputPort};
//!
//! let engine = AudioEngine::new(EngineConfig::default());
//! engine.add_file(std::path::Path::new("chime.wav"), 0, OutputPort::Front);
//! let status = engine.player_status();
//! println!("playing: {} ({}s)", status.filename, status.duration);
//! ```

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod facade;
pub mod resample;
pub mod ring;
pub mod stream;
pub mod types;

pub use config::EngineConfig;
pub use engine::{AudioEngine, ExternalFeed, PlayerStatus};
pub use error::{Error, Result};
pub use types::{OutputPort, Sample, SourceId};
