//! Shared fixtures and polling helpers for the engine scenario tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Once;
use std::time::{Duration, Instant};

use anyhow::Result;
use hound::{SampleFormat, WavSpec, WavWriter};
use tracing_subscriber::EnvFilter;

use monopipe::EngineConfig;

/// Fixture sample rate. Low keeps the files tiny and the pipeline's
/// resampling ratio honest (8 kHz source into a 48 kHz sink).
pub const FIXTURE_RATE: u32 = 8000;

static TRACING: Once = Once::new();

/// Install a test subscriber once per process so `RUST_LOG=debug` surfaces
/// the engine's logs during a failing run.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Engine configuration tuned for tests: a modest sink rate so resampled
/// chunks fit the ring, and a short ring-acquire timeout so saturated
/// ticks recycle quickly. Also installs the test tracing subscriber.
pub fn test_config() -> EngineConfig {
    init_tracing();
    EngineConfig {
        default_sink_rate: 48_000,
        acquire_timeout_ms: 20,
        ..EngineConfig::default()
    }
}

/// Write a mono 16-bit sine WAV of the given duration.
pub fn sine_wav(dir: &Path, name: &str, duration_ms: u64, freq_hz: f32) -> Result<PathBuf> {
    let path = dir.join(name);
    let spec = WavSpec {
        channels: 1,
        sample_rate: FIXTURE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(&path, spec)?;
    let frames = FIXTURE_RATE as u64 * duration_ms / 1000;
    for i in 0..frames {
        let t = i as f32 / FIXTURE_RATE as f32;
        let sample = ((t * freq_hz * std::f32::consts::TAU).sin() * 0.5 * 32767.0) as i16;
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(path)
}

/// Write a mono 16-bit silent WAV.
pub fn silent_wav(dir: &Path, name: &str, duration_ms: u64) -> Result<PathBuf> {
    let path = dir.join(name);
    let spec = WavSpec {
        channels: 1,
        sample_rate: FIXTURE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(&path, spec)?;
    let frames = FIXTURE_RATE as u64 * duration_ms / 1000;
    for _ in 0..frames {
        writer.write_sample(0i16)?;
    }
    writer.finalize()?;
    Ok(path)
}

/// Write a mono u-law WAV (format 7) of silence. Hound cannot produce
/// G.711, so the container is built by hand.
pub fn ulaw_wav(dir: &Path, name: &str, duration_ms: u64) -> Result<PathBuf> {
    let path = dir.join(name);
    let frames = (FIXTURE_RATE as u64 * duration_ms / 1000) as usize;
    let data = vec![0xFFu8; frames]; // u-law encoded zero

    let mut v = Vec::new();
    v.extend_from_slice(b"RIFF");
    v.extend_from_slice(&(4 + 8 + 16 + 8 + data.len() as u32).to_le_bytes());
    v.extend_from_slice(b"WAVE");
    v.extend_from_slice(b"fmt ");
    v.extend_from_slice(&16u32.to_le_bytes());
    v.extend_from_slice(&7u16.to_le_bytes()); // u-law
    v.extend_from_slice(&1u16.to_le_bytes()); // mono
    v.extend_from_slice(&FIXTURE_RATE.to_le_bytes());
    v.extend_from_slice(&FIXTURE_RATE.to_le_bytes()); // byte rate
    v.extend_from_slice(&1u16.to_le_bytes()); // block align
    v.extend_from_slice(&8u16.to_le_bytes()); // bits
    v.extend_from_slice(b"data");
    v.extend_from_slice(&(data.len() as u32).to_le_bytes());
    v.extend_from_slice(&data);
    std::fs::write(&path, v)?;
    Ok(path)
}

/// Write a file that is not audio at all.
pub fn text_file(dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, b"this is not an audio file\n")?;
    Ok(path)
}

/// Poll `cond` until it returns true or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}
