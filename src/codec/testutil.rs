//! Shared fixture builders for the codec tests.

use std::io::Write;
use std::path::PathBuf;

use crate::stream::MediaStream;

/// Write `bytes` to a temp file and open a stream over it. The temp dir
/// must stay alive for as long as the stream is used.
pub(crate) fn write_stream(bytes: &[u8], name: &str) -> (tempfile::TempDir, MediaStream) {
    let dir = tempfile::tempdir().unwrap();
    let path: PathBuf = dir.path().join(name);
    std::fs::File::create(&path).unwrap().write_all(bytes).unwrap();
    let mut s = MediaStream::default();
    s.open(&path).unwrap();
    (dir, s)
}

/// Hand-rolled WAV writer so tests control every header field, including
/// invalid combinations `hound` would refuse to produce.
pub(crate) fn build_wav(
    format: u16,
    channels: u16,
    sample_rate: u32,
    bits: u16,
    block_align: u16,
    extra: &[u8],
    data: &[u8],
) -> Vec<u8> {
    let fmt_size = 16 + extra.len() as u32;
    let mut v = Vec::new();
    v.extend_from_slice(b"RIFF");
    v.extend_from_slice(&(4 + 8 + fmt_size + 8 + data.len() as u32).to_le_bytes());
    v.extend_from_slice(b"WAVE");
    v.extend_from_slice(b"fmt ");
    v.extend_from_slice(&fmt_size.to_le_bytes());
    v.extend_from_slice(&format.to_le_bytes());
    v.extend_from_slice(&channels.to_le_bytes());
    v.extend_from_slice(&sample_rate.to_le_bytes());
    let byte_rate = sample_rate * u32::from(channels) * u32::from(bits / 8).max(1);
    v.extend_from_slice(&byte_rate.to_le_bytes());
    v.extend_from_slice(&block_align.to_le_bytes());
    v.extend_from_slice(&bits.to_le_bytes());
    v.extend_from_slice(extra);
    v.extend_from_slice(b"data");
    v.extend_from_slice(&(data.len() as u32).to_le_bytes());
    v.extend_from_slice(data);
    v
}
