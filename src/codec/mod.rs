//! Codec detection and decoding.
//!
//! Each decoder turns a byte stream into runs of mono `i16` samples and is
//! seekable by whole seconds. Exactly one decoder is alive at a time; the
//! engine holds it as a [`Decoder`] tagged over the concrete types.

mod adpcm;
mod detect;
mod g711;
mod mp3;
pub mod mp3_duration;
#[cfg(test)]
pub(crate) mod testutil;
mod wav;

pub use adpcm::AdpcmDecoder;
pub use detect::{detect, CodecKind};
pub use g711::{alaw_to_linear, ulaw_to_linear, AlawDecoder, UlawDecoder};
pub use mp3::Mp3Decoder;
pub use wav::WavPcmDecoder;

use crate::error::Result;
use crate::stream::MediaStream;
use crate::types::Sample;

/// Decoder lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecoderStatus {
    /// No stream attached, or the stream is exhausted.
    #[default]
    Closed,
    /// Opened successfully, no samples produced yet.
    Ready,
    /// At least one decode call has produced samples.
    Playing,
    /// The decoder hit an unrecoverable condition.
    Error,
}

/// Common decoder contract.
///
/// The stream is owned by the engine and lent to the decoder per call; a
/// decoder only keeps positional bookkeeping between calls.
pub trait Decode {
    /// Parse headers and prepare for decoding. Leaves the stream at the
    /// start of audio data and the status at `Ready`.
    fn open(&mut self, stream: &mut MediaStream) -> Result<()>;

    /// Produce up to `out.len()` mono samples. Returns the count actually
    /// produced; zero signals end of stream and moves the status to
    /// `Closed`.
    fn decode(&mut self, stream: &mut MediaStream, out: &mut [Sample]) -> usize;

    /// Reposition to `sec` seconds from the start, clamped to the stream.
    fn seek(&mut self, stream: &mut MediaStream, sec: u32);

    /// Current position in whole seconds.
    fn position_sec(&self) -> u32;

    /// Total duration in whole seconds (estimated for VBR MP3).
    fn duration_sec(&self) -> u32;

    /// Native sample rate of the source material.
    fn sample_rate(&self) -> u32;

    fn status(&self) -> DecoderStatus;

    /// Drop stream bookkeeping and return to `Closed`.
    fn close(&mut self);
}

/// The engine's single decoder slot, tagged over the concrete decoders.
#[derive(Debug)]
pub enum Decoder {
    WavPcm(WavPcmDecoder),
    Adpcm(AdpcmDecoder),
    Alaw(AlawDecoder),
    Ulaw(UlawDecoder),
    Mp3(Mp3Decoder),
}

impl Decoder {
    /// Construct the decoder matching a detected codec, or `None` for
    /// [`CodecKind::Unknown`].
    pub fn for_codec(kind: CodecKind) -> Option<Decoder> {
        match kind {
            CodecKind::WavPcm => Some(Decoder::WavPcm(WavPcmDecoder::new())),
            CodecKind::WavAdpcm => Some(Decoder::Adpcm(AdpcmDecoder::new())),
            CodecKind::WavAlaw => Some(Decoder::Alaw(AlawDecoder::new())),
            CodecKind::WavUlaw => Some(Decoder::Ulaw(UlawDecoder::new())),
            CodecKind::Mp3 => Some(Decoder::Mp3(Mp3Decoder::new())),
            CodecKind::Unknown => None,
        }
    }

    fn inner(&self) -> &dyn Decode {
        match self {
            Decoder::WavPcm(d) => d,
            Decoder::Adpcm(d) => d,
            Decoder::Alaw(d) => d,
            Decoder::Ulaw(d) => d,
            Decoder::Mp3(d) => d,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Decode {
        match self {
            Decoder::WavPcm(d) => d,
            Decoder::Adpcm(d) => d,
            Decoder::Alaw(d) => d,
            Decoder::Ulaw(d) => d,
            Decoder::Mp3(d) => d,
        }
    }
}

impl Decode for Decoder {
    fn open(&mut self, stream: &mut MediaStream) -> Result<()> {
        self.inner_mut().open(stream)
    }

    fn decode(&mut self, stream: &mut MediaStream, out: &mut [Sample]) -> usize {
        self.inner_mut().decode(stream, out)
    }

    fn seek(&mut self, stream: &mut MediaStream, sec: u32) {
        self.inner_mut().seek(stream, sec)
    }

    fn position_sec(&self) -> u32 {
        self.inner().position_sec()
    }

    fn duration_sec(&self) -> u32 {
        self.inner().duration_sec()
    }

    fn sample_rate(&self) -> u32 {
        self.inner().sample_rate()
    }

    fn status(&self) -> DecoderStatus {
        self.inner().status()
    }

    fn close(&mut self) {
        self.inner_mut().close()
    }
}
