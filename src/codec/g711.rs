//! G.711 A-law and u-law (WAV formats 6 and 7).
//!
//! Table-less inverse companding by bit manipulation. One byte per sample
//! per channel, so seeking is byte-exact.

use crate::codec::wav::parse_wav;
use crate::codec::{Decode, DecoderStatus};
use crate::error::{Error, Result};
use crate::stream::MediaStream;
use crate::types::Sample;

/// Expand one A-law byte to linear PCM.
pub fn alaw_to_linear(alaw: u8) -> Sample {
    let a = alaw ^ 0x55;
    let mut t = i32::from(a & 0x0F) << 4;
    let seg = (a >> 4) & 0x07;
    match seg {
        0 => t += 8,
        1 => t += 0x108,
        _ => {
            t += 0x108;
            t <<= seg - 1;
        }
    }
    if a & 0x80 != 0 {
        t as Sample
    } else {
        -t as Sample
    }
}

/// Expand one u-law byte to linear PCM.
pub fn ulaw_to_linear(ulaw: u8) -> Sample {
    let u = !ulaw;
    let sign = u & 0x80;
    let exponent = (u >> 4) & 0x07;
    let mantissa = u & 0x0F;
    let mut val = ((i32::from(mantissa) << 3) + 0x84) << exponent;
    val -= 0x84;
    if sign != 0 {
        -val as Sample
    } else {
        val as Sample
    }
}

/// Which companding law a [`G711Decoder`] expands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Law {
    Alaw,
    Ulaw,
}

impl Law {
    fn wav_format(self) -> u16 {
        match self {
            Law::Alaw => 6,
            Law::Ulaw => 7,
        }
    }

    fn expand(self, byte: u8) -> Sample {
        match self {
            Law::Alaw => alaw_to_linear(byte),
            Law::Ulaw => ulaw_to_linear(byte),
        }
    }
}

/// Shared decoder body for both companding laws.
#[derive(Debug)]
struct G711Decoder {
    law: Law,
    channels: u16,
    sample_rate: u32,
    data_offset: u32,
    data_size: u32,
    bytes_read: u32,
    scratch: Vec<u8>,
    status: DecoderStatus,
}

impl G711Decoder {
    fn new(law: Law) -> Self {
        Self {
            law,
            channels: 1,
            sample_rate: 8000,
            data_offset: 0,
            data_size: 0,
            bytes_read: 0,
            scratch: Vec::new(),
            status: DecoderStatus::Closed,
        }
    }

    fn open(&mut self, stream: &mut MediaStream) -> Result<()> {
        self.close();
        let layout = parse_wav(stream)?;
        if layout.audio_format != self.law.wav_format() {
            return Err(Error::Unsupported(format!(
                "WAV format code {:#x} does not match {:?}",
                layout.audio_format, self.law
            )));
        }
        if layout.channels == 0 {
            return Err(Error::Malformed("zero channels"));
        }
        self.channels = layout.channels;
        self.sample_rate = layout.sample_rate;
        self.data_offset = layout.data_offset;
        self.data_size = layout.data_size;
        self.bytes_read = 0;
        stream.seek(self.data_offset)?;
        self.status = DecoderStatus::Ready;
        Ok(())
    }

    fn decode(&mut self, stream: &mut MediaStream, out: &mut [Sample]) -> usize {
        if !matches!(self.status, DecoderStatus::Ready | DecoderStatus::Playing) {
            return 0;
        }
        self.status = DecoderStatus::Playing;

        let channels = u32::from(self.channels);
        let bytes_left = self.data_size.saturating_sub(self.bytes_read);
        let frames = (out.len() as u32).min(bytes_left / channels);
        if frames == 0 {
            self.status = DecoderStatus::Closed;
            return 0;
        }

        let raw_bytes = (frames * channels) as usize;
        self.scratch.resize(raw_bytes, 0);
        let read = stream.read(&mut self.scratch[..raw_bytes]);
        let frames = (read as u32 / channels) as usize;
        if frames == 0 {
            self.status = DecoderStatus::Closed;
            return 0;
        }
        self.bytes_read += frames as u32 * channels;

        let ch = self.channels as usize;
        for (i, slot) in out.iter_mut().enumerate().take(frames) {
            let mut sum = 0i32;
            for c in 0..ch {
                sum += i32::from(self.law.expand(self.scratch[i * ch + c]));
            }
            *slot = (sum / ch as i32) as Sample;
        }
        frames
    }

    fn seek(&mut self, stream: &mut MediaStream, sec: u32) {
        let byte_pos = sec
            .saturating_mul(self.sample_rate)
            .saturating_mul(u32::from(self.channels))
            .min(self.data_size);
        self.bytes_read = byte_pos;
        let _ = stream.seek(self.data_offset + byte_pos);
        if self.status == DecoderStatus::Closed {
            self.status = DecoderStatus::Ready;
        }
    }

    fn position_sec(&self) -> u32 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        self.bytes_read / u32::from(self.channels) / self.sample_rate
    }

    fn duration_sec(&self) -> u32 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        self.data_size / u32::from(self.channels) / self.sample_rate
    }

    fn close(&mut self) {
        self.status = DecoderStatus::Closed;
        self.bytes_read = 0;
    }
}

macro_rules! g711_decoder {
    ($name:ident, $law:expr, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug)]
        pub struct $name(G711Decoder);

        impl $name {
            pub fn new() -> Self {
                Self(G711Decoder::new($law))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Decode for $name {
            fn open(&mut self, stream: &mut MediaStream) -> Result<()> {
                self.0.open(stream)
            }

            fn decode(&mut self, stream: &mut MediaStream, out: &mut [Sample]) -> usize {
                self.0.decode(stream, out)
            }

            fn seek(&mut self, stream: &mut MediaStream, sec: u32) {
                self.0.seek(stream, sec)
            }

            fn position_sec(&self) -> u32 {
                self.0.position_sec()
            }

            fn duration_sec(&self) -> u32 {
                self.0.duration_sec()
            }

            fn sample_rate(&self) -> u32 {
                self.0.sample_rate
            }

            fn status(&self) -> DecoderStatus {
                self.0.status
            }

            fn close(&mut self) {
                self.0.close()
            }
        }
    };
}

g711_decoder!(AlawDecoder, Law::Alaw, "A-law decoder (WAV format 6).");
g711_decoder!(UlawDecoder, Law::Ulaw, "u-law decoder (WAV format 7).");
