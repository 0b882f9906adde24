//! RIFF/WAVE container parsing and the linear-PCM decoder.
//!
//! The chunk walker here is shared by the ADPCM and G.711 decoders, which
//! live in the same container with different `fmt ` codes.

use tracing::debug;

use crate::codec::{Decode, DecoderStatus};
use crate::error::{Error, Result};
use crate::stream::MediaStream;
use crate::types::Sample;

/// Fields recovered from the `fmt ` and `data` chunks.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct WavLayout {
    pub audio_format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    /// Samples per block from the extended `fmt ` area (ADPCM), zero when
    /// absent.
    pub samples_per_block: u16,
    pub data_offset: u32,
    pub data_size: u32,
}

/// Walk the RIFF chunks and collect the `fmt ` and `data` descriptions.
pub(crate) fn parse_wav(stream: &mut MediaStream) -> Result<WavLayout> {
    stream.seek(0)?;
    let mut hdr = [0u8; 12];
    if stream.read(&mut hdr) < 12 {
        return Err(Error::Malformed("file shorter than RIFF header"));
    }
    if &hdr[0..4] != b"RIFF" || &hdr[8..12] != b"WAVE" {
        return Err(Error::Malformed("missing RIFF/WAVE magic"));
    }

    let mut layout = WavLayout::default();
    let mut got_fmt = false;
    let mut got_data = false;
    let mut pos = 12u32;

    while pos + 8 < stream.size() {
        stream.seek(pos)?;
        let mut ch = [0u8; 8];
        if stream.read(&mut ch) < 8 {
            break;
        }
        let chunk_size = u32::from_le_bytes([ch[4], ch[5], ch[6], ch[7]]);

        if &ch[0..4] == b"fmt " && chunk_size >= 16 {
            let mut f = [0u8; 20];
            let want = (chunk_size as usize).min(f.len());
            if stream.read(&mut f[..want]) < 16 {
                break;
            }
            layout.audio_format = u16::from_le_bytes([f[0], f[1]]);
            layout.channels = u16::from_le_bytes([f[2], f[3]]);
            layout.sample_rate = u32::from_le_bytes([f[4], f[5], f[6], f[7]]);
            layout.block_align = u16::from_le_bytes([f[12], f[13]]);
            layout.bits_per_sample = u16::from_le_bytes([f[14], f[15]]);
            if want >= 20 {
                layout.samples_per_block = u16::from_le_bytes([f[18], f[19]]);
            }
            got_fmt = true;
        } else if &ch[0..4] == b"data" {
            layout.data_offset = pos + 8;
            layout.data_size = chunk_size;
            got_data = true;
        }

        pos = pos.saturating_add(8 + chunk_size);
        if chunk_size & 1 == 1 {
            pos += 1;
        }
        if got_fmt && got_data {
            break;
        }
    }

    if !got_fmt {
        return Err(Error::Malformed("no fmt chunk"));
    }
    if !got_data {
        return Err(Error::Malformed("no data chunk"));
    }
    // A data chunk may claim more than the file holds (truncated write);
    // clamp so decode terminates at the real end.
    let body_end = stream.size().saturating_sub(layout.data_offset);
    if layout.data_size > body_end {
        debug!(
            "data chunk claims {} bytes but file holds {}, clamping",
            layout.data_size, body_end
        );
        layout.data_size = body_end;
    }
    Ok(layout)
}

/// Linear PCM decoder: 8/16/24/32-bit integer samples, any channel count,
/// downmixed to mono by arithmetic mean.
#[derive(Debug, Default)]
pub struct WavPcmDecoder {
    channels: u16,
    bits_per_sample: u16,
    sample_rate: u32,
    data_offset: u32,
    data_size: u32,
    bytes_read: u32,
    scratch: Vec<u8>,
    status: DecoderStatus,
}

impl WavPcmDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn bytes_per_frame(&self) -> u32 {
        u32::from(self.channels) * u32::from(self.bits_per_sample / 8)
    }
}

impl Decode for WavPcmDecoder {
    fn open(&mut self, stream: &mut MediaStream) -> Result<()> {
        self.close();
        let layout = parse_wav(stream)?;
        if layout.audio_format != 1 {
            return Err(Error::Unsupported(format!(
                "WAV format code {:#x} is not linear PCM",
                layout.audio_format
            )));
        }
        if layout.channels == 0 || layout.bits_per_sample == 0 {
            return Err(Error::Malformed("zero channels or bit depth"));
        }
        if !matches!(layout.bits_per_sample, 8 | 16 | 24 | 32) {
            return Err(Error::Unsupported(format!(
                "{}-bit PCM",
                layout.bits_per_sample
            )));
        }
        self.channels = layout.channels;
        self.bits_per_sample = layout.bits_per_sample;
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

        let bpf = self.bytes_per_frame();
        if bpf == 0 {
            return 0;
        }
        let bytes_left = self.data_size.saturating_sub(self.bytes_read);
        let frames = (out.len() as u32).min(bytes_left / bpf);
        if frames == 0 {
            self.status = DecoderStatus::Closed;
            return 0;
        }

        let raw_bytes = (frames * bpf) as usize;
        self.scratch.resize(raw_bytes, 0);
        let read = stream.read(&mut self.scratch[..raw_bytes]);
        if read == 0 {
            self.status = DecoderStatus::Closed;
            return 0;
        }
        let frames = read as u32 / bpf;
        if frames == 0 {
            self.status = DecoderStatus::Closed;
            return 0;
        }
        self.bytes_read += frames * bpf;

        let bytes_per_sample = (self.bits_per_sample / 8) as usize;
        for i in 0..frames as usize {
            let frame = &self.scratch[i * bpf as usize..];
            let mut mono_sum = 0i32;
            for ch in 0..self.channels as usize {
                let s = &frame[ch * bytes_per_sample..];
                let val = match self.bits_per_sample {
                    8 => (i32::from(s[0]) - 128) << 8,
                    16 => i32::from(i16::from_le_bytes([s[0], s[1]])),
                    24 => {
                        let mut v =
                            i32::from(s[0]) | i32::from(s[1]) << 8 | i32::from(s[2]) << 16;
                        if v & 0x80_0000 != 0 {
                            v |= -0x100_0000i32; // sign-extend from bit 23
                        }
                        v >> 8
                    }
                    32 => i32::from_le_bytes([s[0], s[1], s[2], s[3]]) >> 16,
                    _ => 0,
                };
                mono_sum += val;
            }
            out[i] = (mono_sum / i32::from(self.channels)) as Sample;
        }
        frames as usize
    }

    fn seek(&mut self, stream: &mut MediaStream, sec: u32) {
        let bpf = self.bytes_per_frame();
        let byte_pos = sec
            .saturating_mul(self.sample_rate)
            .saturating_mul(bpf)
            .min(self.data_size);
        self.bytes_read = byte_pos;
        let _ = stream.seek(self.data_offset + byte_pos);
        if self.status == DecoderStatus::Closed {
            self.status = DecoderStatus::Ready;
        }
    }

    fn position_sec(&self) -> u32 {
        let bpf = self.bytes_per_frame();
        if self.sample_rate == 0 || bpf == 0 {
            return 0;
        }
        self.bytes_read / bpf / self.sample_rate
    }

    fn duration_sec(&self) -> u32 {
        let bpf = self.bytes_per_frame();
        if self.sample_rate == 0 || bpf == 0 {
            return 0;
        }
        self.data_size / bpf / self.sample_rate
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn status(&self) -> DecoderStatus {
        self.status
    }

    fn close(&mut self) {
        self.status = DecoderStatus::Closed;
        self.bytes_read = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::testutil::{build_wav, write_stream};

    fn pcm16(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn mono_16bit_round_trip() {
        let samples: Vec<i16> = vec![0, 1000, -1000, i16::MAX, i16::MIN];
        let wav = build_wav(1, 1, 8000, 16, 2, &[], &pcm16(&samples));
        let (_d, mut s) = write_stream(&wav, "m.wav");

        let mut dec = WavPcmDecoder::new();
        dec.open(&mut s).unwrap();
        assert_eq!(dec.sample_rate(), 8000);
        assert_eq!(dec.status(), DecoderStatus::Ready);

        let mut out = [0i16; 16];
        let n = dec.decode(&mut s, &mut out);
        assert_eq!(n, 5);
        assert_eq!(&out[..5], samples.as_slice());
        assert_eq!(dec.status(), DecoderStatus::Playing);

        // Exhausted: next call reports EOF and closes.
        assert_eq!(dec.decode(&mut s, &mut out), 0);
        assert_eq!(dec.status(), DecoderStatus::Closed);
    }

    #[test]
    fn stereo_averages_to_mono() {
        let interleaved: Vec<i16> = vec![100, 300, -100, -300, 0, 500];
        let wav = build_wav(1, 2, 8000, 16, 4, &[], &pcm16(&interleaved));
        let (_d, mut s) = write_stream(&wav, "st.wav");

        let mut dec = WavPcmDecoder::new();
        dec.open(&mut s).unwrap();
        let mut out = [0i16; 8];
        let n = dec.decode(&mut s, &mut out);
        assert_eq!(n, 3);
        assert_eq!(&out[..3], &[200, -200, 250]);
    }

    #[test]
    fn eight_bit_bias_and_shift() {
        let raw: Vec<u8> = vec![128, 255, 0, 192];
        let wav = build_wav(1, 1, 8000, 8, 1, &[], &raw);
        let (_d, mut s) = write_stream(&wav, "u8.wav");

        let mut dec = WavPcmDecoder::new();
        dec.open(&mut s).unwrap();
        let mut out = [0i16; 8];
        let n = dec.decode(&mut s, &mut out);
        assert_eq!(n, 4);
        assert_eq!(&out[..4], &[0, 127 << 8, -128 << 8, 64 << 8]);
    }

    #[test]
    fn twentyfour_bit_sign_extension() {
        // +1.0 near full scale, and a negative value with bit 23 set.
        let raw: Vec<u8> = vec![
            0xFF, 0xFF, 0x7F, // 0x7FFFFF -> 0x7FFF after >> 8
            0x00, 0x00, 0x80, // -0x800000 -> -0x8000
            0x00, 0x01, 0x00, // 0x000100 -> 1
        ];
        let wav = build_wav(1, 1, 8000, 24, 3, &[], &raw);
        let (_d, mut s) = write_stream(&wav, "s24.wav");

        let mut dec = WavPcmDecoder::new();
        dec.open(&mut s).unwrap();
        let mut out = [0i16; 4];
        let n = dec.decode(&mut s, &mut out);
        assert_eq!(n, 3);
        assert_eq!(&out[..3], &[0x7FFF, -0x8000, 1]);
    }

    #[test]
    fn thirtytwo_bit_arithmetic_shift() {
        let raw: Vec<u8> = (0x7FFF_0000i32)
            .to_le_bytes()
            .into_iter()
            .chain(i32::MIN.to_le_bytes())
            .collect();
        let wav = build_wav(1, 1, 8000, 32, 4, &[], &raw);
        let (_d, mut s) = write_stream(&wav, "s32.wav");

        let mut dec = WavPcmDecoder::new();
        dec.open(&mut s).unwrap();
        let mut out = [0i16; 4];
        let n = dec.decode(&mut s, &mut out);
        assert_eq!(n, 2);
        assert_eq!(&out[..2], &[0x7FFF, -0x8000]);
    }

    #[test]
    fn rejects_non_pcm_format_code() {
        let wav = build_wav(7, 1, 8000, 8, 1, &[], &[0u8; 16]);
        let (_d, mut s) = write_stream(&wav, "ul.wav");
        let mut dec = WavPcmDecoder::new();
        assert!(dec.open(&mut s).is_err());
        assert_eq!(dec.status(), DecoderStatus::Closed);
    }

    #[test]
    fn seek_by_seconds_and_position_tracking() {
        // 8000 Hz mono 16-bit, 3 seconds of data.
        let samples: Vec<i16> = (0..24_000).map(|i| (i % 32_768) as i16).collect();
        let wav = build_wav(1, 1, 8000, 16, 2, &[], &pcm16(&samples));
        let (_d, mut s) = write_stream(&wav, "long.wav");

        let mut dec = WavPcmDecoder::new();
        dec.open(&mut s).unwrap();
        assert_eq!(dec.duration_sec(), 3);
        assert_eq!(dec.position_sec(), 0);

        dec.seek(&mut s, 2);
        assert_eq!(dec.position_sec(), 2);
        let mut out = [0i16; 4];
        let n = dec.decode(&mut s, &mut out);
        assert_eq!(n, 4);
        assert_eq!(out[0], samples[16_000]);

        // Seek past the end clamps to the data size.
        dec.seek(&mut s, 100);
        assert_eq!(dec.position_sec(), 3);
        assert_eq!(dec.decode(&mut s, &mut out), 0);
    }

    #[test]
    fn truncated_data_chunk_terminates_cleanly() {
        // Header claims 4000 bytes but only 100 are present.
        let mut wav = build_wav(1, 1, 8000, 16, 2, &[], &[0u8; 100]);
        let data_size_at = wav.len() - 100 - 4;
        wav[data_size_at..data_size_at + 4].copy_from_slice(&4000u32.to_le_bytes());
        let (_d, mut s) = write_stream(&wav, "trunc.wav");

        let mut dec = WavPcmDecoder::new();
        dec.open(&mut s).unwrap();
        let mut out = [0i16; 256];
        let n = dec.decode(&mut s, &mut out);
        assert_eq!(n, 50);
        assert_eq!(dec.decode(&mut s, &mut out), 0);
        assert_eq!(dec.status(), DecoderStatus::Closed);
    }
}
