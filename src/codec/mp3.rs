//! MP3 decoder: a buffering wrapper around the `rmp3` fixed-point frame
//! decoder.
//!
//! The wrapper owns the input window (compact + refill), skips non-audio
//! frames, downmixes to mono and parks frame overflow in a leftover slot.
//! Seeking is byte-proportional: `byte = file_size * sec / duration`, with
//! the decoder reinitialized and the reported position pinned to
//! `sec * sample_rate`. The approximation is intentional; compressed
//! streams are not exactly seekable here.

use rmp3::{Frame, RawDecoder, MAX_SAMPLES_PER_FRAME};
use tracing::debug;

use crate::codec::{mp3_duration, Decode, DecoderStatus};
use crate::error::Result;
use crate::stream::MediaStream;
use crate::types::Sample;

/// Input window size in bytes.
const IN_BUF_SIZE: usize = 16384;

/// Refill when the window holds less than this; larger than any single
/// frame's header-to-header distance never needs to be guaranteed because
/// an underflow simply triggers another refill.
const REFILL_WATERMARK: usize = 1024;

/// Largest mono remainder a frame can leave behind (one MPEG1 granule
/// pair).
const LEFTOVER_MAX: usize = 1152;

pub struct Mp3Decoder {
    raw: RawDecoder,
    in_buf: Box<[u8; IN_BUF_SIZE]>,
    in_len: usize,
    in_pos: usize,
    eof: bool,
    frame_pcm: Box<[Sample; MAX_SAMPLES_PER_FRAME]>,
    leftover: Box<[Sample; LEFTOVER_MAX]>,
    leftover_len: usize,
    leftover_pos: usize,
    sample_rate: u32,
    channels: u16,
    duration_sec: u32,
    total_samples_decoded: u64,
    status: DecoderStatus,
}

impl std::fmt::Debug for Mp3Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mp3Decoder")
            .field("in_len", &self.in_len)
            .field("in_pos", &self.in_pos)
            .field("eof", &self.eof)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("duration_sec", &self.duration_sec)
            .field("total_samples_decoded", &self.total_samples_decoded)
            .field("status", &self.status)
            .finish()
    }
}

impl Mp3Decoder {
    pub fn new() -> Self {
        Self {
            raw: RawDecoder::new(),
            in_buf: Box::new([0; IN_BUF_SIZE]),
            in_len: 0,
            in_pos: 0,
            eof: false,
            frame_pcm: Box::new([0; MAX_SAMPLES_PER_FRAME]),
            leftover: Box::new([0; LEFTOVER_MAX]),
            leftover_len: 0,
            leftover_pos: 0,
            sample_rate: 44_100,
            channels: 2,
            duration_sec: 0,
            total_samples_decoded: 0,
            status: DecoderStatus::Closed,
        }
    }

    /// Compact the unconsumed remainder to the window origin and read more
    /// bytes behind it. Sets `eof` when the stream runs dry.
    fn refill(&mut self, stream: &mut MediaStream) {
        if self.in_pos > 0 {
            let remaining = self.in_len - self.in_pos;
            self.in_buf.copy_within(self.in_pos..self.in_len, 0);
            self.in_len = remaining;
            self.in_pos = 0;
        }
        let space = IN_BUF_SIZE - self.in_len;
        if space > 0 {
            let n = stream.read(&mut self.in_buf[self.in_len..IN_BUF_SIZE]);
            self.in_len += n;
            if n == 0 {
                self.eof = true;
            }
        }
    }

    /// Reset the input window and frame decoder state.
    fn reset_input(&mut self) {
        self.raw = RawDecoder::new();
        self.in_len = 0;
        self.in_pos = 0;
        self.eof = false;
        self.leftover_len = 0;
        self.leftover_pos = 0;
    }
}

impl Default for Mp3Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decode for Mp3Decoder {
    fn open(&mut self, stream: &mut MediaStream) -> Result<()> {
        self.close();
        self.reset_input();
        self.total_samples_decoded = 0;

        // Seed duration, rate and channel count without decoding.
        let info = mp3_duration::estimate(stream);
        self.duration_sec = info.duration_sec;
        self.sample_rate = if info.sample_rate > 0 { info.sample_rate } else { 44_100 };
        self.channels = if info.channels > 0 { u16::from(info.channels) } else { 2 };

        // Position the stream past any ID3v2 tag.
        let data_start = mp3_duration::id3v2_len(stream);
        stream.seek(data_start)?;

        self.status = DecoderStatus::Ready;
        Ok(())
    }

    fn decode(&mut self, stream: &mut MediaStream, out: &mut [Sample]) -> usize {
        if !matches!(self.status, DecoderStatus::Ready | DecoderStatus::Playing) {
            return 0;
        }
        self.status = DecoderStatus::Playing;

        let mut total = 0usize;

        // Leftover from the previous frame first.
        if self.leftover_pos < self.leftover_len {
            let avail = self.leftover_len - self.leftover_pos;
            let n = avail.min(out.len());
            out[..n].copy_from_slice(&self.leftover[self.leftover_pos..self.leftover_pos + n]);
            self.leftover_pos += n;
            total += n;
            self.total_samples_decoded += n as u64;
            if self.leftover_pos >= self.leftover_len {
                self.leftover_len = 0;
                self.leftover_pos = 0;
            }
        }

        while total < out.len() {
            if self.in_len - self.in_pos < REFILL_WATERMARK && !self.eof {
                self.refill(stream);
            }
            if self.in_pos >= self.in_len {
                break;
            }

            match self
                .raw
                .next(&self.in_buf[self.in_pos..self.in_len], &mut *self.frame_pcm)
            {
                Some((Frame::Audio(audio), consumed)) => {
                    self.in_pos += consumed.max(1);

                    if audio.sample_rate() > 0 {
                        self.sample_rate = audio.sample_rate();
                    }
                    self.channels = audio.channels().max(1);

                    let frames = audio.sample_count();
                    let samples = audio.samples();
                    let ch = usize::from(self.channels);

                    let space = out.len() - total;
                    let take = frames.min(space);
                    for i in 0..take {
                        out[total + i] = downmix(samples, i, ch);
                    }
                    total += take;
                    self.total_samples_decoded += take as u64;

                    if take < frames {
                        // Out of caller space: park the rest of the frame.
                        let rem = (frames - take).min(LEFTOVER_MAX);
                        for i in 0..rem {
                            self.leftover[i] = downmix(samples, take + i, ch);
                        }
                        self.leftover_len = rem;
                        self.leftover_pos = 0;
                        break;
                    }
                }
                Some((_, consumed)) => {
                    // Non-audio frame (embedded tag data); skip it.
                    self.in_pos += consumed.max(1);
                }
                None => {
                    // No complete frame in the window: refill, and if the
                    // window was already full of unsyncable bytes, drop it.
                    if self.eof {
                        break;
                    }
                    let held = self.in_len - self.in_pos;
                    self.refill(stream);
                    if self.in_len - self.in_pos == held {
                        if held == IN_BUF_SIZE {
                            debug!("no frame sync in a full window, resyncing");
                            self.in_pos = self.in_len;
                        } else {
                            break;
                        }
                    }
                }
            }
        }

        if total == 0 {
            self.status = DecoderStatus::Closed;
        }
        total
    }

    fn seek(&mut self, stream: &mut MediaStream, sec: u32) {
        let file_size = stream.size();
        let byte_pos = if self.duration_sec > 0 {
            (u64::from(file_size) * u64::from(sec) / u64::from(self.duration_sec))
                .min(u64::from(file_size)) as u32
        } else {
            0
        };
        let _ = stream.seek(byte_pos);
        self.reset_input();
        self.total_samples_decoded = u64::from(sec) * u64::from(self.sample_rate);
        if self.status == DecoderStatus::Closed {
            self.status = DecoderStatus::Ready;
        }
    }

    fn position_sec(&self) -> u32 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.total_samples_decoded / u64::from(self.sample_rate)) as u32
    }

    fn duration_sec(&self) -> u32 {
        self.duration_sec
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn status(&self) -> DecoderStatus {
        self.status
    }

    fn close(&mut self) {
        self.status = DecoderStatus::Closed;
        self.in_len = 0;
        self.in_pos = 0;
        self.leftover_len = 0;
        self.leftover_pos = 0;
        self.total_samples_decoded = 0;
    }
}

/// Arithmetic mean of one frame's channels at index `i`.
fn downmix(samples: &[Sample], i: usize, channels: usize) -> Sample {
    if channels == 2 {
        ((i32::from(samples[i * 2]) + i32::from(samples[i * 2 + 1])) / 2) as Sample
    } else {
        samples[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::mp3_duration::tests::cbr_file;
    use crate::codec::testutil::write_stream;

    #[test]
    fn open_seeds_metadata_from_estimator() {
        let bytes = cbr_file(400, 9, 0);
        let (_d, mut s) = write_stream(&bytes, "t.mp3");
        let mut dec = Mp3Decoder::new();
        dec.open(&mut s).unwrap();
        assert_eq!(dec.sample_rate(), 44_100);
        assert_eq!(dec.duration_sec(), 10);
        assert_eq!(dec.status(), DecoderStatus::Ready);
        assert_eq!(dec.position_sec(), 0);
    }

    #[test]
    fn open_skips_id3v2() {
        let bytes = cbr_file(400, 9, 700);
        let (_d, mut s) = write_stream(&bytes, "t.mp3");
        let mut dec = Mp3Decoder::new();
        dec.open(&mut s).unwrap();
        // Stream sits right after the 10-byte header + 700-byte tag.
        assert_eq!(s.tell(), 710);
    }

    #[test]
    fn decode_produces_mono_and_reaches_eof() {
        // Zero-payload frames decode to silence; the decoder must still
        // step through them and terminate at the end of data.
        let bytes = cbr_file(40, 9, 0);
        let (_d, mut s) = write_stream(&bytes, "t.mp3");
        let mut dec = Mp3Decoder::new();
        dec.open(&mut s).unwrap();

        let mut out = [0i16; 1024];
        let mut produced = 0usize;
        loop {
            let n = dec.decode(&mut s, &mut out);
            if n == 0 {
                break;
            }
            assert!(out[..n].iter().all(|&v| v == 0), "zero frames decode to silence");
            produced += n;
        }
        assert_eq!(dec.status(), DecoderStatus::Closed);
        // 40 frames x 1152 samples, allowing for decoder priming losses.
        assert!(produced > 30 * 1152, "only {produced} samples");
        assert!(produced <= 40 * 1152);
    }

    #[test]
    fn leftover_carries_frame_overflow() {
        let bytes = cbr_file(8, 9, 0);
        let (_d, mut s) = write_stream(&bytes, "t.mp3");
        let mut dec = Mp3Decoder::new();
        dec.open(&mut s).unwrap();

        // Ask for less than one frame: the remainder must arrive on the
        // following calls without losing any samples.
        let mut out = [0i16; 100];
        let mut produced = 0usize;
        loop {
            let n = dec.decode(&mut s, &mut out);
            if n == 0 {
                break;
            }
            produced += n;
        }
        assert!(produced > 0);
        assert_eq!(produced % 1152, 0, "partial frames were dropped");
    }

    #[test]
    fn seek_is_byte_proportional_and_resets_position() {
        let bytes = cbr_file(400, 9, 0);
        let (_d, mut s) = write_stream(&bytes, "t.mp3");
        let mut dec = Mp3Decoder::new();
        dec.open(&mut s).unwrap();
        assert_eq!(dec.duration_sec(), 10);

        dec.seek(&mut s, 5);
        assert_eq!(dec.position_sec(), 5);
        // Roughly the middle of the file.
        let mid = bytes.len() as u32 / 2;
        assert!(s.tell().abs_diff(mid) < 1000);

        // Still decodes after the seek.
        let mut out = [0i16; 2048];
        assert!(dec.decode(&mut s, &mut out) > 0);
    }

    #[test]
    fn garbage_file_closes_without_producing() {
        let bytes = vec![0xA5u8; 4000];
        let (_d, mut s) = write_stream(&bytes, "t.mp3");
        let mut dec = Mp3Decoder::new();
        dec.open(&mut s).unwrap();
        let mut out = [0i16; 512];
        assert_eq!(dec.decode(&mut s, &mut out), 0);
        assert_eq!(dec.status(), DecoderStatus::Closed);
    }
}
