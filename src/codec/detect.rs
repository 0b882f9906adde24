//! Codec classification by header sniffing.

use tracing::debug;

use crate::stream::MediaStream;

/// How many bytes of the file head the detector inspects.
const SNIFF_LEN: usize = 512;

/// Detected stream format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    Unknown,
    WavPcm,
    WavAdpcm,
    WavAlaw,
    WavUlaw,
    Mp3,
}

/// Classify the stream. Reads up to 512 bytes from offset 0 and restores
/// the position to 0 afterwards.
///
/// WAV files are classified by the `fmt ` chunk's audio-format code;
/// unrecognized codes fall back to PCM as the best guess. Non-RIFF data is
/// checked for an ID3 tag or an MPEG sync word, then the file extension
/// decides.
pub fn detect(stream: &mut MediaStream) -> CodecKind {
    let _ = stream.seek(0);
    let mut hdr = [0u8; SNIFF_LEN];
    let n = stream.read(&mut hdr);
    let _ = stream.seek(0);

    if n < 12 {
        return by_extension(stream);
    }

    if &hdr[0..4] == b"RIFF" && &hdr[8..12] == b"WAVE" {
        // Walk chunks looking for `fmt `.
        let mut pos = 12usize;
        while pos + 8 <= n {
            let chunk_size = u32::from_le_bytes([
                hdr[pos + 4],
                hdr[pos + 5],
                hdr[pos + 6],
                hdr[pos + 7],
            ]) as usize;
            if &hdr[pos..pos + 4] == b"fmt " && pos + 10 <= n {
                let format = u16::from_le_bytes([hdr[pos + 8], hdr[pos + 9]]);
                let kind = match format {
                    1 => CodecKind::WavPcm,
                    6 => CodecKind::WavAlaw,
                    7 => CodecKind::WavUlaw,
                    0x11 => CodecKind::WavAdpcm,
                    other => {
                        debug!("WAV format code {other:#x} not recognized, assuming PCM");
                        CodecKind::WavPcm
                    }
                };
                return kind;
            }
            pos += 8 + chunk_size;
            if chunk_size & 1 == 1 {
                pos += 1; // chunk padding
            }
        }
        return CodecKind::WavPcm;
    }

    if &hdr[0..3] == b"ID3" {
        return CodecKind::Mp3;
    }
    if hdr[0] == 0xFF && hdr[1] & 0xE0 == 0xE0 {
        return CodecKind::Mp3;
    }

    by_extension(stream)
}

fn by_extension(stream: &MediaStream) -> CodecKind {
    match stream.extension().as_str() {
        "mp3" => CodecKind::Mp3,
        "wav" => CodecKind::WavPcm,
        _ => CodecKind::Unknown,
    }
}
