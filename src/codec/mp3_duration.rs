//! MP3 duration estimation without decoding.
//!
//! A Xing/Info header gives the exact frame count; otherwise the frame
//! walk accumulates bitrates until the running average settles, and the
//! duration follows from the file size.

use tracing::debug;

use crate::stream::MediaStream;

/// Bytes scanned for the first valid frame header.
const SYNC_SCAN_LIMIT: u32 = 8192;

/// Frames walked before giving up on convergence.
const MAX_SCAN_FRAMES: u32 = 200;

/// kbit/s by [mpeg1?][layer][bitrate index]; index 0 (free) and 15
/// (reserved) stay zero.
const BITRATE_KBPS: [[[u16; 16]; 3]; 2] = [
    // MPEG1
    [
        [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448, 0],
        [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 0],
        [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 0],
    ],
    // MPEG2 / MPEG2.5
    [
        [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256, 0],
        [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0],
        [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0],
    ],
];

/// Hz by [version bits][sample-rate index]; version bits 1 is reserved.
const SAMPLE_RATE_HZ: [[u32; 4]; 4] = [
    [11_025, 12_000, 8_000, 0],  // MPEG2.5
    [0, 0, 0, 0],                // reserved
    [22_050, 24_000, 16_000, 0], // MPEG2
    [44_100, 48_000, 32_000, 0], // MPEG1
];

/// Samples per frame by [version bits][layer index].
const SAMPLES_PER_FRAME: [[u16; 3]; 4] = [
    [384, 1152, 576],  // MPEG2.5
    [0, 0, 0],         // reserved
    [384, 1152, 576],  // MPEG2
    [384, 1152, 1152], // MPEG1
];

/// Estimation result. `exact` is set when a Xing/Info frame count was
/// found; otherwise the duration is an averaged-bitrate approximation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mp3Info {
    pub duration_sec: u32,
    pub sample_rate: u32,
    pub channels: u8,
    pub exact: bool,
}

/// One parsed MPEG frame header.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameInfo {
    /// Bits per second.
    pub bitrate: u32,
    pub sample_rate: u32,
    pub samples_per_frame: u16,
    pub frame_size: u16,
    pub channels: u8,
    /// Raw version bits from the header.
    pub version_bits: u8,
}

/// Validate and decode a 4-byte frame header.
pub(crate) fn parse_frame_header(h: &[u8; 4]) -> Option<FrameInfo> {
    if h[0] != 0xFF || h[1] & 0xE0 != 0xE0 {
        return None;
    }
    let version_bits = (h[1] >> 3) & 3;
    let layer_bits = (h[1] >> 1) & 3;
    let bitrate_idx = (h[2] >> 4) & 0xF;
    let rate_idx = (h[2] >> 2) & 3;
    let padding = (h[2] >> 1) & 1;
    let mode = (h[3] >> 6) & 3;

    if version_bits == 1 || layer_bits == 0 || bitrate_idx == 0 || bitrate_idx == 15 || rate_idx == 3
    {
        return None;
    }

    let v_idx = if version_bits == 3 { 0 } else { 1 }; // MPEG1 vs MPEG2/2.5
    let l_idx = (3 - layer_bits) as usize; // 0 = Layer 1

    let bitrate = u32::from(BITRATE_KBPS[v_idx][l_idx][bitrate_idx as usize]) * 1000;
    let sample_rate = SAMPLE_RATE_HZ[version_bits as usize][rate_idx as usize];
    let samples_per_frame = SAMPLES_PER_FRAME[version_bits as usize][l_idx];
    if bitrate == 0 || sample_rate == 0 || samples_per_frame == 0 {
        return None;
    }

    let frame_size = if l_idx == 0 {
        (12 * bitrate / sample_rate + u32::from(padding)) * 4
    } else {
        u32::from(samples_per_frame) / 8 * bitrate / sample_rate + u32::from(padding)
    };

    Some(FrameInfo {
        bitrate,
        sample_rate,
        samples_per_frame,
        frame_size: frame_size as u16,
        channels: if mode == 3 { 1 } else { 2 },
        version_bits,
    })
}

/// Length of an ID3v2 prefix (tag header plus syncsafe size), or zero.
pub(crate) fn id3v2_len(stream: &mut MediaStream) -> u32 {
    if stream.seek(0).is_err() {
        return 0;
    }
    let mut hdr = [0u8; 10];
    if stream.read(&mut hdr) < 10 {
        return 0;
    }
    if &hdr[0..3] != b"ID3" {
        return 0;
    }
    let size = (u32::from(hdr[6] & 0x7F) << 21)
        | (u32::from(hdr[7] & 0x7F) << 14)
        | (u32::from(hdr[8] & 0x7F) << 7)
        | u32::from(hdr[9] & 0x7F);
    size + 10
}

/// Estimate the stream's duration. The stream position is left unspecified;
/// callers reposition afterwards.
pub fn estimate(stream: &mut MediaStream) -> Mp3Info {
    let mut info = Mp3Info::default();
    let file_size = stream.size();

    let data_start = id3v2_len(stream);
    if stream.seek(data_start).is_err() {
        return info;
    }

    // Find the first valid frame header.
    let mut pos = data_start;
    let mut first: Option<FrameInfo> = None;
    let mut hdr = [0u8; 4];
    while pos < data_start.saturating_add(SYNC_SCAN_LIMIT) {
        if stream.seek(pos).is_err() || stream.read(&mut hdr) < 4 {
            return info;
        }
        if let Some(fi) = parse_frame_header(&hdr) {
            first = Some(fi);
            break;
        }
        pos += 1;
    }
    let Some(first) = first else {
        return info;
    };
    info.sample_rate = first.sample_rate;
    info.channels = first.channels;
    let first_frame_pos = pos;

    // Xing/Info header sits after the side info of the first frame.
    let mut xbuf = [0u8; 256];
    let _ = stream.seek(first_frame_pos);
    let want = (first.frame_size as usize).min(xbuf.len());
    let got = stream.read(&mut xbuf[..want]);

    let is_mpeg1 = first.version_bits == 3;
    let side_offset = 4 + if is_mpeg1 {
        if first.channels == 1 { 17 } else { 32 }
    } else if first.channels == 1 {
        9
    } else {
        17
    };

    if side_offset + 12 < got {
        let tag = &xbuf[side_offset..side_offset + 4];
        if tag == b"Xing" || tag == b"Info" {
            let flags = u32::from_be_bytes([
                xbuf[side_offset + 4],
                xbuf[side_offset + 5],
                xbuf[side_offset + 6],
                xbuf[side_offset + 7],
            ]);
            if flags & 1 != 0 {
                let total_frames = u32::from_be_bytes([
                    xbuf[side_offset + 8],
                    xbuf[side_offset + 9],
                    xbuf[side_offset + 10],
                    xbuf[side_offset + 11],
                ]);
                info.duration_sec = (u64::from(total_frames)
                    * u64::from(first.samples_per_frame)
                    / u64::from(first.sample_rate)) as u32;
                info.exact = true;
                debug!(
                    "Xing frame count {total_frames}: exact duration {} s",
                    info.duration_sec
                );
                return info;
            }
        }
    }

    // No Xing: walk frames until the running bitrate average converges
    // (two consecutive 5-frame checkpoints within 1 %).
    let mut total_bitrate = 0u64;
    let mut frame_count = 0u32;
    let mut prev_avg = 0u32;
    let mut convergence = 0u32;

    pos = first_frame_pos;
    while frame_count < MAX_SCAN_FRAMES && pos + 4 < file_size {
        if stream.seek(pos).is_err() || stream.read(&mut hdr) < 4 {
            break;
        }
        let Some(fi) = parse_frame_header(&hdr) else {
            pos += 1;
            continue;
        };
        total_bitrate += u64::from(fi.bitrate);
        frame_count += 1;
        pos += u32::from(fi.frame_size.max(1));

        if frame_count >= 5 && frame_count % 5 == 0 {
            let avg = (total_bitrate / u64::from(frame_count)) as u32;
            if prev_avg > 0 {
                let delta = avg.abs_diff(prev_avg);
                if delta * 100 < prev_avg {
                    convergence += 1;
                    if convergence >= 2 {
                        break;
                    }
                } else {
                    convergence = 0;
                }
            }
            prev_avg = avg;
        }
    }

    if frame_count > 0 && total_bitrate > 0 {
        let avg_bitrate = total_bitrate / u64::from(frame_count);
        let data_size = u64::from(file_size - data_start);
        info.duration_sec = (data_size * 8 / avg_bitrate) as u32;
        debug!(
            "averaged {frame_count} frames at {avg_bitrate} bps: duration {} s",
            info.duration_sec
        );
    }
    info
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::codec::testutil::write_stream;

    /// Build a valid CBR frame header: MPEG1 Layer3, given bitrate index,
    /// 44.1 kHz, stereo.
    pub(crate) fn frame_header(bitrate_idx: u8) -> [u8; 4] {
        [0xFF, 0xFB, (bitrate_idx << 4) | 0x00, 0x00]
    }

    /// A full CBR frame with the header and zero payload.
    pub(crate) fn cbr_frame(bitrate_idx: u8) -> Vec<u8> {
        let hdr = frame_header(bitrate_idx);
        let fi = parse_frame_header(&hdr).unwrap();
        let mut v = hdr.to_vec();
        v.resize(fi.frame_size as usize, 0);
        v
    }

    /// A CBR file of `frames` frames, optionally behind an ID3v2 tag.
    pub(crate) fn cbr_file(frames: usize, bitrate_idx: u8, id3_len: u32) -> Vec<u8> {
        let mut v = Vec::new();
        if id3_len > 0 {
            v.extend_from_slice(b"ID3\x04\x00\x00");
            v.push(((id3_len >> 21) & 0x7F) as u8);
            v.push(((id3_len >> 14) & 0x7F) as u8);
            v.push(((id3_len >> 7) & 0x7F) as u8);
            v.push((id3_len & 0x7F) as u8);
            v.extend(std::iter::repeat(0u8).take(id3_len as usize));
        }
        let frame = cbr_frame(bitrate_idx);
        for _ in 0..frames {
            v.extend_from_slice(&frame);
        }
        v
    }

    #[test]
    fn header_parsing_rejects_reserved_fields() {
        // Good header first.
        assert!(parse_frame_header(&[0xFF, 0xFB, 0x90, 0x00]).is_some());
        // Broken sync.
        assert!(parse_frame_header(&[0xFE, 0xFB, 0x90, 0x00]).is_none());
        // Reserved version bits (01).
        assert!(parse_frame_header(&[0xFF, 0xEB, 0x90, 0x00]).is_none());
        // Reserved layer (00).
        assert!(parse_frame_header(&[0xFF, 0xF9, 0x90, 0x00]).is_none());
        // Free bitrate (0) and bad bitrate (15).
        assert!(parse_frame_header(&[0xFF, 0xFB, 0x00, 0x00]).is_none());
        assert!(parse_frame_header(&[0xFF, 0xFB, 0xF0, 0x00]).is_none());
        // Reserved sample-rate index (3).
        assert!(parse_frame_header(&[0xFF, 0xFB, 0x9C, 0x00]).is_none());
    }

    #[test]
    fn frame_geometry_mpeg1_layer3() {
        // 128 kbps (index 9), 44.1 kHz stereo.
        let fi = parse_frame_header(&[0xFF, 0xFB, 0x90, 0x00]).unwrap();
        assert_eq!(fi.bitrate, 128_000);
        assert_eq!(fi.sample_rate, 44_100);
        assert_eq!(fi.samples_per_frame, 1152);
        assert_eq!(fi.channels, 2);
        // 144 * 128000 / 44100 = 417 (padding clear).
        assert_eq!(fi.frame_size, 417);
    }

    #[test]
    fn mono_mode_detected() {
        let fi = parse_frame_header(&[0xFF, 0xFB, 0x90, 0xC0]).unwrap();
        assert_eq!(fi.channels, 1);
    }

    #[test]
    fn cbr_estimate_within_one_percent() {
        // 400 frames at 128 kbps, 44.1 kHz: 400 * 1152 / 44100 = 10.44 s.
        let bytes = cbr_file(400, 9, 0);
        let (_d, mut s) = write_stream(&bytes, "c.mp3");
        let info = estimate(&mut s);
        assert!(!info.exact);
        assert_eq!(info.sample_rate, 44_100);
        assert_eq!(info.channels, 2);
        // File is exactly 400 frames of CBR data, so size * 8 / bitrate
        // reproduces the true duration to the second.
        assert_eq!(info.duration_sec, 10);
    }

    #[test]
    fn id3_tag_skipped_before_scan() {
        let bytes = cbr_file(400, 9, 500);
        let (_d, mut s) = write_stream(&bytes, "c.mp3");
        let info = estimate(&mut s);
        assert_eq!(info.sample_rate, 44_100);
        assert_eq!(info.duration_sec, 10);
    }

    #[test]
    fn xing_frame_count_gives_exact_duration() {
        // First frame carries a Xing header with a frame count that does
        // not match the actual (tiny) file: the exact path must win.
        let hdr = frame_header(9);
        let fi = parse_frame_header(&hdr).unwrap();
        let mut frame = hdr.to_vec();
        frame.resize(fi.frame_size as usize, 0);
        let side_offset = 4 + 32; // MPEG1 stereo
        frame[side_offset..side_offset + 4].copy_from_slice(b"Xing");
        frame[side_offset + 4..side_offset + 8].copy_from_slice(&1u32.to_be_bytes());
        // 1000 frames * 1152 / 44100 = 26.1 s.
        frame[side_offset + 8..side_offset + 12].copy_from_slice(&1000u32.to_be_bytes());

        let (_d, mut s) = write_stream(&frame, "x.mp3");
        let info = estimate(&mut s);
        assert!(info.exact);
        assert_eq!(info.duration_sec, 26);
    }

    #[test]
    fn garbage_before_first_frame_is_scanned_past() {
        let mut bytes = vec![0x11u8; 300];
        bytes.extend_from_slice(&cbr_file(100, 9, 0));
        let (_d, mut s) = write_stream(&bytes, "g.mp3");
        let info = estimate(&mut s);
        assert_eq!(info.sample_rate, 44_100);
        assert!(info.duration_sec >= 2);
    }

    #[test]
    fn no_frames_yields_empty_info() {
        let bytes = vec![0u8; 2000];
        let (_d, mut s) = write_stream(&bytes, "z.mp3");
        let info = estimate(&mut s);
        assert_eq!(info.duration_sec, 0);
        assert_eq!(info.sample_rate, 0);
    }
}
