//! Buffered random-access byte stream over a file path.
//!
//! Decoders read and seek through this adapter rather than touching the
//! filesystem directly. Reads go through an internal buffer; a seek that
//! lands inside the buffered window only moves the in-buffer cursor.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Error, Result};

/// Default read buffer size in bytes.
pub const DEFAULT_BUF_SIZE: usize = 8192;

/// Buffered reader with byte-exact positioning.
///
/// Invariant: `seek(tell())` is a no-op with respect to subsequent reads.
#[derive(Debug)]
pub struct MediaStream {
    file: Option<File>,
    path: PathBuf,
    buf: Vec<u8>,
    buf_pos: usize,
    buf_len: usize,
    /// File offset of the first buffered byte.
    file_offset: u32,
    file_size: u32,
}

impl MediaStream {
    pub fn new(buf_size: usize) -> Self {
        Self {
            file: None,
            path: PathBuf::new(),
            buf: vec![0u8; buf_size.max(1)],
            buf_pos: 0,
            buf_len: 0,
            file_offset: 0,
            file_size: 0,
        }
    }

    /// Open `path`, record its size and reset the buffer. Any previously
    /// open file is closed first.
    pub fn open(&mut self, path: &Path) -> Result<()> {
        self.close();
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        self.file = Some(file);
        self.path = path.to_path_buf();
        self.file_size = size.min(u64::from(u32::MAX)) as u32;
        Ok(())
    }

    pub fn close(&mut self) {
        self.file = None;
        self.path.clear();
        self.buf_pos = 0;
        self.buf_len = 0;
        self.file_offset = 0;
        self.file_size = 0;
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Fill `dst` from the current position. Returns the number of bytes
    /// actually read; short on end of file.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let mut total = 0;
        while total < dst.len() {
            if self.buf_pos >= self.buf_len && !self.refill() {
                break;
            }
            let chunk = (dst.len() - total).min(self.buf_len - self.buf_pos);
            dst[total..total + chunk]
                .copy_from_slice(&self.buf[self.buf_pos..self.buf_pos + chunk]);
            self.buf_pos += chunk;
            total += chunk;
        }
        total
    }

    /// Move the read position to `pos`. Positions inside the buffered
    /// window only move the cursor; anything else seeks the file and
    /// invalidates the buffer.
    pub fn seek(&mut self, pos: u32) -> Result<()> {
        let file = self.file.as_mut().ok_or(Error::StreamClosed)?;
        if pos >= self.file_offset && pos < self.file_offset + self.buf_len as u32 {
            self.buf_pos = (pos - self.file_offset) as usize;
            return Ok(());
        }
        file.seek(SeekFrom::Start(u64::from(pos)))?;
        self.file_offset = pos;
        self.buf_pos = 0;
        self.buf_len = 0;
        Ok(())
    }

    /// Current read position.
    pub fn tell(&self) -> u32 {
        self.file_offset + self.buf_pos as u32
    }

    /// Total file size in bytes.
    pub fn size(&self) -> u32 {
        self.file_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Basename after the last `/` or `\`.
    pub fn name(&self) -> String {
        let s = self.path.to_string_lossy();
        match s.rfind(['/', '\\']) {
            Some(idx) => s[idx + 1..].to_string(),
            None => s.into_owned(),
        }
    }

    /// Lower-cased suffix after the last `.` of the basename, or empty.
    pub fn extension(&self) -> String {
        let name = self.name();
        match name.rfind('.') {
            Some(idx) => name[idx + 1..].to_ascii_lowercase(),
            None => String::new(),
        }
    }

    /// Advance the buffered window past its current contents and read the
    /// next stretch of the file.
    fn refill(&mut self) -> bool {
        let Some(file) = self.file.as_mut() else {
            return false;
        };
        self.file_offset += self.buf_len as u32;
        self.buf_pos = 0;
        self.buf_len = 0;
        match file.read(&mut self.buf) {
            Ok(n) => {
                self.buf_len = n;
                n > 0
            }
            Err(e) => {
                warn!("stream read failed at {}: {e}", self.file_offset);
                false
            }
        }
    }
}

impl Default for MediaStream {
    fn default() -> Self {
        Self::new(DEFAULT_BUF_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(bytes: &[u8], name: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::File::create(&path).unwrap().write_all(bytes).unwrap();
        (dir, path)
    }

    #[test]
    fn read_whole_file_through_small_buffer() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let (_dir, path) = temp_file(&data, "a.bin");

        let mut s = MediaStream::new(64);
        s.open(&path).unwrap();
        assert_eq!(s.size(), 1000);

        let mut out = vec![0u8; 1000];
        assert_eq!(s.read(&mut out), 1000);
        assert_eq!(out, data);

        // Past EOF: short read of zero.
        assert_eq!(s.read(&mut out[..8]), 0);
    }

    #[test]
    fn seek_within_buffer_and_beyond() {
        let data: Vec<u8> = (0..200u8).collect();
        let (_dir, path) = temp_file(&data, "a.bin");

        let mut s = MediaStream::new(64);
        s.open(&path).unwrap();

        let mut b = [0u8; 4];
        assert_eq!(s.read(&mut b), 4);
        assert_eq!(b, [0, 1, 2, 3]);
        assert_eq!(s.tell(), 4);

        // Inside the buffered window.
        s.seek(1).unwrap();
        assert_eq!(s.read(&mut b), 4);
        assert_eq!(b, [1, 2, 3, 4]);

        // Far outside the window.
        s.seek(150).unwrap();
        assert_eq!(s.tell(), 150);
        assert_eq!(s.read(&mut b), 4);
        assert_eq!(b, [150, 151, 152, 153]);
    }

    #[test]
    fn seek_tell_is_noop_for_reads() {
        let data: Vec<u8> = (0..200u8).collect();
        let (_dir, path) = temp_file(&data, "a.bin");

        let mut s = MediaStream::new(32);
        s.open(&path).unwrap();

        let mut b = [0u8; 10];
        s.read(&mut b);
        let pos = s.tell();
        s.seek(pos).unwrap();
        assert_eq!(s.tell(), pos);
        let mut c = [0u8; 4];
        s.read(&mut c);
        assert_eq!(c, [10, 11, 12, 13]);
    }

    #[test]
    fn name_and_extension() {
        let (_dir, path) = temp_file(b"x", "Track01.WAV");
        let mut s = MediaStream::default();
        s.open(&path).unwrap();
        assert_eq!(s.name(), "Track01.WAV");
        assert_eq!(s.extension(), "wav");
        s.close();
        assert!(!s.is_open());
        assert_eq!(s.name(), "");
        assert_eq!(s.extension(), "");
    }

    #[test]
    fn open_missing_file_fails() {
        let mut s = MediaStream::default();
        assert!(s.open(Path::new("/nonexistent/file.wav")).is_err());
        assert!(!s.is_open());
    }
}
