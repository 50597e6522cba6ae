// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-call WAV output.
//!
//! One mono 16-bit WAV per call, named by start timestamp, talkgroup and
//! source. `rotate` finalizes the current file and returns its path so the
//! per-call exporters can pick it up; writes after rotation lazily open the
//! next file.

use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Rotating per-call WAV writer.
pub struct CallWavWriter {
    dir: PathBuf,
    sample_rate: u32,
    writer: Option<WavWriter<BufWriter<File>>>,
    current_path: Option<PathBuf>,
    /// Monotonic per-process call counter for unique names.
    call_seq: u64,
}

impl CallWavWriter {
    pub fn new<P: AsRef<Path>>(dir: P, sample_rate: u32) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            sample_rate,
            writer: None,
            current_path: None,
            call_seq: 0,
        }
    }

    fn spec(&self) -> WavSpec {
        WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }

    /// Begin a new call file named from the call identity.
    ///
    /// # Errors
    /// I/O failure creating the directory or file.
    pub fn open_call(&mut self, tg: u32, src: u32, stamp: &str) -> crate::Result<()> {
        self.finish()?;
        std::fs::create_dir_all(&self.dir)?;
        self.call_seq += 1;
        let name = format!("{}_TG{}_SRC{}_{}.wav", stamp, tg, src, self.call_seq);
        let path = self.dir.join(name);
        let writer = WavWriter::create(&path, self.spec())
            .map_err(|e| crate::Error::Io(std::io::Error::other(e.to_string())))?;
        self.writer = Some(writer);
        self.current_path = Some(path);
        Ok(())
    }

    /// Append PCM16 to the current call file; a no-op with no open call.
    pub fn write(&mut self, samples: &[i16]) -> crate::Result<()> {
        if let Some(w) = self.writer.as_mut() {
            for &s in samples {
                w.write_sample(s)
                    .map_err(|e| crate::Error::Io(std::io::Error::other(e.to_string())))?;
            }
        }
        Ok(())
    }

    /// Finalize the current call file, returning its path.
    pub fn finish(&mut self) -> crate::Result<Option<PathBuf>> {
        if let Some(w) = self.writer.take() {
            w.finalize()
                .map_err(|e| crate::Error::Io(std::io::Error::other(e.to_string())))?;
            return Ok(self.current_path.take());
        }
        Ok(None)
    }
}

impl Drop for CallWavWriter {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_rotation_produces_distinct_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut w = CallWavWriter::new(dir.path(), 8000);

        w.open_call(1001, 222, "20260801_120000").expect("open");
        w.write(&[0i16; 160]).expect("write");
        let first = w.finish().expect("finish").expect("path");

        w.open_call(1002, 333, "20260801_120005").expect("open");
        w.write(&[100i16; 320]).expect("write");
        let second = w.finish().expect("finish").expect("path");

        assert_ne!(first, second);
        assert!(first.exists() && second.exists());

        let r = hound::WavReader::open(&second).expect("read back");
        assert_eq!(r.spec().sample_rate, 8000);
        assert_eq!(r.len(), 320);
    }

    #[test]
    fn test_write_without_call_is_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut w = CallWavWriter::new(dir.path(), 8000);
        w.write(&[1i16, 2, 3]).expect("noop");
        assert!(w.finish().expect("finish").is_none());
    }
}
