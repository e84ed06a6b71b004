//! One append-only log file, plus a buffered writer of known current
//! size. `Segment` is owned exclusively by the WAL's flusher task; no
//! other thread ever touches its file handle.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

const FILENAME_PREFIX: &str = "wal.";
const FILENAME_SUFFIX: &str = ".log";

fn segment_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^wal\.(\d+)\.log$").expect("static regex is valid"))
}

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One append-only `wal.<N>.log` file, with a buffered writer tracking
/// how many bytes have been written since the last flush or rotation.
pub struct Segment {
    dir: PathBuf,
    max_bytes: u64,
    num: u64,
    writer: BufWriter<File>,
    buffered: u64,
}

impl Segment {
    /// Scans `dir` for `wal.<N>.log` files and opens the one with the
    /// numerically largest N for append, creating `wal.0.log` if none
    /// exist.
    ///
    /// Numeric ordering (not lexicographic) is deliberate: with more than
    /// ten segments, a lexicographic comparison would pick `wal.2.log`
    /// over `wal.10.log`.
    pub fn open(dir: &Path, max_bytes: u64) -> Result<Self, SegmentError> {
        let num = latest_segment_number(dir)?.unwrap_or(0);
        let path = segment_path(dir, num);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            max_bytes,
            num,
            writer: BufWriter::new(file),
            buffered: 0,
        })
    }

    /// Current buffered-but-unflushed byte count. Used only as a
    /// rotation trigger.
    pub fn size(&self) -> u64 {
        self.buffered
    }

    pub fn num(&self) -> u64 {
        self.num
    }

    /// Appends `bytes` to the buffer, rotating first if the buffer is
    /// already at or past `max_bytes`. A single write is never split
    /// across segments, so a segment may end up slightly larger than
    /// `max_bytes`.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), SegmentError> {
        if self.buffered >= self.max_bytes {
            self.rotate()?;
        }

        self.writer.write_all(bytes)?;
        self.buffered += bytes.len() as u64;
        Ok(())
    }

    /// Flushes buffered bytes to the OS and fsyncs the file. After a
    /// successful return, every byte previously written is durable.
    pub fn flush(&mut self) -> Result<(), SegmentError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.buffered = 0;
        Ok(())
    }

    /// Flushes the current segment, then opens the next one.
    pub fn rotate(&mut self) -> Result<(), SegmentError> {
        self.flush()?;
        self.num += 1;
        let path = segment_path(&self.dir, self.num);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        self.writer = BufWriter::new(file);
        self.buffered = 0;
        Ok(())
    }
}

fn segment_path(dir: &Path, num: u64) -> PathBuf {
    dir.join(format!("{FILENAME_PREFIX}{num}{FILENAME_SUFFIX}"))
}

fn latest_segment_number(dir: &Path) -> Result<Option<u64>, SegmentError> {
    let mut latest: Option<u64> = None;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(caps) = segment_name_pattern().captures(name) else {
            continue;
        };
        let Ok(num) = caps[1].parse::<u64>() else {
            continue;
        };
        latest = Some(latest.map_or(num, |cur| cur.max(num)));
    }
    Ok(latest)
}

/// Enumerates every `wal.<N>.log` file in `dir` with non-zero size,
/// ascending by N. Used by `Wal::load_records` for recovery.
pub fn ordered_nonempty_segments(dir: &Path) -> Result<Vec<PathBuf>, SegmentError> {
    let mut found: Vec<(u64, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(caps) = segment_name_pattern().captures(name) else {
            continue;
        };
        let Ok(num) = caps[1].parse::<u64>() else {
            continue;
        };
        if entry.metadata()?.len() == 0 {
            continue;
        }
        found.push((num, entry.path()));
    }
    found.sort_by_key(|(num, _)| *num);
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn opens_wal_0_log_when_directory_is_empty() {
        let dir = tempdir().unwrap();
        let segment = Segment::open(dir.path(), 1024).unwrap();
        assert_eq!(segment.num(), 0);
        assert!(dir.path().join("wal.0.log").exists());
    }

    #[test]
    fn reopens_the_numerically_latest_segment() {
        let dir = tempdir().unwrap();
        for n in [0, 2, 10] {
            std::fs::write(dir.path().join(format!("wal.{n}.log")), b"x").unwrap();
        }
        let segment = Segment::open(dir.path(), 1024).unwrap();
        // Numeric ordering picks 10, not the lexicographically-largest 2.
        assert_eq!(segment.num(), 10);
    }

    #[test]
    fn write_then_flush_is_durable_and_resets_size() {
        let dir = tempdir().unwrap();
        let mut segment = Segment::open(dir.path(), 1024).unwrap();
        segment.write(b"hello\n").unwrap();
        assert_eq!(segment.size(), 6);
        segment.flush().unwrap();
        assert_eq!(segment.size(), 0);
        let contents = std::fs::read_to_string(dir.path().join("wal.0.log")).unwrap();
        assert_eq!(contents, "hello\n");
    }

    #[test]
    fn a_single_write_is_never_split_across_segments() {
        let dir = tempdir().unwrap();
        let mut segment = Segment::open(dir.path(), 4).unwrap();
        segment.write(b"0123456789").unwrap();
        segment.flush().unwrap();
        assert_eq!(segment.num(), 0);
        let contents = std::fs::read_to_string(dir.path().join("wal.0.log")).unwrap();
        assert_eq!(contents, "0123456789");
    }

    #[test]
    fn rotation_starts_a_new_numbered_file_and_keeps_prior_bytes() {
        let dir = tempdir().unwrap();
        let mut segment = Segment::open(dir.path(), 4).unwrap();
        segment.write(b"aaaa").unwrap();
        segment.write(b"bbbb").unwrap(); // size already >= max, rotates first
        segment.flush().unwrap();

        assert_eq!(segment.num(), 1);
        let seg0 = std::fs::read_to_string(dir.path().join("wal.0.log")).unwrap();
        let seg1 = std::fs::read_to_string(dir.path().join("wal.1.log")).unwrap();
        assert_eq!(seg0, "aaaa");
        assert_eq!(seg1, "bbbb");
    }

    #[test]
    fn ordered_nonempty_segments_skips_empty_files_and_sorts_numerically() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("wal.0.log"), b"a\n").unwrap();
        std::fs::write(dir.path().join("wal.2.log"), b"").unwrap();
        std::fs::write(dir.path().join("wal.10.log"), b"b\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let files = ordered_nonempty_segments(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["wal.0.log", "wal.10.log"]);
    }
}
