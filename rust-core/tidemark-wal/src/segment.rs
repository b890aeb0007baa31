// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Tidemark Write-Ahead Log - Segment files
//
// Each WAL segment is a single append-only file named
// `wal-{first_index:020}.log`. The name records the index of the first
// frame the segment holds, so the index of every other frame follows from
// its position. Segments are rotated when they exceed the configured maximum
// size and are removed or rewritten when the front of the log is truncated.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{WalError, WalResult};
use crate::frame::{decode_frame, read_length, LENGTH_PREFIX_SIZE, MAX_FRAME_SIZE};

/// Default maximum segment size in bytes (64 MiB).
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 64 * 1024 * 1024;

/// The file extension used for WAL segment files.
pub const SEGMENT_EXTENSION: &str = "log";

/// The prefix used for WAL segment file names.
pub const SEGMENT_PREFIX: &str = "wal-";

/// Suffix of a segment being rewritten; never read back on open.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Metadata about a single WAL segment file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    /// The full path to the segment file on disk.
    pub path: PathBuf,

    /// The log index of the first frame in this segment.
    pub start_index: u64,

    /// Current file size in bytes.
    pub file_size: u64,
}

impl PartialOrd for SegmentInfo {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SegmentInfo {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.start_index.cmp(&other.start_index)
    }
}

/// Build the canonical file name for a segment starting at the given index.
///
/// Format: `wal-00000000000000000001.log`
pub fn segment_filename(start_index: u64) -> String {
    format!("{SEGMENT_PREFIX}{start_index:020}.{SEGMENT_EXTENSION}")
}

/// Build the full path for a segment file in the given WAL directory.
pub fn segment_path(wal_dir: &Path, start_index: u64) -> PathBuf {
    wal_dir.join(segment_filename(start_index))
}

/// Path used while a segment starting at `start_index` is being rewritten.
pub fn temp_segment_path(wal_dir: &Path, start_index: u64) -> PathBuf {
    wal_dir.join(format!("{}{TEMP_SUFFIX}", segment_filename(start_index)))
}

/// Parse the starting index from a segment file name.
///
/// Returns `None` if the name does not match the expected pattern.
pub fn parse_segment_filename(name: &str) -> Option<u64> {
    let stripped = name.strip_prefix(SEGMENT_PREFIX)?;
    let num_str = stripped.strip_suffix(&format!(".{SEGMENT_EXTENSION}"))?;
    num_str.parse::<u64>().ok()
}

/// Scan a WAL directory and return metadata for all segment files, sorted
/// by starting index (ascending).
///
/// Non-segment files in the directory are silently ignored.
pub fn list_segments(wal_dir: &Path) -> WalResult<Vec<SegmentInfo>> {
    let mut segments = Vec::new();

    for dir_entry in fs::read_dir(wal_dir)? {
        let dir_entry = dir_entry?;
        let file_name = dir_entry.file_name();
        let name = file_name.to_string_lossy();

        if let Some(start_index) = parse_segment_filename(&name) {
            let metadata = dir_entry.metadata()?;
            segments.push(SegmentInfo {
                path: dir_entry.path(),
                start_index,
                file_size: metadata.len(),
            });
        }
    }

    segments.sort();

    debug!(
        count = segments.len(),
        dir = %wal_dir.display(),
        "Discovered WAL segments"
    );

    Ok(segments)
}

/// Delete leftovers of rewrites that were interrupted by a crash.
pub fn remove_temp_files(wal_dir: &Path) -> WalResult<usize> {
    let mut removed = 0;
    for dir_entry in fs::read_dir(wal_dir)? {
        let dir_entry = dir_entry?;
        if dir_entry.file_name().to_string_lossy().ends_with(TEMP_SUFFIX) {
            fs::remove_file(dir_entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Location of one frame inside a segment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePosition {
    /// Byte offset of the frame's length prefix.
    pub offset: u64,
    /// Total frame size in bytes, including the length prefix.
    pub size: u32,
}

/// Result of validating every frame in a segment file.
#[derive(Debug, Clone)]
pub struct SegmentScan {
    /// Positions of the valid frames, in index order.
    pub positions: Vec<FramePosition>,
    /// Byte length of the valid prefix of the file.
    pub valid_len: u64,
    /// Description of the first invalid frame, if the scan stopped early.
    pub damage: Option<String>,
}

impl SegmentScan {
    /// Index of the last valid frame, or `start_index - 1` when empty.
    pub fn last_index(&self, start_index: u64) -> u64 {
        start_index + self.positions.len() as u64 - 1
    }
}

/// Read a segment file and validate every frame against the segment's
/// starting index. Scanning stops at the first frame that is torn, fails its
/// CRC or carries an unexpected index; the damage is reported, not raised,
/// so the caller can decide whether it is a recoverable tail.
pub fn scan_segment(info: &SegmentInfo) -> WalResult<SegmentScan> {
    let data = fs::read(&info.path)?;
    let mut positions = Vec::new();
    let mut offset = 0usize;
    let mut damage = None;

    while offset < data.len() {
        let Some(frame_length) = read_length(&data, offset) else {
            damage = Some(format!("partial length prefix at offset {offset}"));
            break;
        };

        if frame_length == 0 || frame_length > MAX_FRAME_SIZE {
            damage = Some(format!(
                "frame at offset {offset} declares invalid length {frame_length}"
            ));
            break;
        }

        let frame_end = offset + LENGTH_PREFIX_SIZE + frame_length as usize;
        if frame_end > data.len() {
            damage = Some(format!(
                "truncated frame at offset {offset} ({} of {frame_length} bytes present)",
                data.len() - offset - LENGTH_PREFIX_SIZE
            ));
            break;
        }

        let expected = info.start_index + positions.len() as u64;
        match decode_frame(&data[offset + LENGTH_PREFIX_SIZE..frame_end]) {
            Ok((index, _)) if index == expected => {}
            Ok((index, _)) => {
                damage = Some(format!(
                    "frame at offset {offset} has index {index}, expected {expected}"
                ));
                break;
            }
            Err(err) => {
                damage = Some(format!("frame at offset {offset}: {err}"));
                break;
            }
        }

        positions.push(FramePosition {
            offset: offset as u64,
            size: (frame_end - offset) as u32,
        });
        offset = frame_end;
    }

    Ok(SegmentScan {
        positions,
        valid_len: offset as u64,
        damage,
    })
}

/// Build the error raised for damage that cannot be repaired by cutting a tail.
pub fn corrupt(info: &SegmentInfo, reason: impl Into<String>) -> WalError {
    WalError::Corrupt {
        segment: info
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "<unknown>".to_string()),
        reason: reason.into(),
    }
}
