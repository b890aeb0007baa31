// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Tidemark Write-Ahead Log - Segmented file log
//
// `FileLog` keeps one directory per log. Appends go to the newest segment,
// rotating to a fresh file once the size limit is reached. The position of
// every live frame is held in memory so reads are a single seek.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{WalError, WalResult};
use crate::frame::{decode_frame, encode_frame, LENGTH_PREFIX_SIZE};
use crate::log::{LogOptions, SyncMode, WalLog};
use crate::segment::{
    corrupt, list_segments, remove_temp_files, scan_segment, segment_path, temp_segment_path,
    FramePosition, SegmentInfo,
};

/// One segment file and the positions of its frames.
#[derive(Debug)]
struct SegmentState {
    info: SegmentInfo,
    positions: Vec<FramePosition>,
    /// Read handle, opened on first read.
    reader: Option<File>,
}

impl SegmentState {
    fn empty(start_index: u64, path: PathBuf) -> Self {
        Self {
            info: SegmentInfo {
                path,
                start_index,
                file_size: 0,
            },
            positions: Vec::new(),
            reader: None,
        }
    }

    fn last_index(&self) -> u64 {
        self.info.start_index + self.positions.len() as u64 - 1
    }

    fn reader(&mut self) -> WalResult<&mut File> {
        let file = match self.reader.take() {
            Some(file) => file,
            None => File::open(&self.info.path)?,
        };
        Ok(self.reader.insert(file))
    }
}

#[derive(Debug)]
struct LogState {
    /// Ordered by start index; never empty while the log is open.
    segments: Vec<SegmentState>,
    /// Append handle on the last segment.
    writer: File,
    first_index: u64,
    last_index: u64,
    last_sync: Instant,
    closed: bool,
}

impl LogState {
    fn ensure_open(&self) -> WalResult<()> {
        if self.closed {
            return Err(WalError::Closed);
        }
        Ok(())
    }

    /// Position in `segments` of the segment that holds `index`.
    fn segment_for(&self, index: u64) -> usize {
        self.segments
            .partition_point(|segment| segment.info.start_index <= index)
            .saturating_sub(1)
    }

    fn active_size(&self) -> u64 {
        self.segments
            .last()
            .map_or(0, |segment| segment.info.file_size)
    }
}

/// A write-ahead log stored as a directory of segment files.
///
/// # Example
///
/// ```no_run
/// use tidemark_wal::{FileLog, LogOptions, WalLog};
///
/// let log = FileLog::open("/tmp/tidemark-wal/logs/0", LogOptions::default()).unwrap();
/// let index = log.write(br#"{"title":"hello"}"#).unwrap();
/// assert_eq!(log.read(index).unwrap(), br#"{"title":"hello"}"#.to_vec());
/// log.truncate_front(index).unwrap();
/// assert_eq!(log.first_index().unwrap(), index + 1);
/// ```
#[derive(Debug)]
pub struct FileLog {
    dir: PathBuf,
    options: LogOptions,
    state: Mutex<LogState>,
}

impl FileLog {
    /// Open an existing log directory or initialize a new one.
    ///
    /// A fresh directory starts at index 1. When reopening, a torn frame at
    /// the end of the newest segment (a crash mid-append) is cut off, and a
    /// head segment left behind by an interrupted front truncation is
    /// removed. Any other damage is reported as `WalError::Corrupt`.
    pub fn open(dir: impl AsRef<Path>, options: LogOptions) -> WalResult<Self> {
        let dir = dir.as_ref().to_path_buf();

        if !dir.exists() {
            fs::create_dir_all(&dir)?;
            info!(dir = %dir.display(), "Created WAL directory");
        }

        let removed = remove_temp_files(&dir)?;
        if removed > 0 {
            warn!(dir = %dir.display(), removed, "Removed interrupted WAL rewrites");
        }

        let segments = Self::load_segments(&dir)?;
        let segments = if segments.is_empty() {
            let path = segment_path(&dir, 1);
            File::create(&path)?;
            info!(dir = %dir.display(), "Initialized fresh WAL at index 1");
            vec![SegmentState::empty(1, path)]
        } else {
            segments
        };

        let first_index = segments[0].info.start_index;
        let last_index = segments[segments.len() - 1].last_index();
        let writer = open_append(&segments[segments.len() - 1].info.path)?;

        info!(
            dir = %dir.display(),
            segments = segments.len(),
            first_index,
            last_index,
            "Opened WAL"
        );

        Ok(Self {
            dir,
            options,
            state: Mutex::new(LogState {
                segments,
                writer,
                first_index,
                last_index,
                last_sync: Instant::now(),
                closed: false,
            }),
        })
    }

    /// Returns the path to the log directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of segment files currently backing the log.
    pub fn segment_count(&self) -> usize {
        self.state.lock().segments.len()
    }

    /// Force an immediate `fsync` of the active segment, regardless of the
    /// configured `SyncMode`.
    pub fn sync(&self) -> WalResult<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.writer.sync_all()?;
        state.last_sync = Instant::now();
        Ok(())
    }

    fn load_segments(dir: &Path) -> WalResult<Vec<SegmentState>> {
        let infos = list_segments(dir)?;
        let count = infos.len();
        let mut loaded: Vec<SegmentState> = Vec::with_capacity(count);

        for (position, info) in infos.into_iter().enumerate() {
            let scan = scan_segment(&info)?;

            if let Some(damage) = &scan.damage {
                if position + 1 != count {
                    return Err(corrupt(&info, damage.clone()));
                }
                warn!(
                    segment = %info.path.display(),
                    damage = %damage,
                    valid_len = scan.valid_len,
                    "Cutting torn tail off newest WAL segment"
                );
                OpenOptions::new()
                    .write(true)
                    .open(&info.path)?
                    .set_len(scan.valid_len)?;
            }

            // Overlap can only come from a front truncation that crashed
            // after renaming the new head: everything before it is garbage.
            let overlaps = loaded
                .last()
                .is_some_and(|previous| previous.last_index() >= info.start_index);
            if overlaps {
                for stale in loaded.drain(..) {
                    warn!(
                        segment = %stale.info.path.display(),
                        "Removing WAL segment superseded by interrupted truncation"
                    );
                    fs::remove_file(&stale.info.path)?;
                }
            }

            if let Some(previous) = loaded.last() {
                if previous.last_index() + 1 != info.start_index {
                    return Err(corrupt(
                        &info,
                        format!(
                            "gap after index {}: segment starts at {}",
                            previous.last_index(),
                            info.start_index
                        ),
                    ));
                }
            }

            loaded.push(SegmentState {
                info: SegmentInfo {
                    file_size: scan.valid_len,
                    ..info
                },
                positions: scan.positions,
                reader: None,
            });
        }

        Ok(loaded)
    }

    /// Start a new segment at `last_index + 1`. The current segment is
    /// fsynced first.
    fn rotate(&self, state: &mut LogState) -> WalResult<()> {
        state.writer.sync_all()?;

        let start = state.last_index + 1;
        let path = segment_path(&self.dir, start);
        File::create(&path)?;

        info!(
            old_segment = ?state.segments.last().map(|s| s.info.path.display().to_string()),
            new_segment = %path.display(),
            start_index = start,
            "Rotated WAL segment"
        );

        state.writer = open_append(&path)?;
        state.segments.push(SegmentState::empty(start, path));
        Ok(())
    }

    /// Conditionally call fsync based on the configured sync mode.
    fn maybe_sync(&self, state: &mut LogState) -> WalResult<()> {
        match self.options.sync_mode {
            SyncMode::Fsync => {
                state.writer.sync_all()?;
                state.last_sync = Instant::now();
            }
            SyncMode::Periodic(interval) => {
                if state.last_sync.elapsed() >= interval {
                    state.writer.sync_all()?;
                    state.last_sync = Instant::now();
                }
            }
            SyncMode::Async => {}
        }
        Ok(())
    }

    /// Copy the frames of `segments[position]` from `new_start` onward into a
    /// new segment file named after `new_start`.
    fn rewrite_head(
        &self,
        state: &mut LogState,
        position: usize,
        new_start: u64,
    ) -> WalResult<SegmentState> {
        let segment = &state.segments[position];
        let skip = (new_start - segment.info.start_index) as usize;
        let cut = segment.positions[skip].offset;

        let data = fs::read(&segment.info.path)?;
        let tail = &data[cut as usize..segment.info.file_size as usize];

        let temp_path = temp_segment_path(&self.dir, new_start);
        let final_path = segment_path(&self.dir, new_start);
        {
            let mut temp = File::create(&temp_path)?;
            temp.write_all(tail)?;
            temp.sync_all()?;
        }
        fs::rename(&temp_path, &final_path)?;

        let positions = segment.positions[skip..]
            .iter()
            .map(|p| FramePosition {
                offset: p.offset - cut,
                size: p.size,
            })
            .collect();

        Ok(SegmentState {
            info: SegmentInfo {
                path: final_path,
                start_index: new_start,
                file_size: tail.len() as u64,
            },
            positions,
            reader: None,
        })
    }
}

impl WalLog for FileLog {
    fn batch_write(&self, batch: &[Vec<u8>]) -> WalResult<u64> {
        let mut state = self.state.lock();
        state.ensure_open()?;

        if batch.is_empty() {
            return Ok(state.last_index);
        }

        let first_new = state.last_index + 1;
        let mut buffer = Vec::new();
        let mut sizes = Vec::with_capacity(batch.len());
        for (offset, payload) in batch.iter().enumerate() {
            sizes.push(encode_frame(first_new + offset as u64, payload, &mut buffer));
        }

        let active_size = state.active_size();
        if active_size > 0 && active_size + buffer.len() as u64 > self.options.max_segment_size {
            self.rotate(&mut state)?;
        }

        let base = state.active_size();
        let written = state
            .writer
            .write_all(&buffer)
            .map_err(WalError::from)
            .and_then(|()| self.maybe_sync(&mut state));
        if let Err(err) = written {
            // Cut whatever reached the file so the batch stays invisible.
            if let Err(rollback) = state.writer.set_len(base) {
                warn!(error = %rollback, "Failed to roll back partial WAL batch");
            }
            return Err(err);
        }

        let Some(active) = state.segments.last_mut() else {
            return Err(WalError::Closed);
        };
        let mut offset = base;
        for size in sizes {
            active.positions.push(FramePosition {
                offset,
                size: size as u32,
            });
            offset += size as u64;
        }
        active.info.file_size = offset;
        state.last_index += batch.len() as u64;

        debug!(
            first = first_new,
            last = state.last_index,
            bytes = buffer.len(),
            "Appended WAL batch"
        );

        Ok(state.last_index)
    }

    fn read(&self, index: u64) -> WalResult<Vec<u8>> {
        let mut state = self.state.lock();
        state.ensure_open()?;

        if index < state.first_index || index > state.last_index {
            return Err(WalError::NotFound {
                index,
                first: state.first_index,
                last: state.last_index,
            });
        }

        let position = state.segment_for(index);
        let segment = &mut state.segments[position];
        let frame = segment.positions[(index - segment.info.start_index) as usize];

        let reader = segment.reader()?;
        reader.seek(SeekFrom::Start(frame.offset))?;
        let mut bytes = vec![0u8; frame.size as usize];
        reader.read_exact(&mut bytes)?;

        let (stored_index, payload) = decode_frame(&bytes[LENGTH_PREFIX_SIZE..])?;
        if stored_index != index {
            return Err(corrupt(
                &segment.info,
                format!("frame for index {index} carries index {stored_index}"),
            ));
        }
        Ok(payload)
    }

    fn first_index(&self) -> WalResult<u64> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.first_index)
    }

    fn last_index(&self) -> WalResult<u64> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.last_index)
    }

    fn truncate_front(&self, index: u64) -> WalResult<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;

        if index < state.first_index {
            return Ok(());
        }
        if index > state.last_index {
            return Err(WalError::OutOfRange {
                index,
                first: state.first_index,
                last: state.last_index,
            });
        }

        let new_first = index + 1;

        if new_first > state.last_index {
            // Everything goes; an empty segment keeps the index sequence.
            state.writer.sync_all()?;
            let path = segment_path(&self.dir, new_first);
            File::create(&path)?;
            state.writer = open_append(&path)?;
            let stale = std::mem::replace(
                &mut state.segments,
                vec![SegmentState::empty(new_first, path)],
            );
            for segment in stale {
                fs::remove_file(&segment.info.path)?;
            }
        } else {
            let position = state.segment_for(new_first);

            // Rewrite first so a crash leaves an overlap that open() repairs.
            let replacement = if state.segments[position].info.start_index != new_first {
                Some(self.rewrite_head(&mut state, position, new_first)?)
            } else {
                None
            };

            let stale: Vec<SegmentState> = state.segments.drain(..position).collect();
            for segment in stale {
                fs::remove_file(&segment.info.path)?;
            }

            if let Some(replacement) = replacement {
                let is_active = state.segments.len() == 1;
                let old = std::mem::replace(&mut state.segments[0], replacement);
                if is_active {
                    state.writer = open_append(&state.segments[0].info.path)?;
                }
                fs::remove_file(&old.info.path)?;
            }
        }

        state.first_index = new_first;
        debug!(
            dir = %self.dir.display(),
            first_index = new_first,
            segments = state.segments.len(),
            "Truncated WAL front"
        );
        Ok(())
    }

    fn truncate_back(&self, index: u64) -> WalResult<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;

        if index >= state.last_index {
            return Ok(());
        }
        if index + 1 < state.first_index {
            return Err(WalError::OutOfRange {
                index,
                first: state.first_index,
                last: state.last_index,
            });
        }

        let keep_segment = state.segment_for(index);

        // Newest first, so a crash leaves a contiguous prefix.
        while state.segments.len() > keep_segment + 1 {
            if let Some(segment) = state.segments.pop() {
                fs::remove_file(&segment.info.path)?;
            }
        }

        let segment = &mut state.segments[keep_segment];
        let keep = (index + 1).saturating_sub(segment.info.start_index) as usize;
        let new_len = match keep.checked_sub(1).map(|last| segment.positions[last]) {
            Some(frame) => frame.offset + u64::from(frame.size),
            None => 0,
        };
        segment.positions.truncate(keep);
        segment.info.file_size = new_len;
        segment.reader = None;
        let path = segment.info.path.clone();

        let file = open_append(&path)?;
        file.set_len(new_len)?;
        file.sync_all()?;
        state.writer = file;
        state.last_index = index;

        debug!(dir = %self.dir.display(), last_index = index, "Truncated WAL back");
        Ok(())
    }

    fn close(&self) -> WalResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        state.writer.sync_all()?;
        for segment in &mut state.segments {
            segment.reader = None;
        }
        state.closed = true;
        info!(dir = %self.dir.display(), "Closed WAL");
        Ok(())
    }
}

fn open_append(path: &Path) -> WalResult<File> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::list_segments;
    use tempfile::TempDir;

    fn payload(i: u64) -> Vec<u8> {
        format!(r#"{{"seq":{i}}}"#).into_bytes()
    }

    fn small_segments() -> LogOptions {
        LogOptions {
            sync_mode: SyncMode::Async,
            max_segment_size: 100,
        }
    }

    #[test]
    fn test_open_fresh_directory() {
        let dir = TempDir::new().unwrap();
        let log = FileLog::open(dir.path(), LogOptions::default()).unwrap();
        assert_eq!(log.first_index().unwrap(), 1);
        assert_eq!(log.last_index().unwrap(), 0);
    }

    #[test]
    fn test_write_assigns_sequential_indices() {
        let dir = TempDir::new().unwrap();
        let log = FileLog::open(dir.path(), LogOptions::default()).unwrap();

        assert_eq!(log.write(b"a").unwrap(), 1);
        assert_eq!(log.write(b"b").unwrap(), 2);
        assert_eq!(log.batch_write(&[b"c".to_vec(), b"d".to_vec()]).unwrap(), 4);
        assert_eq!(log.read(3).unwrap(), b"c".to_vec());
        assert_eq!(log.read_range(1, 4).unwrap().len(), 4);
    }

    #[test]
    fn test_read_out_of_range() {
        let dir = TempDir::new().unwrap();
        let log = FileLog::open(dir.path(), LogOptions::default()).unwrap();
        log.write(b"a").unwrap();

        assert!(matches!(log.read(0), Err(WalError::NotFound { .. })));
        assert!(matches!(log.read(2), Err(WalError::NotFound { .. })));
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let dir = TempDir::new().unwrap();
        let log = FileLog::open(dir.path(), LogOptions::default()).unwrap();
        log.write(b"a").unwrap();
        assert_eq!(log.batch_write(&[]).unwrap(), 1);
    }

    #[test]
    fn test_segment_rotation_and_reads_across_segments() {
        let dir = TempDir::new().unwrap();
        let log = FileLog::open(dir.path(), small_segments()).unwrap();

        for i in 1..=20 {
            log.write(&payload(i)).unwrap();
        }

        assert!(log.segment_count() > 1);
        for i in 1..=20 {
            assert_eq!(log.read(i).unwrap(), payload(i));
        }
    }

    #[test]
    fn test_truncate_front_inside_segment() {
        let dir = TempDir::new().unwrap();
        let log = FileLog::open(dir.path(), LogOptions::default()).unwrap();
        for i in 1..=10 {
            log.write(&payload(i)).unwrap();
        }

        log.truncate_front(4).unwrap();
        assert_eq!(log.first_index().unwrap(), 5);
        assert_eq!(log.last_index().unwrap(), 10);
        assert!(log.read(4).is_err());
        assert_eq!(log.read(5).unwrap(), payload(5));

        let segments = list_segments(dir.path()).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start_index, 5);

        // Appends keep going into the rewritten head.
        assert_eq!(log.write(&payload(11)).unwrap(), 11);
        assert_eq!(log.read(11).unwrap(), payload(11));
    }

    #[test]
    fn test_truncate_front_everything_keeps_index_sequence() {
        let dir = TempDir::new().unwrap();
        {
            let log = FileLog::open(dir.path(), small_segments()).unwrap();
            for i in 1..=10 {
                log.write(&payload(i)).unwrap();
            }
            log.truncate_front(10).unwrap();
            assert_eq!(log.first_index().unwrap(), 11);
            assert_eq!(log.last_index().unwrap(), 10);
            log.close().unwrap();
        }

        let log = FileLog::open(dir.path(), small_segments()).unwrap();
        assert_eq!(log.first_index().unwrap(), 11);
        assert_eq!(log.last_index().unwrap(), 10);
        assert_eq!(log.write(&payload(11)).unwrap(), 11);
    }

    #[test]
    fn test_truncate_front_beyond_last_rejected() {
        let dir = TempDir::new().unwrap();
        let log = FileLog::open(dir.path(), LogOptions::default()).unwrap();
        log.write(b"a").unwrap();
        assert!(matches!(
            log.truncate_front(5),
            Err(WalError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_truncate_front_across_segments() {
        let dir = TempDir::new().unwrap();
        let log = FileLog::open(dir.path(), small_segments()).unwrap();
        for i in 1..=20 {
            log.write(&payload(i)).unwrap();
        }

        log.truncate_front(13).unwrap();
        assert_eq!(log.first_index().unwrap(), 14);
        for i in 14..=20 {
            assert_eq!(log.read(i).unwrap(), payload(i));
        }
        let segments = list_segments(dir.path()).unwrap();
        assert_eq!(segments[0].start_index, 14);
    }

    #[test]
    fn test_truncate_back() {
        let dir = TempDir::new().unwrap();
        let log = FileLog::open(dir.path(), small_segments()).unwrap();
        for i in 1..=20 {
            log.write(&payload(i)).unwrap();
        }

        log.truncate_back(7).unwrap();
        assert_eq!(log.last_index().unwrap(), 7);
        assert!(log.read(8).is_err());
        assert_eq!(log.read(7).unwrap(), payload(7));

        // The next append reuses index 8.
        assert_eq!(log.write(b"replacement").unwrap(), 8);
        assert_eq!(log.read(8).unwrap(), b"replacement".to_vec());
    }

    #[test]
    fn test_resume_after_close() {
        let dir = TempDir::new().unwrap();
        {
            let log = FileLog::open(dir.path(), LogOptions::default()).unwrap();
            for i in 1..=3 {
                log.write(&payload(i)).unwrap();
            }
            log.close().unwrap();
            assert!(matches!(log.write(b"late"), Err(WalError::Closed)));
        }

        let log = FileLog::open(dir.path(), LogOptions::default()).unwrap();
        assert_eq!(log.last_index().unwrap(), 3);
        assert_eq!(log.write(&payload(4)).unwrap(), 4);
    }

    #[test]
    fn test_torn_tail_is_cut_on_open() {
        let dir = TempDir::new().unwrap();
        {
            let log = FileLog::open(dir.path(), LogOptions::default()).unwrap();
            log.write(&payload(1)).unwrap();
            log.write(&payload(2)).unwrap();
        }

        let segments = list_segments(dir.path()).unwrap();
        let mut file = OpenOptions::new()
            .append(true)
            .open(&segments[0].path)
            .unwrap();
        file.write_all(&[64, 0, 0, 0, 9, 9, 9]).unwrap();

        let log = FileLog::open(dir.path(), LogOptions::default()).unwrap();
        assert_eq!(log.last_index().unwrap(), 2);
        assert_eq!(log.write(&payload(3)).unwrap(), 3);
        assert_eq!(log.read(3).unwrap(), payload(3));
    }

    #[test]
    fn test_interrupted_front_truncation_is_repaired() {
        let dir = TempDir::new().unwrap();
        {
            let log = FileLog::open(dir.path(), LogOptions::default()).unwrap();
            for i in 1..=6 {
                log.write(&payload(i)).unwrap();
            }
        }

        // Simulate a crash right after the new head was renamed into place.
        let mut buffer = Vec::new();
        for i in 4..=6 {
            encode_frame(i, &payload(i), &mut buffer);
        }
        fs::write(segment_path(dir.path(), 4), &buffer).unwrap();

        let log = FileLog::open(dir.path(), LogOptions::default()).unwrap();
        assert_eq!(log.first_index().unwrap(), 4);
        assert_eq!(log.last_index().unwrap(), 6);
        assert_eq!(list_segments(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_corruption_in_sealed_segment_is_an_error() {
        let dir = TempDir::new().unwrap();
        {
            let log = FileLog::open(dir.path(), small_segments()).unwrap();
            for i in 1..=20 {
                log.write(&payload(i)).unwrap();
            }
        }

        let segments = list_segments(dir.path()).unwrap();
        let mut data = fs::read(&segments[0].path).unwrap();
        data[6] ^= 0xFF;
        fs::write(&segments[0].path, &data).unwrap();

        assert!(matches!(
            FileLog::open(dir.path(), small_segments()),
            Err(WalError::Corrupt { .. })
        ));
    }
}
