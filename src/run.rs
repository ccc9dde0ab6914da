//! Run files: length-prefixed framed serialization of sorted chunks.
//!
//! Each record is a `u32` little-endian payload length followed by the
//! payload bytes produced by the codec. There is no file header; EOF
//! terminates the run.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use tempfile::TempPath;

use crate::codec::Codec;
use crate::error::SortError;

/// Upper bound on a single frame payload. A length prefix above this is
/// treated as a corrupt run rather than an allocation request.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Decoded elements a reader buffers ahead of consumption.
const PREFETCH_LEN: usize = 16;

/// One sorted chunk sealed on disk. The file is deleted when the run is
/// dropped, so abandoning a run list on a failure path cleans up on its own.
pub struct Run {
    path: TempPath,
    items: u64,
}

impl Run {
    /// Number of elements stored in the run.
    pub fn items(&self) -> u64 {
        self.items
    }

    fn delete(self) -> io::Result<()> {
        self.path.close()
    }
}

/// Writes one run file. Created fresh per sorted chunk; writes are
/// buffered and hit the disk on [`seal`](RunWriter::seal).
pub struct RunWriter {
    writer: BufWriter<File>,
    path: TempPath,
    items: u64,
    frame: Vec<u8>,
}

impl RunWriter {
    /// Opens a fresh uniquely-named file in `dir` in create+write mode.
    pub fn create(dir: &Path) -> Result<Self, SortError> {
        let tmp_file = tempfile::Builder::new()
            .prefix("run-")
            .tempfile_in(dir)
            .map_err(SortError::TempFile)?;
        let (file, path) = tmp_file.into_parts();

        Ok(RunWriter {
            writer: BufWriter::new(file),
            path,
            items: 0,
            frame: Vec::new(),
        })
    }

    /// Appends one element, framed with its encoded length.
    pub fn write<T, C: Codec<T>>(&mut self, codec: &C, item: &T) -> Result<(), SortError> {
        self.frame.clear();
        codec
            .encode(item, &mut self.frame)
            .map_err(|err| SortError::SerializationError(Box::new(err)))?;

        let len = u32::try_from(self.frame.len()).map_err(|_| {
            SortError::SerializationError(
                format!("encoded element of {} bytes exceeds the u32 frame limit", self.frame.len()).into(),
            )
        })?;

        self.writer.write_all(&len.to_le_bytes()).map_err(SortError::IO)?;
        self.writer.write_all(&self.frame).map_err(SortError::IO)?;
        self.items += 1;

        Ok(())
    }

    /// Flushes and closes the file, transitioning the run to readable.
    pub fn seal(self) -> Result<Run, SortError> {
        let RunWriter { mut writer, path, items, .. } = self;
        writer.flush().map_err(SortError::IO)?;
        drop(writer);

        Ok(Run { path, items })
    }
}

/// Streaming reader over one sealed run. Decodes ahead into a small
/// prefetch buffer; deletes its file once the run is exhausted.
pub struct RunReader<T> {
    reader: BufReader<File>,
    run: Option<Run>,
    prefetched: VecDeque<T>,
    exhausted: bool,
}

impl<T> RunReader<T> {
    pub fn open(run: Run) -> Result<Self, SortError> {
        let file = File::open(&run.path).map_err(SortError::IO)?;

        Ok(RunReader {
            reader: BufReader::new(file),
            run: Some(run),
            prefetched: VecDeque::with_capacity(PREFETCH_LEN),
            exhausted: false,
        })
    }

    /// Returns the next element of the run, or [`None`] once exhausted.
    /// While the run is not exhausted the returned element is the smallest
    /// not yet read, since runs are written in sorted order.
    pub fn next<C: Codec<T>>(&mut self, codec: &C) -> Result<Option<T>, SortError> {
        if self.prefetched.is_empty() && !self.exhausted {
            self.refill(codec)?;
        }
        Ok(self.prefetched.pop_front())
    }

    fn refill<C: Codec<T>>(&mut self, codec: &C) -> Result<(), SortError> {
        while self.prefetched.len() < PREFETCH_LEN {
            match self.read_frame()? {
                Some(payload) => {
                    let item = codec
                        .decode(&payload)
                        .map_err(|err| SortError::DeserializationError(Box::new(err)))?;
                    self.prefetched.push_back(item);
                }
                None => {
                    self.finish();
                    break;
                }
            }
        }
        Ok(())
    }

    /// Reads one frame; [`None`] on clean EOF at a frame boundary.
    fn read_frame(&mut self) -> Result<Option<Vec<u8>>, SortError> {
        let mut len_buf = [0u8; 4];
        if !read_exact_or_eof(&mut self.reader, &mut len_buf)? {
            return Ok(None);
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_FRAME_LEN {
            return Err(SortError::CorruptRun(format!(
                "frame length {} exceeds the {} byte limit",
                len, MAX_FRAME_LEN
            )));
        }

        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                SortError::CorruptRun("truncated frame payload".to_string())
            } else {
                SortError::IO(err)
            }
        })?;

        Ok(Some(payload))
    }

    fn finish(&mut self) {
        self.exhausted = true;
        if let Some(run) = self.run.take() {
            if let Err(err) = run.delete() {
                log::warn!("exhausted run file not deleted: {}", err);
            }
        }
    }
}

/// Fills `buf` completely, or returns `false` on clean EOF before the
/// first byte. EOF part-way through the buffer is a framing violation.
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> Result<bool, SortError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(SortError::CorruptRun("truncated frame length".to_string())),
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(SortError::IO(err)),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod test {
    use std::io::Write;
    use std::path::PathBuf;

    use rstest::*;
    use tempfile::TempPath;

    use super::{Run, RunReader, RunWriter};
    use crate::codec::RmpCodec;
    use crate::error::SortError;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn drain(mut reader: RunReader<i32>) -> Result<Vec<i32>, SortError> {
        let codec = RmpCodec::new();
        let mut items = Vec::new();
        while let Some(item) = reader.next(&codec)? {
            items.push(item);
        }
        Ok(items)
    }

    #[rstest]
    fn test_write_read_round_trip(tmp_dir: tempfile::TempDir) {
        let codec = RmpCodec::new();
        let saved = Vec::from_iter(0..100);

        let mut writer = RunWriter::create(tmp_dir.path()).unwrap();
        for item in &saved {
            writer.write(&codec, item).unwrap();
        }
        let run = writer.seal().unwrap();
        assert_eq!(run.items(), 100);

        let reader = RunReader::open(run).unwrap();
        assert_eq!(drain(reader).unwrap(), saved);
    }

    #[rstest]
    fn test_reader_deletes_file_at_eof(tmp_dir: tempfile::TempDir) {
        let codec = RmpCodec::new();

        let mut writer = RunWriter::create(tmp_dir.path()).unwrap();
        writer.write(&codec, &1).unwrap();
        let run = writer.seal().unwrap();
        let path: PathBuf = run.path.to_path_buf();
        assert!(path.exists());

        let reader = RunReader::open(run).unwrap();
        drain(reader).unwrap();
        assert!(!path.exists());
    }

    #[rstest]
    fn test_dropping_run_deletes_file(tmp_dir: tempfile::TempDir) {
        let codec = RmpCodec::new();

        let mut writer = RunWriter::create(tmp_dir.path()).unwrap();
        writer.write(&codec, &1).unwrap();
        let run = writer.seal().unwrap();
        let path: PathBuf = run.path.to_path_buf();

        drop(run);
        assert!(!path.exists());
    }

    #[rstest]
    fn test_empty_run(tmp_dir: tempfile::TempDir) {
        let writer = RunWriter::create(tmp_dir.path()).unwrap();
        let run = writer.seal().unwrap();
        assert_eq!(run.items(), 0);

        let reader = RunReader::open(run).unwrap();
        assert_eq!(drain(reader).unwrap(), Vec::<i32>::new());
    }

    #[rstest]
    fn test_create_in_missing_dir_fails() {
        let result = RunWriter::create(std::path::Path::new("/nonexistent/run/dir"));
        assert!(matches!(result, Err(SortError::TempFile(_))));
    }

    fn raw_run(tmp_dir: &tempfile::TempDir, bytes: &[u8]) -> Run {
        let path = tmp_dir.path().join("corrupt-run");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        Run {
            path: TempPath::from_path(path),
            items: 0,
        }
    }

    #[rstest]
    #[case::truncated_length(&[0x05, 0x00])]
    #[case::truncated_payload(&[0x0a, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03])]
    #[case::oversized_length(&[0xff, 0xff, 0xff, 0xff])]
    fn test_corrupt_frames(tmp_dir: tempfile::TempDir, #[case] bytes: &[u8]) {
        let run = raw_run(&tmp_dir, bytes);
        let reader = RunReader::open(run).unwrap();
        assert!(matches!(drain(reader), Err(SortError::CorruptRun(_))));
    }
}
