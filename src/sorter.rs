//! External sorter orchestration.
//!
//! A sort runs in two strict phases. The build phase drains the input
//! channel into bounded chunks, sorts them on a worker pool and seals each
//! one as a run file. The merge phase streams every run back through a
//! heap-based k-way merge into the output channel. The first failure
//! anywhere tears the pipeline down, deletes every run and surfaces the
//! error on the error channel.

use std::path::{Path, PathBuf};
use std::thread;

use crossbeam_channel::{bounded, select, Receiver, Sender};

use crate::cancel::CancelToken;
use crate::chunk::Chunk;
use crate::codec::Codec;
use crate::error::SortError;
use crate::merger::Merger;
use crate::run::{Run, RunWriter};

/// Sorter configuration. The defaults match [`SortConfig::default`]; a
/// `None` configuration passed to [`ExternalSorter::new`] means all
/// defaults.
#[derive(Debug, Clone)]
pub struct SortConfig {
    /// Maximum number of elements per in-memory chunk.
    pub chunk_size: usize,
    /// Number of parallel sort workers.
    pub num_workers: usize,
    /// Capacity of the unsorted-chunk hand-off channel.
    pub chan_buffer: usize,
    /// Directory the run files are placed in; [`None`] means the OS
    /// temporary directory.
    pub temp_files_dir: Option<PathBuf>,
    /// Capacity of the output channel. Zero makes emission a rendezvous
    /// with the consumer.
    pub sorted_chan_buffer: usize,
}

impl Default for SortConfig {
    fn default() -> Self {
        SortConfig {
            chunk_size: 64 * 1024,
            num_workers: 2,
            chan_buffer: 1,
            temp_files_dir: None,
            sorted_chan_buffer: 0,
        }
    }
}

impl SortConfig {
    pub fn new() -> Self {
        SortConfig::default()
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> SortConfig {
        self.chunk_size = chunk_size;
        return self;
    }

    pub fn with_num_workers(mut self, num_workers: usize) -> SortConfig {
        self.num_workers = num_workers;
        return self;
    }

    pub fn with_chan_buffer(mut self, chan_buffer: usize) -> SortConfig {
        self.chan_buffer = chan_buffer;
        return self;
    }

    pub fn with_temp_files_dir(mut self, path: &Path) -> SortConfig {
        self.temp_files_dir = Some(path.to_path_buf());
        return self;
    }

    pub fn with_sorted_chan_buffer(mut self, sorted_chan_buffer: usize) -> SortConfig {
        self.sorted_chan_buffer = sorted_chan_buffer;
        return self;
    }

    pub(crate) fn validate(&self) -> Result<(), SortError> {
        if self.chunk_size < 1 {
            return Err(SortError::InvalidConfig("chunk_size must be at least 1".to_string()));
        }
        if self.num_workers < 1 {
            return Err(SortError::InvalidConfig("num_workers must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// External sorter handle.
///
/// Constructed together with its output and error channels by
/// [`ExternalSorter::new`]; [`sort`](ExternalSorter::sort) consumes the
/// handle and drives the pipeline to completion, so a sorter cannot be
/// reused. The output channel closes when the sort ends, on success and
/// failure alike; the error channel carries exactly one error on failure
/// and none on success. Consumers must drain the output channel before
/// waiting on the error channel.
pub struct ExternalSorter<T, C, F>
where
    T: Send,
    C: Codec<T>,
    F: Fn(&T, &T) -> bool + Sync,
{
    input: Receiver<T>,
    codec: C,
    less: F,
    config: SortConfig,
    tmp_dir: tempfile::TempDir,
    output: Sender<T>,
    errors: Sender<SortError>,
}

impl<T, C, F> ExternalSorter<T, C, F>
where
    T: Send,
    C: Codec<T>,
    F: Fn(&T, &T) -> bool + Sync,
{
    /// Creates a sorter reading elements from `input`, serializing them
    /// with `codec` and ordering them by `less` (a strict weak ordering;
    /// ties may reorder).
    ///
    /// Returns the handle together with the output and error channels.
    /// If setup cannot proceed (invalid configuration, temporary
    /// directory creation failure) the handle is [`None`], the output
    /// channel is already closed and the error channel already holds the
    /// error; no other call is needed to observe the failure.
    pub fn new(
        input: Receiver<T>,
        codec: C,
        less: F,
        config: Option<SortConfig>,
    ) -> (Option<Self>, Receiver<T>, Receiver<SortError>) {
        let config = config.unwrap_or_default();
        let (output_tx, output_rx) = bounded(config.sorted_chan_buffer);
        let (error_tx, error_rx) = bounded(1);

        if let Err(err) = config.validate() {
            error_tx.send(err).ok();
            return (None, output_rx, error_rx);
        }

        let tmp_dir = match init_tmp_directory(config.temp_files_dir.as_deref()) {
            Ok(tmp_dir) => tmp_dir,
            Err(err) => {
                error_tx.send(err).ok();
                return (None, output_rx, error_rx);
            }
        };

        let sorter = ExternalSorter {
            input,
            codec,
            less,
            config,
            tmp_dir,
            output: output_tx,
            errors: error_tx,
        };

        (Some(sorter), output_rx, error_rx)
    }

    /// Drives the pipeline to completion, blocking until the output
    /// channel has been fully emitted and closed or the sort failed.
    /// `cancel` is observed at every channel operation and between file
    /// writes; cancellation surfaces as [`SortError::Canceled`].
    pub fn sort(self, cancel: &CancelToken) {
        let ExternalSorter {
            input,
            codec,
            less,
            config,
            tmp_dir,
            output,
            errors,
        } = self;

        log::info!(
            "starting sort: {} workers, chunk size {}",
            config.num_workers,
            config.chunk_size
        );

        match run_pipeline(input, &codec, &less, &config, &tmp_dir, &output, cancel) {
            Ok(emitted) => log::debug!("sort finished, {} elements emitted", emitted),
            Err(err) => {
                log::debug!("sort failed: {}", err);
                if errors.try_send(err).is_err() {
                    log::warn!("sort error not delivered, error channel abandoned");
                }
            }
        }
        // dropping `output` closes the sorted stream; dropping `tmp_dir`
        // removes whatever run files remain
    }
}

fn init_tmp_directory(tmp_path: Option<&Path>) -> Result<tempfile::TempDir, SortError> {
    let tmp_dir = match tmp_path {
        Some(tmp_path) => tempfile::tempdir_in(tmp_path),
        None => tempfile::tempdir(),
    }
    .map_err(SortError::TempFile)?;

    log::info!("using {} as a temporary directory", tmp_dir.path().display());

    Ok(tmp_dir)
}

fn run_pipeline<T, C, F>(
    input: Receiver<T>,
    codec: &C,
    less: &F,
    config: &SortConfig,
    tmp_dir: &tempfile::TempDir,
    output: &Sender<T>,
    cancel: &CancelToken,
) -> Result<u64, SortError>
where
    T: Send,
    C: Codec<T>,
    F: Fn(&T, &T) -> bool + Sync,
{
    // internal token used to tear the pipeline down on the first error
    let abort = CancelToken::new();

    log::debug!("build phase started");
    let runs = build_runs(input, codec, less, config, tmp_dir, cancel, &abort)?;

    log::debug!("merge phase started ({} runs)", runs.len());
    let emitted = merge_runs(runs, codec, less, output, cancel, &abort)?;

    Ok(emitted)
}

/// Build phase: producer and sort workers feed the run writer until the
/// input drains. Returns the sealed runs. On any failure the internal
/// abort token unblocks every task, in-flight chunks are discarded and
/// the already-created runs are deleted when the run list drops.
fn build_runs<T, C, F>(
    input: Receiver<T>,
    codec: &C,
    less: &F,
    config: &SortConfig,
    tmp_dir: &tempfile::TempDir,
    cancel: &CancelToken,
    abort: &CancelToken,
) -> Result<Vec<Run>, SortError>
where
    T: Send,
    C: Codec<T>,
    F: Fn(&T, &T) -> bool + Sync,
{
    let chunk_size = config.chunk_size;

    let (unsorted_tx, unsorted_rx) = bounded::<Chunk<T>>(config.chan_buffer);
    // rendezvous hand-off: live chunks stay bounded by
    // num_workers + chan_buffer + 2
    let (sorted_tx, sorted_rx) = bounded::<Chunk<T>>(0);

    let mut runs = Vec::new();

    let result = thread::scope(|scope| {
        scope.spawn(move || build_chunks(input, unsorted_tx, chunk_size, cancel, abort));

        for _ in 0..config.num_workers {
            let worker_rx = unsorted_rx.clone();
            let worker_tx = sorted_tx.clone();
            scope.spawn(move || sort_worker(worker_rx, worker_tx, less, cancel, abort));
        }
        drop(unsorted_rx);
        drop(sorted_tx);

        let result = write_runs(&sorted_rx, codec, tmp_dir, &mut runs, cancel, abort);
        if result.is_err() {
            // unblock the producer and workers so the scope can join them
            abort.cancel();
        }
        result
    });

    result.map(|()| runs)
}

/// Producer: drains the input channel into chunks of up to `chunk_size`
/// elements. The final partial chunk is dispatched too; empty chunks are
/// dropped. Closes the unsorted channel on exit.
fn build_chunks<T: Send>(
    input: Receiver<T>,
    unsorted_tx: Sender<Chunk<T>>,
    chunk_size: usize,
    cancel: &CancelToken,
    abort: &CancelToken,
) {
    let mut chunk = Chunk::new(chunk_size);

    loop {
        if cancel.is_canceled() || abort.is_canceled() {
            return;
        }

        let item = match guarded_recv(&input, cancel, abort) {
            Ok(Some(item)) => item,
            Ok(None) => break,
            Err(_) => return,
        };

        chunk.push(item);
        if chunk.is_full() {
            let full = std::mem::replace(&mut chunk, Chunk::new(chunk_size));
            if guarded_send(&unsorted_tx, full, cancel, abort).is_err() {
                return;
            }
        }
    }

    if !chunk.is_empty() {
        let _ = guarded_send(&unsorted_tx, chunk, cancel, abort);
    }
    log::debug!("chunk producer finished");
}

/// Sort worker: receives unsorted chunks, sorts them in place and hands
/// them to the writer. Exits when the unsorted channel drains; the sorted
/// channel closes once the last worker exits.
fn sort_worker<T, F>(
    unsorted_rx: Receiver<Chunk<T>>,
    sorted_tx: Sender<Chunk<T>>,
    less: &F,
    cancel: &CancelToken,
    abort: &CancelToken,
) where
    T: Send,
    F: Fn(&T, &T) -> bool + Sync,
{
    loop {
        if cancel.is_canceled() || abort.is_canceled() {
            return;
        }

        let mut chunk = match guarded_recv(&unsorted_rx, cancel, abort) {
            Ok(Some(chunk)) => chunk,
            Ok(None) => return,
            Err(_) => return,
        };

        log::debug!("sorting chunk of {} elements", chunk.len());
        chunk.sort(less);

        if guarded_send(&sorted_tx, chunk, cancel, abort).is_err() {
            return;
        }
    }
}

/// Writer: streams every sorted chunk into a fresh run file and retains
/// the sealed runs. Runs on the orchestrating thread.
fn write_runs<T, C: Codec<T>>(
    sorted_rx: &Receiver<Chunk<T>>,
    codec: &C,
    tmp_dir: &tempfile::TempDir,
    runs: &mut Vec<Run>,
    cancel: &CancelToken,
    abort: &CancelToken,
) -> Result<(), SortError> {
    loop {
        if cancel.is_canceled() {
            return Err(SortError::Canceled);
        }

        let chunk = match guarded_recv(sorted_rx, cancel, abort) {
            Ok(Some(chunk)) => chunk,
            Ok(None) => return Ok(()),
            Err(_) => return Err(SortError::Canceled),
        };

        let mut writer = RunWriter::create(tmp_dir.path())?;
        for item in chunk {
            if cancel.is_canceled() {
                return Err(SortError::Canceled);
            }
            writer.write(codec, &item)?;
        }

        let run = writer.seal()?;
        log::debug!("run written ({} elements, {} runs total)", run.items(), runs.len() + 1);
        runs.push(run);
    }
}

/// Merge phase: emits the merged stream to the output channel. Emission
/// is the backpressure point; a slow consumer blocks the merge here.
fn merge_runs<T, C, F>(
    runs: Vec<Run>,
    codec: &C,
    less: &F,
    output: &Sender<T>,
    cancel: &CancelToken,
    abort: &CancelToken,
) -> Result<u64, SortError>
where
    C: Codec<T>,
    F: Fn(&T, &T) -> bool,
{
    let mut merger = Merger::new(runs, codec, less)?;
    let mut emitted = 0u64;

    loop {
        if cancel.is_canceled() {
            return Err(SortError::Canceled);
        }

        let item = match merger.next()? {
            Some(item) => item,
            None => return Ok(emitted),
        };

        // a consumer that dropped the output channel counts as cancellation
        if guarded_send(output, item, cancel, abort).is_err() {
            return Err(SortError::Canceled);
        }
        emitted += 1;
    }
}

enum Interrupt {
    Canceled,
    Aborted,
}

/// Receives from `rx` unless one of the tokens trips first. `Ok(None)`
/// means the channel is closed and drained.
fn guarded_recv<T>(
    rx: &Receiver<T>,
    cancel: &CancelToken,
    abort: &CancelToken,
) -> Result<Option<T>, Interrupt> {
    select! {
        recv(rx) -> msg => Ok(msg.ok()),
        recv(cancel.signal()) -> _ => Err(Interrupt::Canceled),
        recv(abort.signal()) -> _ => Err(Interrupt::Aborted),
    }
}

/// Sends to `tx` unless one of the tokens trips first. A disconnected
/// receiver is reported as a cancellation.
fn guarded_send<T>(
    tx: &Sender<T>,
    item: T,
    cancel: &CancelToken,
    abort: &CancelToken,
) -> Result<(), Interrupt> {
    select! {
        send(tx, item) -> res => res.map_err(|_| Interrupt::Canceled),
        recv(cancel.signal()) -> _ => Err(Interrupt::Canceled),
        recv(abort.signal()) -> _ => Err(Interrupt::Aborted),
    }
}
