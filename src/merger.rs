//! Heap-based k-way merger.

use crate::codec::Codec;
use crate::error::SortError;
use crate::queue::PriorityQueue;
use crate::run::{Run, RunReader};

/// Heap entry pairing a reader's current head with the reader it came from.
/// For every live reader exactly one entry is in the heap.
struct HeapEntry<T> {
    head: T,
    source: usize,
}

type EntryLess<'a, T> = Box<dyn Fn(&HeapEntry<T>, &HeapEntry<T>) -> bool + 'a>;

/// Merges the sealed runs of one sort into a single stream in
/// non-decreasing order. Time complexity is *m* \* log(*k*) where *m* is
/// the number of elements and *k* the number of runs. Exhausted readers
/// delete their files as the merge progresses.
pub struct Merger<'a, T, C>
where
    C: Codec<T>,
{
    readers: Vec<RunReader<T>>,
    codec: &'a C,
    heap: PriorityQueue<HeapEntry<T>, EntryLess<'a, T>>,
}

impl<'a, T, C> Merger<'a, T, C>
where
    C: Codec<T>,
{
    /// Opens a reader per run and seeds the heap with every non-empty
    /// reader's head. Fails with the underlying error if any run cannot
    /// be opened or read; abandoned runs delete their files on drop.
    pub fn new<F>(runs: Vec<Run>, codec: &'a C, less: &'a F) -> Result<Self, SortError>
    where
        F: Fn(&T, &T) -> bool,
    {
        let mut readers = Vec::with_capacity(runs.len());
        for run in runs {
            readers.push(RunReader::open(run)?);
        }

        let entry_less: EntryLess<'a, T> = Box::new(move |a, b| less(&a.head, &b.head));
        let mut heap = PriorityQueue::with_capacity(readers.len(), entry_less);

        for (source, reader) in readers.iter_mut().enumerate() {
            if let Some(head) = reader.next(codec)? {
                heap.push(HeapEntry { head, source });
            }
        }

        Ok(Merger { readers, codec, heap })
    }

    /// Returns the next element of the merged stream, or [`None`] once
    /// every run is exhausted.
    pub fn next(&mut self) -> Result<Option<T>, SortError> {
        let HeapEntry { head, source } = match self.heap.pop() {
            Some(entry) => entry,
            None => return Ok(None),
        };

        if let Some(next_head) = self.readers[source].next(self.codec)? {
            self.heap.push(HeapEntry { head: next_head, source });
        }

        Ok(Some(head))
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::Merger;
    use crate::codec::RmpCodec;
    use crate::error::SortError;
    use crate::run::{Run, RunWriter};

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn make_run(tmp_dir: &tempfile::TempDir, items: &[i32]) -> Run {
        let codec = RmpCodec::new();
        let mut writer = RunWriter::create(tmp_dir.path()).unwrap();
        for item in items {
            writer.write(&codec, item).unwrap();
        }
        writer.seal().unwrap()
    }

    fn merge_all(runs: Vec<Run>) -> Result<Vec<i32>, SortError> {
        let codec = RmpCodec::new();
        let less = |a: &i32, b: &i32| a < b;
        let mut merger = Merger::new(runs, &codec, &less)?;

        let mut merged = Vec::new();
        while let Some(item) = merger.next()? {
            merged.push(item);
        }
        Ok(merged)
    }

    #[rstest]
    #[case(vec![], vec![])]
    #[case(vec![vec![], vec![]], vec![])]
    #[case(
        vec![vec![4, 5, 7], vec![1, 6], vec![3], vec![]],
        vec![1, 3, 4, 5, 6, 7],
    )]
    #[case(
        vec![vec![0, 0, 1], vec![0, 2], vec![1, 1]],
        vec![0, 0, 0, 1, 1, 1, 2],
    )]
    fn test_merge(
        tmp_dir: tempfile::TempDir,
        #[case] runs: Vec<Vec<i32>>,
        #[case] expected: Vec<i32>,
    ) {
        let runs = Vec::from_iter(runs.iter().map(|items| make_run(&tmp_dir, items)));
        assert_eq!(merge_all(runs).unwrap(), expected);
    }

    #[rstest]
    fn test_merge_deletes_all_files(tmp_dir: tempfile::TempDir) {
        let runs = vec![
            make_run(&tmp_dir, &[2, 4]),
            make_run(&tmp_dir, &[1, 3]),
            make_run(&tmp_dir, &[]),
        ];

        merge_all(runs).unwrap();
        assert_eq!(std::fs::read_dir(tmp_dir.path()).unwrap().count(), 0);
    }

    #[rstest]
    fn test_singleton_runs(tmp_dir: tempfile::TempDir) {
        let runs = Vec::from_iter([5, 3, 8, 1, 9].iter().map(|i| make_run(&tmp_dir, &[*i])));
        assert_eq!(merge_all(runs).unwrap(), vec![1, 3, 5, 8, 9]);
    }
}
