//! `pipesort` is a channel-pipelined external merge sort library.
//!
//! External sorting is a class of sorting algorithms that can handle massive amounts of data. External sorting
//! is required when the data being sorted do not fit into the main memory (RAM) of a computer and instead must be
//! resided in slower external memory, usually a hard disk drive. Sorting is achieved in two passes. During the
//! first pass it sorts chunks of data that each fit in RAM, during the second pass it merges the sorted chunks
//! together. For more information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! `pipesort` supports the following features:
//!
//! * **Data agnostic:**
//!   it supports all data types that implement `serde` serialization/deserialization by default,
//!   otherwise you can implement your own serialization/deserialization mechanism via the [`Codec`] trait.
//! * **Streaming:**
//!   input and output are bounded channels, so sorting overlaps with producing and consuming and a slow
//!   consumer applies backpressure all the way to the input.
//! * **Multithreading support:**
//!   chunks are sorted on a pool of worker threads while the pipeline keeps the number of in-memory
//!   elements bounded.
//! * **Cancellation:**
//!   a [`CancelToken`] stops a running sort at the next channel or file operation and cleans up every
//!   temporary file.
//!
//! # Example
//!
//! ```no_run
//! use crossbeam_channel::bounded;
//! use pipesort::{CancelToken, ExternalSorter, RmpCodec, SortConfig};
//!
//! fn main() {
//!     let (input_tx, input_rx) = bounded(1024);
//!     std::thread::spawn(move || {
//!         for value in [5u64, 3, 8, 1, 9] {
//!             input_tx.send(value).unwrap();
//!         }
//!     });
//!
//!     let config = SortConfig::new().with_chunk_size(2).with_num_workers(2);
//!     let (sorter, output_rx, error_rx) = ExternalSorter::new(
//!         input_rx,
//!         RmpCodec::<u64>::new(),
//!         |a: &u64, b: &u64| a < b,
//!         Some(config),
//!     );
//!
//!     let sorter = sorter.expect("sorter setup failed");
//!     let cancel = CancelToken::new();
//!     std::thread::spawn(move || sorter.sort(&cancel));
//!
//!     for value in output_rx {
//!         println!("{}", value);
//!     }
//!     if let Ok(err) = error_rx.recv() {
//!         eprintln!("sort failed: {}", err);
//!     }
//! }
//! ```

pub mod cancel;
pub mod chunk;
pub mod codec;
pub mod diff;
pub mod error;
pub mod merger;
pub mod queue;
pub mod run;
pub mod sorter;
pub mod strings;

pub use cancel::CancelToken;
pub use codec::{Codec, RmpCodec, StringCodec};
pub use diff::{new_diff, Differ};
pub use error::{CodecError, SortError};
pub use queue::PriorityQueue;
pub use sorter::{ExternalSorter, SortConfig};
pub use strings::{new_strings, StringSorter};
