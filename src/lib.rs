//! `tape-sort` is a rust external merge sort algorithm implementation.
//!
//! External sorting is a class of sorting algorithms that can handle massive amounts of data. External
//! sorting is required when the data being sorted do not fit into the main memory (RAM) of a computer and
//! instead must be resided in slower external memory, usually a hard disk drive. Sorting happens in two
//! phases. During the first phase the input is read block by block; each block is sorted in memory and
//! written alternately onto two temporary tapes. During the second phase the tapes are merged pairwise,
//! the sorted run length doubling with every pass, until a single tape holds the fully sorted sequence.
//! For more information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! `tape-sort` supports the following features:
//!
//! * **Data agnostic:**
//!   it supports all record types that implement `serde` serialization/deserialization by default
//!   (stored as `MessagePack`), newline-delimited text lines out of the box, and any custom binary
//!   layout through the [`RecordCodec`] trait.
//! * **Caller-defined ordering:**
//!   records are compared by a caller-supplied function; an opaque context value is threaded
//!   unchanged through every read, write and compare call, so key-extraction configuration needs
//!   no global state.
//! * **Bounded memory:**
//!   at most one block of records is decoded in memory at a time, plus one record of lookahead
//!   per tape during merging.
//! * **In-place sorting:**
//!   the output may be the input file itself; the shared file is rewritten only after it has been
//!   fully read.
//!
//! # Example
//!
//! ```no_run
//! use std::fs;
//!
//! use tape_sort::{LineRecordCodec, SortOutput, TapeSorter, TapeSorterBuilder};
//!
//! fn main() {
//!     let mut input = fs::File::open("input.txt").unwrap();
//!     let mut output = fs::File::create("output.txt").unwrap();
//!
//!     let sorter: TapeSorter<String, (), LineRecordCodec> = TapeSorterBuilder::new()
//!         .with_block_size(100_000)
//!         .build()
//!         .unwrap();
//!
//!     sorter.sort(&mut input, SortOutput::File(&mut output), &()).unwrap();
//! }
//! ```

mod block;
pub mod codec;
mod merge;
pub mod sort;
mod tape;

pub use codec::{LineRecordCodec, RecordCodec, RmpRecordCodec};
pub use sort::{SortError, SortOutput, TapeSorter, TapeSorterBuilder, DEFAULT_BLOCK_SIZE};
