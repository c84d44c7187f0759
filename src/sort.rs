//! External tape sorter.

use std::cmp::Ordering;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::marker::PhantomData;
use std::path::Path;

use crate::block::BlockBuilder;
use crate::codec::{RecordCodec, RmpRecordCodec};
use crate::merge;
use crate::tape::Tape;

/// Default in-memory block capacity, in records.
pub const DEFAULT_BLOCK_SIZE: usize = 8192;

/// Sorting error.
#[derive(Debug)]
pub enum SortError<E: Error, D: Error> {
    /// Temporary directory or tape creation error.
    TempFile(io::Error),
    /// Common I/O error.
    Io(io::Error),
    /// Record serialization error.
    Encode(E),
    /// Record deserialization error.
    Decode(D),
    /// Block size outside the valid range (at least one record is required).
    InvalidBlockSize(usize),
}

impl<E, D> Error for SortError<E, D>
where
    E: Error + 'static,
    D: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::TempFile(err) => Some(err),
            SortError::Io(err) => Some(err),
            SortError::Encode(err) => Some(err),
            SortError::Decode(err) => Some(err),
            SortError::InvalidBlockSize(_) => None,
        }
    }
}

impl<E: Error, D: Error> Display for SortError<E, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::TempFile(err) => write!(f, "temporary tape not created: {}", err),
            SortError::Io(err) => write!(f, "I/O operation failed: {}", err),
            SortError::Encode(err) => write!(f, "record serialization error: {}", err),
            SortError::Decode(err) => write!(f, "record deserialization error: {}", err),
            SortError::InvalidBlockSize(size) => {
                write!(f, "block size must be at least 1 record, got {}", size)
            }
        }
    }
}

/// Destination of a sort operation.
pub enum SortOutput<'a> {
    /// Write the sorted records to a separate stream, appending at its current position.
    File(&'a mut fs::File),
    /// Write the sorted records back over the input stream. The shared file is only
    /// touched after the input has been fully read and is repositioned to its start
    /// before the write-back, so unread input is never clobbered. The file itself stays
    /// under the caller's ownership and is never deleted or truncated.
    InPlace,
}

/// Tape sorter builder. Provides methods for [`TapeSorter`] initialization.
#[derive(Clone)]
pub struct TapeSorterBuilder<T, X = (), C = RmpRecordCodec<T>>
where
    C: RecordCodec<T, X>,
{
    /// Directory to be used to store temporary tapes.
    tmp_dir: Option<Box<Path>>,
    /// In-memory block capacity, in records.
    block_size: usize,
    /// Record codec.
    codec: C,

    /// Record type.
    record_type: PhantomData<T>,
    /// Caller context type.
    context_type: PhantomData<X>,
}

impl<T, X, C> TapeSorterBuilder<T, X, C>
where
    C: RecordCodec<T, X>,
{
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self
    where
        C: Default,
    {
        TapeSorterBuilder::default()
    }

    /// Builds a [`TapeSorter`] instance using provided configuration.
    pub fn build(self) -> Result<TapeSorter<T, X, C>, SortError<C::EncodeError, C::DecodeError>> {
        TapeSorter::new(self.tmp_dir.as_deref(), self.block_size, self.codec)
    }

    /// Sets directory to be used to store temporary tapes.
    pub fn with_tmp_dir(mut self, path: &Path) -> TapeSorterBuilder<T, X, C> {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets the number of records sorted in memory at a time.
    pub fn with_block_size(mut self, block_size: usize) -> TapeSorterBuilder<T, X, C> {
        self.block_size = block_size;
        return self;
    }

    /// Sets the record codec.
    pub fn with_codec(mut self, codec: C) -> TapeSorterBuilder<T, X, C> {
        self.codec = codec;
        return self;
    }
}

impl<T, X, C> Default for TapeSorterBuilder<T, X, C>
where
    C: RecordCodec<T, X> + Default,
{
    fn default() -> Self {
        TapeSorterBuilder {
            tmp_dir: None,
            block_size: DEFAULT_BLOCK_SIZE,
            codec: C::default(),
            record_type: PhantomData,
            context_type: PhantomData,
        }
    }
}

/// External tape sorter.
///
/// Sorts a record stream that does not fit in memory: the input is cut into blocks of
/// at most `block_size` records, each block is sorted in memory and distributed onto
/// two temporary tapes, then the tapes are merged pairwise with the run length doubling
/// every pass until a single sorted sequence reaches the output. Record encoding and
/// ordering are supplied by the caller and an opaque context value is threaded through
/// every codec and comparator call.
pub struct TapeSorter<T, X = (), C = RmpRecordCodec<T>>
where
    C: RecordCodec<T, X>,
{
    /// Directory holding the temporary tapes.
    tmp_dir: tempfile::TempDir,
    /// In-memory block capacity, in records.
    block_size: usize,
    /// Record codec.
    codec: C,

    /// Record type.
    record_type: PhantomData<T>,
    /// Caller context type.
    context_type: PhantomData<X>,
}

impl<T, X, C> TapeSorter<T, X, C>
where
    C: RecordCodec<T, X>,
{
    /// Creates a new tape sorter instance.
    ///
    /// # Arguments
    /// * `tmp_path` - Directory to be used to store temporary tapes. If the parameter is
    ///   [`None`] the default OS temporary directory will be used.
    /// * `block_size` - Number of records sorted in memory at a time; must be at least 1.
    /// * `codec` - Record codec used for every stream and tape access.
    pub fn new(
        tmp_path: Option<&Path>,
        block_size: usize,
        codec: C,
    ) -> Result<Self, SortError<C::EncodeError, C::DecodeError>> {
        if block_size == 0 {
            return Err(SortError::InvalidBlockSize(block_size));
        }

        return Ok(TapeSorter {
            tmp_dir: Self::init_tmp_directory(tmp_path)?,
            block_size,
            codec,
            record_type: PhantomData,
            context_type: PhantomData,
        });
    }

    fn init_tmp_directory(
        tmp_path: Option<&Path>,
    ) -> Result<tempfile::TempDir, SortError<C::EncodeError, C::DecodeError>> {
        let tmp_dir = if let Some(tmp_path) = tmp_path {
            tempfile::tempdir_in(tmp_path)
        } else {
            tempfile::tempdir()
        }
        .map_err(|err| SortError::TempFile(err))?;

        log::info!("using {} as a temporary directory", tmp_dir.path().display());

        return Ok(tmp_dir);
    }

    /// Sorts records from the input stream into the output destination using the record
    /// type's natural order.
    ///
    /// # Arguments
    /// * `input` - Stream the unsorted records are fetched from
    /// * `output` - Destination for the sorted records
    /// * `ctx` - Opaque context passed to every codec call
    pub fn sort(
        &self,
        input: &mut fs::File,
        output: SortOutput<'_>,
        ctx: &X,
    ) -> Result<(), SortError<C::EncodeError, C::DecodeError>>
    where
        T: Ord,
    {
        self.sort_by(input, output, ctx, |a, b, _| a.cmp(b))
    }

    /// Sorts records from the input stream into the output destination using a custom
    /// compare function.
    ///
    /// The input is consumed from its current position to end-of-stream. The operation
    /// is all-or-nothing: on error the destination contents are unspecified and all
    /// temporary tapes are reclaimed.
    ///
    /// # Arguments
    /// * `input` - Stream the unsorted records are fetched from
    /// * `output` - Destination for the sorted records; [`SortOutput::InPlace`] rewrites
    ///   the input stream itself
    /// * `ctx` - Opaque context passed to every codec and comparator call
    /// * `compare` - Function to be used to compare records
    pub fn sort_by<Cmp>(
        &self,
        input: &mut fs::File,
        output: SortOutput<'_>,
        ctx: &X,
        compare: Cmp,
    ) -> Result<(), SortError<C::EncodeError, C::DecodeError>>
    where
        Cmp: Fn(&T, &T, &X) -> Ordering,
    {
        let mut source = self.distribute(input, ctx, &compare)?;

        // in the aliasing case the shared file has been fully read by now;
        // reposition it before any write-back touches it
        let out: &mut fs::File = match output {
            SortOutput::File(file) => file,
            SortOutput::InPlace => {
                input.seek(io::SeekFrom::Start(0)).map_err(|err| SortError::Io(err))?;
                input
            }
        };

        source[0].rewind().map_err(|err| SortError::Io(err))?;
        source[1].rewind().map_err(|err| SortError::Io(err))?;

        if source[1].count == 0 {
            // the whole input fit into a single block: tape 0 is already fully sorted
            log::debug!("single sorted block, copying tape 0 straight to the output");
            return merge::copy_tape(&self.codec, &mut source[0], out, ctx);
        }

        merge::merge_tapes(
            &self.codec,
            self.tmp_dir.path(),
            source,
            out,
            self.block_size as u64,
            ctx,
            &compare,
        )
    }

    /// Reads the input block by block, sorting each block in memory and appending it to
    /// tapes 0 and 1 alternately.
    fn distribute<Cmp>(
        &self,
        input: &mut fs::File,
        ctx: &X,
        compare: &Cmp,
    ) -> Result<[Tape; 2], SortError<C::EncodeError, C::DecodeError>>
    where
        Cmp: Fn(&T, &T, &X) -> Ordering,
    {
        let mut tapes = [
            Tape::create(self.tmp_dir.path()).map_err(|err| SortError::TempFile(err))?,
            Tape::create(self.tmp_dir.path()).map_err(|err| SortError::TempFile(err))?,
        ];

        let mut block = BlockBuilder::new(self.block_size);
        let mut destination = 0;

        loop {
            let record = self
                .codec
                .read_record(input, ctx)
                .map_err(|err| SortError::Decode(err))?;
            let at_end = record.is_none();

            if let Some(record) = record {
                block.push(record);
            }

            if block.is_full() || (at_end && !block.is_empty()) {
                block.sort_by(|a, b| compare(a, b, ctx));
                for record in block.drain() {
                    self.codec
                        .write_record(&mut tapes[destination].file, &record, ctx)
                        .map_err(|err| SortError::Encode(err))?;
                    tapes[destination].count += 1;
                }
                destination ^= 1;
            }

            if at_end {
                break;
            }
        }

        log::debug!(
            "initial distribution done: {} + {} records in blocks of {}",
            tapes[0].count,
            tapes[1].count,
            self.block_size
        );

        return Ok(tapes);
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::io::prelude::*;
    use std::io::SeekFrom;

    use rand::seq::SliceRandom;
    use rstest::*;
    use serde::{Deserialize, Serialize};

    use crate::codec::{LineRecordCodec, RecordCodec, RmpRecordCodec};

    use super::{SortError, SortOutput, TapeSorter, TapeSorterBuilder};

    fn file_with_records<T, X, C>(codec: &C, ctx: &X, records: &[T]) -> fs::File
    where
        C: RecordCodec<T, X>,
    {
        let mut file = tempfile::tempfile().unwrap();
        for record in records {
            codec.write_record(&mut file, record, ctx).unwrap();
        }
        file.seek(SeekFrom::Start(0)).unwrap();
        file
    }

    fn read_records<T, X, C>(codec: &C, ctx: &X, file: &mut fs::File) -> Vec<T>
    where
        C: RecordCodec<T, X>,
    {
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut records = Vec::new();
        while let Some(record) = codec.read_record(file, ctx).unwrap() {
            records.push(record);
        }
        records
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(8)]
    #[case(1000)]
    fn test_sort_shuffled_integers(#[case] block_size: usize) {
        let sorted = Vec::from_iter(0..100);
        let mut shuffled = sorted.clone();
        shuffled.shuffle(&mut rand::thread_rng());

        let sorter: TapeSorter<i32> = TapeSorterBuilder::new()
            .with_block_size(block_size)
            .build()
            .unwrap();

        let codec = RmpRecordCodec::<i32>::default();
        let mut input = file_with_records(&codec, &(), &shuffled);
        let mut output = tempfile::tempfile().unwrap();

        sorter.sort(&mut input, SortOutput::File(&mut output), &()).unwrap();

        assert_eq!(read_records(&codec, &(), &mut output), sorted);
    }

    #[rstest]
    fn test_sort_preserves_duplicates() {
        let mut values = Vec::from_iter((0..30).map(|i| i % 7));
        values.shuffle(&mut rand::thread_rng());

        let sorter: TapeSorter<i32> = TapeSorterBuilder::new().with_block_size(4).build().unwrap();

        let codec = RmpRecordCodec::<i32>::default();
        let mut input = file_with_records(&codec, &(), &values);
        let mut output = tempfile::tempfile().unwrap();

        sorter.sort(&mut input, SortOutput::File(&mut output), &()).unwrap();

        values.sort_unstable();
        assert_eq!(read_records(&codec, &(), &mut output), values);
    }

    #[rstest]
    fn test_sort_numeric_lines() {
        let lines = Vec::from_iter(["30", "5", "8", "2"].map(String::from));

        let sorter: TapeSorter<String, (), LineRecordCodec> = TapeSorterBuilder::new()
            .with_block_size(2)
            .build()
            .unwrap();

        let codec = LineRecordCodec;
        let mut input = file_with_records(&codec, &(), &lines);
        let mut output = tempfile::tempfile().unwrap();

        sorter
            .sort_by(&mut input, SortOutput::File(&mut output), &(), |a, b, _| {
                a.parse::<i64>().unwrap().cmp(&b.parse::<i64>().unwrap())
            })
            .unwrap();

        assert_eq!(
            read_records(&codec, &(), &mut output),
            Vec::from_iter(["2", "5", "8", "30"].map(String::from))
        );
    }

    #[rstest]
    fn test_sort_empty_input() {
        let sorter: TapeSorter<i32> = TapeSorterBuilder::new().with_block_size(2).build().unwrap();

        let codec = RmpRecordCodec::<i32>::default();
        let mut input = tempfile::tempfile().unwrap();
        let mut output = tempfile::tempfile().unwrap();

        sorter.sort(&mut input, SortOutput::File(&mut output), &()).unwrap();

        assert_eq!(read_records(&codec, &(), &mut output), Vec::<i32>::new());
    }

    #[rstest]
    fn test_sort_single_record() {
        let sorter: TapeSorter<i32> = TapeSorterBuilder::new().with_block_size(2).build().unwrap();

        let codec = RmpRecordCodec::<i32>::default();
        let mut input = file_with_records(&codec, &(), &[42]);
        let mut output = tempfile::tempfile().unwrap();

        sorter.sort(&mut input, SortOutput::File(&mut output), &()).unwrap();

        assert_eq!(read_records(&codec, &(), &mut output), vec![42]);
    }

    #[rstest]
    fn test_sort_already_sorted_input() {
        let sorted = Vec::from_iter(0..50);

        let sorter: TapeSorter<i32> = TapeSorterBuilder::new().with_block_size(8).build().unwrap();

        let codec = RmpRecordCodec::<i32>::default();
        let mut input = file_with_records(&codec, &(), &sorted);
        let mut output = tempfile::tempfile().unwrap();

        sorter.sort(&mut input, SortOutput::File(&mut output), &()).unwrap();

        assert_eq!(read_records(&codec, &(), &mut output), sorted);
    }

    #[rstest]
    #[case(4)]
    #[case(64)]
    fn test_sort_in_place(#[case] block_size: usize) {
        let mut values = Vec::from_iter(0..100u32);
        values.shuffle(&mut rand::thread_rng());
        let lines = Vec::from_iter(values.iter().map(|v| v.to_string()));

        let codec = LineRecordCodec;
        let mut file = file_with_records(&codec, &(), &lines);

        let sorter: TapeSorter<String, (), LineRecordCodec> = TapeSorterBuilder::new()
            .with_block_size(block_size)
            .build()
            .unwrap();

        sorter
            .sort_by(&mut file, SortOutput::InPlace, &(), |a, b, _| {
                a.parse::<u32>().unwrap().cmp(&b.parse::<u32>().unwrap())
            })
            .unwrap();

        let expected = Vec::from_iter((0..100u32).map(|v| v.to_string()));
        assert_eq!(read_records(&codec, &(), &mut file), expected);
    }

    #[rstest]
    fn test_in_place_matches_separate_destination() {
        let mut values = Vec::from_iter(0..200);
        values.shuffle(&mut rand::thread_rng());

        let codec = RmpRecordCodec::<i32>::default();
        let sorter: TapeSorter<i32> = TapeSorterBuilder::new().with_block_size(16).build().unwrap();

        let mut separate_input = file_with_records(&codec, &(), &values);
        let mut separate_output = tempfile::tempfile().unwrap();
        sorter
            .sort(&mut separate_input, SortOutput::File(&mut separate_output), &())
            .unwrap();

        let mut aliased = file_with_records(&codec, &(), &values);
        sorter.sort(&mut aliased, SortOutput::InPlace, &()).unwrap();

        assert_eq!(
            read_records(&codec, &(), &mut aliased),
            read_records(&codec, &(), &mut separate_output)
        );
    }

    #[rstest]
    fn test_comparator_context() {
        let lines = Vec::from_iter(["ff", "a", "10"].map(String::from));

        let sorter: TapeSorter<String, u32, LineRecordCodec> = TapeSorterBuilder::new()
            .with_block_size(2)
            .build()
            .unwrap();

        let codec = LineRecordCodec;
        let mut input = file_with_records(&codec, &16, &lines);
        let mut output = tempfile::tempfile().unwrap();

        sorter
            .sort_by(&mut input, SortOutput::File(&mut output), &16, |a, b, radix| {
                u64::from_str_radix(a, *radix)
                    .unwrap()
                    .cmp(&u64::from_str_radix(b, *radix).unwrap())
            })
            .unwrap();

        assert_eq!(
            read_records(&codec, &16, &mut output),
            Vec::from_iter(["a", "10", "ff"].map(String::from))
        );
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct Measurement {
        sensor: String,
        value: i64,
    }

    #[rstest]
    fn test_sort_custom_records_by_field() {
        let records = Vec::from_iter([9, -3, 4, 7, 0].map(|value| Measurement {
            sensor: format!("sensor-{}", value),
            value,
        }));

        let sorter: TapeSorter<Measurement> =
            TapeSorterBuilder::new().with_block_size(2).build().unwrap();

        let codec = RmpRecordCodec::<Measurement>::default();
        let mut input = file_with_records(&codec, &(), &records);
        let mut output = tempfile::tempfile().unwrap();

        sorter
            .sort_by(&mut input, SortOutput::File(&mut output), &(), |a, b, _| {
                a.value.cmp(&b.value)
            })
            .unwrap();

        let mut expected = records;
        expected.sort_unstable_by_key(|record| record.value);
        assert_eq!(read_records(&codec, &(), &mut output), expected);
    }

    #[rstest]
    fn test_sorter_with_custom_tmp_dir() {
        let tmp = tempfile::tempdir().unwrap();

        let mut values = Vec::from_iter(0..10);
        values.shuffle(&mut rand::thread_rng());

        let sorter: TapeSorter<i32> = TapeSorterBuilder::new()
            .with_tmp_dir(tmp.path())
            .with_block_size(2)
            .build()
            .unwrap();

        let codec = RmpRecordCodec::<i32>::default();
        let mut input = file_with_records(&codec, &(), &values);
        let mut output = tempfile::tempfile().unwrap();

        sorter.sort(&mut input, SortOutput::File(&mut output), &()).unwrap();

        assert_eq!(read_records(&codec, &(), &mut output), Vec::from_iter(0..10));
    }

    #[rstest]
    fn test_zero_block_size_rejected() {
        let result: Result<TapeSorter<i32>, _> =
            TapeSorterBuilder::new().with_block_size(0).build();

        assert!(matches!(result, Err(SortError::InvalidBlockSize(0))));
    }
}
