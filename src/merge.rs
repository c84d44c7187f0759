//! Two-tape merge engine.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::Path;

use crate::codec::RecordCodec;
use crate::sort::SortError;
use crate::tape::Tape;

/// One merge destination: a file currently open for writing plus the number of records
/// written to it during the running pass. The file is either a fresh temporary tape or,
/// on the finishing pass, the final output stream.
struct DestSlot<'a> {
    file: &'a mut fs::File,
    count: u64,
}

impl<'a> DestSlot<'a> {
    fn new(file: &'a mut fs::File) -> Self {
        DestSlot { file, count: 0 }
    }
}

/// Reads the next record off a tape. The tape's count must say one is there: a clean
/// end-of-stream at this point means the bookkeeping is out of sync with the file.
/// Counts are left untouched, the caller decrements them.
fn read_tape_record<T, X, C>(
    codec: &C,
    tape: &mut Tape,
    ctx: &X,
) -> Result<T, SortError<C::EncodeError, C::DecodeError>>
where
    C: RecordCodec<T, X>,
{
    match codec.read_record(&mut tape.file, ctx).map_err(|err| SortError::Decode(err))? {
        Some(record) => Ok(record),
        None => Err(SortError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "tape exhausted before its record count",
        ))),
    }
}

/// Copies every record from the tape to the output stream, one at a time.
/// This is the terminal path for inputs that fit into a single sorted block.
pub(crate) fn copy_tape<T, X, C>(
    codec: &C,
    tape: &mut Tape,
    out: &mut fs::File,
    ctx: &X,
) -> Result<(), SortError<C::EncodeError, C::DecodeError>>
where
    C: RecordCodec<T, X>,
{
    while tape.count != 0 {
        let record = read_tape_record(codec, tape, ctx)?;
        codec.write_record(out, &record, ctx).map_err(|err| SortError::Encode(err))?;
        tape.count -= 1;
    }

    return Ok(());
}

/// Merges the two source tapes into the output stream, pass by pass.
///
/// Each pass merges sorted runs of up to `block_size` records pairwise onto two fresh
/// destination tapes, doubling the run length. Once everything left on tape 0 fits into
/// a single doubled run the pass writes directly into `out` and the sort is complete.
/// Both source tapes must be rewound and tape 1 must hold at least one record.
pub(crate) fn merge_tapes<T, X, C, Cmp>(
    codec: &C,
    tmp_dir: &Path,
    mut source: [Tape; 2],
    out: &mut fs::File,
    mut block_size: u64,
    ctx: &X,
    compare: &Cmp,
) -> Result<(), SortError<C::EncodeError, C::DecodeError>>
where
    C: RecordCodec<T, X>,
    Cmp: Fn(&T, &T, &X) -> Ordering,
{
    let mut pass = 0u32;

    loop {
        pass += 1;
        log::debug!(
            "merge pass {}: {} + {} records, run length {}",
            pass,
            source[0].count,
            source[1].count,
            block_size
        );

        if source[0].count <= block_size {
            // finishing pass: one run pair absorbs everything, destination 0 is the
            // output itself and the spill tape ends up empty
            let mut spill = Tape::create(tmp_dir).map_err(|err| SortError::TempFile(err))?;
            let mut dest = [DestSlot::new(&mut *out), DestSlot::new(&mut spill.file)];
            merge_pass(codec, &mut source, &mut dest, block_size, ctx, compare)?;

            return Ok(());
        }

        let mut dest0 = Tape::create(tmp_dir).map_err(|err| SortError::TempFile(err))?;
        let mut dest1 = Tape::create(tmp_dir).map_err(|err| SortError::TempFile(err))?;
        {
            let mut dest = [DestSlot::new(&mut dest0.file), DestSlot::new(&mut dest1.file)];
            merge_pass(codec, &mut source, &mut dest, block_size, ctx, compare)?;
            dest0.count = dest[0].count;
            dest1.count = dest[1].count;
        }
        dest0.rewind().map_err(|err| SortError::Io(err))?;
        dest1.rewind().map_err(|err| SortError::Io(err))?;

        // promote the destinations to sources; the drained tapes are dropped here,
        // closing their files and reclaiming the temporary storage
        source = [dest0, dest1];
        block_size *= 2;
    }
}

/// Runs one merge pass: interleaves runs of up to `block_size` records from the two
/// source tapes, writing each merged run pair to destinations 0 and 1 alternately,
/// until source tape 0 is fully consumed.
///
/// Both source tapes must hold at least one record.
fn merge_pass<T, X, C, Cmp>(
    codec: &C,
    source: &mut [Tape; 2],
    dest: &mut [DestSlot<'_>; 2],
    block_size: u64,
    ctx: &X,
    compare: &Cmp,
) -> Result<(), SortError<C::EncodeError, C::DecodeError>>
where
    C: RecordCodec<T, X>,
    Cmp: Fn(&T, &T, &X) -> Ordering,
{
    // one record of lookahead per source tape, primed once per pass and carried across
    // run pairs; a slot goes stale once its tape runs dry, the run and tape counters
    // guarantee a stale slot is never selected
    let mut record = [
        read_tape_record(codec, &mut source[0], ctx)?,
        read_tape_record(codec, &mut source[1], ctx)?,
    ];

    let mut dest_idx = 0;
    while source[0].count != 0 {
        let mut run = [source[0].count.min(block_size), source[1].count.min(block_size)];

        while run[0] + run[1] != 0 {
            let sel = if run[0] == 0 {
                1
            } else if run[1] == 0 {
                0
            } else if compare(&record[0], &record[1], ctx) == Ordering::Less {
                0
            } else {
                // ties go to tape 1
                1
            };

            let slot = &mut dest[dest_idx];
            codec.write_record(slot.file, &record[sel], ctx).map_err(|err| SortError::Encode(err))?;
            slot.count += 1;

            if source[sel].count > 1 {
                record[sel] = read_tape_record(codec, &mut source[sel], ctx)?;
            }
            source[sel].count -= 1;
            run[sel] -= 1;
        }

        dest_idx ^= 1;
    }

    return Ok(());
}
