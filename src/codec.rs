//! Record codecs.

use std::error::Error;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::marker::PhantomData;

/// Record encoding interface. Defines how a single record is read from and written to a tape
/// or stream file, with an opaque caller context threaded through every call.
///
/// Implementations must keep the file position exact: a read leaves the file positioned
/// immediately after the consumed record, a write appends at the current position. The sorter
/// relies on this to interleave records from multiple tapes without any framing of its own.
pub trait RecordCodec<T, X> {
    /// Record serialization error.
    type EncodeError: Error;
    /// Record deserialization error.
    type DecodeError: Error;

    /// Reads one record from the file at its current position.
    /// Returns [`None`] when the stream is cleanly exhausted; any other failure is an error.
    fn read_record(&self, file: &mut fs::File, ctx: &X) -> Result<Option<T>, Self::DecodeError>;

    /// Writes one record to the file at its current position.
    fn write_record(&self, file: &mut fs::File, record: &T, ctx: &X) -> Result<(), Self::EncodeError>;
}

/// RMP (Rust MessagePack) record codec.
/// It uses MessagePack as a data serialization format and supports any record type
/// implementing `serde` serialization/deserialization.
/// For more information see https://msgpack.org/.
pub struct RmpRecordCodec<T> {
    record_type: PhantomData<T>,
}

impl<T> Default for RmpRecordCodec<T> {
    fn default() -> Self {
        RmpRecordCodec { record_type: PhantomData }
    }
}

impl<T> Clone for RmpRecordCodec<T> {
    fn clone(&self) -> Self {
        RmpRecordCodec::default()
    }
}

impl<T, X> RecordCodec<T, X> for RmpRecordCodec<T>
where
    T: serde::ser::Serialize + serde::de::DeserializeOwned,
{
    type EncodeError = rmp_serde::encode::Error;
    type DecodeError = rmp_serde::decode::Error;

    fn read_record(&self, file: &mut fs::File, _ctx: &X) -> Result<Option<T>, Self::DecodeError> {
        // the decoder pulls bytes one at a time, so it consumes exactly one record;
        // a marker read failing with EOF means the stream ended at a record boundary
        match rmp_serde::decode::from_read(&mut *file) {
            Ok(record) => Ok(Some(record)),
            Err(rmp_serde::decode::Error::InvalidMarkerRead(ref err))
                if err.kind() == io::ErrorKind::UnexpectedEof =>
            {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn write_record(&self, file: &mut fs::File, record: &T, _ctx: &X) -> Result<(), Self::EncodeError> {
        rmp_serde::encode::write(&mut *file, record)
    }
}

/// Newline-delimited UTF-8 record codec. Each record is one line, the trailing newline
/// is not part of the record. A final line without a newline terminator is still a record.
#[derive(Clone, Copy, Default)]
pub struct LineRecordCodec;

impl<X> RecordCodec<String, X> for LineRecordCodec {
    type EncodeError = io::Error;
    type DecodeError = io::Error;

    fn read_record(&self, file: &mut fs::File, _ctx: &X) -> Result<Option<String>, Self::DecodeError> {
        // single-byte reads keep the file position exactly at the record boundary
        let mut line = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            if file.read(&mut byte)? == 0 {
                if line.is_empty() {
                    return Ok(None);
                }
                break;
            }
            if byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
        }

        let line = String::from_utf8(line)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

        return Ok(Some(line));
    }

    fn write_record(&self, file: &mut fs::File, record: &String, _ctx: &X) -> Result<(), Self::EncodeError> {
        file.write_all(record.as_bytes())?;
        file.write_all(b"\n")?;

        return Ok(());
    }
}
