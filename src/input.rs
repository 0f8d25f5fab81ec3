use csv::{ByteRecord, ByteRecordsIntoIter, Reader};
use encoding::all::UTF_8;
use encoding::{DecoderTrap, EncodingRef};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use crate::batch::Batch;
use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::Row;

fn decode(data: ByteRecord, encoding: EncodingRef) -> Row {
    let mut row = Row::with_capacity(data.as_slice().len(), data.len());

    for item in data.iter() {
        // DecoderTrap::Replace cannot fail
        row.push_field(&encoding.decode(item, DecoderTrap::Replace).unwrap());
    }

    row
}

/// A CSV file opened for reading, with the encoding its bytes should be
/// decoded with.
pub struct ReaderSource {
    reader: Reader<File>,
    encoding: EncodingRef,
}

impl ReaderSource {
    pub fn from_path<P: AsRef<Path>>(path: P, encoding: EncodingRef) -> Result<ReaderSource> {
        Ok(ReaderSource {
            reader: Reader::from_path(path)?,
            encoding,
        })
    }

    pub fn utf8<P: AsRef<Path>>(path: P) -> Result<ReaderSource> {
        ReaderSource::from_path(path, UTF_8)
    }

    fn headers(&mut self) -> Result<Headers> {
        let data = self.reader.byte_headers()?.clone();

        Ok(Headers::from_row(decode(data, self.encoding)))
    }
}

/// Lazily splits a source into fixed-maximum-size batches.
///
/// Yields batches in source order, with no gaps or overlaps; the last one
/// may be short. The sequence is forward-only and not restartable, it
/// consumes the underlying reader. A parse error surfaces once and fuses
/// the iterator, the run is over at that point.
pub struct ChunkReader {
    records: ByteRecordsIntoIter<File>,
    headers: Arc<Headers>,
    encoding: EncodingRef,
    chunk_size: usize,
    done: bool,
}

impl ChunkReader {
    pub fn new(mut source: ReaderSource, chunk_size: usize) -> Result<ChunkReader> {
        let headers = Arc::new(source.headers()?);

        Ok(ChunkReader {
            records: source.reader.into_byte_records(),
            headers,
            encoding: source.encoding,
            chunk_size: chunk_size.max(1),
            done: false,
        })
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }
}

impl Iterator for ChunkReader {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut rows = Vec::with_capacity(self.chunk_size);

        while rows.len() < self.chunk_size {
            match self.records.next() {
                Some(Ok(record)) => rows.push(decode(record, self.encoding)),
                Some(Err(e)) => {
                    self.done = true;

                    return Some(Err(Error::SourceFormat(e)));
                }
                None => break,
            }
        }

        if rows.is_empty() {
            self.done = true;

            return None;
        }

        Some(Ok(Batch::new(Arc::clone(&self.headers), rows)))
    }
}
