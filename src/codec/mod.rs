//! Binary vector container codec
//!
//! Vector and ground-truth files share one record layout, repeated until the
//! end of the stream:
//! - Count: u32 (4 bytes) - number of values in the record
//! - Payload: count x 4-byte values (f32 for vectors, i32 for neighbor ids)
//!
//! Both fields are little-endian on disk, so a big-endian reader has to
//! byte-swap the count before use. Records are decoded lazily; a record whose
//! payload is cut short fails the whole stream and is never partially returned.

use futures::stream::{self, Stream};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

use crate::types::{GroundTruthSet, Vector, VectorId};
use crate::{Error, Result};

pub mod writer;

pub use writer::{encode_id_record, encode_vector_record, write_ground_truth, write_vectors};

/// Upper bound on the declared value count of a single record.
///
/// Guards against allocating gigabytes for a corrupt count field.
pub const MAX_RECORD_VALUES: u32 = 1 << 24;

const VALUE_BYTES: usize = 4;

/// Reads raw `[count][payload]` records from a byte source
struct RecordReader<R> {
    inner: R,
    records: u64,
}

impl<R: AsyncRead + Unpin> RecordReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, records: 0 }
    }

    /// Read the next record's payload, or `None` at a clean end of stream.
    async fn next_payload(&mut self) -> Result<Option<Vec<u8>>> {
        let count = match self.read_count().await? {
            Some(count) => count,
            None => return Ok(None),
        };

        if count > MAX_RECORD_VALUES {
            return Err(Error::malformed(
                self.records,
                format!(
                    "declared count {} exceeds the limit of {} values",
                    count, MAX_RECORD_VALUES
                ),
            ));
        }

        let mut payload = vec![0u8; count as usize * VALUE_BYTES];
        if let Err(e) = self.inner.read_exact(&mut payload).await {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                return Err(Error::malformed(
                    self.records,
                    format!("declared {} values but the stream ended early", count),
                ));
            }
            return Err(Error::Io(e));
        }

        self.records += 1;
        Ok(Some(payload))
    }

    async fn read_count(&mut self) -> Result<Option<u32>> {
        let mut header = [0u8; 4];
        let mut filled = 0;
        while filled < header.len() {
            let n = self.inner.read(&mut header[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        match filled {
            0 => Ok(None),
            4 => Ok(Some(u32::from_le_bytes(header))),
            partial => Err(Error::malformed(
                self.records,
                format!("count field truncated after {} of 4 bytes", partial),
            )),
        }
    }
}

fn values(payload: &[u8]) -> impl Iterator<Item = [u8; 4]> + '_ {
    payload
        .chunks_exact(VALUE_BYTES)
        .map(|c| [c[0], c[1], c[2], c[3]])
}

async fn open_buffered(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open {}: {}", path.display(), e),
        ))
    })?;
    Ok(BufReader::new(file))
}

/// Lazy, forward-only reader of float vector records
pub struct VectorReader<R> {
    records: RecordReader<R>,
}

impl VectorReader<BufReader<File>> {
    /// Open a vector file for streaming.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(open_buffered(path.as_ref()).await?))
    }
}

impl<R: AsyncRead + Unpin> VectorReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            records: RecordReader::new(inner),
        }
    }

    /// Decode the next vector, or `None` once the stream is exhausted.
    pub async fn next_vector(&mut self) -> Result<Option<Vector>> {
        let payload = match self.records.next_payload().await? {
            Some(payload) => payload,
            None => return Ok(None),
        };

        Ok(Some(values(&payload).map(f32::from_le_bytes).collect()))
    }

    /// Number of records decoded so far
    pub fn records_read(&self) -> u64 {
        self.records.records
    }

    /// Turn the reader into a stream of vectors.
    ///
    /// The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vector>> {
        stream::try_unfold(self, |mut reader| async move {
            Ok::<_, Error>(reader.next_vector().await?.map(|vector| (vector, reader)))
        })
    }
}

/// Lazy, forward-only reader of ground-truth neighbor id records
pub struct GroundTruthReader<R> {
    records: RecordReader<R>,
}

impl GroundTruthReader<BufReader<File>> {
    /// Open a ground-truth file for streaming.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(open_buffered(path.as_ref()).await?))
    }
}

impl<R: AsyncRead + Unpin> GroundTruthReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            records: RecordReader::new(inner),
        }
    }

    /// Decode the next neighbor set, or `None` once the stream is exhausted.
    pub async fn next_set(&mut self) -> Result<Option<GroundTruthSet>> {
        let record = self.records.records;
        let payload = match self.records.next_payload().await? {
            Some(payload) => payload,
            None => return Ok(None),
        };

        let mut set = GroundTruthSet::with_capacity(payload.len() / VALUE_BYTES);
        for raw in values(&payload) {
            let id = i32::from_le_bytes(raw);
            let id = VectorId::try_from(id)
                .map_err(|_| Error::malformed(record, format!("negative neighbor id {}", id)))?;
            set.insert(id);
        }

        Ok(Some(set))
    }

    /// Number of records decoded so far
    pub fn records_read(&self) -> u64 {
        self.records.records
    }
}

/// Read the value count of the first record in a vector file.
///
/// Returns `None` for an empty file.
pub async fn peek_dimension(path: impl AsRef<Path>) -> Result<Option<usize>> {
    let mut reader = RecordReader::new(open_buffered(path.as_ref()).await?);
    Ok(reader.read_count().await?.map(|count| count as usize))
}
