//! Record encoders and file writers for the vector container format

use bytes::{BufMut, BytesMut};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use super::{MAX_RECORD_VALUES, VALUE_BYTES};
use crate::types::VectorId;
use crate::{Error, Result};

fn record_count(len: usize) -> Result<u32> {
    u32::try_from(len)
        .ok()
        .filter(|count| *count <= MAX_RECORD_VALUES)
        .ok_or_else(|| {
            Error::InvalidRequest(format!(
                "record of {} values exceeds the limit of {}",
                len, MAX_RECORD_VALUES
            ))
        })
}

/// Append one vector record to `buf`.
pub fn encode_vector_record(buf: &mut BytesMut, vector: &[f32]) -> Result<()> {
    let count = record_count(vector.len())?;
    buf.reserve(4 + vector.len() * VALUE_BYTES);
    buf.put_u32_le(count);
    for value in vector {
        buf.put_f32_le(*value);
    }
    Ok(())
}

/// Append one neighbor id record to `buf`.
///
/// Ids are stored as signed 32-bit integers.
pub fn encode_id_record(buf: &mut BytesMut, ids: &[VectorId]) -> Result<()> {
    let count = record_count(ids.len())?;
    buf.reserve(4 + ids.len() * VALUE_BYTES);
    buf.put_u32_le(count);
    for id in ids {
        let id = i32::try_from(*id).map_err(|_| {
            Error::InvalidRequest(format!("neighbor id {} does not fit in 32 bits", id))
        })?;
        buf.put_i32_le(id);
    }
    Ok(())
}

async fn write_records<T, F>(path: &Path, records: &[T], mut encode: F) -> Result<u64>
where
    F: FnMut(&mut BytesMut, &T) -> Result<()>,
{
    let mut out = BufWriter::new(File::create(path).await?);
    let mut buf = BytesMut::new();
    let mut written = 0u64;

    for record in records {
        encode(&mut buf, record)?;
        out.write_all(&buf).await?;
        buf.clear();
        written += 1;
    }

    out.flush().await?;
    Ok(written)
}

/// Write a vector file, replacing any existing file. Returns the record count.
pub async fn write_vectors(path: impl AsRef<Path>, vectors: &[Vec<f32>]) -> Result<u64> {
    write_records(path.as_ref(), vectors, |buf, v| encode_vector_record(buf, v)).await
}

/// Write a ground-truth file, one ordered neighbor list per query.
pub async fn write_ground_truth(path: impl AsRef<Path>, neighbors: &[Vec<VectorId>]) -> Result<u64> {
    write_records(path.as_ref(), neighbors, |buf, ids| encode_id_record(buf, ids)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_record_layout() {
        let mut buf = BytesMut::new();
        encode_vector_record(&mut buf, &[1.0, -0.5]).unwrap();

        assert_eq!(buf.len(), 12);
        assert_eq!(&buf[..4], &[2, 0, 0, 0]);
        assert_eq!(&buf[4..8], &1.0f32.to_le_bytes());
        assert_eq!(&buf[8..], &(-0.5f32).to_le_bytes());
    }

    #[test]
    fn test_id_out_of_range() {
        let mut buf = BytesMut::new();
        let result = encode_id_record(&mut buf, &[1, i32::MAX as u64 + 1]);
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
    }
}
