//! Segment encoding for [`Dataset`].
//!
//! Layout: one tag byte, then
//! - table: an Arrow IPC stream
//! - matrix: `nrows: u64`, `ncols: u64`, row-major little-endian `f64` values
//! - sequence: `len: u64`, little-endian `f64` values

use std::io::Cursor;

use arrow::compute::concat_batches;
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;
use chunkflow_common::{ChunkflowError, Result};
use chunkflow_segment::SegmentRecord;

use crate::dataset::Dataset;
use crate::matrix::Matrix;

const TAG_TABLE: u8 = 0;
const TAG_MATRIX: u8 = 1;
const TAG_SEQUENCE: u8 = 2;

impl SegmentRecord for Dataset {
    fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Dataset::Table(batch) => {
                out.push(TAG_TABLE);
                encode_table(batch, out)
            }
            Dataset::Matrix(m) => {
                out.push(TAG_MATRIX);
                out.extend_from_slice(&(m.nrows() as u64).to_le_bytes());
                out.extend_from_slice(&(m.ncols() as u64).to_le_bytes());
                encode_f64s(m.values(), out);
                Ok(())
            }
            Dataset::Sequence(values) => {
                out.push(TAG_SEQUENCE);
                out.extend_from_slice(&(values.len() as u64).to_le_bytes());
                encode_f64s(values, out);
                Ok(())
            }
        }
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let (tag, body) = bytes
            .split_first()
            .ok_or_else(|| ChunkflowError::Segment("empty dataset record".to_string()))?;
        match *tag {
            TAG_TABLE => decode_table(body).map(Dataset::Table),
            TAG_MATRIX => {
                let nrows = read_u64(body, 0)?;
                let ncols = read_u64(body, 8)?;
                let values = decode_f64s(&body[16..])?;
                Matrix::new(nrows, ncols, values)
                    .map(Dataset::Matrix)
                    .map_err(|e| ChunkflowError::Segment(format!("matrix record: {e}")))
            }
            TAG_SEQUENCE => {
                let len = read_u64(body, 0)?;
                let values = decode_f64s(&body[8..])?;
                if values.len() != len {
                    return Err(ChunkflowError::Segment(format!(
                        "sequence record declares {len} values, holds {}",
                        values.len()
                    )));
                }
                Ok(Dataset::Sequence(values))
            }
            other => Err(ChunkflowError::Segment(format!(
                "unknown dataset record tag {other}"
            ))),
        }
    }

    fn rows(&self) -> usize {
        self.len()
    }
}

fn encode_table(batch: &RecordBatch, out: &mut Vec<u8>) -> Result<()> {
    let schema = batch.schema();
    let mut writer = StreamWriter::try_new(out, schema.as_ref())
        .map_err(|e| ChunkflowError::Segment(format!("ipc writer init failed: {e}")))?;
    writer
        .write(batch)
        .map_err(|e| ChunkflowError::Segment(format!("ipc write failed: {e}")))?;
    writer
        .finish()
        .map_err(|e| ChunkflowError::Segment(format!("ipc finish failed: {e}")))
}

fn decode_table(bytes: &[u8]) -> Result<RecordBatch> {
    let reader = StreamReader::try_new(Cursor::new(bytes), None)
        .map_err(|e| ChunkflowError::Segment(format!("ipc reader init failed: {e}")))?;
    let schema = reader.schema();
    let mut batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ChunkflowError::Segment(format!("ipc read failed: {e}")))?;
    match batches.len() {
        0 => Ok(RecordBatch::new_empty(schema)),
        1 => Ok(batches.remove(0)),
        _ => concat_batches(&schema, &batches)
            .map_err(|e| ChunkflowError::Segment(format!("ipc batch concat failed: {e}"))),
    }
}

fn encode_f64s(values: &[f64], out: &mut Vec<u8>) {
    out.reserve(values.len() * 8);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

fn decode_f64s(bytes: &[u8]) -> Result<Vec<f64>> {
    if bytes.len() % 8 != 0 {
        return Err(ChunkflowError::Segment(format!(
            "f64 payload of {} bytes is not a multiple of 8",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|c| {
            let mut raw = [0_u8; 8];
            raw.copy_from_slice(c);
            f64::from_le_bytes(raw)
        })
        .collect())
}

fn read_u64(bytes: &[u8], at: usize) -> Result<usize> {
    let raw = bytes
        .get(at..at + 8)
        .ok_or_else(|| ChunkflowError::Segment("dataset record header truncated".to_string()))?;
    let mut buf = [0_u8; 8];
    buf.copy_from_slice(raw);
    usize::try_from(u64::from_le_bytes(buf))
        .map_err(|_| ChunkflowError::Segment("dataset record length overflows".to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Float64Array, StringArray};
    use arrow_schema::{DataType, Field, Schema};

    use super::*;

    fn roundtrip(ds: &Dataset) -> Dataset {
        let mut buf = Vec::new();
        ds.encode(&mut buf).expect("encode");
        Dataset::decode(&buf).expect("decode")
    }

    #[test]
    fn tables_survive_ipc_encoding() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("name", DataType::Utf8, true),
            Field::new("score", DataType::Float64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![Some("a"), None, Some("c")])),
                Arc::new(Float64Array::from(vec![0.1, 0.2, 0.3])),
            ],
        )
        .expect("batch");
        let ds = Dataset::Table(batch);
        assert_eq!(roundtrip(&ds), ds);

        let Dataset::Table(b) = &ds else {
            unreachable!()
        };
        let empty = Dataset::Table(b.slice(0, 0));
        assert_eq!(roundtrip(&empty), empty);
    }

    #[test]
    fn sliced_tables_encode_only_their_rows() {
        let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Float64, false)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(Float64Array::from_iter_values((0..100).map(f64::from)))],
        )
        .expect("batch");
        let ds = Dataset::Table(batch.slice(40, 5));
        let back = roundtrip(&ds);
        assert_eq!(back.len(), 5);
        assert_eq!(back, ds);
    }

    #[test]
    fn numeric_shapes_are_bit_exact() {
        let seq = Dataset::Sequence(vec![0.1, -0.0, f64::MAX, 1e-300]);
        assert_eq!(roundtrip(&seq), seq);
        let m = Dataset::Matrix(Matrix::new(2, 2, vec![1.5, 2.5, 3.5, 4.5]).expect("matrix"));
        assert_eq!(roundtrip(&m), m);
    }

    #[test]
    fn rejects_corrupt_records() {
        assert!(Dataset::decode(&[]).is_err());
        assert!(Dataset::decode(&[9]).is_err());
        assert!(Dataset::decode(&[TAG_SEQUENCE, 1, 0]).is_err());

        let mut buf = vec![TAG_SEQUENCE];
        buf.extend_from_slice(&3_u64.to_le_bytes());
        buf.extend_from_slice(&1.0_f64.to_le_bytes());
        assert!(matches!(
            Dataset::decode(&buf),
            Err(ChunkflowError::Segment(_))
        ));
    }
}
