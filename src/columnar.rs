//! Parquet encoding, decoding and merging of Arrow record batches.

use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::errors::ParquetError;

use crate::Result;

/// Rows per batch when merging files.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Serializes batches sharing one schema into an in-memory Parquet file.
pub fn encode_batches(batches: &[RecordBatch]) -> Result<Vec<u8>> {
    let first = batches.first().ok_or_else(|| {
        ParquetError::General("cannot write a Parquet file without record batches".to_owned())
    })?;

    let mut writer = ArrowWriter::try_new(Vec::new(), first.schema(), None)?;
    for batch in batches {
        writer.write(batch)?;
    }
    Ok(writer.into_inner()?)
}

/// Reads every record batch of an in-memory Parquet file.
pub fn decode_batches(bytes: Bytes) -> Result<Vec<RecordBatch>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)?.build()?;
    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch?);
    }
    Ok(batches)
}

/// Streams several Parquet files into one, batch by batch.
///
/// The output schema is the schema of the first batch read; later files
/// must match it.
pub struct ParquetMerger {
    batch_size: usize,
    writer: Option<ArrowWriter<Vec<u8>>>,
    rows: usize,
}

impl ParquetMerger {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            writer: None,
            rows: 0,
        }
    }

    /// Appends every row of one Parquet file.
    pub fn append(&mut self, file: Bytes) -> Result<()> {
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?
            .with_batch_size(self.batch_size)
            .build()?;

        for batch in reader {
            let batch = batch?;
            let writer = match &mut self.writer {
                Some(writer) => writer,
                slot => slot.insert(ArrowWriter::try_new(Vec::new(), batch.schema(), None)?),
            };
            writer.write(&batch)?;
            self.rows += batch.num_rows();
        }
        Ok(())
    }

    /// Rows written so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Finishes the file. `None` when no batch was ever read.
    pub fn finish(self) -> Result<Option<Vec<u8>>> {
        match self.writer {
            Some(writer) => Ok(Some(writer.into_inner()?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use bytes::Bytes;

    use super::{decode_batches, encode_batches, ParquetMerger};
    use crate::WarehouseError;

    fn batch(ids: Vec<i64>, names: Vec<&str>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(ids)),
                Arc::new(StringArray::from(names)),
            ],
        )
        .expect("valid batch")
    }

    fn ids(batches: &[RecordBatch]) -> Vec<i64> {
        batches
            .iter()
            .flat_map(|batch| {
                let col = batch
                    .column(0)
                    .as_any()
                    .downcast_ref::<Int64Array>()
                    .expect("int64 column");
                (0..col.len()).map(|i| col.value(i)).collect::<Vec<_>>()
            })
            .collect()
    }

    #[test]
    fn encode_then_decode_keeps_rows() {
        let bytes = encode_batches(&[batch(vec![1, 2], vec!["a", "b"]), batch(vec![3], vec!["c"])])
            .expect("must encode");
        let decoded = decode_batches(Bytes::from(bytes)).expect("must decode");
        assert_eq!(ids(&decoded), vec![1, 2, 3]);
    }

    #[test]
    fn encode_requires_a_batch() {
        let err = encode_batches(&[]).expect_err("must fail");
        assert!(matches!(err, WarehouseError::Parquet(_)));
    }

    #[test]
    fn merger_concatenates_in_file_order() {
        let first = encode_batches(&[batch(vec![1, 2, 3], vec!["a", "b", "c"])]).expect("encode");
        let second = encode_batches(&[batch(vec![4, 5], vec!["d", "e"])]).expect("encode");

        let mut merger = ParquetMerger::new(2);
        merger.append(Bytes::from(first)).expect("append first");
        merger.append(Bytes::from(second)).expect("append second");
        assert_eq!(merger.rows(), 5);

        let merged = merger.finish().expect("finish").expect("has data");
        let decoded = decode_batches(Bytes::from(merged)).expect("decode merged");
        assert_eq!(ids(&decoded), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn merger_without_input_has_no_output() {
        let merger = ParquetMerger::new(10);
        assert!(merger.finish().expect("finish").is_none());
    }
}
