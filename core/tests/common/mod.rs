//! Common test utilities and helpers for integration tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use datafusion::arrow::array::{ArrayRef, Int32Array, StringArray};
use datafusion::arrow::datatypes::{DataType as ArrowDataType, Field as ArrowField, Schema};
use datafusion::arrow::record_batch::RecordBatch;
use nativesql_common::error::Result;
use nativesql_core::codec::{ArrowIpcCodec, BatchCodec, BatchReader};
use nativesql_core::types::{DataType, Field};

/// Fields of the batches built by [`create_test_batch`]
pub fn create_test_fields() -> Vec<Field> {
    vec![
        Field::new("x", DataType::Int32, true),
        Field::new("name", DataType::Utf8, true),
    ]
}

/// Create a batch with an `x` column holding `values` and a derived `name`
pub fn create_test_batch(values: &[Option<i32>]) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("x", ArrowDataType::Int32, true),
        ArrowField::new("name", ArrowDataType::Utf8, true),
    ]));
    let x: ArrayRef = Arc::new(Int32Array::from(values.to_vec()));
    let name: ArrayRef = Arc::new(StringArray::from(
        values
            .iter()
            .map(|v| v.map(|v| format!("row-{}", v)))
            .collect::<Vec<_>>(),
    ));
    RecordBatch::try_new(schema, vec![x, name]).unwrap()
}

/// Two blocks: three batches and nine rows in total, one NULL in `x`
pub fn create_test_groups() -> Vec<Vec<RecordBatch>> {
    vec![
        vec![
            create_test_batch(&[Some(1), Some(5), Some(9)]),
            create_test_batch(&[Some(4), None]),
        ],
        vec![create_test_batch(&[Some(7), Some(2), Some(6), Some(5)])],
    ]
}

/// Codec wrapper that counts readers opened and explicitly closed
#[allow(dead_code)] // Only the broadcast tests count readers
#[derive(Debug, Default)]
pub struct CountingCodec {
    inner: ArrowIpcCodec,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl CountingCodec {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl BatchCodec for CountingCodec {
    fn serialize(&self, batches: &[RecordBatch]) -> Result<Vec<u8>> {
        self.inner.serialize(batches)
    }

    fn deserialize(
        &self,
        schema: &[Field],
        blocks: Arc<Vec<Vec<u8>>>,
    ) -> Result<Box<dyn BatchReader>> {
        let inner = self.inner.deserialize(schema, blocks)?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingReader {
            inner,
            closed: Arc::clone(&self.closed),
            done: false,
        }))
    }
}

/// Counts `close` calls only; dropping without closing is not counted.
struct CountingReader {
    inner: Box<dyn BatchReader>,
    closed: Arc<AtomicUsize>,
    done: bool,
}

impl Iterator for CountingReader {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl BatchReader for CountingReader {
    fn close(&mut self) {
        if !self.done {
            self.done = true;
            self.inner.close();
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
