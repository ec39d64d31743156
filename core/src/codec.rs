//! Columnar batch codec for broadcast blocks.
//!
//! A block is one Arrow IPC stream, optionally compressed as a whole. Readers
//! decode lazily: a block is decompressed and opened only once iteration
//! reaches it, and its bytes are accounted in a DataFusion memory pool while
//! it is open.

use std::fmt::Debug;
use std::io::Cursor;
use std::sync::Arc;

use datafusion::arrow::datatypes::{Schema, SchemaRef};
use datafusion::arrow::error::ArrowError;
use datafusion::arrow::ipc::reader::StreamReader;
use datafusion::arrow::ipc::writer::StreamWriter;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::execution::memory_pool::{MemoryConsumer, MemoryPool, MemoryReservation};
use nativesql_common::compression::{CompressionBuilder, CompressionConfig, Compressor};
use nativesql_common::config::NativeSqlConfig;
use nativesql_common::error::{CommonError, ErrorContext, Result};
use tracing::debug;

use crate::types::{self, Field};

/// Single-pass source of decoded batches.
///
/// After `close` the reader yields nothing and holds no buffers.
pub trait BatchReader: Iterator<Item = Result<RecordBatch>> + Send {
    fn close(&mut self);
}

/// Encodes batch groups into blocks and decodes blocks back into batches.
pub trait BatchCodec: Debug + Send + Sync {
    /// Encode one group of batches sharing a schema into a single block.
    fn serialize(&self, batches: &[RecordBatch]) -> Result<Vec<u8>>;

    /// Open a lazy reader over `blocks`.
    ///
    /// An empty `schema` accepts whatever schema each block carries. A
    /// non-empty one is enforced on every batch.
    fn deserialize(
        &self,
        schema: &[Field],
        blocks: Arc<Vec<Vec<u8>>>,
    ) -> Result<Box<dyn BatchReader>>;
}

/// Arrow IPC stream codec.
#[derive(Debug, Clone, Default)]
pub struct ArrowIpcCodec {
    compressor: Option<Arc<dyn Compressor>>,
    memory_pool: Option<Arc<dyn MemoryPool>>,
}

impl ArrowIpcCodec {
    /// Uncompressed blocks, no memory accounting.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compression(mut self, config: CompressionConfig) -> Result<Self> {
        self.compressor = Some(CompressionBuilder::from_config(config).build()?);
        Ok(self)
    }

    pub fn from_config(config: &NativeSqlConfig) -> Result<Self> {
        config.validate()?;
        match config.block_compression() {
            Some(compression) => Self::new().with_compression(compression),
            None => Ok(Self::new()),
        }
    }

    /// Account decoded block bytes in `pool`.
    pub fn with_memory_pool(mut self, pool: Arc<dyn MemoryPool>) -> Self {
        self.memory_pool = Some(pool);
        self
    }

    pub fn compressor(&self) -> Option<&Arc<dyn Compressor>> {
        self.compressor.as_ref()
    }
}

impl BatchCodec for ArrowIpcCodec {
    fn serialize(&self, batches: &[RecordBatch]) -> Result<Vec<u8>> {
        let schema = batches
            .first()
            .map(RecordBatch::schema)
            .unwrap_or_else(|| Arc::new(Schema::empty()));

        let mut writer = StreamWriter::try_new(Vec::new(), &schema)
            .with_serialization_context(|| "Failed to start IPC stream".to_string())?;
        for batch in batches {
            writer
                .write(batch)
                .with_serialization_context(|| "Failed to write batch".to_string())?;
        }
        writer
            .finish()
            .with_serialization_context(|| "Failed to finish IPC stream".to_string())?;
        let stream = writer
            .into_inner()
            .with_serialization_context(|| "Failed to finish IPC stream".to_string())?;

        match &self.compressor {
            Some(compressor) => compressor.compress(&stream),
            None => Ok(stream),
        }
    }

    fn deserialize(
        &self,
        schema: &[Field],
        blocks: Arc<Vec<Vec<u8>>>,
    ) -> Result<Box<dyn BatchReader>> {
        let expected = (!schema.is_empty()).then(|| types::to_arrow_schema(schema));
        Ok(Box::new(ArrowIpcReader {
            blocks,
            next_block: 0,
            current: None,
            expected,
            compressor: self.compressor.clone(),
            memory_pool: self.memory_pool.clone(),
            reservation: None,
            closed: false,
        }))
    }
}

/// Bytes of one block: borrowed from the shared buffer or owned after
/// decompression.
enum BlockBytes {
    Shared {
        blocks: Arc<Vec<Vec<u8>>>,
        index: usize,
    },
    Owned(Vec<u8>),
}

impl AsRef<[u8]> for BlockBytes {
    fn as_ref(&self) -> &[u8] {
        match self {
            BlockBytes::Shared { blocks, index } => {
                blocks.get(*index).map(Vec::as_slice).unwrap_or_default()
            }
            BlockBytes::Owned(bytes) => bytes,
        }
    }
}

/// Continuation marker followed by a zero length, written by `StreamWriter::finish`.
const IPC_END_OF_STREAM: [u8; 8] = [0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0];

type IpcBatches = Box<dyn Iterator<Item = std::result::Result<RecordBatch, ArrowError>> + Send>;

struct ArrowIpcReader {
    blocks: Arc<Vec<Vec<u8>>>,
    next_block: usize,
    current: Option<IpcBatches>,
    expected: Option<SchemaRef>,
    compressor: Option<Arc<dyn Compressor>>,
    memory_pool: Option<Arc<dyn MemoryPool>>,
    reservation: Option<MemoryReservation>,
    closed: bool,
}

impl ArrowIpcReader {
    fn open_block(&mut self, index: usize) -> Result<IpcBatches> {
        let bytes = match self.compressor.clone() {
            Some(compressor) => {
                let blocks = Arc::clone(&self.blocks);
                let raw = blocks.get(index).map(Vec::as_slice).unwrap_or_default();
                // Charged before inflating; trued up once the real size is known.
                self.reserve(compressor.decompressed_size(raw).unwrap_or(raw.len()))?;
                let decompressed = compressor.decompress(raw).map_err(|e| {
                    CommonError::corrupt_broadcast_data_error_with_source(
                        format!("block {} has a bad {} frame", index, compressor.algorithm()),
                        e,
                    )
                })?;
                self.reserve(decompressed.len())?;
                BlockBytes::Owned(decompressed)
            }
            None => {
                let bytes = BlockBytes::Shared {
                    blocks: Arc::clone(&self.blocks),
                    index,
                };
                self.reserve(bytes.as_ref().len())?;
                bytes
            }
        };

        // A stream cut at a message boundary reads as a shorter valid stream.
        if !bytes.as_ref().ends_with(&IPC_END_OF_STREAM) {
            return Err(CommonError::corrupt_broadcast_data_error(format!(
                "block {} is truncated: no IPC end-of-stream marker",
                index
            )));
        }

        let reader = StreamReader::try_new(Cursor::new(bytes), None)
            .with_corruption_context(|| format!("block {} is not a valid IPC stream", index))?;
        debug!("Opened broadcast block {}", index);
        Ok(Box::new(reader))
    }

    /// Set the open block's reservation to `bytes`.
    fn reserve(&mut self, bytes: usize) -> Result<()> {
        let Some(pool) = &self.memory_pool else {
            return Ok(());
        };
        let reservation = self
            .reservation
            .get_or_insert_with(|| MemoryConsumer::new("BroadcastBlockReader").register(pool));
        reservation.try_resize(bytes).map_err(|e| {
            CommonError::resource_exhausted_error_with_source(
                format!("Cannot reserve {} bytes for a broadcast block", bytes),
                e,
            )
        })
    }

    fn finish_block(&mut self) {
        self.current = None;
        if let Some(reservation) = self.reservation.as_mut() {
            reservation.free();
        }
    }

    fn conform(&self, batch: RecordBatch) -> Result<RecordBatch> {
        let Some(expected) = &self.expected else {
            return Ok(batch);
        };
        if batch.num_columns() != expected.fields().len() {
            return Err(CommonError::corrupt_broadcast_data_error(format!(
                "expected {} columns, block has {}",
                expected.fields().len(),
                batch.num_columns()
            )));
        }
        for (field, column) in expected.fields().iter().zip(batch.columns()) {
            if field.data_type() != column.data_type() {
                return Err(CommonError::corrupt_broadcast_data_error(format!(
                    "column '{}' expected {}, block has {}",
                    field.name(),
                    field.data_type(),
                    column.data_type()
                )));
            }
        }
        RecordBatch::try_new(Arc::clone(expected), batch.columns().to_vec())
            .with_corruption_context(|| "batch does not match the expected schema".to_string())
    }

    fn fail(&mut self, error: CommonError) -> Option<Result<RecordBatch>> {
        self.close();
        Some(Err(error))
    }
}

impl Iterator for ArrowIpcReader {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.closed {
            return None;
        }
        loop {
            if let Some(current) = self.current.as_mut() {
                match current.next() {
                    Some(Ok(batch)) => {
                        return match self.conform(batch) {
                            Ok(batch) => Some(Ok(batch)),
                            Err(e) => self.fail(e),
                        };
                    }
                    Some(Err(e)) => {
                        let index = self.next_block.saturating_sub(1);
                        return self.fail(CommonError::corrupt_broadcast_data_error_with_source(
                            format!("block {} has an invalid IPC message", index),
                            e,
                        ));
                    }
                    None => self.finish_block(),
                }
            }

            if self.next_block >= self.blocks.len() {
                self.close();
                return None;
            }
            let index = self.next_block;
            self.next_block += 1;
            match self.open_block(index) {
                Ok(batches) => self.current = Some(batches),
                Err(e) => return self.fail(e),
            }
        }
    }
}

impl BatchReader for ArrowIpcReader {
    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.current = None;
        self.reservation = None;
        self.blocks = Arc::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;
    use datafusion::arrow::array::{ArrayRef, Int64Array, StringArray};
    use datafusion::arrow::datatypes::{DataType as ArrowDataType, Field as ArrowField};
    use datafusion::execution::memory_pool::GreedyMemoryPool;
    use nativesql_common::compression::CompressionAlgorithm;

    fn batch(ids: &[i64]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            ArrowField::new("id", ArrowDataType::Int64, false),
            ArrowField::new("tag", ArrowDataType::Utf8, true),
        ]));
        let id: ArrayRef = Arc::new(Int64Array::from(ids.to_vec()));
        let tag: ArrayRef = Arc::new(StringArray::from(
            ids.iter().map(|i| Some(format!("t{}", i))).collect::<Vec<_>>(),
        ));
        RecordBatch::try_new(schema, vec![id, tag]).unwrap()
    }

    fn blocks(codec: &ArrowIpcCodec) -> Arc<Vec<Vec<u8>>> {
        Arc::new(vec![
            codec.serialize(&[batch(&[1, 2]), batch(&[3])]).unwrap(),
            codec.serialize(&[batch(&[4, 5, 6])]).unwrap(),
        ])
    }

    fn total_rows(reader: Box<dyn BatchReader>) -> usize {
        reader.map(|batch| batch.unwrap().num_rows()).sum()
    }

    #[test]
    fn test_reads_every_block_in_order() {
        let codec = ArrowIpcCodec::new();
        let reader = codec.deserialize(&[], blocks(&codec)).unwrap();
        let batches = reader.collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(
            batches.iter().map(RecordBatch::num_rows).collect::<Vec<_>>(),
            vec![2, 1, 3]
        );
        assert_eq!(batches[0].schema().field(0).name(), "id");
    }

    #[test]
    fn test_compressed_blocks() {
        for algorithm in [
            CompressionAlgorithm::Lz4,
            CompressionAlgorithm::Zstd,
            CompressionAlgorithm::Snappy,
        ] {
            let codec = ArrowIpcCodec::new()
                .with_compression(CompressionConfig::new(algorithm))
                .unwrap();
            let reader = codec.deserialize(&[], blocks(&codec)).unwrap();
            assert_eq!(total_rows(reader), 6, "{}", algorithm);
        }
    }

    #[test]
    fn test_empty_buffer_yields_nothing() {
        let codec = ArrowIpcCodec::new();
        let mut reader = codec.deserialize(&[], Arc::new(Vec::new())).unwrap();
        assert!(reader.next().is_none());
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_expected_schema_relabels_columns() {
        let codec = ArrowIpcCodec::new();
        let schema = vec![
            Field::new("key", DataType::Int64, false),
            Field::new("label", DataType::Utf8, true),
        ];
        let mut reader = codec.deserialize(&schema, blocks(&codec)).unwrap();
        let first = reader.next().unwrap().unwrap();
        assert_eq!(first.schema().field(0).name(), "key");
        assert_eq!(first.schema().field(1).name(), "label");
    }

    #[test]
    fn test_schema_mismatch_is_corruption() {
        let codec = ArrowIpcCodec::new();
        let schema = vec![Field::new("key", DataType::Int32, false)];
        let mut reader = codec.deserialize(&schema, blocks(&codec)).unwrap();
        assert!(matches!(
            reader.next(),
            Some(Err(CommonError::CorruptBroadcastDataError { .. }))
        ));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_garbage_block_is_corruption() {
        let codec = ArrowIpcCodec::new();
        // Continuation marker and a short length, followed by bytes that are
        // not a flatbuffer message.
        let garbage = vec![0xFF, 0xFF, 0xFF, 0xFF, 8, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8];
        let mut reader = codec.deserialize(&[], Arc::new(vec![garbage])).unwrap();
        assert!(matches!(
            reader.next(),
            Some(Err(CommonError::CorruptBroadcastDataError { .. }))
        ));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_block_cut_at_batch_boundary_is_corruption() {
        let codec = ArrowIpcCodec::new();
        let one = codec.serialize(&[batch(&[1, 2, 3])]).unwrap();
        let two = codec.serialize(&[batch(&[1, 2, 3]), batch(&[4, 5, 6])]).unwrap();
        let cut = one[..one.len() - IPC_END_OF_STREAM.len()].to_vec();
        assert!(two.starts_with(&cut));

        let mut reader = codec.deserialize(&[], Arc::new(vec![cut])).unwrap();
        match reader.next() {
            Some(Err(CommonError::CorruptBroadcastDataError { message, .. })) => {
                assert!(message.contains("block 0 is truncated"), "{}", message);
            }
            other => panic!("unexpected item: {other:?}"),
        }
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_truncated_compressed_block_is_corruption() {
        let plain = ArrowIpcCodec::new();
        let snappy = ArrowIpcCodec::new()
            .with_compression(CompressionConfig::new(CompressionAlgorithm::Snappy))
            .unwrap();
        let stream = plain.serialize(&[batch(&[1, 2, 3]), batch(&[4, 5, 6])]).unwrap();
        let one = plain.serialize(&[batch(&[1, 2, 3])]).unwrap();
        let cut = &stream[..one.len() - IPC_END_OF_STREAM.len()];
        let block = snappy.compressor().unwrap().compress(cut).unwrap();

        let mut reader = snappy.deserialize(&[], Arc::new(vec![block])).unwrap();
        assert!(matches!(
            reader.next(),
            Some(Err(CommonError::CorruptBroadcastDataError { .. }))
        ));
    }

    #[test]
    fn test_uncompressed_block_fed_to_compressed_codec_is_corruption() {
        let plain = ArrowIpcCodec::new();
        let zstd = ArrowIpcCodec::new()
            .with_compression(CompressionConfig::new(CompressionAlgorithm::Zstd))
            .unwrap();
        let mut reader = zstd.deserialize(&[], blocks(&plain)).unwrap();
        assert!(matches!(
            reader.next(),
            Some(Err(CommonError::CorruptBroadcastDataError { .. }))
        ));
    }

    #[test]
    fn test_reservation_released_per_block_and_on_close() {
        let pool: Arc<dyn MemoryPool> = Arc::new(GreedyMemoryPool::new(1 << 20));
        let codec = ArrowIpcCodec::new().with_memory_pool(Arc::clone(&pool));
        let buffer = blocks(&codec);
        let mut reader = codec.deserialize(&[], Arc::clone(&buffer)).unwrap();

        reader.next().unwrap().unwrap();
        assert_eq!(pool.reserved(), buffer[0].len());
        assert_eq!(Arc::strong_count(&buffer), 3);

        reader.close();
        assert_eq!(pool.reserved(), 0);
        assert_eq!(Arc::strong_count(&buffer), 1);
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_pool_limit_is_resource_exhaustion() {
        let pool: Arc<dyn MemoryPool> = Arc::new(GreedyMemoryPool::new(16));
        let codec = ArrowIpcCodec::new().with_memory_pool(pool);
        let mut reader = codec.deserialize(&[], blocks(&codec)).unwrap();
        assert!(matches!(
            reader.next(),
            Some(Err(CommonError::ResourceExhaustedError { .. }))
        ));
    }

    #[test]
    fn test_declared_size_is_reserved_before_decompression() {
        let pool: Arc<dyn MemoryPool> = Arc::new(GreedyMemoryPool::new(64));
        let codec = ArrowIpcCodec::new()
            .with_compression(CompressionConfig::new(CompressionAlgorithm::Lz4))
            .unwrap()
            .with_memory_pool(Arc::clone(&pool));
        let mut reader = codec.deserialize(&[], blocks(&codec)).unwrap();
        assert!(matches!(
            reader.next(),
            Some(Err(CommonError::ResourceExhaustedError { .. }))
        ));
        assert_eq!(codec.compressor().unwrap().stats().total_decompressions, 0);
        assert_eq!(pool.reserved(), 0);
    }

    #[test]
    fn test_compressed_reservation_matches_decoded_size() {
        let pool: Arc<dyn MemoryPool> = Arc::new(GreedyMemoryPool::new(1 << 20));
        let codec = ArrowIpcCodec::new()
            .with_compression(CompressionConfig::new(CompressionAlgorithm::Zstd))
            .unwrap()
            .with_memory_pool(Arc::clone(&pool));
        let plain = ArrowIpcCodec::new().serialize(&[batch(&[1, 2]), batch(&[3])]).unwrap();
        let mut reader = codec.deserialize(&[], blocks(&codec)).unwrap();

        reader.next().unwrap().unwrap();
        assert_eq!(pool.reserved(), plain.len());
        reader.close();
        assert_eq!(pool.reserved(), 0);
    }

    #[test]
    fn test_from_config() {
        let codec = ArrowIpcCodec::from_config(&NativeSqlConfig::default()).unwrap();
        assert_eq!(
            codec.compressor().map(|c| c.algorithm()),
            Some(CompressionAlgorithm::Lz4)
        );

        let config = NativeSqlConfig {
            broadcast_compress: false,
            ..Default::default()
        };
        assert!(ArrowIpcCodec::from_config(&config).unwrap().compressor().is_none());
    }
}
