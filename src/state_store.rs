//! State stores and the chunked state transport.
//!
//! A state store keeps the host's state blobs. Blobs cross the wire in
//! range-addressed chunks: every chunk names the half-open byte range
//! `[start, end)` it covers and the blob's total length, and the chunks of a
//! blob are contiguous and cover `[0, total_length)` in order.
//!
//! Reads are split by [`StateChunks`]. Writes arrive as a
//! [`WriteStateBytesStream`] whose chunks have already been checked by a
//! [`StateChunkValidator`].

use std::fmt;
use std::pin::Pin;

use tokio_stream::{Stream, StreamExt};

use crate::diagnostic::Diagnostic;
use crate::types::DynamicValue;

/// Chunk size used when neither side negotiated one (8 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 8 << 20;

const EMPTY_CHUNK_SUMMARY: &str = "Unexpected empty state chunk in WriteStateBytes";
const INVALID_CHUNK_SUMMARY: &str = "Unexpected state chunk data received in WriteStateBytes";
const INCOMPLETE_SUMMARY: &str = "Incomplete state data received in WriteStateBytes";
const REPORT_SUFFIX: &str =
    "This is always an issue with Terraform and should be reported to the Terraform developers.";

/// A state store listed by GetMetadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StateStoreMetadata {
    /// State store type name.
    pub type_name: String,
}

/// ValidateStateStoreConfig request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidateStateStoreConfigRequest {
    /// State store type name.
    pub type_name: String,
    /// Configuration.
    pub config: Option<DynamicValue>,
}

/// ValidateStateStoreConfig response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidateStateStoreConfigResponse {
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// State transport settings proposed by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateStoreClientCapabilities {
    /// Preferred chunk size in bytes.
    pub chunk_size: i64,
}

/// State transport settings chosen by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateStoreServerCapabilities {
    /// Chunk size in bytes used for reads and expected for writes.
    pub chunk_size: i64,
}

/// ConfigureStateStore request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigureStateStoreRequest {
    /// State store type name.
    pub type_name: String,
    /// Configuration.
    pub config: Option<DynamicValue>,
    /// Host transport settings.
    pub capabilities: Option<StateStoreClientCapabilities>,
}

/// ConfigureStateStore response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigureStateStoreResponse {
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
    /// Provider transport settings. The chunk size here is the effective one.
    pub capabilities: Option<StateStoreServerCapabilities>,
}

/// Half-open byte range `[start, end)` within a state blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateByteRange {
    /// First byte offset, inclusive.
    pub start: i64,
    /// Last byte offset, exclusive.
    pub end: i64,
}

impl StateByteRange {
    /// Create a range.
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Number of bytes covered.
    pub fn len(&self) -> i64 {
        self.end - self.start
    }

    /// Whether the range covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

impl fmt::Display for StateByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Identifies the blob a write stream belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StateChunkMeta {
    /// State store type name.
    pub type_name: String,
    /// State identifier.
    pub state_id: String,
}

/// ReadStateBytes request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadStateBytesRequest {
    /// State store type name.
    pub type_name: String,
    /// State identifier.
    pub state_id: String,
}

/// What a handler returns for ReadStateBytes. The server splits it into chunks.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadStateBytesResponse {
    /// The whole state blob.
    pub bytes: Vec<u8>,
    /// Diagnostics, sent with the first chunk.
    pub diagnostics: Vec<Diagnostic>,
}

/// One chunk of a ReadStateBytes stream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StateByteChunk {
    /// Bytes of this chunk.
    pub bytes: Vec<u8>,
    /// Length of the whole blob.
    pub total_length: i64,
    /// Range covered by this chunk.
    pub range: Option<StateByteRange>,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// One chunk of a WriteStateBytes stream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WriteStateChunk {
    /// Blob identification. The host sends it on the first chunk.
    pub meta: Option<StateChunkMeta>,
    /// Bytes of this chunk.
    pub bytes: Vec<u8>,
    /// Length of the whole blob.
    pub total_length: i64,
    /// Range covered by this chunk.
    pub range: Option<StateByteRange>,
}

/// WriteStateBytes response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WriteStateBytesResponse {
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// GetStates request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GetStatesRequest {
    /// State store type name.
    pub type_name: String,
}

/// GetStates response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GetStatesResponse {
    /// Identifiers of the stored states.
    pub state_ids: Vec<String>,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// DeleteState request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeleteStateRequest {
    /// State store type name.
    pub type_name: String,
    /// State identifier.
    pub state_id: String,
}

/// DeleteState response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeleteStateResponse {
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// LockState request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LockStateRequest {
    /// State store type name.
    pub type_name: String,
    /// State identifier.
    pub state_id: String,
    /// Operation the lock is taken for, e.g. "apply".
    pub operation: String,
}

/// LockState response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LockStateResponse {
    /// Identifier to pass to UnlockState.
    pub lock_id: String,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// UnlockState request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnlockStateRequest {
    /// State store type name.
    pub type_name: String,
    /// State identifier.
    pub state_id: String,
    /// Identifier returned by LockState.
    pub lock_id: String,
}

/// UnlockState response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnlockStateResponse {
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// Splits a blob into contiguous chunks of at most `chunk_size` bytes.
///
/// An empty blob yields a single chunk with range `[0, 0)`.
#[derive(Debug, Clone)]
pub struct StateChunks<'a> {
    data: &'a [u8],
    chunk_size: usize,
    offset: usize,
    started: bool,
}

impl<'a> StateChunks<'a> {
    /// Split `data`. A non-positive `chunk_size` selects [`DEFAULT_CHUNK_SIZE`].
    pub fn new(data: &'a [u8], chunk_size: i64) -> Self {
        let chunk_size = usize::try_from(chunk_size)
            .ok()
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_CHUNK_SIZE);
        Self {
            data,
            chunk_size,
            offset: 0,
            started: false,
        }
    }
}

impl Iterator for StateChunks<'_> {
    type Item = StateByteChunk;

    fn next(&mut self) -> Option<Self::Item> {
        if self.started && self.offset >= self.data.len() {
            return None;
        }
        self.started = true;

        let start = self.offset;
        let end = (start + self.chunk_size).min(self.data.len());
        self.offset = end;

        Some(StateByteChunk {
            bytes: self.data[start..end].to_vec(),
            total_length: self.data.len() as i64,
            range: Some(StateByteRange::new(start as i64, end as i64)),
            diagnostics: Vec::new(),
        })
    }
}

/// Checks the chunks of one WriteStateBytes stream in arrival order.
#[derive(Debug, Default)]
pub struct StateChunkValidator {
    next_start: i64,
    total_length: Option<i64>,
    meta: Option<StateChunkMeta>,
    received: usize,
}

impl StateChunkValidator {
    /// Create a validator for a new stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunks accepted so far.
    pub fn received(&self) -> usize {
        self.received
    }

    /// The first metadata seen on the stream.
    pub fn meta(&self) -> Option<&StateChunkMeta> {
        self.meta.as_ref()
    }

    /// Validate the next chunk. `None` stands for an empty frame.
    pub fn validate(&mut self, chunk: Option<&WriteStateChunk>) -> Result<(), Diagnostic> {
        let Some(chunk) = chunk else {
            return Err(Diagnostic::error(EMPTY_CHUNK_SUMMARY).with_detail(format!(
                "An empty state byte chunk was received. {}",
                REPORT_SUFFIX
            )));
        };

        let Some(range) = chunk.range else {
            return Err(invalid_chunk(
                "An invalid state byte chunk was received with no range start/end information."
                    .to_string(),
            ));
        };

        if chunk.total_length < 0 {
            return Err(invalid_chunk(format!(
                "A state byte chunk declared a negative total length of {} bytes.",
                chunk.total_length
            )));
        }
        match self.total_length {
            None => self.total_length = Some(chunk.total_length),
            Some(total) if total != chunk.total_length => {
                return Err(invalid_chunk(format!(
                    "A state byte chunk declared a total length of {} bytes after earlier chunks declared {} bytes.",
                    chunk.total_length, total
                )));
            },
            Some(_) => {},
        }

        if let Some(meta) = &chunk.meta {
            match &self.meta {
                None if self.received == 0 => self.meta = Some(meta.clone()),
                Some(first) if first == meta => {},
                _ => {
                    return Err(invalid_chunk(format!(
                        "A state byte chunk for state {:?} of type {:?} was received in a stream for a different state.",
                        meta.state_id, meta.type_name
                    )));
                },
            }
        }

        if range.start != self.next_start {
            return Err(invalid_chunk(format!(
                "A state byte chunk with range {} was received, expected one starting at byte {}.",
                range, self.next_start
            )));
        }
        if range.end < range.start || range.end > chunk.total_length {
            return Err(invalid_chunk(format!(
                "A state byte chunk with range {} does not fit a state of {} bytes.",
                range, chunk.total_length
            )));
        }
        if range.len() != chunk.bytes.len() as i64 {
            return Err(invalid_chunk(format!(
                "A state byte chunk with range {} carried {} bytes.",
                range,
                chunk.bytes.len()
            )));
        }

        self.next_start = range.end;
        self.received += 1;
        Ok(())
    }

    /// Check that the accepted chunks cover the whole blob.
    pub fn finish(&self) -> Result<(), Diagnostic> {
        match self.total_length {
            None => Err(Diagnostic::error(INCOMPLETE_SUMMARY).with_detail(format!(
                "The state byte stream ended without any chunks. {}",
                REPORT_SUFFIX
            ))),
            Some(total) if total != self.next_start => {
                Err(Diagnostic::error(INCOMPLETE_SUMMARY).with_detail(format!(
                    "The state byte stream ended after {} of {} bytes. {}",
                    self.next_start, total, REPORT_SUFFIX
                )))
            },
            Some(_) => Ok(()),
        }
    }
}

fn invalid_chunk(detail: String) -> Diagnostic {
    Diagnostic::error(INVALID_CHUNK_SUMMARY).with_detail(format!("{} {}", detail, REPORT_SUFFIX))
}

/// A fully received state blob.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CollectedState {
    /// Metadata from the stream.
    pub meta: Option<StateChunkMeta>,
    /// The reassembled blob.
    pub bytes: Vec<u8>,
}

type ChunkStream = Pin<Box<dyn Stream<Item = Result<WriteStateChunk, Diagnostic>> + Send>>;

/// Incoming chunks of a WriteStateBytes call.
///
/// Every chunk handed out has passed [`StateChunkValidator`]. The stream ends
/// after the first error.
pub struct WriteStateBytesStream {
    inner: ChunkStream,
    validator: StateChunkValidator,
    done: bool,
}

impl fmt::Debug for WriteStateBytesStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteStateBytesStream")
            .field("validator", &self.validator)
            .field("done", &self.done)
            .finish()
    }
}

impl WriteStateBytesStream {
    /// Wrap a stream of chunks. Items that are already errors end the stream.
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<WriteStateChunk, Diagnostic>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
            validator: StateChunkValidator::new(),
            done: false,
        }
    }

    /// A stream over chunks already in memory.
    pub fn from_chunks(chunks: Vec<WriteStateChunk>) -> Self {
        Self::new(tokio_stream::iter(chunks.into_iter().map(Ok)))
    }

    /// The metadata sent with the first chunk, once it has been received.
    pub fn meta(&self) -> Option<&StateChunkMeta> {
        self.validator.meta()
    }

    /// The next validated chunk, or `None` once the blob is complete.
    pub async fn next_chunk(&mut self) -> Option<Result<WriteStateChunk, Diagnostic>> {
        if self.done {
            return None;
        }
        match self.inner.next().await {
            None => {
                self.done = true;
                self.validator.finish().err().map(Err)
            },
            Some(Err(diagnostic)) => {
                self.done = true;
                Some(Err(diagnostic))
            },
            Some(Ok(chunk)) => match self.validator.validate(Some(&chunk)) {
                Ok(()) => Some(Ok(chunk)),
                Err(diagnostic) => {
                    self.done = true;
                    Some(Err(diagnostic))
                },
            },
        }
    }

    /// Receive every chunk and reassemble the blob.
    pub async fn collect_state(mut self) -> Result<CollectedState, Diagnostic> {
        // Grows with the bytes received; the declared total length is
        // untrusted until the validator has seen every chunk.
        let mut bytes = Vec::new();
        while let Some(chunk) = self.next_chunk().await {
            bytes.extend_from_slice(&chunk?.bytes);
        }
        Ok(CollectedState {
            meta: self.validator.meta().cloned(),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> StateChunkMeta {
        StateChunkMeta {
            type_name: "examplecloud_store".to_string(),
            state_id: "default".to_string(),
        }
    }

    fn write_chunks(data: &[u8], chunk_size: i64) -> Vec<WriteStateChunk> {
        StateChunks::new(data, chunk_size)
            .enumerate()
            .map(|(i, chunk)| WriteStateChunk {
                meta: (i == 0).then(meta),
                bytes: chunk.bytes,
                total_length: chunk.total_length,
                range: chunk.range,
            })
            .collect()
    }

    #[test]
    fn test_chunks_partition_blob() {
        let data: Vec<u8> = (0..=255).cycle().take(1000).collect();
        let chunks: Vec<_> = StateChunks::new(&data, 300).collect();

        let ranges: Vec<_> = chunks.iter().map(|c| c.range.unwrap()).collect();
        assert_eq!(
            ranges,
            [
                StateByteRange::new(0, 300),
                StateByteRange::new(300, 600),
                StateByteRange::new(600, 900),
                StateByteRange::new(900, 1000),
            ]
        );
        assert!(chunks.iter().all(|c| c.total_length == 1000));
        let joined: Vec<u8> = chunks.into_iter().flat_map(|c| c.bytes).collect();
        assert_eq!(joined, data);
    }

    #[test]
    fn test_chunks_exact_multiple() {
        let data = [7u8; 8];
        let chunks: Vec<_> = StateChunks::new(&data, 4).collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].range, Some(StateByteRange::new(4, 8)));
    }

    #[test]
    fn test_chunks_empty_blob() {
        let chunks: Vec<_> = StateChunks::new(&[], 4).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].range, Some(StateByteRange::new(0, 0)));
        assert_eq!(chunks[0].total_length, 0);
    }

    #[test]
    fn test_chunks_default_size() {
        let data = vec![0u8; DEFAULT_CHUNK_SIZE + 1];
        let chunks: Vec<_> = StateChunks::new(&data, 0).collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].bytes.len(), DEFAULT_CHUNK_SIZE);
        assert_eq!(StateChunks::new(&data, -5).count(), 2);
    }

    #[test]
    fn test_validator_missing_range() {
        let mut validator = StateChunkValidator::new();
        let chunk = WriteStateChunk {
            meta: Some(meta()),
            bytes: b"{}".to_vec(),
            total_length: 2,
            range: None,
        };
        let diag = validator.validate(Some(&chunk)).unwrap_err();
        assert!(diag.is_error());
        assert_eq!(
            diag.summary,
            "Unexpected state chunk data received in WriteStateBytes"
        );
        assert!(diag
            .detail
            .starts_with("An invalid state byte chunk was received with no range start/end information."));
    }

    #[test]
    fn test_validator_empty_chunk() {
        let mut validator = StateChunkValidator::new();
        let diag = validator.validate(None).unwrap_err();
        assert_eq!(diag.summary, "Unexpected empty state chunk in WriteStateBytes");
    }

    #[test]
    fn test_validator_gap() {
        let mut chunks = write_chunks(b"abcdefgh", 3);
        chunks.remove(1);
        let mut validator = StateChunkValidator::new();
        assert!(validator.validate(Some(&chunks[0])).is_ok());
        let diag = validator.validate(Some(&chunks[1])).unwrap_err();
        assert_eq!(diag.summary, INVALID_CHUNK_SUMMARY);
        assert!(diag.detail.contains("[6, 8)"));
    }

    #[test]
    fn test_validator_total_length_change() {
        let mut chunks = write_chunks(b"abcdef", 3);
        chunks[1].total_length = 7;
        let mut validator = StateChunkValidator::new();
        validator.validate(Some(&chunks[0])).unwrap();
        assert!(validator.validate(Some(&chunks[1])).is_err());
    }

    #[test]
    fn test_validator_meta_change() {
        let mut chunks = write_chunks(b"abcdef", 3);
        chunks[1].meta = Some(StateChunkMeta {
            type_name: "examplecloud_store".to_string(),
            state_id: "other".to_string(),
        });
        let mut validator = StateChunkValidator::new();
        validator.validate(Some(&chunks[0])).unwrap();
        assert!(validator.validate(Some(&chunks[1])).is_err());

        let mut same = write_chunks(b"abcdef", 3);
        same[1].meta = Some(meta());
        let mut validator = StateChunkValidator::new();
        validator.validate(Some(&same[0])).unwrap();
        assert!(validator.validate(Some(&same[1])).is_ok());
    }

    #[test]
    fn test_validator_length_mismatch() {
        let mut validator = StateChunkValidator::new();
        let chunk = WriteStateChunk {
            meta: None,
            bytes: b"abc".to_vec(),
            total_length: 4,
            range: Some(StateByteRange::new(0, 4)),
        };
        assert!(validator.validate(Some(&chunk)).is_err());
    }

    #[test]
    fn test_validator_incomplete() {
        let chunks = write_chunks(b"abcdef", 3);
        let mut validator = StateChunkValidator::new();
        validator.validate(Some(&chunks[0])).unwrap();
        let diag = validator.finish().unwrap_err();
        assert_eq!(diag.summary, INCOMPLETE_SUMMARY);
        assert!(StateChunkValidator::new().finish().is_err());
    }

    #[tokio::test]
    async fn test_collect_state() {
        let data = b"{\"version\":4,\"serial\":12}".to_vec();
        let stream = WriteStateBytesStream::from_chunks(write_chunks(&data, 5));
        let collected = stream.collect_state().await.unwrap();
        assert_eq!(collected.bytes, data);
        assert_eq!(collected.meta, Some(meta()));
    }

    #[tokio::test]
    async fn test_collect_empty_blob() {
        let stream = WriteStateBytesStream::from_chunks(write_chunks(&[], 5));
        let collected = stream.collect_state().await.unwrap();
        assert!(collected.bytes.is_empty());
    }

    #[tokio::test]
    async fn test_collect_rejects_oversized_total_length() {
        let chunk = WriteStateChunk {
            meta: Some(meta()),
            bytes: vec![0],
            total_length: i64::MAX,
            range: Some(StateByteRange::new(0, 1)),
        };
        let stream = WriteStateBytesStream::from_chunks(vec![chunk]);
        let diag = stream.collect_state().await.unwrap_err();
        assert_eq!(diag.summary, INCOMPLETE_SUMMARY);
        assert!(diag.detail.contains(&format!("after 1 of {} bytes", i64::MAX)));
    }

    #[test]
    fn test_validator_negative_total_length() {
        let chunk = WriteStateChunk {
            meta: Some(meta()),
            bytes: Vec::new(),
            total_length: -1,
            range: Some(StateByteRange::new(0, 0)),
        };
        let diag = StateChunkValidator::new().validate(Some(&chunk)).unwrap_err();
        assert_eq!(diag.summary, INVALID_CHUNK_SUMMARY);
        assert!(diag.detail.contains("negative total length"));
    }

    #[tokio::test]
    async fn test_collect_without_chunks() {
        let stream = WriteStateBytesStream::from_chunks(Vec::new());
        let diag = stream.collect_state().await.unwrap_err();
        assert_eq!(diag.summary, INCOMPLETE_SUMMARY);
    }

    #[tokio::test]
    async fn test_stream_stops_after_error() {
        let mut chunks = write_chunks(b"abcdefgh", 3);
        chunks[1].range = None;
        let mut stream = WriteStateBytesStream::from_chunks(chunks);

        assert!(stream.next_chunk().await.unwrap().is_ok());
        assert!(stream.next_chunk().await.unwrap().is_err());
        assert!(stream.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let items = vec![Err(Diagnostic::error("Error receiving state chunk in WriteStateBytes"))];
        let mut stream = WriteStateBytesStream::new(tokio_stream::iter(items));
        let err = stream.next_chunk().await.unwrap().unwrap_err();
        assert_eq!(err.summary, "Error receiving state chunk in WriteStateBytes");
        assert!(stream.next_chunk().await.is_none());
    }
}
