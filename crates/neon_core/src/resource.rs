//! The resource data model.

use core::time::Duration;

use bytes::Bytes;

/// A cacheable payload produced by a fetcher provider and held by the store.
///
/// A resource is an opaque name, an ordered collection of byte chunks and a
/// time-to-live. Resources are immutable once stored under a name; storing
/// the same name again replaces the whole record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    name: String,
    chunks: Vec<Bytes>,
    ttl: Duration,
}

impl Resource {
    /// Creates an empty resource with the given name and time-to-live.
    #[must_use]
    pub fn new(name: impl Into<String>, ttl: Duration) -> Self {
        Self {
            name: name.into(),
            chunks: Vec::new(),
            ttl,
        }
    }

    /// Appends a chunk, builder style.
    #[must_use]
    pub fn with_chunk(mut self, chunk: impl Into<Bytes>) -> Self {
        self.chunks.push(chunk.into());
        self
    }

    /// Appends a chunk.
    pub fn push_chunk(&mut self, chunk: impl Into<Bytes>) {
        self.chunks.push(chunk.into());
    }

    /// The resource name, unique within a store.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ordered byte chunks.
    #[must_use]
    pub fn chunks(&self) -> &[Bytes] {
        &self.chunks
    }

    /// The time-to-live requested by the producer.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Total payload size across all chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.iter().map(Bytes::len).sum()
    }

    /// Returns true when the resource carries no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.iter().all(Bytes::is_empty)
    }
}
