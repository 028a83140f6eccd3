//! Buffer consumers
//!
//! Observers (visualisers, analysers) that receive decoded audio from the
//! current pipeline. Neither the engine nor a pipeline owns a consumer:
//! both keep `Weak` registrations, and a consumer that has been dropped
//! simply stops receiving buffers.

use crate::pipeline::PipelineId;
use std::sync::{Arc, Weak};

/// One block of decoded, interleaved audio
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Interleaved f32 samples
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Stream position of the first frame in this buffer
    pub position_ms: u64,
}

impl AudioBuffer {
    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

/// Receives raw audio buffers from a pipeline
///
/// Called from the pipeline's streaming thread, so implementations must be
/// cheap and must not block.
pub trait BufferConsumer: Send + Sync {
    fn consume_buffer(&self, buffer: &AudioBuffer, source: PipelineId);
}

/// Non-owning registration of a consumer
pub type ConsumerRef = Weak<dyn BufferConsumer>;

/// Build a registration for a shared consumer
pub fn consumer_ref<C: BufferConsumer + 'static>(consumer: &Arc<C>) -> ConsumerRef {
    Arc::downgrade(consumer) as ConsumerRef
}

/// Set of consumer registrations, compared by pointer identity
#[derive(Default, Clone)]
pub struct ConsumerSet {
    consumers: Vec<ConsumerRef>,
}

impl ConsumerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer; returns false if it was already present
    pub fn add(&mut self, consumer: ConsumerRef) -> bool {
        if self.contains(&consumer) {
            return false;
        }
        self.consumers.push(consumer);
        true
    }

    /// Unregister a consumer; returns false if it was not present
    pub fn remove(&mut self, consumer: &ConsumerRef) -> bool {
        let before = self.consumers.len();
        self.consumers.retain(|c| !Weak::ptr_eq(c, consumer));
        self.consumers.len() != before
    }

    pub fn contains(&self, consumer: &ConsumerRef) -> bool {
        self.consumers.iter().any(|c| Weak::ptr_eq(c, consumer))
    }

    pub fn clear(&mut self) {
        self.consumers.clear();
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConsumerRef> {
        self.consumers.iter()
    }

    /// Forget registrations whose consumer has been dropped
    pub fn prune(&mut self) -> usize {
        let before = self.consumers.len();
        self.consumers.retain(|c| c.strong_count() > 0);
        before - self.consumers.len()
    }

    /// Hand a buffer to every live consumer; returns how many received it
    pub fn deliver(&self, buffer: &AudioBuffer, source: PipelineId) -> usize {
        let mut delivered = 0;
        for consumer in self.consumers.iter().filter_map(Weak::upgrade) {
            consumer.consume_buffer(buffer, source);
            delivered += 1;
        }
        delivered
    }
}

impl std::fmt::Debug for ConsumerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerSet")
            .field("len", &self.consumers.len())
            .finish()
    }
}
