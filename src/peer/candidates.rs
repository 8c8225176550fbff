use crate::peer::types::NetworkCandidate;
use std::collections::VecDeque;

/// Очередь кандидатов, которые пока нельзя использовать: удаленные,
/// полученные до установки remote description, и локальные, которые
/// собеседник еще не запросил.
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    queue: VecDeque<NetworkCandidate>,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, candidate: NetworkCandidate) {
        self.queue.push_back(candidate);
    }

    /// Забирает все кандидаты в порядке поступления.
    pub fn drain(&mut self) -> Vec<NetworkCandidate> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
