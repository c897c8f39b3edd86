use std::ops::Range;

use parking_lot::Mutex;

use crate::types::VertexId;

/// Messages queued during one superstep, waiting for the barrier.
///
/// Senders append to one of several shards to keep lock hold times short.
/// Nothing posted here is visible to receivers until [`MessageQueues::drain`]
/// runs at the superstep barrier.
pub struct MessageQueues<M> {
    shards: Box<[Mutex<Vec<(VertexId, M)>>]>,
}

impl<M> MessageQueues<M> {
    pub fn new(shards: usize) -> Self {
        Self {
            shards: (0..shards.max(1)).map(|_| Mutex::new(Vec::new())).collect(),
        }
    }

    /// Moves `batch` into the queue chosen by `hint`, leaving it empty.
    pub fn post(&self, hint: usize, batch: &mut Vec<(VertexId, M)>) {
        if batch.is_empty() {
            return;
        }
        let mut shard = self.shards[hint % self.shards.len()].lock();
        shard.append(batch);
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.lock().is_empty())
    }

    /// Takes every queued message, grouped by destination.
    pub fn drain(&self) -> Inbox<M> {
        let mut messages = Vec::new();
        for shard in self.shards.iter() {
            messages.append(&mut shard.lock());
        }
        Inbox::from_messages(messages)
    }

    /// Drops everything queued.
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            shard.lock().clear();
        }
    }
}

/// Messages for one superstep's delivery phase, grouped by destination.
pub struct Inbox<M> {
    messages: Vec<(VertexId, M)>,
    groups: Vec<(VertexId, Range<usize>)>,
}

impl<M> Default for Inbox<M> {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            groups: Vec::new(),
        }
    }
}

impl<M> Inbox<M> {
    fn from_messages(mut messages: Vec<(VertexId, M)>) -> Self {
        messages.sort_by_key(|(dest, _)| *dest);
        let mut groups = Vec::new();
        let mut start = 0;
        while start < messages.len() {
            let dest = messages[start].0;
            let mut end = start + 1;
            while end < messages.len() && messages[end].0 == dest {
                end += 1;
            }
            groups.push((dest, start..end));
            start = end;
        }
        Self { messages, groups }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Total messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Distinct destinations, ascending.
    pub fn destinations(&self) -> usize {
        self.groups.len()
    }

    /// Destination and messages of group `i`.
    pub fn group(&self, i: usize) -> (VertexId, impl Iterator<Item = &M>) {
        let (dest, range) = &self.groups[i];
        (*dest, self.messages[range.clone()].iter().map(|(_, m)| m))
    }
}
