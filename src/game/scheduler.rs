//! Deadline-keyed delayed actions driven by the frame tick

/// A queue of actions that become due at a room-clock deadline.
///
/// Nothing here knows about match phases: whoever drains the queue re-checks
/// the phase before applying a side effect.
#[derive(Debug)]
pub struct DelayedActions<T> {
    queue: Vec<Scheduled<T>>,
    next_seq: u64,
}

#[derive(Debug)]
struct Scheduled<T> {
    due_at: f64,
    seq: u64,
    action: T,
}

impl<T> DelayedActions<T> {
    pub fn new() -> Self {
        Self {
            queue: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn schedule(&mut self, due_at: f64, action: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Scheduled {
            due_at,
            seq,
            action,
        });
    }

    /// Remove and return every action due at `now`, earliest deadline first
    pub fn drain_due(&mut self, now: f64) -> Vec<T> {
        let (mut due, pending): (Vec<_>, Vec<_>) =
            self.queue.drain(..).partition(|s| s.due_at <= now);
        self.queue = pending;
        due.sort_by(|a, b| a.due_at.total_cmp(&b.due_at).then(a.seq.cmp(&b.seq)));
        due.into_iter().map(|s| s.action).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

impl<T> Default for DelayedActions<T> {
    fn default() -> Self {
        Self::new()
    }
}
