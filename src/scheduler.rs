use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

/// Deadline-ordered one-shot tasks, polled by the owner's loop.
/// Nothing fires unless the owner asks for due tasks, so cancelling on a
/// state change is enough to stop a stale callback.
#[derive(Debug, Clone)]
pub struct OneShotQueue<T> {
    next_id: u64,
    pending: Vec<(TaskId, Instant, T)>,
}

impl<T> OneShotQueue<T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            pending: Vec::new(),
        }
    }

    pub fn schedule(&mut self, at: Instant, task: T) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.pending.push((id, at, task));
        id
    }

    pub fn cancel(&mut self, id: TaskId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|(tid, _, _)| *tid != id);
        self.pending.len() != before
    }

    pub fn cancel_where(&mut self, pred: impl Fn(&T) -> bool) -> usize {
        let before = self.pending.len();
        self.pending.retain(|(_, _, task)| !pred(task));
        before - self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn contains(&self, pred: impl Fn(&T) -> bool) -> bool {
        self.pending.iter().any(|(_, _, task)| pred(task))
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|(_, at, _)| *at).min()
    }

    /// Removes and returns tasks whose deadline is at or before `now`,
    /// earliest first, ties in scheduling order
    pub fn take_due(&mut self, now: Instant) -> Vec<T> {
        let (mut due, rest): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|(_, at, _)| *at <= now);
        self.pending = rest;
        due.sort_by_key(|(id, at, _)| (*at, id.0));
        due.into_iter().map(|(_, _, task)| task).collect()
    }
}

impl<T> Default for OneShotQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
