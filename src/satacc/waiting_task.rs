use std::{cmp::Reverse, collections::BinaryHeap};

/// # WaitingTaskData
/// the data is sorted by the leaving cycle, then by the push order
#[derive(Debug)]
pub struct WaitingTaskData<T> {
    pub task: T,
    pub leaving_cycle: usize,
    seq: i64,
}
impl<T> WaitingTaskData<T> {
    fn key(&self) -> (usize, i64) {
        (self.leaving_cycle, self.seq)
    }
}
impl<T> PartialEq for WaitingTaskData<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl<T> Eq for WaitingTaskData<T> {}
impl<T> PartialOrd for WaitingTaskData<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for WaitingTaskData<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}
/// # WaitingTask
/// A waiting task is a task queue that sorted by leaving cycle.
/// - it's a simple wrapper of BinaryHeap. It uses Reverse to simulate a min-heap.
/// - tasks leaving at the same cycle pop in the order they were pushed.
/// - a task given back by [`WaitingTask::restore`] pops before every other task of its cycle.
#[derive(Debug)]
pub struct WaitingTask<T> {
    data: BinaryHeap<Reverse<WaitingTaskData<T>>>,
    next_seq: i64,
    front_seq: i64,
}

impl<T> Default for WaitingTask<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WaitingTask<T> {
    pub fn new() -> Self {
        WaitingTask {
            data: BinaryHeap::new(),
            next_seq: 0,
            front_seq: 0,
        }
    }
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn push(&mut self, task: T, leaving_cycle: usize) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.data.push(Reverse(WaitingTaskData {
            task,
            leaving_cycle,
            seq,
        }));
    }
    /// give back a task that was just popped but could not be consumed
    pub fn restore(&mut self, task: T, leaving_cycle: usize) {
        self.front_seq -= 1;
        self.data.push(Reverse(WaitingTaskData {
            task,
            leaving_cycle,
            seq: self.front_seq,
        }));
    }
    /// pop the earliest task if it's ready at `current_cycle`
    pub fn pop_ready(&mut self, current_cycle: usize) -> Option<(usize, T)> {
        let ready = matches!(self.peek(), Some((leaving_cycle, _)) if leaving_cycle <= current_cycle);
        if ready {
            self.pop()
        } else {
            None
        }
    }
    pub fn pop(&mut self) -> Option<(usize, T)> {
        self.data.pop().map(
            |Reverse(WaitingTaskData {
                 task,
                 leaving_cycle,
                 ..
             })| (leaving_cycle, task),
        )
    }
    pub fn peek(&self) -> Option<(usize, &T)> {
        self.data.peek().map(
            |Reverse(WaitingTaskData {
                 task,
                 leaving_cycle,
                 ..
             })| (*leaving_cycle, task),
        )
    }
    /// true if some task is still waiting for a future cycle
    pub fn any_leaving_after(&self, current_cycle: usize) -> bool {
        self.data
            .iter()
            .any(|Reverse(data)| data.leaving_cycle > current_cycle)
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn waiting_task_test() {
        let mut waiting_task = WaitingTask::new();
        waiting_task.push(1, 1);
        waiting_task.push(2, 2);
        waiting_task.push(3, 3);
        let next = waiting_task.pop();
        assert_eq!(next, Some((1, 1)));
        let next = waiting_task.pop();
        assert_eq!(next, Some((2, 2)));
        waiting_task.push(2, 2);
        let next = waiting_task.pop();
        assert_eq!(next, Some((2, 2)));
        let next = waiting_task.pop();
        assert_eq!(next, Some((3, 3)));
    }

    #[test]
    fn same_cycle_keeps_push_order() {
        let mut waiting_task = WaitingTask::new();
        waiting_task.push("b", 5);
        waiting_task.push("a", 5);
        waiting_task.push("c", 4);
        assert_eq!(waiting_task.pop_ready(3), None);
        assert!(waiting_task.any_leaving_after(4));
        assert_eq!(waiting_task.pop_ready(4), Some((4, "c")));
        assert!(!waiting_task.any_leaving_after(5));
        assert_eq!(waiting_task.pop_ready(5), Some((5, "b")));
        assert_eq!(waiting_task.pop_ready(5), Some((5, "a")));
        assert!(waiting_task.is_empty());
    }

    #[test]
    fn restored_task_stays_first() {
        let mut waiting_task = WaitingTask::new();
        waiting_task.push(1, 2);
        waiting_task.push(2, 2);
        let (cycle, task) = waiting_task.pop_ready(2).unwrap();
        waiting_task.restore(task, cycle);
        assert_eq!(waiting_task.pop(), Some((2, 1)));
        assert_eq!(waiting_task.pop(), Some((2, 2)));
    }
}
