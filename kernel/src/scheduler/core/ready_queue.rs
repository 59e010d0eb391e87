//! Ready-queue table
//!
//! One circular doubly-linked list per priority level, threaded through
//! the TCB arena by index. The head of a list is the next thread to run at
//! that level; rotation moves a thread to the tail. A thread on a list of
//! one links to itself.

use super::priority_map::{PriorityIter, PriorityMap};
use crate::scheduler::thread::thread::{ReadyLink, ThreadTable};
use crate::scheduler::Priority;
use alloc::vec;
use alloc::vec::Vec;

pub(crate) struct ReadyQueues {
    heads: Vec<Option<usize>>,
    map: PriorityMap,
}

impl ReadyQueues {
    pub fn new(levels: u32) -> Self {
        Self {
            heads: vec![None; levels as usize],
            map: PriorityMap::new(levels),
        }
    }

    /// Most urgent priority with a ready thread
    #[inline]
    pub fn highest(&self) -> Option<Priority> {
        self.map.highest()
    }

    /// Occupied priorities, most urgent first
    pub fn priorities(&self) -> PriorityIter<'_> {
        self.map.iter()
    }

    #[inline]
    pub fn head(&self, priority: Priority) -> Option<usize> {
        self.heads[priority as usize]
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Append a thread at the tail of its priority's list
    pub fn enqueue_tail(&mut self, threads: &mut ThreadTable, index: usize) {
        let priority = threads.get(index).priority;
        crate::sched_assert!(threads.get(index).ready_link.is_none(), "thread already on a ready list");

        match self.heads[priority as usize] {
            None => {
                threads.get_mut(index).ready_link = Some(ReadyLink {
                    next: index,
                    previous: index,
                });
                self.heads[priority as usize] = Some(index);
                self.map.mark(priority);
            }
            Some(head) => {
                let tail = link_of(threads, head).previous;
                threads.get_mut(index).ready_link = Some(ReadyLink {
                    next: head,
                    previous: tail,
                });
                set_next(threads, tail, index);
                set_previous(threads, head, index);
            }
        }
    }

    /// Splice a thread out of its list
    pub fn remove(&mut self, threads: &mut ThreadTable, index: usize) {
        let priority = threads.get(index).priority;
        let link = match threads.get_mut(index).ready_link.take() {
            Some(link) => link,
            None => crate::scheduler::core::error::corrupted("removing a thread that is not ready-listed"),
        };

        if link.next == index {
            crate::sched_assert!(self.heads[priority as usize] == Some(index), "lone thread is not the list head");
            self.heads[priority as usize] = None;
            self.map.clear(priority);
            return;
        }

        set_next(threads, link.previous, link.next);
        set_previous(threads, link.next, link.previous);
        if self.heads[priority as usize] == Some(index) {
            self.heads[priority as usize] = Some(link.next);
        }
    }

    /// Move a thread behind its equal-priority peers
    ///
    /// Returns false when it is alone at its level.
    pub fn rotate(&mut self, threads: &mut ThreadTable, index: usize) -> bool {
        match threads.get(index).ready_link {
            Some(link) if link.next != index => {
                self.remove(threads, index);
                self.enqueue_tail(threads, index);
                true
            }
            _ => false,
        }
    }

    /// Threads at one level in FIFO order
    pub fn iter<'a>(&self, threads: &'a ThreadTable, priority: Priority) -> ReadyIter<'a> {
        let head = self.heads[priority as usize];
        ReadyIter {
            threads,
            head,
            next: head,
        }
    }

    pub fn len(&self, threads: &ThreadTable, priority: Priority) -> usize {
        self.iter(threads, priority).count()
    }
}

fn link_of(threads: &ThreadTable, index: usize) -> ReadyLink {
    match threads.get(index).ready_link {
        Some(link) => link,
        None => crate::scheduler::core::error::corrupted("ready list neighbour is unlinked"),
    }
}

fn set_next(threads: &mut ThreadTable, index: usize, next: usize) {
    let mut link = link_of(threads, index);
    link.next = next;
    threads.get_mut(index).ready_link = Some(link);
}

fn set_previous(threads: &mut ThreadTable, index: usize, previous: usize) {
    let mut link = link_of(threads, index);
    link.previous = previous;
    threads.get_mut(index).ready_link = Some(link);
}

pub(crate) struct ReadyIter<'a> {
    threads: &'a ThreadTable,
    head: Option<usize>,
    next: Option<usize>,
}

impl Iterator for ReadyIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let current = self.next?;
        let following = link_of(self.threads, current).next;
        self.next = if Some(following) == self.head { None } else { Some(following) };
        Some(current)
    }
}
