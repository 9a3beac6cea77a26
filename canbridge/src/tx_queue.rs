//! Outbound frame queue: strict priority, FIFO within a priority level
//!
//! Entries live in a fixed slot table. Each priority level and the free pool own a circular
//! doubly linked list threaded through the slots, with one sentinel node per list.
//! Sentinels take node numbers `0..CLASS_COUNT`, slot `i` is node `CLASS_COUNT + i`.
//! Every operation is O(1).

use crate::core::{Priority, PrioritySet};

const FREE_CLASS: u16 = Priority::COUNT as u16;
const CLASS_COUNT: usize = Priority::COUNT + 1;
const SLOT_OFFSET: u16 = CLASS_COUNT as u16;

pub const MAX_CAPACITY: usize = u16::MAX as usize + 1 - CLASS_COUNT;

#[derive(Debug, Clone, Copy)]
struct Link {
    next: u16,
    prev: u16,
}

impl Link {
    const fn detached(node: u16) -> Self {
        Self {
            next: node,
            prev: node,
        }
    }
}

pub struct TxQueue<V, const N: usize> {
    sentinels: [Link; CLASS_COUNT],
    slots: [Link; N],
    values: [Option<V>; N],
    occupied: PrioritySet,
    len: usize,
}

impl<V, const N: usize> TxQueue<V, N> {
    const _ASSERT: usize = MAX_CAPACITY - N;

    pub fn new() -> Self {
        let _ = Self::_ASSERT;

        let mut queue = Self {
            sentinels: core::array::from_fn(|i| Link::detached(i as u16)),
            slots: core::array::from_fn(|i| Link::detached(SLOT_OFFSET + i as u16)),
            values: core::array::from_fn(|_| None),
            occupied: PrioritySet::NONE,
            len: 0,
        };
        for i in 0..N {
            queue.move_before(SLOT_OFFSET + i as u16, FREE_CLASS);
        }
        queue
    }

    pub fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.occupied.is_empty()
    }

    /// Appends `value` behind all pending entries of the same priority.
    pub fn push(&mut self, priority: Priority, value: V) -> Result<(), V> {
        let Some(slot) = self.front(FREE_CLASS) else {
            return Err(value);
        };
        self.move_before(SLOT_OFFSET + slot, class_of(priority));
        self.values[usize::from(slot)] = Some(value);
        self.occupied.insert(priority);
        self.len += 1;
        Ok(())
    }

    /// Oldest entry of the most urgent non-empty priority level
    pub fn peek(&self) -> Option<(Priority, &V)> {
        let priority = self.occupied.first()?;
        let slot = unwrap!(self.front(class_of(priority)));
        Some((priority, unwrap!(self.values[usize::from(slot)].as_ref())))
    }

    pub fn pop(&mut self) -> Option<(Priority, V)> {
        let priority = self.occupied.first()?;
        let slot = unwrap!(self.front(class_of(priority)));
        Some((priority, self.release(priority, slot)))
    }

    /// Removes the newest entry of `priority`, undoing the latest `push` at that level.
    pub fn pop_back(&mut self, priority: Priority) -> Option<V> {
        let slot = self.back(class_of(priority))?;
        Some(self.release(priority, slot))
    }

    fn release(&mut self, priority: Priority, slot: u16) -> V {
        self.move_before(SLOT_OFFSET + slot, FREE_CLASS);
        if self.front(class_of(priority)).is_none() {
            self.occupied.remove(priority);
        }
        self.len -= 1;
        unwrap!(self.values[usize::from(slot)].take())
    }

    fn front(&self, class: u16) -> Option<u16> {
        self.link(class).next.checked_sub(SLOT_OFFSET)
    }

    fn back(&self, class: u16) -> Option<u16> {
        self.link(class).prev.checked_sub(SLOT_OFFSET)
    }

    fn link(&self, node: u16) -> &Link {
        match node.checked_sub(SLOT_OFFSET) {
            Some(slot) => &self.slots[usize::from(slot)],
            None => &self.sentinels[usize::from(node)],
        }
    }

    fn link_mut(&mut self, node: u16) -> &mut Link {
        match node.checked_sub(SLOT_OFFSET) {
            Some(slot) => &mut self.slots[usize::from(slot)],
            None => &mut self.sentinels[usize::from(node)],
        }
    }

    fn unlink(&mut self, node: u16) {
        let Link { next, prev } = *self.link(node);
        self.link_mut(prev).next = next;
        self.link_mut(next).prev = prev;
        *self.link_mut(node) = Link::detached(node);
    }

    fn move_before(&mut self, node: u16, next: u16) {
        self.unlink(node);
        let prev = self.link(next).prev;
        *self.link_mut(node) = Link { next, prev };
        self.link_mut(prev).next = node;
        self.link_mut(next).prev = node;
    }
}

impl<V, const N: usize> Default for TxQueue<V, N> {
    fn default() -> Self {
        Self::new()
    }
}

fn class_of(priority: Priority) -> u16 {
    u16::from(priority.into_u8())
}
