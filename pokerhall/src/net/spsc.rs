//! Bounded lock-free single-producer/single-consumer queue.
//!
//! Thread safety holds only under a strict two-role contract: exactly
//! one thread pushes and exactly one thread pops, and the roles never
//! swap for the lifetime of the queue. Only the producer advances the
//! write position and only the consumer advances the read position,
//! which is why no lock around the indices is needed.
//!
//! The ring uses a power-of-two capacity and sacrifices one slot to
//! distinguish full from empty, so a queue built with capacity `N`
//! holds at most `N - 1` items.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Backoff used while the queue is full.
const FULL_BACKOFF: Duration = Duration::from_millis(20);

pub struct Spsc<T> {
    slots: Box<[UnsafeCell<Option<T>>]>,
    mask: usize,
    read_pos: AtomicUsize,
    write_pos: AtomicUsize,
}

// Each slot is touched by exactly one role at a time: the producer
// writes slots between write_pos and read_pos, the consumer reads the
// rest. The atomics order those handoffs.
unsafe impl<T: Send> Sync for Spsc<T> {}
unsafe impl<T: Send> Send for Spsc<T> {}

impl<T> Spsc<T> {
    /// Creates a queue with the given capacity, rounded up to a power
    /// of two. Usable capacity is one less than the ring size.
    pub fn with_capacity(capacity: usize) -> Self {
        let size = capacity.max(2).next_power_of_two();
        let slots = (0..size)
            .map(|_| UnsafeCell::new(None))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            mask: size - 1,
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
        }
    }

    /// Producer side. Returns the item back if the queue is full.
    pub fn push(&self, item: T) -> Result<(), T> {
        let write = self.write_pos.load(Ordering::Relaxed);
        let next = (write + 1) & self.mask;
        if next == self.read_pos.load(Ordering::Acquire) {
            return Err(item);
        }
        unsafe {
            *self.slots[write].get() = Some(item);
        }
        self.write_pos.store(next, Ordering::Release);
        Ok(())
    }

    /// Producer side. Retries a full queue with a short sleep until the
    /// push lands or `cancelled` reports the other side is gone.
    /// Returns whether the item was enqueued.
    pub fn wait_push(&self, item: T, cancelled: impl Fn() -> bool) -> bool {
        let mut item = item;
        loop {
            match self.push(item) {
                Ok(()) => return true,
                Err(back) => {
                    if cancelled() {
                        return false;
                    }
                    item = back;
                    thread::sleep(FULL_BACKOFF);
                }
            }
        }
    }

    /// Consumer side.
    pub fn pop(&self) -> Option<T> {
        let read = self.read_pos.load(Ordering::Relaxed);
        if read == self.write_pos.load(Ordering::Acquire) {
            return None;
        }
        let item = unsafe { (*self.slots[read].get()).take() };
        self.read_pos.store((read + 1) & self.mask, Ordering::Release);
        item
    }

    pub fn is_empty(&self) -> bool {
        self.read_pos.load(Ordering::Acquire) == self.write_pos.load(Ordering::Acquire)
    }
}
