//! Message Queues
//!
//! FIFO of owned envelopes shared between interrupt and task context.
//! Envelopes are stored as compact `LEN | CMD0 | CMD1 | DATA` records in
//! an arena of message memory, so the queue is bounded only by the bytes
//! its messages occupy. Running out behaves like an allocator failure.
//! Records are packed before and unpacked after the critical section,
//! which covers only the budget check and the record copy.

use core::cell::RefCell;
use core::fmt;

use critical_section::Mutex;
use heapless::Deque;

use crate::config::{FRAME_HEADER_LEN, MAX_PAYLOAD, MESSAGE_OVERHEAD, MESSAGE_POOL_BYTES};
use crate::types::Envelope;

/// Largest record: header plus a full payload
const RECORD_MAX: usize = FRAME_HEADER_LEN + MAX_PAYLOAD;

// Charging at least the record header keeps the arena from overflowing
const _: () = assert!(MESSAGE_OVERHEAD >= FRAME_HEADER_LEN);

/// Enqueue failure; the queue is left unchanged
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueError {
    /// Message memory exhausted
    OutOfMemory,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "message memory exhausted"),
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for QueueError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::OutOfMemory => defmt::write!(f, "OutOfMemory"),
        }
    }
}

/// Byte-budget accounting standing in for message allocation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessagePool {
    budget: usize,
    used: usize,
}

impl MessagePool {
    /// Pool of `budget` bytes, all free
    #[must_use]
    pub const fn new(budget: usize) -> Self {
        Self { budget, used: 0 }
    }

    /// Bytes charged for one envelope of `payload_len` bytes
    #[must_use]
    pub const fn cost(payload_len: usize) -> usize {
        payload_len + MESSAGE_OVERHEAD
    }

    /// Reserve memory for a message
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::OutOfMemory`] if the reservation does not fit.
    pub fn allocate(&mut self, payload_len: usize) -> Result<(), QueueError> {
        let cost = Self::cost(payload_len);
        if self.budget - self.used < cost {
            return Err(QueueError::OutOfMemory);
        }
        self.used += cost;
        Ok(())
    }

    /// Return a message's memory
    pub fn release(&mut self, payload_len: usize) {
        self.used = self.used.saturating_sub(Self::cost(payload_len));
    }

    /// Bytes currently reserved
    #[must_use]
    pub const fn used(&self) -> usize {
        self.used
    }

    /// Bytes still available
    #[must_use]
    pub const fn available(&self) -> usize {
        self.budget - self.used
    }
}

struct Inner {
    arena: Deque<u8, MESSAGE_POOL_BYTES>,
    pool: MessagePool,
    count: usize,
}

/// Envelope FIFO safe to use from interrupt and task context
///
/// Each record occupies `len + FRAME_HEADER_LEN` arena bytes and is
/// charged [`MessagePool::cost`], which is never smaller, so a successful
/// budget check always leaves room in the arena.
pub struct MsgQueue {
    inner: Mutex<RefCell<Inner>>,
}

impl MsgQueue {
    /// Empty queue with the default message budget
    #[must_use]
    pub const fn new() -> Self {
        Self::with_budget(MESSAGE_POOL_BYTES)
    }

    /// Empty queue with a budget of `bytes`, capped at the arena size
    #[must_use]
    pub const fn with_budget(bytes: usize) -> Self {
        let budget = if bytes < MESSAGE_POOL_BYTES {
            bytes
        } else {
            MESSAGE_POOL_BYTES
        };
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                arena: Deque::new(),
                pool: MessagePool::new(budget),
                count: 0,
            })),
        }
    }

    /// Append an envelope
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::OutOfMemory`] when the message memory cannot
    /// hold it. The envelope is dropped and the queue is unchanged.
    pub fn enqueue(&self, env: Envelope) -> Result<(), QueueError> {
        let mut record = [0u8; RECORD_MAX];
        let payload = env.payload();
        let size = FRAME_HEADER_LEN + payload.len();
        // Payloads are clamped to MAX_PAYLOAD, which fits in a u8
        record[0] = payload.len() as u8;
        record[1] = env.cmd0();
        record[2] = env.command_id();
        record[FRAME_HEADER_LEN..size].copy_from_slice(payload);

        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.pool.allocate(payload.len())?;
            for &byte in &record[..size] {
                // Room guaranteed by the budget check
                let _ = inner.arena.push_back(byte);
            }
            inner.count += 1;
            Ok(())
        })
    }

    /// Remove the oldest envelope
    pub fn dequeue(&self) -> Option<Envelope> {
        let mut record = [0u8; RECORD_MAX];
        let size = critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let len = usize::from(inner.arena.pop_front()?);
            for slot in &mut record[1..FRAME_HEADER_LEN + len] {
                *slot = inner.arena.pop_front().unwrap_or(0);
            }
            inner.pool.release(len);
            inner.count -= 1;
            Some(FRAME_HEADER_LEN + len)
        })?;

        let mut env = Envelope::from_cmd(record[1], record[2]).ok()?;
        env.set_payload(&record[FRAME_HEADER_LEN..size]).ok()?;
        Some(env)
    }

    /// Number of queued envelopes
    #[must_use]
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).count)
    }

    /// Whether the queue holds nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the message budget
    #[must_use]
    pub fn pool(&self) -> MessagePool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).pool)
    }

    /// Discard everything and return all memory
    pub fn clear(&self) {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.arena.clear();
            inner.pool = MessagePool::new(inner.pool.budget);
            inner.count = 0;
        });
    }
}

impl Default for MsgQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_rejects_past_budget() {
        let mut pool = MessagePool::new(MessagePool::cost(10));
        assert!(pool.allocate(10).is_ok());
        assert_eq!(pool.allocate(0), Err(QueueError::OutOfMemory));
        pool.release(10);
        assert_eq!(pool.available(), MessagePool::cost(10));
    }
}
