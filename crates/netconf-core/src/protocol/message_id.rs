//! Counter for automatically assigned RPC `message-id` values.
//!
//! # What is a message-id? (for beginners)
//!
//! Every `<rpc>` a NETCONF client sends carries a `message-id` attribute, and
//! the server copies that attribute verbatim onto the matching
//! `<rpc-reply>`.  Comparing the two lets the client confirm that the reply
//! it just read belongs to the request it just sent, and not to an earlier
//! request whose reply arrived late.
//!
//! When the session manages ids automatically it uses this counter: the
//! first request is stamped `1`, the second `2`, and so on.  The value `0`
//! means "no request has been stamped yet".
//!
//! # Thread safety
//!
//! The counter is an `AtomicU64`, so the current value can be read from any
//! thread (for logging, say) while the owning session advances it.

use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing source of `message-id` values.
///
/// # Examples
///
/// ```rust
/// use netconf_core::protocol::MessageIdCounter;
///
/// let ids = MessageIdCounter::new();
/// assert_eq!(ids.current(), 0);
/// assert_eq!(ids.next(), 1);
/// assert_eq!(ids.next(), 2);
/// ```
#[derive(Debug)]
pub struct MessageIdCounter {
    last: AtomicU64,
}

impl MessageIdCounter {
    /// Creates a counter whose first [`next`](Self::next) returns 1.
    pub fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Advances the counter and returns the new value.
    ///
    /// Wraps from `u64::MAX` to 0 without panicking.
    pub fn next(&self) -> u64 {
        // `fetch_add` returns the previous value, so add one to get the
        // value just stored.
        self.last.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Returns the most recently assigned value without advancing.
    pub fn current(&self) -> u64 {
        self.last.load(Ordering::Relaxed)
    }
}

impl Default for MessageIdCounter {
    fn default() -> Self {
        Self::new()
    }
}
