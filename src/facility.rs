//! The seam between the session machinery and a concrete counting facility.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Process-scope access to a counting facility.
///
/// A value of this type is the initialised facility: constructing it is the
/// one-time global init, dropping it the matching shutdown. Measurement
/// sessions borrow it for their whole lifetime.
pub trait Facility: Sync {
    type Handle: CounterHandle;

    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Allocate an empty counter handle for the calling thread.
    fn create_handle(&self) -> io::Result<Self::Handle>;

    /// Number of handles created and not yet released or dropped.
    fn live_handles(&self) -> usize;
}

/// Abstract trait to control the counters owned by one thread.
///
/// Handles only ever see well-ordered calls; lifecycle checking happens in
/// [`CounterContext`](crate::context::CounterContext).
pub trait CounterHandle: Send {
    /// Attach a named event. Unknown or unsupported events return an error and
    /// leave the handle usable.
    fn subscribe(&mut self, event: &str) -> io::Result<()>;

    /// Reset and enable all subscribed events.
    fn start(&mut self) -> io::Result<()>;

    /// Disable all events and read them, in subscription order.
    fn stop(&mut self) -> io::Result<Vec<u64>>;

    /// Give the handle back to the facility.
    fn release(self) -> io::Result<()>;
}

/// Counts live handles of a facility.
#[derive(Clone, Debug, Default)]
pub struct LiveHandles {
    count: Arc<AtomicUsize>,
}

impl LiveHandles {
    pub fn token(&self) -> LiveToken {
        self.count.fetch_add(1, Ordering::SeqCst);
        LiveToken {
            count: self.count.clone(),
        }
    }

    pub fn get(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

/// Held by a handle; decrements the live count when dropped.
#[derive(Debug)]
pub struct LiveToken {
    count: Arc<AtomicUsize>,
}

impl Drop for LiveToken {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}
