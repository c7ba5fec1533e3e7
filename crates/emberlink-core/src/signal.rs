//! Signal/slot system for Emberlink.
//!
//! This module provides a type-safe signal/slot mechanism for delivering
//! events from a connection or registry to application code. Signals are
//! emitted when something happens on a socket, and connected slots
//! (callbacks) are invoked in response.
//!
//! Dispatch is always direct: slots run synchronously on the thread that
//! emits, in registration order. The embedding runtime is expected to drive
//! all socket events from a single thread, so there is no queued or
//! cross-thread delivery. Signals are nonetheless `Send + Sync` and can be
//! shared freely via `Arc`.
//!
//! Slots may re-enter the signal (connect, disconnect, or emit again from
//! inside a slot); emission works on a snapshot of the registered slots, so
//! re-entrant mutation never invalidates an in-flight emission.
//!
//! # Example
//!
//! ```
//! use emberlink_core::Signal;
//!
//! let data_received = Signal::<Vec<u8>>::new();
//!
//! let slot_id = data_received.connect(|data| {
//!     println!("received {} bytes", data.len());
//! });
//!
//! data_received.emit(b"hello".to_vec());
//!
//! data_received.disconnect(slot_id);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// A unique identifier for a signal-slot connection.
    ///
    /// Use this ID to disconnect a specific slot via [`Signal::disconnect`].
    /// The ID remains valid until the slot is explicitly disconnected or the
    /// signal is dropped.
    pub struct SlotId;
}

type Slot<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

/// A type-safe signal that can have multiple connected slots.
///
/// When a signal is emitted, all connected slots are invoked with a
/// reference to the provided arguments, in the order they were connected.
///
/// # Type Parameter
///
/// - `Args`: The argument type passed to connected slots. Use `()` for
///   signals with no arguments, or a tuple for multiple arguments.
pub struct Signal<Args> {
    /// All registered slots.
    slots: Mutex<SlotMap<SlotId, Slot<Args>>>,
    /// Whether signal emission is temporarily blocked.
    blocked: AtomicBool,
}

impl<Args: Clone + Send + 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: Clone + Send + 'static> Signal<Args> {
    /// Create a new signal with no connected slots.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(SlotMap::with_key()),
            blocked: AtomicBool::new(false),
        }
    }

    /// Connect a slot (closure) to this signal.
    ///
    /// Returns a [`SlotId`] that can be used to disconnect the slot later.
    ///
    /// # Example
    ///
    /// ```
    /// use emberlink_core::Signal;
    ///
    /// let signal = Signal::<String>::new();
    /// let id = signal.connect(|s| println!("got: {}", s));
    /// signal.emit("hello".to_string());
    /// ```
    pub fn connect<F>(&self, slot: F) -> SlotId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.slots.lock().insert(Arc::new(slot))
    }

    /// Disconnect a specific slot by its ID.
    ///
    /// Returns `true` if the slot was found and removed, `false` otherwise.
    pub fn disconnect(&self, id: SlotId) -> bool {
        self.slots.lock().remove(id).is_some()
    }

    /// Disconnect all slots from this signal.
    pub fn disconnect_all(&self) {
        self.slots.lock().clear();
    }

    /// Get the number of connected slots.
    pub fn slot_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Block signal emission temporarily.
    ///
    /// While blocked, calls to `emit()` do nothing. This is useful during
    /// teardown or batch updates to prevent cascading notifications.
    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }

    /// Check if signal emission is currently blocked.
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Emit the signal, invoking all connected slots.
    ///
    /// If the signal is blocked, this does nothing. Slots are invoked
    /// synchronously on the emitting thread with a shared reference to
    /// `args`. Emission snapshots the slot list first, so slots may
    /// connect or disconnect slots on this same signal without affecting
    /// the in-flight emission.
    pub fn emit(&self, args: Args) {
        if self.is_blocked() {
            tracing::trace!(target: "emberlink_core::signal", "signal blocked, skipping emit");
            return;
        }

        // Snapshot so a slot can mutate the slot table re-entrantly.
        let slots: Vec<Slot<Args>> = self.slots.lock().values().cloned().collect();
        tracing::trace!(target: "emberlink_core::signal", slot_count = slots.len(), "emitting signal");

        for slot in slots {
            slot(&args);
        }
    }
}
