//! Core systems for Emberlink.
//!
//! This crate provides the foundational component of the Emberlink socket
//! library: a type-safe signal/slot mechanism used to deliver connection
//! events (data arrival, acknowledgements, errors, lifecycle changes) to
//! application code.
//!
//! # Signal/Slot Example
//!
//! ```
//! use emberlink_core::Signal;
//!
//! // Create a signal that passes a byte count
//! let bytes_written = Signal::<usize>::new();
//!
//! // Connect a slot to handle the signal
//! let slot_id = bytes_written.connect(|&len| {
//!     println!("wrote {} bytes", len);
//! });
//!
//! // Emit the signal
//! bytes_written.emit(42);
//!
//! // Disconnect when done
//! bytes_written.disconnect(slot_id);
//! ```

mod signal;

pub use signal::{Signal, SlotId};
