//! Write-once single-producer single-consumer cells.
//!
//! The order-preserving pipeline needs a cell that one producer writes
//! exactly once, one consumer blocks on, and that carries either a
//! value or an error. Two interchangeable realizations are provided
//! behind the [`Slot`] seam: a rendezvous-channel one-shot and a
//! condition-variable-guarded option cell with value swap. A writer
//! dropped without fulfilling its slot surfaces as an error on `wait`,
//! never as a hang.

use std::sync::{Arc, Condvar, Mutex};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::error::{Error, Result};

/// Family of write-once SPSC cells carrying pipeline output units.
pub trait Slot: 'static {
    type Writer: Send + 'static;
    type Reader: Send + 'static;

    /// Create a fresh cell and hand back both ends.
    fn pair() -> (Self::Writer, Self::Reader);

    /// Fulfill the cell; consumes the write end.
    fn fulfill(writer: Self::Writer, value: Result<Vec<u8>>);

    /// Block until the cell is fulfilled; consumes the read end.
    fn wait(reader: Self::Reader) -> Result<Vec<u8>>;
}

/// One-shot over a rendezvous channel (the promise/future variant).
pub enum ChannelSlot {}

impl Slot for ChannelSlot {
    type Writer = Sender<Result<Vec<u8>>>;
    type Reader = Receiver<Result<Vec<u8>>>;

    fn pair() -> (Self::Writer, Self::Reader) {
        bounded(1)
    }

    fn fulfill(writer: Self::Writer, value: Result<Vec<u8>>) {
        // The reader may already be gone during an abort; that is fine.
        let _ = writer.send(value);
    }

    fn wait(reader: Self::Reader) -> Result<Vec<u8>> {
        reader
            .recv()
            .unwrap_or_else(|_| Err(Error::child("a worker dropped an output slot")))
    }
}

struct SwapCell {
    value: Mutex<Option<Result<Vec<u8>>>>,
    ready: Condvar,
}

/// Write end of a [`SwapSlot`] cell.
pub struct SwapWriter {
    cell: Arc<SwapCell>,
    fulfilled: bool,
}

/// Read end of a [`SwapSlot`] cell.
pub struct SwapReader {
    cell: Arc<SwapCell>,
}

impl SwapWriter {
    fn set(&mut self, value: Result<Vec<u8>>) {
        let mut slot = self.cell.value.lock().expect("slot mutex poisoned");
        *slot = Some(value);
        self.fulfilled = true;
        self.cell.ready.notify_one();
    }
}

impl Drop for SwapWriter {
    fn drop(&mut self) {
        if !self.fulfilled {
            self.set(Err(Error::child("a worker dropped an output slot")));
        }
    }
}

/// Condvar-guarded option cell with value swap (the queue/swap
/// variant).
pub enum SwapSlot {}

impl Slot for SwapSlot {
    type Writer = SwapWriter;
    type Reader = SwapReader;

    fn pair() -> (Self::Writer, Self::Reader) {
        let cell = Arc::new(SwapCell {
            value: Mutex::new(None),
            ready: Condvar::new(),
        });
        (
            SwapWriter {
                cell: cell.clone(),
                fulfilled: false,
            },
            SwapReader { cell },
        )
    }

    fn fulfill(mut writer: Self::Writer, value: Result<Vec<u8>>) {
        writer.set(value);
    }

    fn wait(reader: Self::Reader) -> Result<Vec<u8>> {
        let mut slot = reader.cell.value.lock().expect("slot mutex poisoned");
        loop {
            // Swap the value out rather than cloning it.
            match slot.take() {
                Some(value) => return value,
                None => {
                    slot = reader
                        .cell
                        .ready
                        .wait(slot)
                        .expect("slot mutex poisoned");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn exercise<S: Slot>() {
        // Fulfilled from another thread.
        let (writer, reader) = S::pair();
        let handle = thread::spawn(move || S::fulfill(writer, Ok(b"value".to_vec())));
        assert_eq!(S::wait(reader).unwrap(), b"value");
        handle.join().unwrap();

        // Error passes through.
        let (writer, reader) = S::pair();
        S::fulfill(writer, Err(Error::child("boom")));
        assert!(S::wait(reader).is_err());

        // Dropped writer is an error, not a hang.
        let (writer, reader) = S::pair();
        drop(writer);
        assert!(S::wait(reader).is_err());
    }

    #[test]
    fn channel_slot_contract() {
        exercise::<ChannelSlot>();
    }

    #[test]
    fn swap_slot_contract() {
        exercise::<SwapSlot>();
    }
}
