//! Parallel dispatch cores over pools of child subprocesses.
//!
//! All three cores share one shape: a reader pulls input units, a
//! bounded queue hands them to per-worker feeder threads, collector
//! threads read the children's output, and a reaper folds exit
//! statuses. They differ in how output order is restored:
//!
//! - [`line`] - the canonical order-preserving core. Each input unit
//!   gets a write-once slot; a single writer drains the slots in input
//!   order, so a slow worker stalls only its own pending units. The
//!   slot primitive is pluggable through [`slot::Slot`]: a rendezvous
//!   channel one-shot (`sparallel`) or a condvar-guarded swap cell
//!   (`qparallel`).
//! - [`round_robin`] - the simple cousin (`rparallel`): unit *i* goes
//!   to worker *i mod n* and blocking pipe I/O is the only
//!   synchronization. Correct only for strictly line-synchronous
//!   children; a child that buffers many inputs before producing
//!   output can deadlock the whole arrangement, which is why the slot
//!   design is the default.
//! - [`warc`] - the same queue/sentinel/reaper discipline over WARC
//!   records, with records from different workers interleaved into a
//!   shared (optionally gzipped, optionally sharded) output.
//!
//! Scheduling is plain preemptive OS threads with blocking I/O; there
//! are no timeouts and no cancellation beyond orderly shutdown. A
//! child that never writes output will hang its pipeline.

pub mod child;
pub mod line;
pub mod round_robin;
pub mod slot;
pub mod warc;
