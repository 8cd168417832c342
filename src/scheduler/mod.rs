//! The poll loop that moves due jobs from storage onto the work queue.

mod poller;

pub use poller::{Poller, PollerError, PollerHandle};
