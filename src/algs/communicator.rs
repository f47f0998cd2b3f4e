//! Thin façade over intra-process (threaded) or inter-process (MPI) message
//! passing.
//!
//! Messages are *contiguous byte slices*. Every operation is **blocking**:
//! the whole coupling pipeline is synchronous by contract, and the ascending
//! worker-id iteration order at each hop is the only synchronization
//! mechanism; there are no sequence numbers. Between any fixed
//! `(sender, receiver, tag)` triple, delivery order is program order.

use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::CouplingError;

/// Typed message tag, one per protocol phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    #[inline]
    pub fn as_u16(self) -> u16 {
        self.0
    }
}

/// Protocol phases. Distinct tags keep unrelated exchanges on separate
/// FIFO channels.
pub mod tags {
    use super::CommTag;

    /// Per-worker cell-count table gather.
    pub const COUNTS: CommTag = CommTag(1);
    /// Field gather: global total relayed to the coordinator.
    pub const GATHER_TOTAL: CommTag = CommTag(2);
    /// Field gather: per-worker payload blocks.
    pub const GATHER: CommTag = CommTag(3);
    /// Mapped-field scatter back to workers.
    pub const SCATTER: CommTag = CommTag(4);
    /// Relay reductions (sum, max).
    pub const REDUCE: CommTag = CommTag(5);
    /// Coordinator-to-worker broadcast.
    pub const BROADCAST: CommTag = CommTag(6);
}

/// Blocking communication interface (minimal by design).
pub trait Communicator: Send + Sync {
    /// Send `buf` to `peer`; returns once the message is handed off.
    fn send(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Result<(), CouplingError>;
    /// Receive the next message from `peer` on `tag`, blocking until it
    /// arrives.
    fn recv(&self, peer: usize, tag: CommTag) -> Result<Vec<u8>, CouplingError>;
}

/// Fixed process-group topology: ranks `0..size`, the coordinator is the
/// last rank, workers are everything below it, and worker 0 doubles as the
/// relay between workers and coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessGroup {
    rank: usize,
    size: usize,
}

impl ProcessGroup {
    /// A group needs at least one worker plus the coordinator.
    pub fn new(rank: usize, size: usize) -> Result<Self, CouplingError> {
        if size < 2 || rank >= size {
            return Err(CouplingError::comm(
                rank,
                format!("invalid process group: rank {rank} of {size}"),
            ));
        }
        Ok(Self { rank, size })
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn worker_count(&self) -> usize {
        self.size - 1
    }

    #[inline]
    pub fn coordinator_rank(&self) -> usize {
        self.size - 1
    }

    /// Worker 0 relays between the other workers and the coordinator.
    #[inline]
    pub fn relay_rank(&self) -> usize {
        0
    }

    #[inline]
    pub fn is_coordinator(&self) -> bool {
        self.rank == self.coordinator_rank()
    }

    #[inline]
    pub fn is_relay(&self) -> bool {
        self.rank == self.relay_rank()
    }

    #[inline]
    pub fn is_worker(&self) -> bool {
        !self.is_coordinator()
    }

    /// Worker ids in ascending order, the iteration order every gather and
    /// scatter loop must follow.
    #[inline]
    pub fn workers(&self) -> std::ops::Range<usize> {
        0..self.worker_count()
    }
}

/// Compile-time no-op comm for pure serial unit tests.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    fn send(&self, _peer: usize, _tag: CommTag, _buf: &[u8]) -> Result<(), CouplingError> {
        Ok(())
    }

    fn recv(&self, peer: usize, _tag: CommTag) -> Result<Vec<u8>, CouplingError> {
        Err(CouplingError::comm(peer, "NoComm cannot receive"))
    }
}

// --- ThreadComm: intra-process, one simulated rank per thread ---

type Key = (usize, usize, u16); // (src, dst, tag)
type Mailbox = DashMap<Key, Mutex<VecDeque<Bytes>>>;

static GLOBAL_MAILBOX: Lazy<Arc<Mailbox>> = Lazy::new(|| Arc::new(DashMap::new()));

/// In-process communicator backed by a shared FIFO mailbox. Each simulated
/// rank runs on its own thread; `recv` spins with `yield_now` until the
/// matching message is queued.
#[derive(Clone, Debug)]
pub struct ThreadComm {
    rank: usize,
    mailbox: Arc<Mailbox>,
}

impl ThreadComm {
    /// Rank on the process-wide shared mailbox.
    pub fn new(rank: usize) -> Self {
        Self {
            rank,
            mailbox: GLOBAL_MAILBOX.clone(),
        }
    }

    /// A fresh, isolated group of `size` ranks sharing one private mailbox.
    /// Preferred in tests so concurrent test binaries never cross-talk.
    pub fn group(size: usize) -> Vec<ThreadComm> {
        let mailbox: Arc<Mailbox> = Arc::new(DashMap::new());
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                mailbox: mailbox.clone(),
            })
            .collect()
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }
}

impl Communicator for ThreadComm {
    fn send(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Result<(), CouplingError> {
        let key = (self.rank, peer, tag.as_u16());
        let queue = self
            .mailbox
            .entry(key)
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        queue.lock().push_back(Bytes::copy_from_slice(buf));
        Ok(())
    }

    fn recv(&self, peer: usize, tag: CommTag) -> Result<Vec<u8>, CouplingError> {
        let key = (peer, self.rank, tag.as_u16());
        loop {
            if let Some(queue) = self.mailbox.get(&key) {
                if let Some(msg) = queue.lock().pop_front() {
                    return Ok(msg.to_vec());
                }
            }
            std::thread::yield_now();
        }
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{CommTag, Communicator};
    use crate::error::CouplingError;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    /// Blocking MPI communicator over the world group.
    pub struct MpiComm {
        world: SimpleCommunicator,
        rank: usize,
    }

    impl MpiComm {
        pub fn new(world: SimpleCommunicator) -> Self {
            let rank = world.rank() as usize;
            Self { world, rank }
        }

        pub fn rank(&self) -> usize {
            self.rank
        }
    }

    impl Communicator for MpiComm {
        fn send(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Result<(), CouplingError> {
            self.world
                .process_at_rank(peer as i32)
                .send_with_tag(buf, tag.as_u16() as i32);
            Ok(())
        }

        fn recv(&self, peer: usize, tag: CommTag) -> Result<Vec<u8>, CouplingError> {
            let (data, _status) = self
                .world
                .process_at_rank(peer as i32)
                .receive_vec_with_tag::<u8>(tag.as_u16() as i32);
            Ok(data)
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
