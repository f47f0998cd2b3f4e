//! Relay-based collectives over the fixed two-hop topology.
//!
//! Nothing here talks to more than one hop: workers exchange with the relay
//! (worker 0), and the relay alone exchanges with the coordinator. Every
//! loop over peers runs in ascending worker-id order, which is the only
//! synchronization the pipeline has.

use super::communicator::{Communicator, ProcessGroup, tags};
use super::wire;
use crate::error::CouplingError;

/// Sum a per-worker count over all workers; every rank receives the total.
///
/// The coordinator contributes nothing and passes any value for `local`.
pub fn sum_counts_over_workers<C: Communicator>(
    comm: &C,
    group: ProcessGroup,
    local: usize,
) -> Result<usize, CouplingError> {
    let relay = group.relay_rank();
    if group.is_coordinator() {
        let bytes = comm.recv(relay, tags::REDUCE)?;
        return wire::decode_count(&bytes).map_err(|m| CouplingError::comm(relay, m));
    }
    if group.is_relay() {
        let mut total = local;
        for w in group.workers().skip(1) {
            let bytes = comm.recv(w, tags::REDUCE)?;
            total += wire::decode_count(&bytes).map_err(|m| CouplingError::comm(w, m))?;
        }
        comm.send(group.coordinator_rank(), tags::REDUCE, &wire::encode_count(total))?;
        for w in group.workers().skip(1) {
            comm.send(w, tags::REDUCE, &wire::encode_count(total))?;
        }
        Ok(total)
    } else {
        comm.send(relay, tags::REDUCE, &wire::encode_count(local))?;
        let bytes = comm.recv(relay, tags::REDUCE)?;
        wire::decode_count(&bytes).map_err(|m| CouplingError::comm(relay, m))
    }
}

/// Maximum of a per-worker scalar over all workers; every rank receives it.
///
/// The coordinator contributes nothing; workers with nothing to report pass
/// `f64::NEG_INFINITY`.
pub fn max_over_workers<C: Communicator>(
    comm: &C,
    group: ProcessGroup,
    local: f64,
) -> Result<f64, CouplingError> {
    let relay = group.relay_rank();
    if group.is_coordinator() {
        let bytes = comm.recv(relay, tags::REDUCE)?;
        return wire::decode_f64(&bytes).map_err(|m| CouplingError::comm(relay, m));
    }
    if group.is_relay() {
        let mut acc = local;
        for w in group.workers().skip(1) {
            let bytes = comm.recv(w, tags::REDUCE)?;
            let v = wire::decode_f64(&bytes).map_err(|m| CouplingError::comm(w, m))?;
            if v > acc {
                acc = v;
            }
        }
        comm.send(group.coordinator_rank(), tags::REDUCE, &wire::encode_f64(acc))?;
        for w in group.workers().skip(1) {
            comm.send(w, tags::REDUCE, &wire::encode_f64(acc))?;
        }
        Ok(acc)
    } else {
        comm.send(relay, tags::REDUCE, &wire::encode_f64(local))?;
        let bytes = comm.recv(relay, tags::REDUCE)?;
        wire::decode_f64(&bytes).map_err(|m| CouplingError::comm(relay, m))
    }
}

/// Broadcast one byte from the coordinator to all workers through the
/// relay. Only the coordinator's `value` is meaningful; every rank returns
/// the broadcast byte.
pub fn broadcast_byte<C: Communicator>(
    comm: &C,
    group: ProcessGroup,
    value: u8,
) -> Result<u8, CouplingError> {
    let relay = group.relay_rank();
    if group.is_coordinator() {
        comm.send(relay, tags::BROADCAST, &[value])?;
        return Ok(value);
    }
    if group.is_relay() {
        let bytes = comm.recv(group.coordinator_rank(), tags::BROADCAST)?;
        let byte = *bytes
            .first()
            .ok_or_else(|| CouplingError::comm(group.coordinator_rank(), "empty broadcast"))?;
        for w in group.workers().skip(1) {
            comm.send(w, tags::BROADCAST, &[byte])?;
        }
        Ok(byte)
    } else {
        let bytes = comm.recv(relay, tags::BROADCAST)?;
        bytes
            .first()
            .copied()
            .ok_or_else(|| CouplingError::comm(relay, "empty broadcast"))
    }
}
