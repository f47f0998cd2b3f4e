//! Scattering a mapped field from the coordinator back to the workers.
//!
//! The coordinator slices the mapped array by the count table's prefix
//! sums and sends each worker its block through the relay, in ascending
//! worker-id order. Each hop sends a one-byte status first and the payload
//! only when the status is not `Error`, so a failed slice never leaves a
//! peer blocked on a payload that will not come.
//!
//! On arrival every value is checked against the identity it was gathered
//! under: the `(worker id, cell id)` pair recorded in the partition index
//! must match the receiving rank and the local traversal order. The first
//! mismatch poisons that slot and every following one with
//! [`SLOT_ERROR_VALUE`].

use itertools::izip;

use super::communicator::{Communicator, ProcessGroup, tags};
use super::wire::{self, WireBlockHeader};
use crate::data::{CellId, CountTable, FieldTag, PartitionIndex, SLOT_ERROR_VALUE, SlotStore, ZoneSlice};
use crate::error::{CouplingError, ExchangeStatus};

fn encode_block(worker: usize, values: &[f64], worker_ids: &[u32], cell_ids: &[u32]) -> Vec<u8> {
    let mut buf = WireBlockHeader::new(values.len(), worker).encode();
    buf.extend_from_slice(&wire::encode_f64s(values));
    buf.extend_from_slice(&wire::encode_u32s(worker_ids));
    buf.extend_from_slice(&wire::encode_u32s(cell_ids));
    buf
}

struct Block {
    values: Vec<f64>,
    worker_ids: Vec<u32>,
    cell_ids: Vec<u32>,
}

fn decode_block(bytes: &[u8], peer: usize) -> Result<Block, CouplingError> {
    let header_len = std::mem::size_of::<WireBlockHeader>();
    if bytes.len() < header_len {
        return Err(CouplingError::PayloadLengthMismatch {
            declared: header_len,
            received: bytes.len(),
        });
    }
    let header = WireBlockHeader::decode(&bytes[..header_len])
        .map_err(|m| CouplingError::comm(peer, m))?;
    let count = header.count();
    let expected = header_len + count * 8 + count * 4 + count * 4;
    if bytes.len() != expected {
        return Err(CouplingError::PayloadLengthMismatch {
            declared: expected,
            received: bytes.len(),
        });
    }
    let mut at = header_len;
    let values = wire::decode_f64s(&bytes[at..at + count * 8], count)
        .map_err(|m| CouplingError::comm(peer, m))?;
    at += count * 8;
    let worker_ids = wire::decode_u32s(&bytes[at..at + count * 4], count)
        .map_err(|m| CouplingError::comm(peer, m))?;
    at += count * 4;
    let cell_ids = wire::decode_u32s(&bytes[at..], count)
        .map_err(|m| CouplingError::comm(peer, m))?;
    Ok(Block {
        values,
        worker_ids,
        cell_ids,
    })
}

/// Write one worker's block into its zone slots, verifying provenance.
fn apply_block<Z: ZoneSlice + SlotStore>(
    zone: &mut Z,
    group: ProcessGroup,
    tag: FieldTag,
    block: &Block,
) -> Result<ExchangeStatus, CouplingError> {
    let cells: Vec<CellId> = zone.cells().collect();
    if block.values.len() != cells.len() {
        log::error!(
            "scatter block holds {} values for a zone slice of {} cells",
            block.values.len(),
            cells.len()
        );
        return Ok(ExchangeStatus::Error);
    }
    let my_id = group.rank() as u32;
    let mut corrupted = false;
    for (&cell, &worker_id, &cell_id, &value) in
        izip!(&cells, &block.worker_ids, &block.cell_ids, &block.values)
    {
        if !corrupted && (worker_id != my_id || cell_id != cell.0) {
            log::error!(
                "scatter ordering corrupted at cell {}: block carries worker {worker_id}, cell {cell_id}",
                cell.0
            );
            corrupted = true;
        }
        let v = if corrupted { SLOT_ERROR_VALUE } else { value };
        zone.write_slot(cell, tag, v)?;
    }
    Ok(if corrupted {
        ExchangeStatus::Error
    } else {
        ExchangeStatus::Ok
    })
}

/// Distribute a mapped array back onto the workers' zone slots.
///
/// The coordinator passes the mapped values together with the partition
/// index and count table from the originating gather; workers pass their
/// zone slice. Every rank returns its view of the exchange status; the
/// handshake completes on every hop even when a block is in error.
pub fn distribute_mapped_field<C, Z>(
    comm: &C,
    group: ProcessGroup,
    host: Option<(&[f64], &PartitionIndex, &CountTable)>,
    tag: FieldTag,
    zone: Option<&mut Z>,
) -> Result<ExchangeStatus, CouplingError>
where
    C: Communicator,
    Z: ZoneSlice + SlotStore,
{
    let relay = group.relay_rank();

    if group.is_coordinator() {
        let (values, index, counts) = host.ok_or(CouplingError::NotInitialized)?;
        let consistent = counts.validate_total(values.len()).is_ok()
            && index.len() == values.len();
        if !consistent {
            log::error!(
                "scatter refused: {} values, {} index entries, count table totals {}",
                values.len(),
                index.len(),
                counts.total()
            );
        }
        let offsets = counts.offsets();
        let mut overall = ExchangeStatus::Ok;
        for w in group.workers() {
            let (lo, hi) = (offsets[w], offsets[w + 1]);
            let status = if !consistent {
                ExchangeStatus::Error
            } else if lo == hi {
                log::warn!("worker {w} owns no cells in this zone");
                ExchangeStatus::Warning
            } else {
                ExchangeStatus::Ok
            };
            comm.send(relay, tags::SCATTER, &[status.to_wire()])?;
            if !status.is_error() {
                let block = encode_block(
                    w,
                    &values[lo..hi],
                    &index.worker_ids[lo..hi],
                    &index.cell_ids[lo..hi],
                );
                comm.send(relay, tags::SCATTER, &block)?;
            }
            overall = overall.worst(status);
        }
        return Ok(overall);
    }

    let zone = zone.ok_or(CouplingError::NotInitialized)?;

    if group.is_relay() {
        let mut local = ExchangeStatus::Ok;
        for w in group.workers() {
            let status_bytes = comm.recv(group.coordinator_rank(), tags::SCATTER)?;
            let status = ExchangeStatus::from_wire(
                *status_bytes
                    .first()
                    .ok_or_else(|| CouplingError::comm(group.coordinator_rank(), "empty status"))?,
            );
            let payload = if status.is_error() {
                None
            } else {
                Some(comm.recv(group.coordinator_rank(), tags::SCATTER)?)
            };
            if w == group.rank() {
                local = local.worst(status);
                if let Some(bytes) = payload {
                    let block = decode_block(&bytes, group.coordinator_rank())?;
                    local = local.worst(apply_block(zone, group, tag, &block)?);
                }
            } else {
                comm.send(w, tags::SCATTER, &[status.to_wire()])?;
                if let Some(bytes) = payload {
                    comm.send(w, tags::SCATTER, &bytes)?;
                }
            }
        }
        return Ok(local);
    }

    // Plain worker: one status byte, then the payload unless in error.
    let status_bytes = comm.recv(relay, tags::SCATTER)?;
    let mut status = ExchangeStatus::from_wire(
        *status_bytes
            .first()
            .ok_or_else(|| CouplingError::comm(relay, "empty status"))?,
    );
    if !status.is_error() {
        let bytes = comm.recv(relay, tags::SCATTER)?;
        let block = decode_block(&bytes, relay)?;
        status = status.worst(apply_block(zone, group, tag, &block)?);
    }
    Ok(status)
}
