//! Gathering per-worker zone data onto the coordinator.
//!
//! Every worker serializes its local slice (cell ids, sampled field values,
//! cell centroids) into one contiguous block and sends it toward the
//! coordinator through the relay. The relay forwards blocks in ascending
//! worker-id order, its own first, so the coordinator appends them in that
//! same order. The resulting arrays are grouped by ascending worker id with
//! worker-local traversal order inside each group; that layout is what
//! [`CountTable::offsets`] inverts at scatter time.

use super::collective::sum_counts_over_workers;
use super::communicator::{Communicator, ProcessGroup, tags};
use super::wire::{self, WireBlockHeader};
use crate::data::{CellId, CountTable, GatheredField, PointSet, ZoneSlice};
use crate::error::CouplingError;

/// Gather each worker's local cell count into a per-worker table on the
/// coordinator, together with the relay-computed control sum.
///
/// Returns `Some` on the coordinator, `None` on workers.
pub fn gather_cell_counts<C: Communicator>(
    comm: &C,
    group: ProcessGroup,
    local_count: usize,
) -> Result<Option<(CountTable, usize)>, CouplingError> {
    let control_sum = sum_counts_over_workers(comm, group, local_count)?;
    let relay = group.relay_rank();

    if group.is_coordinator() {
        let mut table = CountTable::zeros(group.worker_count());
        for w in group.workers() {
            let bytes = comm.recv(relay, tags::COUNTS)?;
            let count = wire::decode_count(&bytes).map_err(|m| CouplingError::comm(relay, m))?;
            table.set(w, count)?;
        }
        table.validate_total(control_sum)?;
        return Ok(Some((table, control_sum)));
    }

    if group.is_relay() {
        comm.send(
            group.coordinator_rank(),
            tags::COUNTS,
            &wire::encode_count(local_count),
        )?;
        for w in group.workers().skip(1) {
            let bytes = comm.recv(w, tags::COUNTS)?;
            comm.send(group.coordinator_rank(), tags::COUNTS, &bytes)?;
        }
    } else {
        comm.send(relay, tags::COUNTS, &wire::encode_count(local_count))?;
    }
    Ok(None)
}

/// One worker's gather block as a single contiguous buffer:
/// header, cell ids, field values, flat centroids.
fn encode_block(worker: usize, cell_ids: &[u32], values: &[f64], coords: &[f64]) -> Vec<u8> {
    let mut buf = WireBlockHeader::new(cell_ids.len(), worker).encode();
    buf.extend_from_slice(&wire::encode_u32s(cell_ids));
    buf.extend_from_slice(&wire::encode_f64s(values));
    buf.extend_from_slice(&wire::encode_f64s(coords));
    buf
}

struct Block {
    worker: usize,
    cell_ids: Vec<u32>,
    values: Vec<f64>,
    coords: Vec<f64>,
}

fn decode_block(bytes: &[u8], dim: usize, peer: usize) -> Result<Block, CouplingError> {
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
    let expected = header_len + count * 4 + count * 8 + count * dim * 8;
    if bytes.len() != expected {
        return Err(CouplingError::PayloadLengthMismatch {
            declared: expected,
            received: bytes.len(),
        });
    }
    let mut at = header_len;
    let cell_ids = wire::decode_u32s(&bytes[at..at + count * 4], count)
        .map_err(|m| CouplingError::comm(peer, m))?;
    at += count * 4;
    let values = wire::decode_f64s(&bytes[at..at + count * 8], count)
        .map_err(|m| CouplingError::comm(peer, m))?;
    at += count * 8;
    let coords = wire::decode_f64s(&bytes[at..], count * dim)
        .map_err(|m| CouplingError::comm(peer, m))?;
    Ok(Block {
        worker: header.worker(),
        cell_ids,
        values,
        coords,
    })
}

/// Gather a zone field onto the coordinator.
///
/// Workers pass their local zone slice plus a sampling closure; the
/// coordinator passes `None` and receives the assembled [`GatheredField`].
/// Workers with an empty slice still send a header so the hop sequence
/// stays aligned.
pub fn gather_zone_field<C, Z, F>(
    comm: &C,
    group: ProcessGroup,
    dim: usize,
    zone: Option<&Z>,
    field: F,
) -> Result<Option<GatheredField>, CouplingError>
where
    C: Communicator,
    Z: ZoneSlice,
    F: Fn(&Z, CellId) -> f64,
{
    let relay = group.relay_rank();

    if group.is_coordinator() {
        let total = sum_counts_over_workers(comm, group, 0)?;
        log::debug!("gathering {total} cells from {} workers", group.worker_count());

        let mut gathered = GatheredField {
            points: PointSet::new(dim)?,
            ..Default::default()
        };
        for w in group.workers() {
            let bytes = comm.recv(relay, tags::GATHER)?;
            let block = decode_block(&bytes, dim, relay)?;
            if block.worker != w {
                return Err(CouplingError::comm(
                    relay,
                    format!("expected block from worker {w}, got {}", block.worker),
                ));
            }
            if gathered.len() + block.values.len() > total {
                log::error!(
                    "worker {w} block of {} cells overflows announced total {total}",
                    block.values.len()
                );
                return Err(CouplingError::PayloadLengthMismatch {
                    declared: total,
                    received: gathered.len() + block.values.len(),
                });
            }
            gathered.index.extend_block(w, &block.cell_ids);
            gathered.values.extend_from_slice(&block.values);
            gathered.points.extend_flat(&block.coords)?;
        }
        if gathered.len() != total {
            log::error!(
                "gathered {} cells but the control sum announced {total}",
                gathered.len()
            );
            return Err(CouplingError::PayloadLengthMismatch {
                declared: total,
                received: gathered.len(),
            });
        }
        return Ok(Some(gathered));
    }

    // Worker side: serialize the local slice in traversal order.
    let zone = zone.ok_or(CouplingError::NotInitialized)?;
    if zone.dim() != dim {
        return Err(CouplingError::DimensionMismatch {
            expected: dim,
            found: zone.dim(),
        });
    }
    let cells: Vec<CellId> = zone.cells().collect();
    let mut cell_ids = Vec::with_capacity(cells.len());
    let mut values = Vec::with_capacity(cells.len());
    let mut coords = vec![0.0; cells.len() * dim];
    for (i, &cell) in cells.iter().enumerate() {
        cell_ids.push(cell.0);
        values.push(field(zone, cell));
        zone.centroid(cell, &mut coords[i * dim..(i + 1) * dim])?;
    }
    sum_counts_over_workers(comm, group, cells.len())?;

    let block = encode_block(group.rank(), &cell_ids, &values, &coords);
    if group.is_relay() {
        comm.send(group.coordinator_rank(), tags::GATHER, &block)?;
        for w in group.workers().skip(1) {
            let forwarded = comm.recv(w, tags::GATHER)?;
            comm.send(group.coordinator_rank(), tags::GATHER, &forwarded)?;
        }
    } else {
        comm.send(relay, tags::GATHER, &block)?;
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_roundtrip() {
        let bytes = encode_block(2, &[7, 3], &[1.5, -2.5], &[0.0, 1.0, 2.0, 3.0]);
        let block = decode_block(&bytes, 2, 0).unwrap();
        assert_eq!(block.worker, 2);
        assert_eq!(block.cell_ids, vec![7, 3]);
        assert_eq!(block.values, vec![1.5, -2.5]);
        assert_eq!(block.coords, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn truncated_block_is_a_length_mismatch() {
        let mut bytes = encode_block(0, &[1], &[2.0], &[0.5, 0.5]);
        bytes.pop();
        assert!(matches!(
            decode_block(&bytes, 2, 0),
            Err(CouplingError::PayloadLengthMismatch { .. })
        ));
    }

    #[test]
    fn empty_block_roundtrip() {
        let bytes = encode_block(1, &[], &[], &[]);
        let block = decode_block(&bytes, 3, 0).unwrap();
        assert_eq!(block.worker, 1);
        assert!(block.cell_ids.is_empty());
    }

    mod consistency {
        use super::*;
        use crate::algs::communicator::ThreadComm;
        use crate::data::{InMemoryZone, ZoneId};

        fn one_cell_zone() -> InMemoryZone {
            let mut zone = InMemoryZone::new(ZoneId(1), 2);
            zone.push_cell(CellId(0), &[0.0, 0.0], 1.0);
            zone
        }

        /// Run a size-3 group where worker 1 announces `declared` cells in
        /// the count reduction but ships a one-cell block, and return the
        /// coordinator's gather result.
        fn gather_with_lying_worker(
            declared: usize,
        ) -> Result<Option<GatheredField>, CouplingError> {
            let mut comms = ThreadComm::group(3);
            let coordinator = comms.pop().unwrap();
            let liar = comms.pop().unwrap();
            let relay = comms.pop().unwrap();

            let relay_thread = std::thread::spawn(move || {
                let group = ProcessGroup::new(0, 3).unwrap();
                let zone = one_cell_zone();
                gather_zone_field(&relay, group, 2, Some(&zone), |z: &InMemoryZone, c| {
                    z.scalar(c).unwrap_or(0.0)
                })
            });
            let liar_thread = std::thread::spawn(move || {
                let group = ProcessGroup::new(1, 3).unwrap();
                sum_counts_over_workers(&liar, group, declared)?;
                let block = encode_block(1, &[5], &[2.0], &[1.0, 0.0]);
                liar.send(group.relay_rank(), tags::GATHER, &block)
            });

            let group = ProcessGroup::new(2, 3).unwrap();
            let result = gather_zone_field::<_, InMemoryZone, _>(
                &coordinator,
                group,
                2,
                None,
                |_, _| 0.0,
            );
            relay_thread.join().unwrap().unwrap();
            liar_thread.join().unwrap().unwrap();
            result
        }

        #[test]
        fn shortfall_against_control_sum_aborts_the_gather() {
            // Declares 2 cells, ships 1; total 3 announced, 2 received.
            assert_eq!(
                gather_with_lying_worker(2),
                Err(CouplingError::PayloadLengthMismatch {
                    declared: 3,
                    received: 2,
                })
            );
        }

        #[test]
        fn overflow_of_control_sum_aborts_the_gather() {
            // Declares 0 cells, ships 1; total 1 announced, 2 received.
            assert_eq!(
                gather_with_lying_worker(0),
                Err(CouplingError::PayloadLengthMismatch {
                    declared: 1,
                    received: 2,
                })
            );
        }
    }
}
