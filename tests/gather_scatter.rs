use field_couple::prelude::*;

fn field(z: &InMemoryZone, c: CellId) -> f64 {
    z.scalar(c).unwrap_or(0.0)
}

/// Worker `w` owns `count` cells with ids `100*w + i` and values `10*w + i`.
fn worker_zone(worker: usize, count: usize) -> InMemoryZone {
    let mut zone = InMemoryZone::new(ZoneId(1), 2);
    for i in 0..count {
        zone.push_cell(
            CellId((100 * worker + i) as u32),
            &[worker as f64, i as f64],
            (10 * worker + i) as f64,
        );
    }
    zone
}

#[test]
fn gather_groups_blocks_by_ascending_worker_id() {
    let size = 4;
    let counts = [2usize, 0, 1];
    let comms = ThreadComm::group(size);
    let handles: Vec<_> = comms
        .into_iter()
        .enumerate()
        .map(|(rank, comm)| {
            std::thread::spawn(move || {
                let group = ProcessGroup::new(rank, size).unwrap();
                if group.is_coordinator() {
                    gather_zone_field(&comm, group, 2, None::<&InMemoryZone>, field).unwrap()
                } else {
                    let zone = worker_zone(rank, counts[rank]);
                    gather_zone_field(&comm, group, 2, Some(&zone), field).unwrap()
                }
            })
        })
        .collect();
    let mut results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let gathered = results.pop().unwrap().expect("coordinator result");
    assert!(results.iter().all(|r| r.is_none()));
    assert_eq!(gathered.values, vec![0.0, 1.0, 20.0]);
    assert_eq!(gathered.index.worker_ids, vec![0, 0, 2]);
    assert_eq!(gathered.index.cell_ids, vec![0, 1, 200]);
    assert_eq!(gathered.points.point(2), &[2.0, 0.0]);
}

#[test]
fn cell_count_table_matches_worker_slices() {
    let size = 4;
    let counts = [3usize, 0, 2];
    let comms = ThreadComm::group(size);
    let handles: Vec<_> = comms
        .into_iter()
        .enumerate()
        .map(|(rank, comm)| {
            std::thread::spawn(move || {
                let group = ProcessGroup::new(rank, size).unwrap();
                let local = if group.is_worker() { counts[rank] } else { 0 };
                gather_cell_counts(&comm, group, local).unwrap()
            })
        })
        .collect();
    let mut results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let (table, control_sum) = results.pop().unwrap().expect("coordinator result");
    assert_eq!(control_sum, 5);
    assert_eq!(table.offsets(), vec![0, 3, 3, 5]);
}

/// Gather, double every value on the coordinator, scatter back; the
/// doubled value must land in the heat-source slot of the cell it was
/// sampled from, on every worker including the relay.
#[test]
fn gather_then_scatter_round_trips_through_slots() {
    let size = 3;
    let comms = ThreadComm::group(size);
    let handles: Vec<_> = comms
        .into_iter()
        .enumerate()
        .map(|(rank, comm)| {
            std::thread::spawn(move || {
                let group = ProcessGroup::new(rank, size).unwrap();
                if group.is_coordinator() {
                    let gathered = gather_zone_field(&comm, group, 2, None::<&InMemoryZone>, field)
                        .unwrap()
                        .unwrap();
                    let (table, _) = gather_cell_counts(&comm, group, 0).unwrap().unwrap();
                    let doubled: Vec<f64> = gathered.values.iter().map(|v| v * 2.0).collect();
                    let status = distribute_mapped_field(
                        &comm,
                        group,
                        Some((&doubled[..], &gathered.index, &table)),
                        FieldTag::HeatSource,
                        None::<&mut InMemoryZone>,
                    )
                    .unwrap();
                    assert_eq!(status, ExchangeStatus::Ok);
                    None
                } else {
                    let mut zone = worker_zone(rank, 2);
                    gather_zone_field(&comm, group, 2, Some(&zone), field).unwrap();
                    gather_cell_counts(&comm, group, zone.cell_count()).unwrap();
                    let status = distribute_mapped_field(
                        &comm,
                        group,
                        None,
                        FieldTag::HeatSource,
                        Some(&mut zone),
                    )
                    .unwrap();
                    assert_eq!(status, ExchangeStatus::Ok);
                    Some(zone)
                }
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for (worker, zone) in results.iter().take(size - 1).enumerate() {
        let zone = zone.as_ref().unwrap();
        for i in 0..2u32 {
            let cell = CellId((100 * worker) as u32 + i);
            let expected = 2.0 * (10 * worker) as f64 + 2.0 * i as f64;
            assert_eq!(zone.read_slot(cell, FieldTag::HeatSource), Ok(expected));
        }
    }
}

/// A permuted partition index must be detected on arrival: the receiving
/// worker reports an error and poisons the affected slots.
#[test]
fn corrupted_index_poisons_receiving_worker() {
    let size = 3;
    let comms = ThreadComm::group(size);
    let handles: Vec<_> = comms
        .into_iter()
        .enumerate()
        .map(|(rank, comm)| {
            std::thread::spawn(move || {
                let group = ProcessGroup::new(rank, size).unwrap();
                if group.is_coordinator() {
                    let gathered = gather_zone_field(&comm, group, 2, None::<&InMemoryZone>, field)
                        .unwrap()
                        .unwrap();
                    let (table, _) = gather_cell_counts(&comm, group, 0).unwrap().unwrap();
                    let mut index = gathered.index.clone();
                    // Swap worker 1's two cell ids.
                    index.cell_ids.swap(2, 3);
                    let status = distribute_mapped_field(
                        &comm,
                        group,
                        Some((&gathered.values[..], &index, &table)),
                        FieldTag::HeatSource,
                        None::<&mut InMemoryZone>,
                    )
                    .unwrap();
                    (status, None)
                } else {
                    let mut zone = worker_zone(rank, 2);
                    gather_zone_field(&comm, group, 2, Some(&zone), field).unwrap();
                    gather_cell_counts(&comm, group, zone.cell_count()).unwrap();
                    let status = distribute_mapped_field(
                        &comm,
                        group,
                        None,
                        FieldTag::HeatSource,
                        Some(&mut zone),
                    )
                    .unwrap();
                    (status, Some(zone))
                }
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Worker 0's slice was untouched.
    let (status0, zone0) = &results[0];
    assert_eq!(*status0, ExchangeStatus::Ok);
    assert_eq!(
        zone0.as_ref().unwrap().read_slot(CellId(0), FieldTag::HeatSource),
        Ok(0.0)
    );

    // Worker 1 sees the corruption from its first cell onward.
    let (status1, zone1) = &results[1];
    assert_eq!(*status1, ExchangeStatus::Error);
    let zone1 = zone1.as_ref().unwrap();
    assert_eq!(
        zone1.read_slot(CellId(100), FieldTag::HeatSource),
        Ok(SLOT_ERROR_VALUE)
    );
    assert_eq!(
        zone1.read_slot(CellId(101), FieldTag::HeatSource),
        Ok(SLOT_ERROR_VALUE)
    );
}

/// A worker without cells in the zone still completes the handshake; the
/// coordinator reports the empty slice as a warning.
#[test]
fn zero_cell_worker_degrades_to_warning() {
    let size = 3;
    let counts = [2usize, 0];
    let comms = ThreadComm::group(size);
    let handles: Vec<_> = comms
        .into_iter()
        .enumerate()
        .map(|(rank, comm)| {
            std::thread::spawn(move || {
                let group = ProcessGroup::new(rank, size).unwrap();
                if group.is_coordinator() {
                    let gathered = gather_zone_field(&comm, group, 2, None::<&InMemoryZone>, field)
                        .unwrap()
                        .unwrap();
                    let (table, _) = gather_cell_counts(&comm, group, 0).unwrap().unwrap();
                    distribute_mapped_field(
                        &comm,
                        group,
                        Some((&gathered.values[..], &gathered.index, &table)),
                        FieldTag::HeatSource,
                        None::<&mut InMemoryZone>,
                    )
                    .unwrap()
                } else {
                    let mut zone = worker_zone(rank, counts[rank]);
                    gather_zone_field(&comm, group, 2, Some(&zone), field).unwrap();
                    gather_cell_counts(&comm, group, zone.cell_count()).unwrap();
                    distribute_mapped_field(
                        &comm,
                        group,
                        None,
                        FieldTag::HeatSource,
                        Some(&mut zone),
                    )
                    .unwrap()
                }
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results[0], ExchangeStatus::Ok);
    assert_eq!(results[1], ExchangeStatus::Warning);
    assert_eq!(results[2], ExchangeStatus::Warning);
}
