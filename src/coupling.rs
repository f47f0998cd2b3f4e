//! Session orchestration for the two-way coupling loop.
//!
//! A [`CouplingSession`] drives the whole sequence the solvers agree on:
//! initialization builds the nearest-neighbor mapping from a fresh gather
//! against the external point-set file, then every step exports the tracked
//! scalar, hands the turn to the external solver through the sync file,
//! reads its results back and scatters them into the workers' zone slots.
//! Every rank executes the same call sequence; the role split (coordinator,
//! relay, worker) is resolved inside each collective.
//!
//! A missing or stopping partner degrades a step to "no update" rather
//! than failing the solver run. Hard faults (transport, corrupted files,
//! ordering violations) surface as [`CouplingError`] and reset the session
//! to `Uninitialized`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::algs::collective::{broadcast_byte, max_over_workers};
use crate::algs::communicator::{Communicator, ProcessGroup};
use crate::algs::gather::{gather_cell_counts, gather_zone_field};
use crate::algs::matching::{Mapping, match_point_sets};
use crate::algs::reorder::{reorder_scalars, reorder_vectors};
use crate::algs::scatter::distribute_mapped_field;
use crate::data::{CellId, CountTable, FieldTag, GatheredField, SlotStore, ZoneId, ZoneSlice};
use crate::error::{CouplingError, ExchangeStatus};
use crate::io::{self, CouplingState, export, external};

/// Which quantities flow through a zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityFlow {
    /// Import the external scalar into the heat-source slot.
    pub heat_source: bool,
    /// Import the external vector into the per-axis force slots.
    pub forces: bool,
}

impl Default for QuantityFlow {
    fn default() -> Self {
        Self {
            heat_source: true,
            forces: true,
        }
    }
}

/// Exchange-file locations for one coupled zone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneFiles {
    /// Point set the external solver publishes (one point per line).
    pub external_points: PathBuf,
    /// Inbound scalar field, `value weight` per line.
    pub scalar_in: PathBuf,
    /// Inbound vector field, `dim` columns per line.
    pub vector_in: PathBuf,
    /// Outbound tracked scalar in external element order.
    pub scalar_out: PathBuf,
    /// Debug dump of both mapping directions, written at initialization.
    #[serde(default)]
    pub mapping_forward_debug: Option<PathBuf>,
    #[serde(default)]
    pub mapping_reverse_debug: Option<PathBuf>,
    /// Debug dump of the gathered field with provenance.
    #[serde(default)]
    pub gathered_debug: Option<PathBuf>,
}

/// One coupled zone as configured.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub id: ZoneId,
    #[serde(default)]
    pub flow: QuantityFlow,
    pub files: ZoneFiles,
}

/// Session configuration, typically deserialized from a config file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CouplingConfig {
    /// Shared handshake file.
    pub sync_file: PathBuf,
    /// Spatial dimension of both solvers' point sets (2 or 3).
    pub dim: usize,
    /// Retry budget when polling the sync file.
    #[serde(default = "default_max_trials")]
    pub max_trials: usize,
    /// Sleep between sync-file polls, in milliseconds.
    #[serde(default = "default_poll_ms")]
    pub poll_interval_ms: u64,
    /// Skip an exchange when the global max relative change of the tracked
    /// scalar stays below this. `None` exchanges every step.
    #[serde(default)]
    pub loose_threshold: Option<f64>,
    pub zones: Vec<ZoneConfig>,
}

fn default_max_trials() -> usize {
    1200
}

fn default_poll_ms() -> u64 {
    1000
}

impl CouplingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Coordinator-side state of one mapped zone. Workers keep none of this;
/// their share of the state lives in their zone slots.
#[derive(Debug, Default)]
struct CoupledZone {
    gathered: Option<GatheredField>,
    counts: Option<CountTable>,
    mapping: Option<Mapping>,
    external_len: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionState {
    Uninitialized,
    Mapped,
}

/// Outcome of one coupling step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Fields were exchanged and scattered.
    Exchanged,
    /// Change stayed below the loose-coupling threshold; nothing moved.
    Skipped,
    /// The partner stopped or timed out; fields kept their previous values.
    Degraded,
}

const GO: u8 = 1;
const NO_GO: u8 = 0;

/// Drives initialization and per-step exchanges over a process group.
pub struct CouplingSession<C: Communicator> {
    comm: C,
    group: ProcessGroup,
    config: CouplingConfig,
    state: SessionState,
    zones: Vec<CoupledZone>,
}

impl<C: Communicator> CouplingSession<C> {
    pub fn new(comm: C, group: ProcessGroup, config: CouplingConfig) -> Self {
        let zones = config.zones.iter().map(|_| CoupledZone::default()).collect();
        Self {
            comm,
            group,
            config,
            state: SessionState::Uninitialized,
            zones,
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.state == SessionState::Mapped
    }

    fn check_locals<Z: ZoneSlice>(&self, locals: &[Z]) -> Result<(), CouplingError> {
        if self.group.is_worker() && locals.len() != self.config.zones.len() {
            return Err(CouplingError::ZoneCountMismatch {
                expected: self.config.zones.len(),
                found: locals.len(),
            });
        }
        Ok(())
    }

    fn free_zone_state(&mut self) {
        for zone in &mut self.zones {
            *zone = CoupledZone::default();
        }
        self.state = SessionState::Uninitialized;
    }

    /// Build the mapping between this side's gathered cells and the
    /// external solver's point set, zone by zone.
    ///
    /// Workers pass their local zone slices in configuration order plus a
    /// tracked-scalar accessor; the coordinator passes an empty slice. Any
    /// failure frees all zone state and leaves the session uninitialized.
    pub fn initialize<Z, F>(
        &mut self,
        locals: &mut [Z],
        field: &F,
    ) -> Result<ExchangeStatus, CouplingError>
    where
        Z: ZoneSlice + SlotStore,
        F: Fn(&Z, CellId) -> f64,
    {
        match self.try_initialize(locals, field) {
            Ok(status) => Ok(status),
            Err(err) => {
                log::error!("coupling initialization failed: {err}");
                self.free_zone_state();
                Err(err)
            }
        }
    }

    fn try_initialize<Z, F>(
        &mut self,
        locals: &mut [Z],
        field: &F,
    ) -> Result<ExchangeStatus, CouplingError>
    where
        Z: ZoneSlice + SlotStore,
        F: Fn(&Z, CellId) -> f64,
    {
        self.check_locals(locals)?;
        // The external solver publishes its point sets first and signals
        // readiness; without that signal the files cannot be trusted.
        let found = if self.group.is_coordinator() {
            let (state, _status) = io::wait_for_state(
                &self.config.sync_file,
                CouplingState::ExternalReady,
                self.config.max_trials,
                self.config.poll_interval(),
            )?;
            broadcast_byte(&self.comm, self.group, state.code() as u8)?
        } else {
            broadcast_byte(&self.comm, self.group, 0)?
        };
        if i32::from(found) != CouplingState::ExternalReady.code() {
            return Err(CouplingError::WrongSyncState {
                found: i32::from(found),
            });
        }

        for z in 0..self.config.zones.len() {
            let dim = self.config.dim;
            let local = if self.group.is_worker() {
                Some(&locals[z])
            } else {
                None
            };
            let gathered = gather_zone_field(&self.comm, self.group, dim, local, field)?;
            let local_count = local.map_or(0, |zone| zone.cell_count());
            let counts = gather_cell_counts(&self.comm, self.group, local_count)?;

            if self.group.is_coordinator() {
                let gathered = gathered.ok_or(CouplingError::NotInitialized)?;
                let (counts, control_sum) = counts.ok_or(CouplingError::NotInitialized)?;
                counts.validate_total(gathered.len())?;
                log::info!(
                    "zone {:?}: gathered {control_sum} cells",
                    self.config.zones[z].id
                );

                let files = &self.config.zones[z].files;
                let external = external::read_point_set(&files.external_points, dim)?;
                let mapping = match_point_sets(&gathered.points, &external)?;

                if let Some(path) = &files.mapping_forward_debug {
                    export::write_indices(path, &mapping.a_to_b)?;
                }
                if let Some(path) = &files.mapping_reverse_debug {
                    export::write_indices(path, &mapping.b_to_a)?;
                }
                if let Some(path) = &files.gathered_debug {
                    export::write_debug_field(path, &gathered)?;
                }
                export::write_mapped_scalars(&files.scalar_out, &gathered.values, &mapping.b_to_a)?;

                self.zones[z] = CoupledZone {
                    external_len: external.len(),
                    gathered: Some(gathered),
                    counts: Some(counts),
                    mapping: Some(mapping),
                };
            } else {
                // Seed the throttle reference with the current field.
                let zone = &mut locals[z];
                let cells: Vec<CellId> = zone.cells().collect();
                for cell in cells {
                    let v = field(&*zone, cell);
                    zone.write_slot(cell, FieldTag::PrevTracked, v)?;
                }
            }
        }

        if self.group.is_coordinator() {
            io::write_state(&self.config.sync_file, CouplingState::SelfReady)?;
        }
        self.state = SessionState::Mapped;
        Ok(ExchangeStatus::Ok)
    }

    /// One full exchange: export the tracked scalar, hand the turn to the
    /// external solver, import its fields and scatter them into the zone
    /// slots.
    pub fn exchange_step<Z, F>(
        &mut self,
        locals: &mut [Z],
        field: &F,
    ) -> Result<StepOutcome, CouplingError>
    where
        Z: ZoneSlice + SlotStore,
        F: Fn(&Z, CellId) -> f64,
    {
        if self.state != SessionState::Mapped {
            return Err(CouplingError::NotInitialized);
        }
        self.check_locals(locals)?;
        match self.try_exchange(locals, field) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                log::error!("exchange step failed: {err}");
                self.free_zone_state();
                Err(err)
            }
        }
    }

    /// Like [`exchange_step`](Self::exchange_step), but first measures the
    /// global maximum relative change of the tracked scalar against the
    /// previous exchange and skips the step entirely below the configured
    /// threshold.
    pub fn exchange_step_loose<Z, F>(
        &mut self,
        locals: &mut [Z],
        field: &F,
    ) -> Result<StepOutcome, CouplingError>
    where
        Z: ZoneSlice + SlotStore,
        F: Fn(&Z, CellId) -> f64,
    {
        if self.state != SessionState::Mapped {
            return Err(CouplingError::NotInitialized);
        }
        self.check_locals(locals)?;
        let Some(threshold) = self.config.loose_threshold else {
            return self.exchange_step(locals, field);
        };

        let local_max = if self.group.is_worker() {
            let mut acc = f64::NEG_INFINITY;
            for zone in locals.iter() {
                for cell in zone.cells().collect::<Vec<_>>() {
                    let prev = zone.read_slot(cell, FieldTag::PrevTracked)?;
                    let now = field(zone, cell);
                    acc = acc.max(relative_change(now, prev));
                }
            }
            acc
        } else {
            f64::NEG_INFINITY
        };
        let global_max = max_over_workers(&self.comm, self.group, local_max)?;
        if global_max < threshold {
            log::debug!("skipping exchange: max relative change {global_max} below {threshold}");
            return Ok(StepOutcome::Skipped);
        }
        self.exchange_step(locals, field)
    }

    fn try_exchange<Z, F>(
        &mut self,
        locals: &mut [Z],
        field: &F,
    ) -> Result<StepOutcome, CouplingError>
    where
        Z: ZoneSlice + SlotStore,
        F: Fn(&Z, CellId) -> f64,
    {
        let dim = self.config.dim;

        // Export the current tracked scalar for every zone before handing
        // the turn over.
        for z in 0..self.config.zones.len() {
            let local = if self.group.is_worker() {
                Some(&locals[z])
            } else {
                None
            };
            let gathered = gather_zone_field(&self.comm, self.group, dim, local, field)?;
            if self.group.is_coordinator() {
                let gathered = gathered.ok_or(CouplingError::NotInitialized)?;
                let zone = &self.zones[z];
                let mapping = zone.mapping.as_ref().ok_or(CouplingError::NotInitialized)?;
                let files = &self.config.zones[z].files;
                export::write_mapped_scalars(&files.scalar_out, &gathered.values, &mapping.b_to_a)?;
                self.zones[z].gathered = Some(gathered);
            }
        }

        // Hand over, then wait for the partner to finish its own step.
        let go = if self.group.is_coordinator() {
            io::write_state(&self.config.sync_file, CouplingState::SelfReady)?;
            let (_state, status) = io::wait_for_state(
                &self.config.sync_file,
                CouplingState::ExternalReady,
                self.config.max_trials,
                self.config.poll_interval(),
            )?;
            let byte = if status.is_error() || status == ExchangeStatus::Warning {
                NO_GO
            } else {
                GO
            };
            broadcast_byte(&self.comm, self.group, byte)?
        } else {
            broadcast_byte(&self.comm, self.group, 0)?
        };
        if go == NO_GO {
            log::warn!("partner unavailable; keeping previous coupled fields this step");
            return Ok(StepOutcome::Degraded);
        }

        for z in 0..self.config.zones.len() {
            self.import_zone(z, locals, field)?;
        }
        Ok(StepOutcome::Exchanged)
    }

    fn import_zone<Z, F>(
        &mut self,
        z: usize,
        locals: &mut [Z],
        field: &F,
    ) -> Result<(), CouplingError>
    where
        Z: ZoneSlice + SlotStore,
        F: Fn(&Z, CellId) -> f64,
    {
        let dim = self.config.dim;
        let flow = self.config.zones[z].flow;

        // Coordinator reads and reorders into gather order; workers only
        // participate in the scatters.
        let mut heat = Vec::new();
        let mut forces = Vec::new();
        if self.group.is_coordinator() {
            let zone = &self.zones[z];
            let gathered = zone.gathered.as_ref().ok_or(CouplingError::NotInitialized)?;
            let mapping = zone.mapping.as_ref().ok_or(CouplingError::NotInitialized)?;
            let files = &self.config.zones[z].files;

            if flow.heat_source {
                let (scalars, _weights) =
                    external::read_scalar_and_weight(&files.scalar_in, zone.external_len)?;
                heat = vec![0.0; gathered.len()];
                reorder_scalars(&scalars, &mapping.a_to_b, &mut heat)?;
            }
            if flow.forces {
                let vectors = external::read_vectors(&files.vector_in, dim, zone.external_len)?;
                forces = vec![0.0; gathered.len() * dim];
                reorder_vectors(&vectors, dim, &mapping.a_to_b, &mut forces)?;
            }
        }

        let mut scatter = |tag: FieldTag, column: &[f64]| -> Result<ExchangeStatus, CouplingError> {
            if self.group.is_coordinator() {
                let zone = &self.zones[z];
                let gathered = zone.gathered.as_ref().ok_or(CouplingError::NotInitialized)?;
                let counts = zone.counts.as_ref().ok_or(CouplingError::NotInitialized)?;
                distribute_mapped_field(
                    &self.comm,
                    self.group,
                    Some((column, &gathered.index, counts)),
                    tag,
                    None::<&mut Z>,
                )
            } else {
                distribute_mapped_field(
                    &self.comm,
                    self.group,
                    None,
                    tag,
                    Some(&mut locals[z]),
                )
            }
        };

        if flow.heat_source {
            let status = scatter(FieldTag::HeatSource, &heat)?;
            if status.is_error() {
                log::error!("heat-source scatter degraded to error in zone {z}");
            }
        }
        if flow.forces {
            let mut column = vec![0.0; forces.len() / dim.max(1)];
            for axis in 0..dim {
                if self.group.is_coordinator() {
                    for (i, slot) in column.iter_mut().enumerate() {
                        *slot = forces[i * dim + axis];
                    }
                }
                let status = scatter(FieldTag::force_axis(axis)?, &column)?;
                if status.is_error() {
                    log::error!("force scatter degraded to error on axis {axis} in zone {z}");
                }
            }
        }

        // Refresh the throttle reference now that the exchange happened.
        if self.group.is_worker() {
            let zone = &mut locals[z];
            let cells: Vec<CellId> = zone.cells().collect();
            for cell in cells {
                let v = field(&*zone, cell);
                zone.write_slot(cell, FieldTag::PrevTracked, v)?;
            }
        }
        Ok(())
    }
}

/// Relative change of `now` against `prev`, with a zero-reference guard:
/// identical zeros count as no change, anything else against a zero
/// reference forces an exchange.
fn relative_change(now: f64, prev: f64) -> f64 {
    if prev.abs() > 0.0 {
        ((now - prev) / prev).abs()
    } else if now == prev {
        0.0
    } else {
        f64::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_change_guards_zero_reference() {
        assert_eq!(relative_change(0.0, 0.0), 0.0);
        assert_eq!(relative_change(1.0, 0.0), f64::INFINITY);
        assert!((relative_change(1.1, 1.0) - 0.1).abs() < 1e-12);
        assert!((relative_change(0.9, -1.0) - 1.9).abs() < 1e-12);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let json = r#"{
            "sync_file": "/tmp/sync.txt",
            "dim": 3,
            "zones": [{
                "id": 7,
                "files": {
                    "external_points": "/tmp/nodes.out",
                    "scalar_in": "/tmp/scalar.out",
                    "vector_in": "/tmp/vector.out",
                    "scalar_out": "/tmp/export.in"
                }
            }]
        }"#;
        let config: CouplingConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.max_trials, 1200);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.loose_threshold, None);
        assert_eq!(config.zones[0].id, ZoneId(7));
        assert!(config.zones[0].flow.heat_source);
        assert!(config.zones[0].files.mapping_forward_debug.is_none());
    }
}
