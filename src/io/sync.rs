//! Sync-file handshake with the external solver.
//!
//! Both sides poll one shared file holding a single numeric state code.
//! Codes are written as integers but parsed as floats with an epsilon
//! comparison, because either side may emit them through formatted float
//! output. Polling is bounded: a missing partner degrades the exchange to
//! a warning instead of hanging the solver forever.

use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{CouplingError, ExchangeStatus};

/// Handshake states, in the order of their on-file codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CouplingState {
    /// Neither side ready.
    Init,
    /// External solver has finished its step; its output files are valid.
    ExternalReady,
    /// This side has finished its step; our output files are valid.
    SelfReady,
    /// Either side requests a shutdown of the coupling.
    Stop,
    /// The file held something unrecognizable.
    SyncError,
}

impl CouplingState {
    pub fn code(self) -> i32 {
        match self {
            CouplingState::Init => 0,
            CouplingState::ExternalReady => 1,
            CouplingState::SelfReady => 2,
            CouplingState::Stop => 3,
            CouplingState::SyncError => 4,
        }
    }
}

const CODE_EPSILON: f64 = 1e-6;

#[inline]
fn code_is(value: f64, code: i32) -> bool {
    (value - code as f64).abs() < CODE_EPSILON
}

fn parse_code(raw: &str, path: &Path) -> Result<f64, CouplingError> {
    let token = raw
        .split_whitespace()
        .next()
        .ok_or_else(|| CouplingError::parse(path, "empty sync file"))?;
    #[cfg(feature = "single-precision")]
    {
        token
            .parse::<f32>()
            .map(f64::from)
            .map_err(|e| CouplingError::parse(path, e.to_string()))
    }
    #[cfg(not(feature = "single-precision"))]
    {
        token
            .parse::<f64>()
            .map_err(|e| CouplingError::parse(path, e.to_string()))
    }
}

/// Read the current handshake state. An unknown numeric code reads as
/// [`CouplingState::SyncError`] rather than an error, so a confused partner
/// degrades the exchange instead of aborting it.
pub fn read_state(path: &Path) -> Result<CouplingState, CouplingError> {
    let raw = fs::read_to_string(path).map_err(|e| CouplingError::io(path, e))?;
    let value = parse_code(&raw, path)?;
    for state in [
        CouplingState::Init,
        CouplingState::ExternalReady,
        CouplingState::SelfReady,
        CouplingState::Stop,
    ] {
        if code_is(value, state.code()) {
            return Ok(state);
        }
    }
    log::warn!("unrecognized sync code {value} in {}", path.display());
    Ok(CouplingState::SyncError)
}

/// Overwrite the handshake file with `state`'s integer code.
pub fn write_state(path: &Path, state: CouplingState) -> Result<(), CouplingError> {
    fs::write(path, format!("{}\n", state.code())).map_err(|e| CouplingError::io(path, e))
}

/// Reset the handshake to [`CouplingState::Init`].
pub fn reset_sync_state(path: &Path) -> Result<(), CouplingError> {
    write_state(path, CouplingState::Init)
}

/// Signal that the external solver's files are valid. Intended for test
/// harnesses and external-side simulators.
pub fn mark_external_ready(path: &Path) -> Result<(), CouplingError> {
    write_state(path, CouplingState::ExternalReady)
}

/// Poll the handshake file until it reads `desired`, for at most
/// `max_trials` reads spaced `sleep` apart.
///
/// Returns the final observed state plus a status: `Ok` when the desired
/// state arrived, `Warning` when the budget ran out or the partner asked to
/// stop. Unreadable polls consume a trial rather than failing, since the
/// partner may be mid-write.
pub fn wait_for_state(
    path: &Path,
    desired: CouplingState,
    max_trials: usize,
    sleep: Duration,
) -> Result<(CouplingState, ExchangeStatus), CouplingError> {
    let mut last = CouplingState::SyncError;
    for trial in 0..max_trials {
        match read_state(path) {
            Ok(state) => {
                last = state;
                if state == desired {
                    return Ok((state, ExchangeStatus::Ok));
                }
                if state == CouplingState::Stop {
                    log::warn!("partner requested stop while waiting on {}", path.display());
                    return Ok((state, ExchangeStatus::Warning));
                }
            }
            Err(err) => {
                log::debug!("sync poll {trial} failed: {err}");
            }
        }
        std::thread::sleep(sleep);
    }
    log::warn!(
        "gave up waiting for sync state after {max_trials} trials on {}",
        path.display()
    );
    Ok((last, ExchangeStatus::Warning))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn tmp_file(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn state_roundtrip_through_file() {
        let f = tempfile::NamedTempFile::new().unwrap();
        for state in [
            CouplingState::Init,
            CouplingState::ExternalReady,
            CouplingState::SelfReady,
            CouplingState::Stop,
        ] {
            write_state(f.path(), state).unwrap();
            assert_eq!(read_state(f.path()).unwrap(), state);
        }
    }

    #[test]
    fn float_formatted_codes_are_accepted() {
        let f = tmp_file("1.0000001\n");
        assert_eq!(read_state(f.path()).unwrap(), CouplingState::ExternalReady);
        let f = tmp_file("2.000000\n");
        assert_eq!(read_state(f.path()).unwrap(), CouplingState::SelfReady);
    }

    #[test]
    fn unknown_code_reads_as_sync_error() {
        let f = tmp_file("42\n");
        assert_eq!(read_state(f.path()).unwrap(), CouplingState::SyncError);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let f = tmp_file("ready\n");
        assert!(matches!(
            read_state(f.path()),
            Err(CouplingError::Parse { .. })
        ));
    }

    #[test]
    fn wait_succeeds_when_state_is_present() {
        let f = tmp_file("1\n");
        let (state, status) = wait_for_state(
            f.path(),
            CouplingState::ExternalReady,
            3,
            Duration::from_millis(1),
        )
        .unwrap();
        assert_eq!(state, CouplingState::ExternalReady);
        assert_eq!(status, ExchangeStatus::Ok);
    }

    #[test]
    fn wait_degrades_on_exhausted_budget() {
        let f = tmp_file("0\n");
        let (state, status) = wait_for_state(
            f.path(),
            CouplingState::ExternalReady,
            2,
            Duration::from_millis(1),
        )
        .unwrap();
        assert_eq!(state, CouplingState::Init);
        assert_eq!(status, ExchangeStatus::Warning);
    }

    #[test]
    fn wait_degrades_on_stop_request() {
        let f = tmp_file("3\n");
        let (state, status) = wait_for_state(
            f.path(),
            CouplingState::ExternalReady,
            10,
            Duration::from_millis(1),
        )
        .unwrap();
        assert_eq!(state, CouplingState::Stop);
        assert_eq!(status, ExchangeStatus::Warning);
    }
}
