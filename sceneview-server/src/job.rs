use log::{info, warn};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Simulation job state, derived transiently from the liveness of the
/// process id recorded in the marker file. Nothing else is persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    NotRunning,
    Starting,
    Running,
    Finished,
    Error,
}

/// Why a start request was refused or failed.
#[derive(Debug)]
pub enum StartRefused {
    /// A simulation is running or has finished without being cleared.
    Conflict(JobState),
    Failed(String),
}

/// Controls the single simulation job through a marker file whose entire
/// content is the spawned process id.
pub struct JobController {
    marker_path: PathBuf,
    command: String,
    probe: fn(u32) -> bool,
}

impl JobController {
    pub fn new(marker_path: PathBuf, command: String) -> Self {
        Self {
            marker_path,
            command,
            probe: pid_alive,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_probe(marker_path: PathBuf, command: String, probe: fn(u32) -> bool) -> Self {
        Self {
            marker_path,
            command,
            probe,
        }
    }

    /// Reads the recorded process id. A missing marker is `None`; a
    /// marker that does not parse as a pid is deleted on the spot and
    /// treated as absent. Only a genuine I/O failure is an error.
    fn read_marker(&self) -> Result<Option<u32>, String> {
        let raw = match fs::read_to_string(&self.marker_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("Failed to read marker: {}", e)),
        };
        match raw.trim().parse::<u32>() {
            Ok(pid) => Ok(Some(pid)),
            Err(_) => {
                warn!(
                    "Removing corrupt simulation marker: {}",
                    self.marker_path.display()
                );
                let _ = fs::remove_file(&self.marker_path);
                Ok(None)
            }
        }
    }

    pub fn status(&self) -> JobState {
        match self.read_marker() {
            Ok(None) => JobState::NotRunning,
            Ok(Some(pid)) if (self.probe)(pid) => JobState::Running,
            Ok(Some(_)) => JobState::Finished,
            Err(e) => {
                warn!("{}", e);
                JobState::Error
            }
        }
    }

    /// State plus a human-readable line for the status endpoint.
    pub fn describe(&self) -> (JobState, String) {
        let state = self.status();
        let message = match state {
            JobState::NotRunning => "No simulation has been started.".to_string(),
            JobState::Starting => "Simulation is starting.".to_string(),
            JobState::Running => match self.read_marker() {
                Ok(Some(pid)) => format!("Simulation is running (pid {}).", pid),
                _ => "Simulation is running.".to_string(),
            },
            JobState::Finished => {
                "Simulation finished; clear it before starting a new one.".to_string()
            }
            JobState::Error => "Simulation state could not be determined.".to_string(),
        };
        (state, message)
    }

    /// Spawns the simulation command and records its pid. Refused while a
    /// previous run is alive or its results have not been cleared.
    pub fn start(&self) -> Result<u32, StartRefused> {
        match self.status() {
            state @ (JobState::Running | JobState::Finished) => {
                Err(StartRefused::Conflict(state))
            }
            JobState::Error => Err(StartRefused::Failed(
                "Simulation marker could not be read.".to_string(),
            )),
            _ => {
                let pid = spawn_detached(&self.command, &[])
                    .map_err(StartRefused::Failed)?;
                fs::write(&self.marker_path, pid.to_string())
                    .map_err(|e| StartRefused::Failed(format!("Failed to write marker: {}", e)))?;
                info!("Simulation started (pid {})", pid);
                Ok(pid)
            }
        }
    }

    /// Deletes the marker. Refused while the recorded process is alive;
    /// idempotent when nothing was ever started.
    pub fn clear(&self) -> Result<(), String> {
        if self.status() == JobState::Running {
            return Err("Simulation is still running.".to_string());
        }
        if self.marker_path.exists() {
            fs::remove_file(&self.marker_path)
                .map_err(|e| format!("Failed to remove marker: {}", e))?;
            info!("Simulation marker cleared");
        }
        Ok(())
    }
}

/// Spawns a command line fully detached: no inherited stdio, no handle
/// kept. Used for the simulation job and the generation triggers alike.
pub fn spawn_detached(command: &str, extra_args: &[String]) -> Result<u32, String> {
    let mut parts = command.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| "Empty command configured.".to_string())?;
    let child = Command::new(program)
        .args(parts)
        .args(extra_args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| format!("Failed to spawn '{}': {}", program, e))?;
    Ok(child.id())
}

fn pid_alive(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), true);
    system.process(Pid::from_u32(pid)).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn alive(_: u32) -> bool {
        true
    }

    fn dead(_: u32) -> bool {
        false
    }

    fn controller(dir: &TempDir, probe: fn(u32) -> bool) -> JobController {
        JobController::with_probe(dir.path().join("simulation.pid"), "true".to_string(), probe)
    }

    #[test]
    fn starts_when_no_marker_exists() {
        let dir = TempDir::new().unwrap();
        let job = controller(&dir, alive);
        assert_eq!(job.status(), JobState::NotRunning);

        let pid = job.start().unwrap();
        let recorded = fs::read_to_string(dir.path().join("simulation.pid")).unwrap();
        assert_eq!(recorded.trim().parse::<u32>().unwrap(), pid);
        assert_eq!(job.status(), JobState::Running);
    }

    #[test]
    fn second_start_conflicts_while_running() {
        let dir = TempDir::new().unwrap();
        let job = controller(&dir, alive);
        job.start().unwrap();

        match job.start() {
            Err(StartRefused::Conflict(JobState::Running)) => {}
            other => panic!("expected running conflict, got {:?}", other.err()),
        }
    }

    #[test]
    fn second_start_conflicts_when_finished() {
        let dir = TempDir::new().unwrap();
        let job = controller(&dir, dead);
        fs::write(dir.path().join("simulation.pid"), "12345").unwrap();
        assert_eq!(job.status(), JobState::Finished);

        match job.start() {
            Err(StartRefused::Conflict(JobState::Finished)) => {}
            other => panic!("expected finished conflict, got {:?}", other.err()),
        }
    }

    #[test]
    fn clear_refused_while_running() {
        let dir = TempDir::new().unwrap();
        let job = controller(&dir, alive);
        job.start().unwrap();

        assert!(job.clear().is_err());
        assert_eq!(job.status(), JobState::Running);
    }

    #[test]
    fn clear_removes_finished_marker_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let job = controller(&dir, dead);
        fs::write(dir.path().join("simulation.pid"), "12345").unwrap();

        job.clear().unwrap();
        assert_eq!(job.status(), JobState::NotRunning);
        assert!(!dir.path().join("simulation.pid").exists());

        // Clearing with no marker present succeeds as well.
        job.clear().unwrap();
    }

    #[test]
    fn corrupt_marker_is_deleted_and_treated_as_absent() {
        let dir = TempDir::new().unwrap();
        let job = controller(&dir, alive);
        fs::write(dir.path().join("simulation.pid"), "not-a-pid").unwrap();

        assert_eq!(job.status(), JobState::NotRunning);
        assert!(!dir.path().join("simulation.pid").exists());
    }

    #[test]
    fn finished_state_allows_restart_after_clear() {
        let dir = TempDir::new().unwrap();
        let job = controller(&dir, dead);
        fs::write(dir.path().join("simulation.pid"), "12345").unwrap();

        job.clear().unwrap();
        job.start().unwrap();
        assert!(dir.path().join("simulation.pid").exists());
    }

    #[test]
    fn spawn_detached_refuses_empty_command() {
        assert!(spawn_detached("", &[]).is_err());
        assert!(spawn_detached("   ", &[]).is_err());
    }
}
