use std::io::{BufRead, BufReader, Read};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use wait_timeout::ChildExt;

use crate::services::oracle::{
    CommandSpec, Oracle, OracleConfig, OracleError, OracleReport, OutputMarkers,
};

/// How long output is awaited after the run has exited or been killed.
const OUTPUT_GRACE: Duration = Duration::from_secs(1);

/// Oracle backed by real processes: the prepare steps, then a timed run.
#[derive(Debug)]
pub struct ProcessOracle {
    prepare: Vec<CommandSpec>,
    run: CommandSpec,
    workdir: PathBuf,
    timeout: Duration,
    markers: OutputMarkers,
}

impl ProcessOracle {
    /// Build from project configuration; `timeout_override` wins over the config.
    pub fn from_config(
        config: &OracleConfig,
        workdir: impl AsRef<Path>,
        timeout_override: Option<u64>,
    ) -> Result<Self, OracleError> {
        let seconds = timeout_override.unwrap_or(config.timeout_seconds);
        Ok(Self {
            prepare: config.prepare.clone(),
            run: config.run.clone(),
            workdir: workdir.as_ref().to_path_buf(),
            timeout: Duration::from_secs(seconds),
            markers: config.markers()?,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn command(&self, spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).current_dir(&self.workdir);
        cmd
    }

    fn run_step(&self, spec: &CommandSpec) -> Result<(), OracleError> {
        log::debug!("prepare: {}", spec.display());
        let output = self
            .command(spec)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| OracleError::Launch { program: spec.program.clone(), source })?;

        if !output.status.success() {
            return Err(OracleError::StepFailed {
                step: spec.display(),
                detail: format!("exited with {}", output.status),
            });
        }
        if let Some(marker) = &spec.success_marker {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            if !text.contains(marker.as_str()) {
                return Err(OracleError::StepFailed {
                    step: spec.display(),
                    detail: format!("output did not contain `{marker}`"),
                });
            }
        }
        Ok(())
    }

    fn run_timed(&self) -> Result<(String, bool), OracleError> {
        let spec = &self.run;
        log::debug!("run: {} (timeout {}s)", spec.display(), self.timeout.as_secs());
        let mut cmd = self.command(spec);
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        // Own process group, so a timeout also stops anything the run spawned.
        #[cfg(unix)]
        cmd.process_group(0);
        let mut child = cmd
            .spawn()
            .map_err(|source| OracleError::Launch { program: spec.program.clone(), source })?;

        let (tx, rx) = mpsc::channel();
        drain(child.stdout.take(), &tx);
        drain(child.stderr.take(), &tx);
        drop(tx);

        let timed_out = match wait_or_kill(&mut child, self.timeout) {
            Ok(timed_out) => timed_out,
            Err(source) => {
                terminate(&mut child);
                return Err(OracleError::Wait { program: spec.program.clone(), source });
            }
        };

        Ok((collect(&rx), timed_out))
    }
}

/// Returns `true` if the run had to be killed.
fn wait_or_kill(child: &mut Child, timeout: Duration) -> std::io::Result<bool> {
    match child.wait_timeout(timeout)? {
        Some(status) => {
            log::debug!("run exited with {status}");
            Ok(false)
        }
        None => {
            log::info!("run still alive after {}s; stopping it", timeout.as_secs());
            terminate(child);
            Ok(true)
        }
    }
}

/// Kill the run's process group (or just the child off unix) and reap it.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: plain syscall; the group was created by `process_group(0)` at spawn.
            let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
            if rc != 0 {
                log::debug!("killpg({pgid}) failed: {}", std::io::Error::last_os_error());
            }
        }
    }
    if let Err(err) = child.kill() {
        log::debug!("kill failed: {err}");
    }
    if let Err(err) = child.wait() {
        log::warn!("failed to reap run: {err}");
    }
}

/// Spawn a reader that forwards `pipe` line by line on `tx`.
fn drain<R: Read + Send + 'static>(pipe: Option<R>, tx: &Sender<String>) {
    let Some(pipe) = pipe else {
        return;
    };
    let tx = tx.clone();
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.send(String::from_utf8_lossy(&line).into_owned()).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

/// Gather output once the run is gone. A descendant that escaped the kill may
/// hold a pipe open; lines still pending after `OUTPUT_GRACE` are dropped.
fn collect(rx: &Receiver<String>) -> String {
    let deadline = Instant::now() + OUTPUT_GRACE;
    let mut output = String::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(line) => {
                output.push_str(&line);
                if !line.ends_with('\n') {
                    output.push('\n');
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "run output still open {}s after exit; ignoring the rest",
                    OUTPUT_GRACE.as_secs()
                );
                break;
            }
        }
    }
    output
}

impl Oracle for ProcessOracle {
    fn invoke(&mut self) -> Result<OracleReport, OracleError> {
        for step in &self.prepare {
            self.run_step(step)?;
        }
        let (output, timed_out) = self.run_timed()?;
        let report = self.markers.parse(&output, timed_out);
        log::info!(
            "oracle: {} (work completed: {})",
            report.result,
            report.work_completed.map(|n| n.to_string()).unwrap_or_else(|| "n/a".into())
        );
        Ok(report)
    }

    fn name(&self) -> &'static str {
        "process"
    }
}
