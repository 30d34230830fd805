use log::{debug, info, warn};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdout, Command};

use crate::config::Config;

#[derive(Error, Debug)]
pub enum DecoderError {
    #[error("Unable to start {path}: {source}")]
    Spawn { path: String, source: std::io::Error },
    #[error("Decoder stdout is not available")]
    NoStdout,
    #[error("Decoder output ended, rtlamr has exited")]
    Exited,
    #[error("Reading decoder output failed: {0}")]
    Output(#[from] std::io::Error),
}

/// Command line for rtlamr, ids are only filtered when specific protocols are watched
pub fn build_args(config: &Config) -> Vec<String> {
    let mut args = vec![
        format!("-msgtype={}", config.rtlamr.protocols.trim()),
        "-format=json".to_string(),
    ];

    if !config.rtlamr.watches_all() {
        args.push(format!("-filterid={}", config.meter_ids().join(",")));
    }

    args.extend(config.rtlamr.extra_args.iter().cloned());
    return args;
}

const STOP_GRACE: Duration = Duration::from_secs(1);

pub struct RtlamrProcess {
    child: Child,
}

impl RtlamrProcess {
    pub fn start(config: &Config) -> Result<(Self, BufReader<ChildStdout>), DecoderError> {
        let args = build_args(config);
        info!("Starting rtlamr: {} {}", config.rtlamr.path, args.join(" "));

        let mut child = Command::new(&config.rtlamr.path)
            .args(&args)
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DecoderError::Spawn { path: config.rtlamr.path.clone(), source })?;

        let stdout = child.stdout.take().ok_or(DecoderError::NoStdout)?;
        return Ok((RtlamrProcess { child }, BufReader::new(stdout)));
    }

    /// Asks rtlamr to terminate and kills it when it is still around after a second
    pub async fn stop(&mut self) {
        info!("Shutting down rtlamr");
        self.terminate();

        match tokio::time::timeout(STOP_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => debug!("rtlamr exited with {status}"),
            Ok(Err(e)) => warn!("Unable to wait for rtlamr: {e}"),
            Err(_) => {
                warn!("rtlamr did not exit in time, killing it");
                if let Err(e) = self.child.kill().await {
                    warn!("Unable to stop rtlamr: {e}");
                }
            }
        }
    }

    #[cfg(unix)]
    fn terminate(&self) {
        /* No pid means the child has already been reaped */
        if let Some(pid) = self.child.id() {
            if unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) } != 0 {
                warn!("Unable to send SIGTERM to rtlamr: {}", std::io::Error::last_os_error());
            }
        }
    }

    #[cfg(not(unix))]
    fn terminate(&self) {}
}
