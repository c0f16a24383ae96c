//! Spawns, authenticates, and tears down one SSH tunnel child process.

use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::TunnelError;
use crate::prompter::{ExpectPrompter, PasswordPrompter, PromptOutcome, SshpassPrompter};
use crate::spec::{Auth, TunnelSpec};

const SSH_PROGRAM: &str = "ssh";
const STABILIZATION_WINDOW: Duration = Duration::from_secs(2);
const TERMINATE_WAIT: Duration = Duration::from_secs(5);
const TERMINATE_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Starting,
    Running,
    Failed,
    Stopped,
}

/// Owns the lifecycle of one SSH tunnel subprocess: spawn, authenticate,
/// liveness-check, and deterministic teardown.
pub struct TunnelManager {
    spec: TunnelSpec,
    child: Option<Child>,
    state: TunnelState,
}

impl TunnelManager {
    pub fn new(spec: TunnelSpec) -> Self {
        Self {
            spec,
            child: None,
            state: TunnelState::Starting,
        }
    }

    pub fn state(&self) -> TunnelState {
        self.state
    }

    /// Spawn the `ssh` child, authenticate if password auth is in use,
    /// wait out the stabilization window, then confirm liveness.
    pub fn establish(&mut self) -> Result<(), TunnelError> {
        let args = self.spec.command();
        info!(command = %format!("ssh {}", args.join(" ")), "establishing ssh tunnel");

        let outcome = match self.spec.auth.clone() {
            Auth::Key { .. } => {
                let child = Command::new(SSH_PROGRAM)
                    .args(&args)
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .spawn()
                    .map_err(TunnelError::Spawn)?;
                self.child = Some(child);
                PromptOutcome::Running
            }
            Auth::Password { secret } => self.authenticate(&args, &secret)?,
        };

        if outcome == PromptOutcome::Failed {
            self.cleanup_failed_child();
            self.state = TunnelState::Failed;
            return Err(TunnelError::AuthFailed);
        }

        std::thread::sleep(STABILIZATION_WINDOW);

        if self.is_alive() {
            self.state = TunnelState::Running;
            info!("ssh tunnel established successfully");
            Ok(())
        } else {
            self.state = TunnelState::Failed;
            Err(TunnelError::NotAlive)
        }
    }

    fn authenticate(&mut self, args: &[String], secret: &str) -> Result<PromptOutcome, TunnelError> {
        if SshpassPrompter::is_available() {
            debug!("authenticating via sshpass");
            let prompter = SshpassPrompter;
            let mut child = prompter.spawn(SSH_PROGRAM, args, secret)?;
            let outcome = prompter.drive(&mut child)?;
            self.child = Some(child);
            Ok(outcome)
        } else {
            warn!("sshpass not found on PATH; falling back to line-scanned password prompting");
            let prompter = ExpectPrompter;
            let mut child = prompter.spawn(SSH_PROGRAM, args, secret)?;
            let outcome = prompter.drive_with_secret(&mut child, secret)?;
            self.child = Some(child);
            Ok(outcome)
        }
    }

    fn cleanup_failed_child(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    /// Whether the child process is still running.
    pub fn is_alive(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Terminate the tunnel: a polite request to exit, then up to
    /// [`TERMINATE_WAIT`] for it to do so, then a forced kill. Idempotent.
    pub fn teardown(&mut self) {
        if self.state == TunnelState::Stopped {
            return;
        }
        if let Some(mut child) = self.child.take() {
            request_terminate(&child);

            let deadline = Instant::now() + TERMINATE_WAIT;
            loop {
                match child.try_wait() {
                    Ok(Some(_)) => break,
                    Ok(None) if Instant::now() >= deadline => {
                        warn!("ssh tunnel did not exit politely; force killing");
                        let _ = child.kill();
                        let _ = child.wait();
                        break;
                    }
                    Ok(None) => std::thread::sleep(TERMINATE_POLL),
                    Err(_) => break,
                }
            }
        }
        self.state = TunnelState::Stopped;
    }
}

impl Drop for TunnelManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(unix)]
fn request_terminate(child: &Child) {
    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn request_terminate(_child: &Child) {
    // No portable polite-terminate on this platform; teardown falls
    // straight through to the forced kill once TERMINATE_WAIT elapses.
}
