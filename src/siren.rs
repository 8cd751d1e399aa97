//! Local siren actuator
//!
//! Best-effort audible alarm on the monitor box itself. Failures are
//! logged and swallowed; a missing audio stack must never stall the
//! pipeline. Not subject to the alert cooldown.

use std::time::Duration;
use tokio::process::Command;

const PULSES: u32 = 3;
const PULSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Local audible alarm
pub struct Siren {
    enabled: bool,
}

impl Siren {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Fire the alarm: three pulses, each a short-lived child process.
    /// Never returns an error.
    pub async fn sound(&self) {
        if !self.enabled {
            tracing::debug!("Siren disabled, skipping");
            return;
        }

        for pulse in 0..PULSES {
            if let Err(e) = run_pulse().await {
                // The remaining pulses would fail the same way
                tracing::warn!(pulse = pulse, error = %e, "Siren pulse failed");
                return;
            }
        }
    }
}

fn pulse_command() -> Command {
    #[cfg(target_os = "macos")]
    {
        let mut cmd = Command::new("say");
        cmd.arg("Warning! Safety violation detected!");
        cmd
    }
    #[cfg(target_os = "windows")]
    {
        let mut cmd = Command::new("powershell");
        cmd.args(["-NoProfile", "-Command", "[console]::beep(1600,1000)"]);
        cmd
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        let mut cmd = Command::new("play");
        cmd.args(["-nq", "-t", "alsa", "synth", "1", "sine", "1600"]);
        cmd
    }
}

async fn run_pulse() -> std::io::Result<()> {
    use std::process::Stdio;

    let child = pulse_command()
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    match tokio::time::timeout(PULSE_TIMEOUT, child.wait_with_output()).await {
        Ok(Ok(output)) if output.status.success() => Ok(()),
        Ok(Ok(output)) => Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("siren command exited with {}", output.status),
        )),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "siren command timed out",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_siren_is_noop() {
        let siren = Siren::new(false);
        assert!(!siren.is_enabled());
        // Must return immediately without touching any audio command
        siren.sound().await;
    }
}
