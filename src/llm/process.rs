use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::{Child, Command};

/// A proxy server child process owned by this service. The handle tracks
/// the pid it spawned, so stopping or restarting can never signal an
/// unrelated process, and `kill_on_drop` guarantees the child is
/// terminated, not abandoned, when the handle goes out of scope.
pub struct ProxyProcess {
    child: Child,
    pid: u32,
}

impl ProxyProcess {
    pub fn start(program: &str, args: &[String]) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start proxy process '{}'", program))?;

        let pid = child
            .id()
            .context("proxy process exited before a pid was assigned")?;
        tracing::info!("Started proxy process '{}' (pid {})", program, pid);

        Ok(Self { child, pid })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether the child is still running. A previously healthy proxy may
    /// have died between calls; callers re-check before every generation.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Terminates and reaps the child.
    pub async fn stop(&mut self) {
        match self.child.kill().await {
            Ok(()) => tracing::info!("Stopped proxy process (pid {})", self.pid),
            Err(e) => tracing::warn!("Failed to stop proxy process {}: {}", self.pid, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawned_process_is_alive_until_stopped() {
        let mut process = ProxyProcess::start("sleep", &["30".to_string()]).unwrap();
        assert!(process.is_alive());
        assert!(process.pid() > 0);

        process.stop().await;
        assert!(!process.is_alive());
    }

    #[tokio::test]
    async fn test_exited_process_is_not_alive() {
        let mut process = ProxyProcess::start("true", &[]).unwrap();
        // Give the child a moment to run to completion.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(!process.is_alive());
    }

    #[test]
    fn test_start_missing_program_errors() {
        let result = ProxyProcess::start("definitely-not-a-real-binary", &[]);
        assert!(result.is_err());
    }
}
