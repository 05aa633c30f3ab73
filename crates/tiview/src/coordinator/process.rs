//! Coordinator running as a child process.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::traits::Coordinator;
use crate::error::{Result, TiviewError};

use super::{CoordinatorOptions, ProcessSettings};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Launches the coordinator service as `<command> --host H --port P` and
/// considers it started once `H:P` accepts TCP connections.
pub struct ProcessCoordinator {
    settings: ProcessSettings,
    options: CoordinatorOptions,
    child: Option<Child>,
}

impl ProcessCoordinator {
    pub fn new(settings: ProcessSettings, options: CoordinatorOptions) -> Self {
        Self {
            settings,
            options,
            child: None,
        }
    }

    /// Whether the child process is currently held.
    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    async fn wait_until_ready(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.settings.startup_timeout;
        let addr = format!("{}:{}", self.settings.host, self.settings.port);

        loop {
            if let Some(child) = self.child.as_mut() {
                if let Some(status) = child.try_wait()? {
                    self.child = None;
                    return Err(TiviewError::Coordinator(format!(
                        "'{}' exited before accepting connections ({})",
                        self.settings.command, status
                    )));
                }
            }

            // An unreachable host would otherwise stall for the OS connect timeout.
            let remaining = deadline.saturating_duration_since(Instant::now());
            if let Ok(Ok(_)) = tokio::time::timeout(remaining, TcpStream::connect(&addr)).await {
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(TiviewError::Coordinator(format!(
                    "coordinator did not accept connections on {} within {}ms",
                    addr,
                    self.settings.startup_timeout.as_millis()
                )));
            }

            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    async fn stop_child(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if let Some(status) = child.try_wait()? {
            debug!("Coordinator process already exited ({})", status);
            return Ok(());
        }

        child.kill().await.map_err(|e| {
            TiviewError::Coordinator(format!("stopping '{}': {}", self.settings.command, e))
        })?;
        info!("Coordinator process stopped");
        Ok(())
    }
}

#[async_trait]
impl Coordinator for ProcessCoordinator {
    async fn start(&mut self) -> Result<()> {
        if self.child.is_some() {
            return Err(TiviewError::Coordinator("coordinator already started".to_string()));
        }

        let child = Command::new(&self.settings.command)
            .arg("--host")
            .arg(&self.settings.host)
            .arg("--port")
            .arg(self.settings.port.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TiviewError::Coordinator(format!(
                    "launching '{}': {}",
                    self.settings.command, e
                ))
            })?;

        debug!(
            "Spawned coordinator '{}' (pid {:?})",
            self.settings.command,
            child.id()
        );
        self.child = Some(child);

        if let Err(e) = self.wait_until_ready().await {
            if let Err(stop_err) = self.stop_child().await {
                warn!("Failed to stop coordinator after failed start: {}", stop_err);
            }
            return Err(e);
        }

        info!(
            "Coordinator listening on {}:{}",
            self.settings.host, self.settings.port
        );
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.stop_child().await
    }

    fn options(&self) -> &CoordinatorOptions {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(command: &str, port: u16) -> ProcessSettings {
        ProcessSettings {
            host: "127.0.0.1".to_string(),
            port,
            command: command.to_string(),
            startup_timeout: Duration::from_millis(1500),
        }
    }

    fn unused_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_missing_executable_fails_to_start() {
        let mut coordinator = ProcessCoordinator::new(
            settings("tiview-no-such-coordinator-binary", unused_port()),
            CoordinatorOptions::new(),
        );
        let err = coordinator.start().await.unwrap_err();
        assert!(matches!(err, TiviewError::Coordinator(_)));
        assert!(!coordinator.is_running());
        coordinator.close().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_exiting_early_fails_to_start() {
        let mut coordinator =
            ProcessCoordinator::new(settings("true", unused_port()), CoordinatorOptions::new());
        let err = coordinator.start().await.unwrap_err();
        assert!(err.to_string().contains("exited before accepting connections"));
        assert!(!coordinator.is_running());
    }

    #[cfg(unix)]
    fn sleeper_script(dir: &std::path::Path) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("coordinator.sh");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreachable_host_respects_startup_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let script = sleeper_script(dir.path());

        // Non-routable: connection attempts hang or fail, never succeed.
        let mut coordinator = ProcessCoordinator::new(
            ProcessSettings {
                host: "10.255.255.1".to_string(),
                port: 5800,
                command: script.to_str().unwrap().to_string(),
                startup_timeout: Duration::from_millis(300),
            },
            CoordinatorOptions::new(),
        );

        let started = std::time::Instant::now();
        let err = coordinator.start().await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(err.to_string().contains("did not accept connections"));
        assert!(!coordinator.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_and_idempotent_close() {
        // Something already listens on the port, so readiness is immediate.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let dir = tempfile::tempdir().unwrap();
        let script = sleeper_script(dir.path());

        let mut coordinator = ProcessCoordinator::new(
            settings(script.to_str().unwrap(), port),
            CoordinatorOptions::new(),
        );
        coordinator.start().await.unwrap();
        assert!(coordinator.is_running());
        assert!(coordinator.start().await.is_err());

        coordinator.close().await.unwrap();
        assert!(!coordinator.is_running());
        coordinator.close().await.unwrap();
    }
}
