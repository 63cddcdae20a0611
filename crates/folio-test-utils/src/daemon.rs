//! Daemon fixture serving over real TCP.
//!
//! [`TestDaemon`] binds an ephemeral port, runs the full [`Daemon`] on it,
//! and waits until `/healthz` answers before returning.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use folio_config::AppConfig;
use folio_core::{Daemon, DaemonError};

/// A running daemon with an owned temp directory.
///
/// The temp directory is deleted when this value is dropped, even on panic.
pub struct TestDaemon {
    pub daemon: Arc<Daemon>,
    pub base_url: String,
    handle: JoinHandle<Result<(), DaemonError>>,
    temp_dir: TempDir,
}

impl TestDaemon {
    /// Start a daemon with `config`. The configured listen port is ignored.
    pub async fn start(config: AppConfig) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        Self::start_in(config, temp_dir).await
    }

    /// Start a daemon from a TOML string. `{tmp}` is replaced with the
    /// fixture's temp directory so store paths can live there.
    pub async fn with_toml(toml_content: &str) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let toml_content = toml_content.replace("{tmp}", &temp_dir.path().display().to_string());
        let config_path = temp_dir.path().join("folio.toml");
        tokio::fs::write(&config_path, toml_content)
            .await
            .expect("failed to write test config");

        let config = AppConfig::load(&config_path)
            .await
            .expect("failed to parse test config");
        Self::start_in(config, temp_dir).await
    }

    async fn start_in(config: AppConfig, temp_dir: TempDir) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        let daemon = Arc::new(Daemon::new(config).expect("daemon builds"));

        let runner = daemon.clone();
        let handle = tokio::spawn(async move { runner.run_on(listener).await });

        let base_url = format!("http://{addr}");
        wait_until_healthy(&base_url).await;

        Self {
            daemon,
            base_url,
            handle,
            temp_dir,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Absolute URL for `path` on this daemon.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Signal shutdown and wait for the daemon to return.
    pub async fn stop(self) -> Result<(), DaemonError> {
        self.daemon.shutdown();
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("daemon stops within 10s")
            .expect("daemon task does not panic")
    }
}

async fn wait_until_healthy(base_url: &str) {
    let client = reqwest::Client::new();
    for _ in 0..50 {
        if let Ok(resp) = client.get(format!("{base_url}/healthz")).send().await
            && resp.status().is_success()
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("daemon at {base_url} never became healthy");
}
