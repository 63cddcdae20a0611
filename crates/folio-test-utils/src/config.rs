//! Configuration builders for tests.

use std::path::Path;

use folio_config::AppConfig;

/// Fluent builder for [`AppConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .max_requests_per_window(2)
///     .allowed_origins(&["https://folio.dev"])
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn listen_addr(mut self, addr: &str) -> Self {
        self.config.server.listen_addr = addr.to_string();
        self
    }

    pub fn listen_port(mut self, port: u16) -> Self {
        self.config.server.listen_port = port;
        self
    }

    pub fn development(mut self) -> Self {
        self.config.server.environment = "development".to_string();
        self
    }

    pub fn allowed_origins(mut self, origins: &[&str]) -> Self {
        self.config.server.allowed_origins = origins.iter().map(|o| o.to_string()).collect();
        self
    }

    pub fn max_body_bytes(mut self, bytes: usize) -> Self {
        self.config.server.max_body_bytes = bytes;
        self
    }

    pub fn max_requests_per_window(mut self, n: u32) -> Self {
        self.config.guard.max_requests_per_window = n;
        self
    }

    pub fn max_concurrent_requests(mut self, n: usize) -> Self {
        self.config.guard.max_concurrent_requests = n;
        self
    }

    pub fn suspicious_threshold(mut self, n: u32) -> Self {
        self.config.guard.suspicious_threshold = n;
        self
    }

    pub fn global_max_requests(mut self, n: u64) -> Self {
        self.config.guard.global_max_requests = n;
        self
    }

    pub fn sweep_interval_secs(mut self, secs: u64) -> Self {
        self.config.guard.sweep_interval_secs = secs;
        self
    }

    pub fn webhook_url(mut self, url: &str) -> Self {
        self.config.notify.webhook_url = Some(url.to_string());
        self
    }

    pub fn store_path(mut self, path: &Path) -> Self {
        self.config.notify.store_path = Some(path.display().to_string());
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
