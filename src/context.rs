// Per-invocation context shared by every resolution step

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::http::{HttpClient, Sleeper};
use crate::language::DescriptorRegistry;
use crate::platform::PlatformId;
use crate::process::ProcessManager;

/// Configuration, platform and shared clients for one run.
///
/// The platform is computed once; descriptor documents are parsed on first
/// use and kept for the context's lifetime.
#[derive(Debug)]
pub struct Context {
    config: Config,
    platform: PlatformId,
    descriptors: DescriptorRegistry,
    http: HttpClient,
    process: ProcessManager,
}

impl Context {
    pub fn new(config: Config) -> Result<Self> {
        Self::with_platform(config, PlatformId::current())
    }

    pub fn with_platform(config: Config, platform: PlatformId) -> Result<Self> {
        let http = HttpClient::new(&config.http)?;
        Ok(Self {
            descriptors: DescriptorRegistry::new(config.descriptors_dir.clone()),
            process: ProcessManager::new(),
            http,
            platform,
            config,
        })
    }

    /// Replace the sleeper used between HTTP retries
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.http = self.http.with_sleeper(sleeper);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn platform(&self) -> &PlatformId {
        &self.platform
    }

    pub fn descriptors(&self) -> &DescriptorRegistry {
        &self.descriptors
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn process(&self) -> &ProcessManager {
        &self.process
    }
}
