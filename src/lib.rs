// devboot - development environment bootstrapper library
// Language-version resolution and provider selection, plus the collaborators
// it needs: HTTP retrieval, archives, git checkouts and subprocesses.

pub mod archive;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod git;
pub mod http;
pub mod language;
pub mod logging;
pub mod platform;
pub mod process;

// Re-export main types for easier access
pub use config::{Config, HttpSettings};
pub use context::Context;
pub use error::{
    exit_codes, ConfigError, DescriptorError, DevbootError, ErrorKind, HttpError, ProcessError,
    ResolutionError, Result, StorageError,
};
pub use http::{HttpClient, RetryPolicy};
pub use language::{
    Definition, DescriptorRegistry, Feature, FeatureSet, InstallOutcome, Installation, Language,
    Provider, ProviderRegistry, Record, RecordStore, Resolver, UpdateOutcome,
};
pub use logging::{ColorConfig, LogConfig, LogFormat};
pub use platform::PlatformId;
pub use process::{ProcessConfig, ProcessManager, ProcessResult};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

// Build information (set by build script)
pub const BUILD_DATE: &str = env!("BUILD_DATE");
pub const GIT_COMMIT: &str = env!("GIT_COMMIT");
pub const RUST_VERSION: &str = env!("RUST_VERSION");

/// Get formatted version string with build information
pub fn version_info() -> String {
    format!("{NAME} {VERSION} (commit: {GIT_COMMIT}, built: {BUILD_DATE}, rustc: {RUST_VERSION})")
}
