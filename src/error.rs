// Error handling framework for devboot
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DevbootError>;

/// Coarse failure category, used for exit codes and by callers that branch
/// on what went wrong rather than where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown descriptor, provider, feature or language name
    NotFound,
    /// Malformed or version-mismatched persisted document
    InvalidData,
    /// Mutex feature conflict, or no working provider left
    InvalidState,
    /// No provider version candidate matched
    Lookup,
    /// Everything else (IO, network, subprocess)
    General,
}

/// Main error type for devboot
#[derive(Debug, Error)]
pub enum DevbootError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<ConfigError>),

    #[error("Descriptor error: {0}")]
    Descriptor(#[from] Box<DescriptorError>),

    #[error("Resolution failed: {0}")]
    Resolution(#[from] Box<ResolutionError>),

    #[error("Record storage failed: {0}")]
    Storage(#[from] Box<StorageError>),

    #[error("HTTP retrieval failed: {0}")]
    Http(#[from] Box<HttpError>),

    #[error("Process execution failed: {0}")]
    Process(#[from] Box<ProcessError>),

    #[error("Git operation failed: {0}")]
    Git(#[from] Box<GitError>),

    #[error("Archive extraction failed: {0}")]
    Archive(#[from] Box<ArchiveError>),

    #[error("CLI argument error: {0}")]
    Cli(#[from] Box<CliError>),

    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Project configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    NotFound {
        path: PathBuf,
        suggestion: Option<String>,
    },

    #[error("Invalid TOML syntax: {message}")]
    InvalidToml {
        message: String,
        file_path: Option<PathBuf>,
    },

    #[error("Invalid configuration value for {field}: {value} (expected {expected})")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Cannot determine {what} directory")]
    DirectoryUnavailable {
        what: String,
        suggestion: Option<String>,
    },
}

/// Descriptor document and name lookup errors
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("Unknown language: {name}")]
    UnknownLanguage {
        name: String,
        available: Vec<String>,
    },

    #[error("Descriptor document for {language} not found: {path}")]
    DocumentNotFound { language: String, path: PathBuf },

    #[error("Descriptor not found: {name} ({language})")]
    DefinitionNotFound {
        language: String,
        name: String,
        available: Vec<String>,
    },

    #[error("Unsupported format-version {found} in {path} (expected {expected})")]
    UnsupportedFormatVersion {
        path: PathBuf,
        found: i64,
        expected: u32,
    },

    #[error("Invalid descriptor document {path}: {message}")]
    InvalidDocument { path: PathBuf, message: String },

    #[error("Descriptor {name} has an invalid base version {base_version}: {error}")]
    InvalidBaseVersion {
        name: String,
        base_version: String,
        error: String,
    },

    #[error("Unknown feature: {name} ({language})")]
    UnknownFeature {
        language: String,
        name: String,
        available: Vec<String>,
    },

    #[error("Unknown provider: {name} ({language})")]
    UnknownProvider {
        language: String,
        name: String,
        available: Vec<String>,
    },
}

/// A single provider's failure, kept for aggregate reporting
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    pub provider: String,
    pub message: String,
}

/// Provider resolution, feature and installation errors
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Features {first} and {second} are mutually exclusive (labels: {labels:?})")]
    FeatureConflict {
        first: String,
        second: String,
        labels: Vec<String>,
    },

    #[error("No provider supports {descriptor} on {platform}")]
    NoSupportableProvider {
        descriptor: String,
        platform: String,
    },

    #[error("All providers failed to install {descriptor}")]
    AllProvidersFailed {
        descriptor: String,
        failures: Vec<ProviderFailure>,
    },

    #[error("Provider {provider} found no {implementation} version matching {base_version}")]
    NoCandidateVersion {
        provider: String,
        implementation: String,
        base_version: String,
    },

    #[error("Provider {provider} failed to install: {message}")]
    InstallationFailed { provider: String, message: String },

    #[error("Invalid version {version}: {error}")]
    InvalidVersion { version: String, error: String },

    #[error("{descriptor} is not installed for {platform}")]
    NotInstalled {
        descriptor: String,
        platform: String,
    },
}

/// Record store errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Unsupported record format-version {found} in {path} (expected {expected})")]
    UnsupportedFormatVersion {
        path: PathBuf,
        found: i64,
        expected: u32,
    },

    #[error("Invalid record document {path}: {message}")]
    InvalidDocument { path: PathBuf, message: String },

    #[error("Failed to write record document {path}: {error}")]
    WriteFailed { path: PathBuf, error: String },

    #[error("Failed to lock {path}: {error}")]
    LockFailed { path: PathBuf, error: String },

    #[error("Directory creation failed: {path}")]
    DirectoryFailed { path: PathBuf, error: String },
}

/// HTTP retrieval errors
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP {status} from {url}")]
    Status {
        url: String,
        status: u16,
        retry_after: Option<u64>,
    },

    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("No checksum published for {file}")]
    MissingChecksum { file: String },

    #[error("Invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    #[error("Failed to write download to {path}: {message}")]
    Write { path: String, message: String },
}

/// Process execution errors
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Process execution failed: {command}")]
    ExecutionFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Process timeout after {duration:?}: {command}")]
    Timeout {
        command: String,
        duration: std::time::Duration,
    },

    #[error("Command not found: {command}")]
    CommandNotFound {
        command: String,
        suggestion: Option<String>,
    },

    #[error("Process spawn failed: {command}")]
    SpawnFailed { command: String, error: String },

    #[error("Output capture failed: {message}")]
    OutputCaptureFailed { message: String, command: String },
}

/// Git operation errors
#[derive(Debug, Error)]
pub enum GitError {
    #[error("Clone of {url} into {path} failed: {message}")]
    CloneFailed {
        url: String,
        path: PathBuf,
        message: String,
    },

    #[error("Update of {path} failed: {message}")]
    UpdateFailed { path: PathBuf, message: String },

    #[error("Git command failed: {operation}: {message}")]
    CommandFailed { operation: String, message: String },
}

/// Archive extraction errors
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Refusing to unpack entry outside destination: {entry}")]
    UnsafeEntry { archive: PathBuf, entry: String },

    #[error("Failed to unpack {archive}: {message}")]
    Unpack { archive: PathBuf, message: String },

    #[error("Unexpected layout in {archive}: missing {expected}")]
    UnexpectedLayout { archive: PathBuf, expected: String },
}

/// CLI argument errors
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Invalid argument: {argument}")]
    InvalidArgument {
        argument: String,
        message: String,
        suggestion: Option<String>,
    },

    #[error("Conflicting arguments: {first} and {second}")]
    ConflictingArguments {
        first: String,
        second: String,
        suggestion: String,
    },

    #[error("Runtime error: {message}")]
    RuntimeError { message: String },
}

/// Format errors with colors and context
pub struct ErrorFormatter {
    use_colors: bool,
}

impl ErrorFormatter {
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    /// Format an error with context and colors
    pub fn format_error(&self, error: &DevbootError) -> String {
        use tracing::error;

        let error_type = match error {
            DevbootError::Config(_) => "config",
            DevbootError::Descriptor(_) => "descriptor",
            DevbootError::Resolution(_) => "resolution",
            DevbootError::Storage(_) => "storage",
            DevbootError::Http(_) => "http",
            DevbootError::Process(_) => "process",
            DevbootError::Git(_) => "git",
            DevbootError::Archive(_) => "archive",
            DevbootError::Cli(_) => "cli",
            DevbootError::Io(_) => "io",
        };
        error!(error_type, kind = ?error.kind(), error = %error, "Operation failed");

        let mut output = String::new();

        if self.use_colors {
            output.push_str("\x1b[31m");
        }
        output.push_str("Error: ");
        if self.use_colors {
            output.push_str("\x1b[0m");
        }

        output.push_str(&error.to_string());

        match error {
            DevbootError::Config(config_err) => {
                self.add_config_context(&mut output, config_err.as_ref());
            }
            DevbootError::Descriptor(descriptor_err) => {
                self.add_descriptor_context(&mut output, descriptor_err.as_ref());
            }
            DevbootError::Resolution(resolution_err) => {
                self.add_resolution_context(&mut output, resolution_err.as_ref());
            }
            DevbootError::Process(process_err) => {
                self.add_process_context(&mut output, process_err.as_ref());
            }
            DevbootError::Cli(cli_err) => {
                self.add_cli_context(&mut output, cli_err.as_ref());
            }
            _ => {}
        }

        output
    }

    fn add_config_context(&self, output: &mut String, error: &ConfigError) {
        match error {
            ConfigError::NotFound {
                suggestion: Some(suggestion),
                ..
            }
            | ConfigError::DirectoryUnavailable {
                suggestion: Some(suggestion),
                ..
            } => {
                output.push_str(&format!("\n  Help: {suggestion}"));
            }
            ConfigError::InvalidToml {
                file_path: Some(path),
                ..
            } => {
                output.push_str(&format!("\n  --> {}", path.display()));
            }
            _ => {}
        }
    }

    fn add_descriptor_context(&self, output: &mut String, error: &DescriptorError) {
        match error {
            DescriptorError::DefinitionNotFound { available, .. }
            | DescriptorError::UnknownFeature { available, .. }
            | DescriptorError::UnknownProvider { available, .. }
            | DescriptorError::UnknownLanguage { available, .. }
                if !available.is_empty() =>
            {
                output.push_str(&format!("\n  Available: {}", available.join(", ")));
            }
            DescriptorError::DocumentNotFound { language, .. } => {
                output.push_str(&format!(
                    "\n  Help: Create the {language} descriptor document or point [paths] descriptors at it"
                ));
            }
            _ => {}
        }
    }

    fn add_resolution_context(&self, output: &mut String, error: &ResolutionError) {
        match error {
            ResolutionError::AllProvidersFailed { failures, .. } => {
                for (i, failure) in failures.iter().enumerate() {
                    output.push_str(&format!(
                        "\n    {}: {}: {}",
                        i + 1,
                        failure.provider,
                        failure.message
                    ));
                }
            }
            ResolutionError::NotInstalled { descriptor, .. } => {
                output.push_str(&format!("\n  Help: Run `devboot install {descriptor}` first"));
            }
            _ => {}
        }
    }

    fn add_process_context(&self, output: &mut String, error: &ProcessError) {
        match error {
            ProcessError::CommandNotFound {
                suggestion: Some(suggestion),
                ..
            } => {
                output.push_str(&format!("\n  Help: {suggestion}"));
            }
            ProcessError::ExecutionFailed { stderr, .. } if !stderr.is_empty() => {
                output.push_str(&format!("\n  Process error: {}", stderr.trim_end()));
            }
            _ => {}
        }
    }

    fn add_cli_context(&self, output: &mut String, error: &CliError) {
        match error {
            CliError::InvalidArgument {
                suggestion: Some(suggestion),
                ..
            } => {
                output.push_str(&format!("\n  Help: {suggestion}"));
            }
            CliError::ConflictingArguments { suggestion, .. } => {
                output.push_str(&format!("\n  Help: {suggestion}"));
            }
            _ => {}
        }
    }
}

/// Process exit codes, one per failure category
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const CLI_ERROR: i32 = 2;
    pub const INVALID_DATA: i32 = 3;
    pub const INVALID_STATE: i32 = 4;
}

impl DevbootError {
    /// Failure category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DevbootError::Config(config_err) => match config_err.as_ref() {
                ConfigError::InvalidToml { .. } | ConfigError::InvalidValue { .. } => {
                    ErrorKind::InvalidData
                }
                ConfigError::NotFound { .. } => ErrorKind::NotFound,
                ConfigError::DirectoryUnavailable { .. } => ErrorKind::General,
            },
            DevbootError::Descriptor(descriptor_err) => match descriptor_err.as_ref() {
                DescriptorError::UnknownLanguage { .. }
                | DescriptorError::DocumentNotFound { .. }
                | DescriptorError::DefinitionNotFound { .. }
                | DescriptorError::UnknownFeature { .. }
                | DescriptorError::UnknownProvider { .. } => ErrorKind::NotFound,
                DescriptorError::UnsupportedFormatVersion { .. }
                | DescriptorError::InvalidDocument { .. }
                | DescriptorError::InvalidBaseVersion { .. } => ErrorKind::InvalidData,
            },
            DevbootError::Resolution(resolution_err) => match resolution_err.as_ref() {
                ResolutionError::FeatureConflict { .. }
                | ResolutionError::NoSupportableProvider { .. }
                | ResolutionError::AllProvidersFailed { .. } => ErrorKind::InvalidState,
                ResolutionError::NoCandidateVersion { .. } => ErrorKind::Lookup,
                ResolutionError::InvalidVersion { .. } => ErrorKind::InvalidData,
                ResolutionError::InstallationFailed { .. } => ErrorKind::General,
                ResolutionError::NotInstalled { .. } => ErrorKind::NotFound,
            },
            DevbootError::Storage(storage_err) => match storage_err.as_ref() {
                StorageError::UnsupportedFormatVersion { .. }
                | StorageError::InvalidDocument { .. } => ErrorKind::InvalidData,
                _ => ErrorKind::General,
            },
            DevbootError::Http(http_err) => match http_err.as_ref() {
                HttpError::ChecksumMismatch { .. } | HttpError::InvalidResponse { .. } => {
                    ErrorKind::InvalidData
                }
                HttpError::MissingChecksum { .. } => ErrorKind::Lookup,
                _ => ErrorKind::General,
            },
            DevbootError::Archive(archive_err) => match archive_err.as_ref() {
                ArchiveError::UnsafeEntry { .. } | ArchiveError::UnexpectedLayout { .. } => {
                    ErrorKind::InvalidData
                }
                ArchiveError::Unpack { .. } => ErrorKind::General,
            },
            DevbootError::Process(_)
            | DevbootError::Git(_)
            | DevbootError::Cli(_)
            | DevbootError::Io(_) => ErrorKind::General,
        }
    }

    /// Get the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        if let DevbootError::Cli(_) = self {
            return exit_codes::CLI_ERROR;
        }
        match self.kind() {
            ErrorKind::InvalidData => exit_codes::INVALID_DATA,
            ErrorKind::InvalidState => exit_codes::INVALID_STATE,
            ErrorKind::NotFound | ErrorKind::Lookup | ErrorKind::General => {
                exit_codes::GENERAL_ERROR
            }
        }
    }

    /// Create a user-friendly error message with context
    pub fn user_message(&self, use_colors: bool) -> String {
        let formatter = ErrorFormatter::new(use_colors);
        formatter.format_error(self)
    }
}

// Conversion from toml::de::Error to ConfigError
impl From<toml::de::Error> for Box<ConfigError> {
    fn from(error: toml::de::Error) -> Self {
        Box::new(ConfigError::InvalidToml {
            message: error.message().to_string(),
            file_path: None,
        })
    }
}

impl From<git2::Error> for Box<GitError> {
    fn from(error: git2::Error) -> Self {
        Box::new(GitError::CommandFailed {
            operation: "git2 operation".to_string(),
            message: error.message().to_string(),
        })
    }
}

impl From<git2::Error> for DevbootError {
    fn from(error: git2::Error) -> Self {
        DevbootError::Git(Box::<GitError>::from(error))
    }
}

impl From<reqwest::Error> for Box<HttpError> {
    fn from(error: reqwest::Error) -> Self {
        let url = error.url().map(|u| u.to_string()).unwrap_or_default();
        match error.status() {
            Some(status) => Box::new(HttpError::Status {
                url,
                status: status.as_u16(),
                retry_after: None,
            }),
            None => Box::new(HttpError::Transport {
                url,
                message: error.to_string(),
            }),
        }
    }
}

impl From<reqwest::Error> for DevbootError {
    fn from(error: reqwest::Error) -> Self {
        DevbootError::Http(Box::<HttpError>::from(error))
    }
}
