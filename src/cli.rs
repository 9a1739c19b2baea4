// CLI interface for devboot using clap
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use serde::Serialize;
use std::path::PathBuf;

use crate::commands::{self, venv::VenvConfig, Session};
use crate::error::{exit_codes, CliError, DevbootError, Result};
use crate::language::Language;
use crate::platform::PlatformId;

#[derive(Parser)]
#[command(
    name = "devboot",
    about = "devboot - development environment bootstrapper",
    version = crate::VERSION,
    long_about = "devboot resolves the language runtimes a project declares, installs them with the first provider that supports the current platform, and records the exact versions it picked."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Project directory
    #[arg(short = 'C', long, global = true, default_value = ".")]
    pub project: PathBuf,

    /// Configuration file path (default: devboot.toml in the project)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Language whose descriptors to use
    #[arg(short, long, global = true, default_value = "python")]
    pub language: String,

    /// Control color output (auto, always, never)
    #[arg(long, global = true, value_name = "WHEN", value_parser = ["auto", "always", "never"])]
    pub color: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_name = "FORMAT", default_value = "pretty", value_parser = ["pretty", "json", "compact"])]
    pub log_format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the descriptors of the project
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a descriptor with its providers, record and installation
    Show {
        name: String,

        /// Platform identifier to evaluate, e.g. linux-64--x86_64
        #[arg(long)]
        platform: Option<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the providers able to serve a descriptor
    Providers {
        name: String,

        /// Platform identifier to evaluate, e.g. darwin-64--aarch64
        #[arg(long)]
        platform: Option<String>,
    },

    /// Print the recorded version, discovering it on first use
    Record { name: String },

    /// Install the recorded version of a descriptor
    Install { name: String },

    /// Look for a newer version and update the record
    Update {
        name: String,

        /// Install the new version right away
        #[arg(long)]
        install: bool,
    },

    /// Print the interpreter of an installed descriptor
    Path {
        name: String,

        /// Print the installation directory instead
        #[arg(long)]
        location: bool,
    },

    /// Print the platform identifier
    Platform {
        /// Print the ABI identifier of an interpreter instead
        #[arg(long)]
        abi: bool,

        /// Interpreter to inspect (default: python3 on PATH)
        #[arg(long, requires = "abi")]
        interpreter: Option<PathBuf>,
    },

    /// Create a virtual environment from a descriptor's interpreter
    Venv {
        name: String,

        /// Directory of the virtual environment
        dest: PathBuf,

        /// Requirements files to install
        #[arg(short, long = "requirement", value_name = "FILE")]
        requirements: Vec<PathBuf>,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completion for
        shell: Shell,
    },
}

impl Cli {
    pub fn run(&self) -> Result<i32> {
        self.init_logging();

        if self.verbose && self.quiet {
            return Err(DevbootError::Cli(Box::new(CliError::ConflictingArguments {
                first: "--verbose".to_string(),
                second: "--quiet".to_string(),
                suggestion: "Use either --verbose for more output or --quiet for less output, but not both".to_string(),
            })));
        }

        if let Commands::Completion { shell } = &self.command {
            let mut cmd = Self::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut std::io::stdout());
            return Ok(exit_codes::SUCCESS);
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.dispatch())
    }

    async fn dispatch(&self) -> Result<i32> {
        let language = Language::from_name(&self.language)?;
        let session = Session::open(&self.project, self.config.as_deref(), language)?;

        match &self.command {
            Commands::List { json } => {
                let summaries = commands::descriptors::execute_list_command(&session)?;
                if *json {
                    print_json(&summaries)?;
                } else if summaries.is_empty() {
                    println!("No {language} descriptors defined");
                } else {
                    for summary in &summaries {
                        println!("{}", commands::descriptors::render_summary(summary));
                    }
                }
            }
            Commands::Show {
                name,
                platform,
                json,
            } => {
                let platform = platform.as_deref().map(parse_platform).transpose()?;
                let report =
                    commands::descriptors::execute_show_command(&session, name, platform.as_ref())?;
                if *json {
                    print_json(&report)?;
                } else {
                    println!("{}", commands::descriptors::render_report(&report));
                }
            }
            Commands::Providers { name, platform } => {
                let platform = platform.as_deref().map(parse_platform).transpose()?;
                for provider in
                    commands::resolve::execute_providers_command(&session, name, platform.as_ref())?
                {
                    println!("{provider}");
                }
            }
            Commands::Record { name } => {
                let record = commands::resolve::execute_record_command(&session, name).await?;
                println!("{} ({})", record.implementation_version, record.provider);
            }
            Commands::Install { name } => {
                let outcome = commands::resolve::execute_install_command(&session, name).await?;
                println!("{}", commands::resolve::render_install(&outcome));
            }
            Commands::Update { name, install } => {
                let (outcome, installed) =
                    commands::resolve::execute_update_command(&session, name, *install).await?;
                println!("{}", commands::resolve::render_update(name, &outcome));
                if let Some(installed) = installed {
                    println!("{}", commands::resolve::render_install(&installed));
                }
            }
            Commands::Path { name, location } => {
                let installation = commands::resolve::execute_path_command(&session, name)?;
                if *location {
                    println!("{}", installation.location.display());
                } else {
                    println!("{}", installation.executable().display());
                }
            }
            Commands::Platform { abi, interpreter } => {
                if *abi {
                    let id = commands::platform::execute_abi_command(
                        &session.ctx,
                        interpreter.as_deref(),
                    )
                    .await?;
                    println!("{id}");
                } else {
                    println!("{}", commands::platform::execute_platform_command(&session.ctx));
                }
            }
            Commands::Venv {
                name,
                dest,
                requirements,
            } => {
                let config = VenvConfig {
                    descriptor: name.clone(),
                    dest: dest.clone(),
                    requirements: requirements.clone(),
                };
                let result = commands::venv::execute_venv_command(&session, &config).await?;
                println!(
                    "Created virtual environment at {} ({} {})",
                    result.venv.path.display(),
                    result.interpreter.installation().implementation,
                    result.interpreter.installation().implementation_version
                );
            }
            Commands::Completion { .. } => {}
        }

        Ok(exit_codes::SUCCESS)
    }

    /// Whether error output should be colored
    pub fn use_colors(&self) -> bool {
        self.log_config().should_use_colors()
    }

    fn log_config(&self) -> crate::logging::LogConfig {
        use crate::logging::{LogConfig, LogFormat};

        let format = LogFormat::parse(&self.log_format).unwrap_or(LogFormat::Pretty);
        LogConfig::from_cli(self.verbose, self.quiet, self.color.clone()).with_format(format)
    }

    fn init_logging(&self) {
        if let Err(e) = crate::logging::init_logging(self.log_config()) {
            eprintln!("Failed to initialize logging: {e}");
        }
    }
}

fn parse_platform(value: &str) -> Result<PlatformId> {
    PlatformId::parse(value).ok_or_else(|| {
        DevbootError::Cli(Box::new(CliError::InvalidArgument {
            argument: "--platform".to_string(),
            message: format!("'{value}' is not a platform identifier"),
            suggestion: Some("Use {kernel}-{address size}--{architecture}, e.g. linux-64--x86_64".to_string()),
        }))
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).map_err(|e| {
        DevbootError::Cli(Box::new(CliError::RuntimeError {
            message: format!("Failed to render JSON: {e}"),
        }))
    })?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_parsing_version() {
        let cli = Cli::try_parse_from(["devboot", "--version"]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["devboot"]).is_err());
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["devboot", "list"]).unwrap();
        assert_eq!(cli.project, PathBuf::from("."));
        assert_eq!(cli.language, "python");
        assert_eq!(cli.log_format, "pretty");
        assert!(cli.config.is_none());
        assert!(!cli.verbose);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_cli_global_flags_after_command() {
        let cli = Cli::try_parse_from(["devboot", "install", "py310", "-C", "/work", "-v"]).unwrap();
        assert_eq!(cli.project, PathBuf::from("/work"));
        assert!(cli.verbose);
        match cli.command {
            Commands::Install { name } => assert_eq!(name, "py310"),
            _ => panic!("Expected Install command"),
        }
    }

    #[test]
    fn test_cli_venv_requirements() {
        let cli = Cli::try_parse_from([
            "devboot", "venv", "py310", ".venv", "-r", "requirements.txt", "-r", "dev.txt",
        ])
        .unwrap();
        match cli.command {
            Commands::Venv { requirements, .. } => assert_eq!(requirements.len(), 2),
            _ => panic!("Expected Venv command"),
        }
    }

    #[test]
    fn test_cli_interpreter_requires_abi() {
        assert!(Cli::try_parse_from(["devboot", "platform", "--interpreter", "/usr/bin/python3"]).is_err());
        assert!(Cli::try_parse_from([
            "devboot", "platform", "--abi", "--interpreter", "/usr/bin/python3"
        ])
        .is_ok());
    }

    #[test]
    fn test_cli_rejects_unknown_log_format() {
        assert!(Cli::try_parse_from(["devboot", "list", "--log-format", "xml"]).is_err());
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        let cli = Cli::try_parse_from(["devboot", "platform", "-v", "-q"]).unwrap();
        let error = cli.run().unwrap_err();
        assert_eq!(error.exit_code(), exit_codes::CLI_ERROR);
    }

    #[test]
    fn test_parse_platform_argument() {
        assert_eq!(
            parse_platform("linux-64--x86_64").unwrap(),
            PlatformId::new("linux", "64", "x86_64")
        );
        assert!(parse_platform("linux").is_err());
    }
}
