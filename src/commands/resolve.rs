// Provider resolution commands: providers, record, install, update, path

use tracing::info;

use super::Session;
use crate::error::{DevbootError, ResolutionError, Result};
use crate::language::{InstallOutcome, Installation, Record, UpdateOutcome};
use crate::platform::PlatformId;

/// Names of the providers able to serve a descriptor, in registration order
pub fn execute_providers_command(
    session: &Session,
    name: &str,
    platform: Option<&PlatformId>,
) -> Result<Vec<String>> {
    let platform = platform.unwrap_or_else(|| session.ctx.platform());
    let definition = session.definition(name)?;
    Ok(session
        .resolver()
        .supportable_providers(&definition, platform)?
        .iter()
        .map(|provider| provider.name().to_string())
        .collect())
}

/// The current platform's record, formed on first use
pub async fn execute_record_command(session: &Session, name: &str) -> Result<Record> {
    let definition = session.definition(name)?;
    session
        .resolver()
        .get_or_create_record(&definition, session.ctx.platform())
        .await
}

pub async fn execute_install_command(session: &Session, name: &str) -> Result<InstallOutcome> {
    let definition = session.definition(name)?;
    session
        .resolver()
        .install(&definition, session.ctx.platform())
        .await
}

/// Refresh the record and install the new version when one was found
pub async fn execute_update_command(
    session: &Session,
    name: &str,
    install: bool,
) -> Result<(UpdateOutcome, Option<InstallOutcome>)> {
    let definition = session.definition(name)?;
    let resolver = session.resolver();
    let platform = session.ctx.platform();

    let outcome = resolver.update(&definition, platform).await?;
    let installed = match (&outcome, install) {
        (UpdateOutcome::Updated { .. }, true) => {
            info!(descriptor = %definition.name, "Installing updated version");
            Some(resolver.install(&definition, platform).await?)
        }
        _ => None,
    };
    Ok((outcome, installed))
}

/// Existing installation of a descriptor on this platform
pub fn execute_path_command(session: &Session, name: &str) -> Result<Installation> {
    let definition = session.definition(name)?;
    let platform = session.ctx.platform();
    session
        .resolver()
        .locate(&definition, platform)?
        .ok_or_else(|| {
            DevbootError::Resolution(Box::new(ResolutionError::NotInstalled {
                descriptor: definition.name.clone(),
                platform: platform.to_string(),
            }))
        })
}

pub fn render_install(outcome: &InstallOutcome) -> String {
    let installation = outcome.installation();
    let verb = match outcome {
        InstallOutcome::Installed(_) => "Installed",
        InstallOutcome::AlreadySatisfied(_) => "Already installed",
    };
    format!(
        "{verb} {} {} ({}) at {}",
        installation.implementation,
        installation.implementation_version,
        installation.provider,
        installation.location.display()
    )
}

pub fn render_update(descriptor: &str, outcome: &UpdateOutcome) -> String {
    match outcome {
        UpdateOutcome::Updated { previous, current } => format!(
            "{descriptor}: {} -> {} ({})",
            previous.implementation_version, current.implementation_version, current.provider
        ),
        UpdateOutcome::UpToDate(record) => format!(
            "{descriptor}: {} is up to date",
            record.implementation_version
        ),
    }
}
