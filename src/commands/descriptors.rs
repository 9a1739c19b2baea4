// Descriptor listing and inspection

use serde::Serialize;
use tracing::warn;

use super::Session;
use crate::error::Result;
use crate::language::{Definition, Installation, Record};
use crate::platform::PlatformId;

/// One row of `devboot list`
#[derive(Debug, Clone, Serialize)]
pub struct DescriptorSummary {
    #[serde(flatten)]
    pub definition: Definition,
    pub supportable: bool,
    pub recorded_version: Option<String>,
    /// Why the descriptor cannot be resolved at all, e.g. conflicting features
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Output of `devboot show`
#[derive(Debug, Clone, Serialize)]
pub struct DescriptorReport {
    #[serde(flatten)]
    pub definition: Definition,
    pub platform: String,
    pub supportable_providers: Vec<String>,
    pub record: Option<Record>,
    pub installation: Option<Installation>,
}

pub fn execute_list_command(session: &Session) -> Result<Vec<DescriptorSummary>> {
    let platform = session.ctx.platform();
    let resolver = session.resolver();

    session
        .ctx
        .descriptors()
        .list_definitions(session.language)?
        .into_values()
        .map(|definition| -> Result<DescriptorSummary> {
            let (supportable, error) = match resolver.is_supportable(&definition, platform) {
                Ok(supportable) => (supportable, None),
                Err(e) => {
                    warn!(descriptor = %definition.name, error = %e, "Descriptor cannot be resolved");
                    (false, Some(e.to_string()))
                }
            };
            let recorded_version = resolver
                .records()
                .get(&definition.name, platform)?
                .map(|record| record.implementation_version);
            Ok(DescriptorSummary {
                definition,
                supportable,
                recorded_version,
                error,
            })
        })
        .collect()
}

pub fn execute_show_command(
    session: &Session,
    name: &str,
    platform: Option<&PlatformId>,
) -> Result<DescriptorReport> {
    let platform = platform.unwrap_or_else(|| session.ctx.platform());
    let definition = session.definition(name)?;
    let resolver = session.resolver();

    let supportable_providers = resolver
        .supportable_providers(&definition, platform)?
        .iter()
        .map(|provider| provider.name().to_string())
        .collect();
    let record = resolver.records().get(&definition.name, platform)?;
    let installation = resolver.locate(&definition, platform)?;

    Ok(DescriptorReport {
        definition,
        platform: platform.to_string(),
        supportable_providers,
        record,
        installation,
    })
}

pub fn render_summary(summary: &DescriptorSummary) -> String {
    let definition = &summary.definition;
    let mut line = format!(
        "{:<16} {} {}",
        definition.name, definition.implementation, definition.base_version
    );
    if !definition.features.is_empty() {
        line.push_str(&format!(" [{}]", definition.features.join(", ")));
    }
    if let Some(error) = &summary.error {
        line.push_str(&format!(" (error: {error})"));
        return line;
    }
    match (&summary.recorded_version, summary.supportable) {
        (Some(version), _) => line.push_str(&format!(" -> {version}")),
        (None, false) => line.push_str(" (unsupported on this platform)"),
        (None, true) => {}
    }
    line
}

pub fn render_report(report: &DescriptorReport) -> String {
    let definition = &report.definition;
    let mut lines = vec![
        format!("name:           {}", definition.name),
        format!("implementation: {}", definition.implementation),
        format!("base-version:   {}", definition.base_version),
        format!("features:       {}", definition.features.join(", ")),
        format!("platform:       {}", report.platform),
        format!("providers:      {}", report.supportable_providers.join(", ")),
    ];
    match &report.record {
        Some(record) => lines.push(format!(
            "record:         {} ({})",
            record.implementation_version, record.provider
        )),
        None => lines.push("record:         none".to_string()),
    }
    if let Some(installation) = &report.installation {
        lines.push(format!("location:       {}", installation.location.display()));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;

    #[test]
    fn test_render_summary() {
        let summary = DescriptorSummary {
            definition: Definition::new(Language::Python, "py310", "3.10", "cpython")
                .with_features(["debug"]),
            supportable: true,
            recorded_version: Some("3.10.15".to_string()),
            error: None,
        };
        let line = render_summary(&summary);
        assert!(line.starts_with("py310"));
        assert!(line.contains("[debug]"));
        assert!(line.ends_with("-> 3.10.15"));
    }

    #[test]
    fn test_render_unsupported() {
        let summary = DescriptorSummary {
            definition: Definition::new(Language::Python, "ft", "3.12", "cpython"),
            supportable: false,
            recorded_version: None,
            error: None,
        };
        assert!(render_summary(&summary).contains("unsupported"));
    }

    #[test]
    fn test_render_unresolvable() {
        let summary = DescriptorSummary {
            definition: Definition::new(Language::Python, "mem", "3.12", "cpython"),
            supportable: false,
            recorded_version: None,
            error: Some("features conflict".to_string()),
        };
        let line = render_summary(&summary);
        assert!(line.ends_with("(error: features conflict)"));
        assert!(!line.contains("unsupported"));
    }
}
