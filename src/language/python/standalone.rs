//! Prebuilt CPython from python-build-standalone.
//!
//! Releases are tagged by date; each publishes a `SHA256SUMS` listing with
//! one `install_only` archive per version and target triple. The release tag
//! becomes the local segment of the recorded version, so
//! `cpython-3.10.15+20241016-x86_64-unknown-linux-gnu-install_only.tar.gz`
//! is recorded as `3.10.15+20241016`.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

use super::{symlink_file, version, CPYTHON};
use crate::archive::{find_checksum, unpack_tar_gz, verify_sha256};
use crate::context::Context;
use crate::error::{ArchiveError, DevbootError, HttpError, ResolutionError, Result};
use crate::language::{Definition, Feature, InstallRequest, Provider};
use crate::platform::PlatformId;

pub const PROVIDER_NAME: &str = "prebuilt";

pub const LATEST_RELEASE_URL: &str =
    "https://raw.githubusercontent.com/astral-sh/python-build-standalone/latest-release/latest-release.json";
pub const RELEASE_DOWNLOAD_URL: &str =
    "https://github.com/astral-sh/python-build-standalone/releases/download";

const MINIMUM_BASE: &str = "3.9";
const ARCHIVE_SUFFIX: &str = "install_only.tar.gz";

#[derive(Debug, Deserialize)]
struct LatestRelease {
    #[allow(dead_code)]
    tag: String,
    asset_url_prefix: String,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StandaloneProvider;

/// Target triple of the archives built for a platform
pub fn target_triple(platform: &PlatformId) -> Option<&'static str> {
    if platform.address_size != "64" {
        return None;
    }
    let arch = match platform.architecture.as_str() {
        "x86_64" | "amd64" => "x86_64",
        "aarch64" | "arm64" => "aarch64",
        _ => return None,
    };
    match (platform.kernel.as_str(), arch) {
        ("linux", "x86_64") => Some("x86_64-unknown-linux-gnu"),
        ("linux", "aarch64") => Some("aarch64-unknown-linux-gnu"),
        ("darwin", "x86_64") => Some("x86_64-apple-darwin"),
        ("darwin", "aarch64") => Some("aarch64-apple-darwin"),
        ("windows", "x86_64") => Some("x86_64-pc-windows-msvc"),
        _ => None,
    }
}

pub fn archive_name(implementation_version: &str, triple: &str) -> String {
    format!("cpython-{implementation_version}-{triple}-{ARCHIVE_SUFFIX}")
}

/// Implementation versions offered for a triple in a `SHA256SUMS` listing
pub fn candidate_versions(listing: &str, triple: &str) -> Vec<String> {
    let suffix = format!("-{triple}-{ARCHIVE_SUFFIX}");
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .filter_map(|file| file.strip_prefix("cpython-")?.strip_suffix(suffix.as_str()))
        .map(str::to_string)
        .collect()
}

/// Split `3.10.15+20241016` into version and release tag
fn split_release(implementation_version: &str) -> Result<(&str, &str)> {
    implementation_version
        .split_once('+')
        .filter(|(version, tag)| !version.is_empty() && !tag.is_empty())
        .ok_or_else(|| {
            DevbootError::Resolution(Box::new(ResolutionError::InvalidVersion {
                version: implementation_version.to_string(),
                error: "expected {version}+{release tag}".to_string(),
            }))
        })
}

fn unsupported_platform(platform: &PlatformId) -> DevbootError {
    DevbootError::Resolution(Box::new(ResolutionError::InstallationFailed {
        provider: PROVIDER_NAME.to_string(),
        message: format!("no prebuilt archives for {platform}"),
    }))
}

#[async_trait]
impl Provider for StandaloneProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supports_platform(&self, platform: &PlatformId) -> bool {
        target_triple(platform).is_some()
    }

    fn supports_base_version(&self, definition: &Definition) -> bool {
        matches!(
            version::compare(&definition.base_version, MINIMUM_BASE),
            Ok(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
        )
    }

    fn supports_implementation(&self, implementation: &str) -> bool {
        implementation == CPYTHON
    }

    fn supports_feature(&self, _feature: &Feature) -> bool {
        false
    }

    async fn discover_current_version(
        &self,
        ctx: &Context,
        definition: &Definition,
        platform: &PlatformId,
    ) -> Result<String> {
        let triple = target_triple(platform).ok_or_else(|| unsupported_platform(platform))?;

        let latest: LatestRelease = ctx.http().get_json(LATEST_RELEASE_URL).await?;
        let sums_url = format!("{}/SHA256SUMS", latest.asset_url_prefix.trim_end_matches('/'));
        let listing = ctx.http().get_text(&sums_url).await?;

        let candidates = candidate_versions(&listing, triple);
        debug!(count = candidates.len(), triple, "Prebuilt candidates");

        version::newest_matching(&definition.base_version, candidates).ok_or_else(|| {
            DevbootError::Resolution(Box::new(ResolutionError::NoCandidateVersion {
                provider: PROVIDER_NAME.to_string(),
                implementation: definition.implementation.clone(),
                base_version: definition.base_version.clone(),
            }))
        })
    }

    async fn install(&self, ctx: &Context, request: &InstallRequest<'_>) -> Result<()> {
        let triple =
            target_triple(request.platform).ok_or_else(|| unsupported_platform(request.platform))?;
        let implementation_version = request.record.implementation_version.as_str();
        let (_, tag) = split_release(implementation_version)?;

        let file_name = archive_name(implementation_version, triple);
        let release_url = format!("{RELEASE_DOWNLOAD_URL}/{tag}");
        let listing = ctx
            .http()
            .get_text(&format!("{release_url}/SHA256SUMS"))
            .await?;
        let expected = find_checksum(&listing, &file_name)
            .ok_or_else(|| {
                DevbootError::Http(Box::new(HttpError::MissingChecksum {
                    file: file_name.clone(),
                }))
            })?
            .to_string();

        let url = format!("{release_url}/{}", file_name.replace('+', "%2B"));
        let archive = ctx.config().downloads_dir().join(&file_name);
        let cached = archive.is_file() && verify_sha256(&archive, &expected, &url).is_ok();
        if cached {
            debug!(archive = %archive.display(), "Using cached archive");
        } else {
            info!(%url, "Downloading prebuilt Python");
            ctx.http().download(&url, &archive).await?;
            verify_sha256(&archive, &expected, &url)?;
        }

        let parent = request
            .location
            .parent()
            .unwrap_or_else(|| Path::new("."));
        let staging = tempfile::TempDir::new_in(parent)?;
        unpack_tar_gz(&archive, staging.path())?;

        let tree = staging.path().join("python");
        if !tree.is_dir() {
            return Err(DevbootError::Archive(Box::new(
                ArchiveError::UnexpectedLayout {
                    archive,
                    expected: "python/".to_string(),
                },
            )));
        }
        std::fs::rename(&tree, request.location)?;

        if !request.platform.is_windows() {
            link_python(request.location)?;
        }
        Ok(())
    }
}

/// Archives ship `bin/python3`; add `bin/python` when missing
fn link_python(location: &Path) -> Result<()> {
    let link = location.join("bin").join("python");
    if link.exists() || !location.join("bin").join("python3").exists() {
        return Ok(());
    }
    symlink_file(Path::new("python3"), &link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;

    const SUMS: &str = "\
1111  cpython-3.10.15+20241016-x86_64-unknown-linux-gnu-install_only.tar.gz
2222  cpython-3.10.15+20241016-x86_64-unknown-linux-gnu-install_only_stripped.tar.gz
3333  cpython-3.10.15+20241016-aarch64-apple-darwin-install_only.tar.gz
4444  cpython-3.12.7+20241016-x86_64-unknown-linux-gnu-install_only.tar.gz
5555  cpython-3.13.0+20241016-x86_64-unknown-linux-gnu-freethreaded+pgo+lto-full.tar.zst
6666  cpython-3.13.0+20241016-x86_64-unknown-linux-gnu-install_only.tar.gz
";

    #[test]
    fn test_target_triples() {
        assert_eq!(
            target_triple(&PlatformId::new("linux", "64", "x86_64")),
            Some("x86_64-unknown-linux-gnu")
        );
        assert_eq!(
            target_triple(&PlatformId::new("darwin", "64", "arm64")),
            Some("aarch64-apple-darwin")
        );
        assert_eq!(target_triple(&PlatformId::new("linux", "32", "x86_64")), None);
        assert_eq!(target_triple(&PlatformId::new("freebsd", "64", "x86_64")), None);
    }

    #[test]
    fn test_candidate_versions() {
        let versions = candidate_versions(SUMS, "x86_64-unknown-linux-gnu");
        assert_eq!(
            versions,
            vec!["3.10.15+20241016", "3.12.7+20241016", "3.13.0+20241016"]
        );
        assert_eq!(
            version::newest_matching("3.12", &versions).as_deref(),
            Some("3.12.7+20241016")
        );
    }

    #[test]
    fn test_archive_name_matches_listing() {
        let name = archive_name("3.10.15+20241016", "aarch64-apple-darwin");
        assert_eq!(find_checksum(SUMS, &name), Some("3333"));
    }

    #[test]
    fn test_split_release() {
        assert_eq!(
            split_release("3.10.15+20241016").unwrap(),
            ("3.10.15", "20241016")
        );
        assert!(split_release("3.10.15").is_err());
    }

    #[test]
    fn test_support_matrix() {
        let provider = StandaloneProvider;
        let old = Definition::new(Language::Python, "old", "3.8", "cpython");
        let new = Definition::new(Language::Python, "new", "3.12", "cpython");
        assert!(!provider.supports_base_version(&old));
        assert!(provider.supports_base_version(&new));
        assert!(!provider.supports_implementation("pypy"));
    }
}
