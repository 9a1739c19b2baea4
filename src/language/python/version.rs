// PEP 440 version handling for Python descriptors and records

use pep440_rs::Version;
use std::cmp::Ordering;
use std::str::FromStr;

use crate::error::{DevbootError, ResolutionError, Result};

pub fn parse(version: &str) -> Result<Version> {
    Version::from_str(version.trim()).map_err(|e| {
        DevbootError::Resolution(Box::new(ResolutionError::InvalidVersion {
            version: version.to_string(),
            error: e.to_string(),
        }))
    })
}

pub fn compare(left: &str, right: &str) -> Result<Ordering> {
    Ok(parse(left)?.cmp(&parse(right)?))
}

/// A candidate matches when its release segments start with the base's.
///
/// `3.10` matches `3.10.0` and `3.10.15+20241016`, not `3.1.4` or `3.100.0`.
pub fn matches_base(base: &Version, candidate: &Version) -> bool {
    candidate.release().starts_with(base.release())
}

/// Newest candidate matching `base_version`.
///
/// Final releases win over pre-releases; a pre-release is only picked when no
/// final release matches. Unparseable candidates and development-branch builds
/// (`3.13-dev`, `3.14.dev0`) are skipped. The original candidate string is
/// returned unchanged.
pub fn newest_matching<I, S>(base_version: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let base = parse(base_version).ok()?;
    select_newest(Some(&base), candidates)
}

/// Newest of all candidates, with the same final-over-pre-release preference
pub fn newest<I, S>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    select_newest(None, candidates)
}

fn select_newest<I, S>(base: Option<&Version>, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut best_final: Option<(Version, String)> = None;
    let mut best_pre: Option<(Version, String)> = None;

    for candidate in candidates {
        let raw = candidate.as_ref().trim();
        let Ok(version) = Version::from_str(raw) else {
            continue;
        };
        if is_development_build(raw, &version) {
            continue;
        }
        if base.map_or(false, |base| !matches_base(base, &version)) {
            continue;
        }

        let slot = if version.any_prerelease() {
            &mut best_pre
        } else {
            &mut best_final
        };
        if slot.as_ref().map_or(true, |(best, _)| version > *best) {
            *slot = Some((version, raw.to_string()));
        }
    }

    best_final.or(best_pre).map(|(_, raw)| raw)
}

/// Builds of a development branch name no fixed release
fn is_development_build(raw: &str, version: &Version) -> bool {
    version.is_dev() || raw.to_ascii_lowercase().ends_with("-dev")
}
