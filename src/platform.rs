//! Platform identifier calculation.
//!
//! A platform identifier names the OS kernel family, address width and CPU
//! architecture an installation is built for, rendered as
//! `{kernel}-{address_size}--{architecture}` (e.g. `linux-64--x86_64`).
//! Three environment variables override the detected values, which keeps
//! cross-compilation and tests deterministic.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const KERNEL_ENV: &str = "DEVBOOT_PLATFORM_KERNEL";
pub const ADDRESS_SIZE_ENV: &str = "DEVBOOT_PLATFORM_ADDRESS_SIZE";
pub const ARCH_ENV: &str = "DEVBOOT_PLATFORM_ARCH";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlatformId {
    pub kernel: String,
    pub address_size: String,
    pub architecture: String,
}

impl PlatformId {
    pub fn new(
        kernel: impl Into<String>,
        address_size: impl Into<String>,
        architecture: impl Into<String>,
    ) -> Self {
        Self {
            kernel: kernel.into(),
            address_size: address_size.into(),
            architecture: architecture.into(),
        }
    }

    /// Platform of the running process, honoring the override variables.
    pub fn current() -> Self {
        Self::detect(|key| std::env::var(key).ok())
    }

    /// Compute the identifier from an environment lookup.
    ///
    /// Empty override values are ignored.
    pub fn detect<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let overridden = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let kernel = overridden(KERNEL_ENV)
            .map(|value| value.trim().to_lowercase())
            .unwrap_or_else(|| normalize_kernel(std::env::consts::OS));
        let address_size = overridden(ADDRESS_SIZE_ENV)
            .map(|value| value.trim().to_string())
            .unwrap_or_else(|| usize::BITS.to_string());
        let architecture = overridden(ARCH_ENV)
            .map(|value| value.trim().to_string())
            .unwrap_or_else(|| std::env::consts::ARCH.to_string());

        Self {
            kernel,
            address_size,
            architecture,
        }
    }

    /// Parse the `{kernel}-{address_size}--{architecture}` form.
    pub fn parse(value: &str) -> Option<Self> {
        let (head, architecture) = value.split_once("--")?;
        let (kernel, address_size) = head.split_once('-')?;
        if kernel.is_empty() || address_size.is_empty() || architecture.is_empty() {
            return None;
        }
        if !address_size.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(Self::new(kernel, address_size, architecture))
    }

    pub fn is_linux(&self) -> bool {
        self.kernel == "linux"
    }

    pub fn is_darwin(&self) -> bool {
        self.kernel == "darwin"
    }

    pub fn is_windows(&self) -> bool {
        self.kernel == "windows"
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}--{}",
            self.kernel, self.address_size, self.architecture
        )
    }
}

/// Map Rust's OS names onto kernel names (`macos` → `darwin`).
pub fn normalize_kernel(os: &str) -> String {
    match os {
        "macos" | "ios" => "darwin".to_string(),
        other => other.to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_display_format() {
        let platform = PlatformId::new("linux", "64", "x86_64");
        assert_eq!(platform.to_string(), "linux-64--x86_64");
    }

    #[test]
    fn test_overrides_replace_detection() {
        let platform = PlatformId::detect(lookup_from(&[
            (KERNEL_ENV, "Darwin"),
            (ADDRESS_SIZE_ENV, "32"),
            (ARCH_ENV, "arm64"),
        ]));
        assert_eq!(platform.to_string(), "darwin-32--arm64");
    }

    #[test]
    fn test_partial_override() {
        let platform = PlatformId::detect(lookup_from(&[(ARCH_ENV, "riscv64")]));
        assert_eq!(platform.architecture, "riscv64");
        assert_eq!(platform.kernel, normalize_kernel(std::env::consts::OS));
        assert_eq!(platform.address_size, usize::BITS.to_string());
    }

    #[test]
    fn test_empty_override_is_ignored() {
        let platform = PlatformId::detect(lookup_from(&[(KERNEL_ENV, "  ")]));
        assert_eq!(platform.kernel, normalize_kernel(std::env::consts::OS));
    }

    #[test]
    fn test_detection_is_deterministic() {
        let first = PlatformId::detect(lookup_from(&[]));
        let second = PlatformId::detect(lookup_from(&[]));
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse() {
        let platform = PlatformId::parse("linux-64--x86_64").unwrap();
        assert_eq!(platform, PlatformId::new("linux", "64", "x86_64"));

        assert!(PlatformId::parse("linux-x86_64").is_none());
        assert!(PlatformId::parse("linux-sixty--x86_64").is_none());
        assert!(PlatformId::parse("-64--x86_64").is_none());
    }

    #[test]
    fn test_normalize_kernel() {
        assert_eq!(normalize_kernel("macos"), "darwin");
        assert_eq!(normalize_kernel("linux"), "linux");
        assert_eq!(normalize_kernel("windows"), "windows");
    }
}
