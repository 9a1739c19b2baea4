// Archive unpacking and checksum verification for downloaded runtimes

use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tar::Archive;
use tracing::debug;

use crate::error::{ArchiveError, DevbootError, HttpError, Result};

/// Hex-encoded SHA-256 of a file
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Fail with `HttpError::ChecksumMismatch` unless `path` hashes to `expected`
pub fn verify_sha256(path: &Path, expected: &str, url: &str) -> Result<()> {
    let actual = sha256_file(path)?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(DevbootError::Http(Box::new(HttpError::ChecksumMismatch {
            url: url.to_string(),
            expected: expected.trim().to_lowercase(),
            actual,
        })));
    }
    Ok(())
}

/// Look up a file's digest in a `SHA256SUMS`-style listing
pub fn find_checksum<'a>(listing: &'a str, file_name: &str) -> Option<&'a str> {
    listing.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let digest = parts.next()?;
        let name = parts.next()?.trim_start_matches('*');
        (name == file_name).then_some(digest)
    })
}

/// Unpack a `.tar.gz` into `dest`, refusing entries that escape it
pub fn unpack_tar_gz(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
    archive.set_preserve_permissions(true);
    std::fs::create_dir_all(dest)?;

    let unpack_error = |message: String| {
        DevbootError::Archive(Box::new(ArchiveError::Unpack {
            archive: archive_path.to_path_buf(),
            message,
        }))
    };

    let entries = archive
        .entries()
        .map_err(|e| unpack_error(format!("Failed to read tar: {e}")))?;

    let mut unpacked = 0usize;
    for entry in entries {
        let mut entry = entry.map_err(|e| unpack_error(format!("Failed to read tar entry: {e}")))?;
        let entry_name = entry
            .path()
            .map(|path| path.display().to_string())
            .unwrap_or_default();

        let inside = entry
            .unpack_in(dest)
            .map_err(|e| unpack_error(format!("{entry_name}: {e}")))?;
        if !inside {
            return Err(DevbootError::Archive(Box::new(ArchiveError::UnsafeEntry {
                archive: archive_path.to_path_buf(),
                entry: entry_name,
            })));
        }
        unpacked += 1;
    }

    debug!(archive = %archive_path.display(), entries = unpacked, "Unpacked archive");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    fn build_archive(path: &Path, files: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, name, *content).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_unpack_tar_gz() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("python.tar.gz");
        build_archive(
            &archive,
            &[("python/bin/python3", b"#!/bin/sh\n"), ("python/README", b"hi")],
        );

        let dest = temp.path().join("out");
        unpack_tar_gz(&archive, &dest).unwrap();
        assert!(dest.join("python/bin/python3").is_file());
        assert_eq!(std::fs::read(dest.join("python/README")).unwrap(), b"hi");
    }

    #[test]
    fn test_traversal_entry_is_rejected() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("evil.tar.gz");

        // Builder::append_data refuses `..`, so write the name into the header directly.
        let file = File::create(&archive).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let mut header = tar::Header::new_old();
        header.as_old_mut().name[..12].copy_from_slice(b"../escape.sh");
        header.set_size(1);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, &b"x"[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let dest = temp.path().join("out");
        let error = unpack_tar_gz(&archive, &dest).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidData);
        assert!(!temp.path().join("escape.sh").exists());
    }

    #[test]
    fn test_checksum_verification() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data");
        std::fs::write(&path, b"abc").unwrap();

        let digest = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        assert_eq!(sha256_file(&path).unwrap(), digest);
        verify_sha256(&path, &digest.to_uppercase(), "file://data").unwrap();

        let error = verify_sha256(&path, &"0".repeat(64), "file://data").unwrap_err();
        assert!(error.to_string().contains("Checksum mismatch"));
    }

    #[test]
    fn test_find_checksum() {
        let listing = "aaaa  cpython-3.10.15+20241016-x86_64-unknown-linux-gnu-install_only.tar.gz\n\
                       bbbb *cpython-3.12.7+20241016-aarch64-apple-darwin-install_only.tar.gz\n";
        assert_eq!(
            find_checksum(
                listing,
                "cpython-3.10.15+20241016-x86_64-unknown-linux-gnu-install_only.tar.gz"
            ),
            Some("aaaa")
        );
        assert_eq!(
            find_checksum(
                listing,
                "cpython-3.12.7+20241016-aarch64-apple-darwin-install_only.tar.gz"
            ),
            Some("bbbb")
        );
        assert_eq!(find_checksum(listing, "missing.tar.gz"), None);
    }
}
