//! Executable-bit check (spec §4.2).

use std::fs::Metadata;

/// POSIX execute bits: owner, group, other.
const EXEC_MASK: u32 = 0o111;

/// Whether `metadata` has any of the three execute bits set.
///
/// Directories with the execute bit are "executable" for traversal
/// purposes but are never registered as tools by the caller.
#[cfg(unix)]
#[must_use]
pub fn is_executable(metadata: &Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt as _;
    metadata.permissions().mode() & EXEC_MASK != 0
}

/// On non-Unix platforms there's no execute bit to inspect; treat every
/// regular file as a candidate and let spawning fail if it isn't
/// launchable.
#[cfg(not(unix))]
#[must_use]
pub fn is_executable(_metadata: &Metadata) -> bool {
    true
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::os::unix::fs::PermissionsExt as _;
    use tempfile::NamedTempFile;

    #[test]
    fn detects_owner_execute_bit() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"#!/bin/sh\n").unwrap();
        let path = f.path().to_path_buf();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(!is_executable(&std::fs::metadata(&path).unwrap()));

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(is_executable(&std::fs::metadata(&path).unwrap()));
    }

    #[test]
    fn group_or_other_exec_bit_is_sufficient() {
        let f = NamedTempFile::new().unwrap();
        let path = f.path().to_path_buf();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();
        assert!(!is_executable(&std::fs::metadata(&path).unwrap()));

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o610)).unwrap();
        assert!(is_executable(&std::fs::metadata(&path).unwrap()));
    }
}
