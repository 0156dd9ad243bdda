//! Library version constants and checkpoint version negotiation.
//!
//! The current version triple is process-wide immutable state: it is stamped
//! into every checkpoint at encode time and compared against the stored
//! triple at decode time, before any body field is read.

use std::fmt;

/// Current format version (major). Kept in sync with the package version.
pub const VERSION_MAJOR: i32 = 4;

/// Current format version (minor).
pub const VERSION_MINOR: i32 = 1;

/// Current format version (patch).
pub const VERSION_PATCH: i32 = 0;

/// The one frozen legacy checkpoint version that remains readable.
pub const LEGACY_MAJOR: i32 = 3;
pub const LEGACY_MINOR: i32 = 9;

/// A (major, minor, patch) version triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: i32,
    pub minor: i32,
    pub patch: i32,
}

impl Version {
    /// The version this library writes.
    pub const CURRENT: Version = Version {
        major: VERSION_MAJOR,
        minor: VERSION_MINOR,
        patch: VERSION_PATCH,
    };

    pub const fn new(major: i32, minor: i32, patch: i32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Parse strategy decided from the stored version triple alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionAction {
    /// Same major, minor not ahead: parse normally.
    Accept,
    /// Same major, newer minor: parse with the current layout, warn, and
    /// tolerate unknown trailing optional fields.
    WarnForward,
    /// The frozen 3.9 checkpoint: parse with the legacy layout, warn.
    LegacyMigrate,
    /// Any other major: fatal.
    Reject,
}

/// Decide how a checkpoint with the given stored version must be parsed.
pub fn negotiate(stored: Version) -> VersionAction {
    if stored.major == LEGACY_MAJOR && stored.minor == LEGACY_MINOR {
        VersionAction::LegacyMigrate
    } else if stored.major != VERSION_MAJOR {
        VersionAction::Reject
    } else if stored.minor > VERSION_MINOR {
        VersionAction::WarnForward
    } else {
        VersionAction::Accept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_match_package_version() {
        assert_eq!(env!("CARGO_PKG_VERSION_MAJOR"), VERSION_MAJOR.to_string());
        assert_eq!(env!("CARGO_PKG_VERSION_MINOR"), VERSION_MINOR.to_string());
        assert_eq!(env!("CARGO_PKG_VERSION_PATCH"), VERSION_PATCH.to_string());
    }

    #[test]
    fn negotiate_accepts_current_and_older_minor() {
        assert_eq!(
            negotiate(Version::CURRENT),
            VersionAction::Accept
        );
        assert_eq!(
            negotiate(Version::new(VERSION_MAJOR, 0, 7)),
            VersionAction::Accept
        );
    }

    #[test]
    fn negotiate_warns_on_newer_minor() {
        assert_eq!(
            negotiate(Version::new(VERSION_MAJOR, VERSION_MINOR + 1, 0)),
            VersionAction::WarnForward
        );
    }

    #[test]
    fn negotiate_takes_legacy_path_for_3_9() {
        assert_eq!(
            negotiate(Version::new(3, 9, 2)),
            VersionAction::LegacyMigrate
        );
    }

    #[test]
    fn negotiate_rejects_other_majors() {
        assert_eq!(negotiate(Version::new(3, 8, 0)), VersionAction::Reject);
        assert_eq!(negotiate(Version::new(2, 9, 0)), VersionAction::Reject);
        assert_eq!(
            negotiate(Version::new(VERSION_MAJOR - 1, VERSION_MINOR, 0)),
            VersionAction::Reject
        );
        assert_eq!(
            negotiate(Version::new(VERSION_MAJOR + 1, 0, 0)),
            VersionAction::Reject
        );
    }
}
