//! Decoding of the raw version string reported by the device.
//!
//! EC images identify themselves as `board_vMAJOR.MINOR.PATCH-hash`, with a
//! `-dirty` suffix for builds from a modified tree, e.g.
//! `hammer_v1.1.2173-e6b8a4e3b-dirty`.

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Version string is empty")]
    Empty,
    #[error("Version marker '_v' not found")]
    MissingMarker,
    #[error("Invalid version triplet {0:?}")]
    InvalidTriplet(String),
    #[error("Source hash missing after the version triplet")]
    MissingHash,
}

/// Structured firmware version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirmwareVersion {
    /// Dotted version, e.g. `1.1.2173`.
    pub triplet: String,
    pub board_name: String,
    /// Source revision the image was built from.
    pub hash: String,
    /// Built from a tree with uncommitted changes.
    pub dirty: bool,
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_v{}-{}", self.board_name, self.triplet, self.hash)?;
        if self.dirty {
            write!(f, "-dirty")?;
        }
        Ok(())
    }
}

/// Turns the raw version string into a [`FirmwareVersion`].
pub trait VersionDecoder {
    fn decode(&self, raw: &str) -> Result<FirmwareVersion, VersionError>;
}

/// Decoder for ChromeOS EC version strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrosEcVersionDecoder;

impl VersionDecoder for CrosEcVersionDecoder {
    fn decode(&self, raw: &str) -> Result<FirmwareVersion, VersionError> {
        let raw = raw.trim_end_matches('\0').trim();
        if raw.is_empty() {
            return Err(VersionError::Empty);
        }

        let (board_name, rest) = raw.split_once("_v").ok_or(VersionError::MissingMarker)?;

        let (triplet, tail) = match rest.split_once('-') {
            Some((triplet, tail)) => (triplet, tail),
            None => (rest, ""),
        };
        let parts: Vec<&str> = triplet.split('.').collect();
        if parts.len() < 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(VersionError::InvalidTriplet(triplet.to_string()));
        }

        let hash = tail.split('-').next().unwrap_or_default();
        if hash.is_empty() {
            return Err(VersionError::MissingHash);
        }
        let dirty = tail.split('-').skip(1).any(|p| p == "dirty");

        Ok(FirmwareVersion {
            triplet: triplet.to_string(),
            board_name: board_name.to_string(),
            hash: hash.to_string(),
            dirty,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_clean() {
        let v = CrosEcVersionDecoder
            .decode("hammer_v1.1.2173-e6b8a4e3b")
            .unwrap();
        assert_eq!(v.board_name, "hammer");
        assert_eq!(v.triplet, "1.1.2173");
        assert_eq!(v.hash, "e6b8a4e3b");
        assert!(!v.dirty);
        assert_eq!(v.to_string(), "hammer_v1.1.2173-e6b8a4e3b");
    }

    #[test]
    fn test_decode_dirty() {
        let v = CrosEcVersionDecoder
            .decode("staff_v2.0.7-8c1d1f2-dirty\0\0\0")
            .unwrap();
        assert_eq!(v.board_name, "staff");
        assert_eq!(v.triplet, "2.0.7");
        assert_eq!(v.hash, "8c1d1f2");
        assert!(v.dirty);
    }

    #[test]
    fn test_decode_board_with_underscore() {
        let v = CrosEcVersionDecoder
            .decode("zed_tp_v1.2.3-abc")
            .unwrap();
        assert_eq!(v.board_name, "zed_tp");
        assert_eq!(v.triplet, "1.2.3");
    }

    #[test]
    fn test_decode_failures() {
        let d = CrosEcVersionDecoder;
        assert_eq!(d.decode(""), Err(VersionError::Empty));
        assert_eq!(d.decode("hammer-1.2.3"), Err(VersionError::MissingMarker));
        assert!(matches!(
            d.decode("hammer_v1.1-abc"),
            Err(VersionError::InvalidTriplet(_))
        ));
        assert_eq!(d.decode("hammer_v1.1.2173"), Err(VersionError::MissingHash));
        assert_eq!(d.decode("hammer_v1.1.2173-"), Err(VersionError::MissingHash));
    }
}
