//! Content addressing of canonical URLs.
//!
//! Every persisted row is keyed by a 128-bit MD5 digest of the canonical URL.
//! The digest is a partitioning key, not a security boundary.

use std::fmt;

use md5::{Digest, Md5};
use rusqlite::ToSql;
use rusqlite::types::ToSqlOutput;

use crate::canonical::CanonicalUrl;

/// Size of a [`UrlDigest`] in bytes.
pub const DIGEST_LEN: usize = 16;

/// Storage key derived from a canonical URL.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UrlDigest([u8; DIGEST_LEN]);

impl UrlDigest {
    /// Digest a canonical URL.
    pub fn of(url: &CanonicalUrl) -> Self {
        Self::of_str(url.as_str())
    }

    /// Digest an already-canonical URL string.
    pub fn of_str(canonical: &str) -> Self {
        let mut bytes = [0u8; DIGEST_LEN];
        bytes.copy_from_slice(&Md5::digest(canonical.as_bytes()));
        Self(bytes)
    }

    /// The raw digest bytes, as stored in SQLite.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

impl From<[u8; DIGEST_LEN]> for UrlDigest {
    fn from(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for UrlDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for UrlDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UrlDigest({self})")
    }
}

impl ToSql for UrlDigest {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(&self.0[..]))
    }
}
