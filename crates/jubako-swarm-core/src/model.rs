//! Domain types shared by the orchestrator, registry, and stream router.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use data_encoding::BASE32;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::error::LocatorError;

/// Byte length of a v1 info-hash.
pub const CONTENT_ID_LEN: usize = 20;

const HEX_LEN: usize = CONTENT_ID_LEN * 2;
const BASE32_LEN: usize = 32;
const BTIH_PREFIX: &str = "urn:btih:";

/// Fixed-size identifier of one swarm's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId([u8; CONTENT_ID_LEN]);

impl ContentId {
    /// Wrap raw info-hash bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; CONTENT_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw info-hash bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; CONTENT_ID_LEN] {
        &self.0
    }

    /// Lowercase 40-character hex rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the 40-character hex form (either case).
    ///
    /// # Errors
    ///
    /// Returns [`LocatorError`] when the length or alphabet is wrong.
    pub fn from_hex(value: &str) -> Result<Self, LocatorError> {
        if value.len() != HEX_LEN {
            return Err(LocatorError::InvalidLength {
                length: value.len(),
            });
        }
        let mut bytes = [0_u8; CONTENT_ID_LEN];
        hex::decode_to_slice(value, &mut bytes).map_err(|_| LocatorError::InvalidHex)?;
        Ok(Self(bytes))
    }

    /// Parse the 32-character RFC 4648 base32 form (either case).
    ///
    /// # Errors
    ///
    /// Returns [`LocatorError`] when the length or alphabet is wrong.
    pub fn from_base32(value: &str) -> Result<Self, LocatorError> {
        if value.len() != BASE32_LEN {
            return Err(LocatorError::InvalidLength {
                length: value.len(),
            });
        }
        let decoded = BASE32
            .decode(value.to_ascii_uppercase().as_bytes())
            .map_err(|_| LocatorError::InvalidBase32)?;
        let bytes: [u8; CONTENT_ID_LEN] = decoded
            .try_into()
            .map_err(|_| LocatorError::InvalidBase32)?;
        Ok(Self(bytes))
    }

    /// Parse an info-hash in either the hex or the base32 form.
    ///
    /// # Errors
    ///
    /// Returns [`LocatorError`] when neither form matches.
    pub fn parse_info_hash(value: &str) -> Result<Self, LocatorError> {
        match value.len() {
            HEX_LEN => Self::from_hex(value),
            BASE32_LEN => Self::from_base32(value),
            length => Err(LocatorError::InvalidLength { length }),
        }
    }
}

impl Display for ContentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ContentId {
    type Err = LocatorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_hex(value)
    }
}

impl Serialize for ContentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Parsed magnet URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLocator {
    uri: String,
    content_id: ContentId,
    display_name: Option<String>,
    trackers: Vec<String>,
}

impl MagnetLocator {
    /// Parse a `magnet:` URI carrying a `urn:btih:` exact topic.
    ///
    /// # Errors
    ///
    /// Returns [`LocatorError`] when the text is not a magnet URI or the
    /// info-hash is missing or malformed.
    pub fn parse(uri: &str) -> Result<Self, LocatorError> {
        let trimmed = uri.trim();
        let url = Url::parse(trimmed).map_err(|_| LocatorError::InvalidUri)?;
        if url.scheme() != "magnet" {
            return Err(LocatorError::NotMagnet {
                scheme: url.scheme().to_string(),
            });
        }

        let mut content_id = None;
        let mut display_name = None;
        let mut trackers = Vec::new();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "xt" if content_id.is_none() => {
                    if let Some(hash) = strip_btih(&value) {
                        content_id = Some(ContentId::parse_info_hash(hash)?);
                    }
                }
                "dn" => display_name = Some(value.into_owned()),
                "tr" => trackers.push(value.into_owned()),
                _ => {}
            }
        }

        let content_id = content_id.ok_or(LocatorError::MissingInfoHash)?;
        Ok(Self {
            uri: trimmed.to_string(),
            content_id,
            display_name,
            trackers,
        })
    }

    /// Original locator text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.uri
    }

    /// Content identifier from the exact topic.
    #[must_use]
    pub const fn content_id(&self) -> ContentId {
        self.content_id
    }

    /// Display name when the locator carried one.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Tracker announce URLs in locator order.
    #[must_use]
    pub fn trackers(&self) -> &[String] {
        &self.trackers
    }
}

fn strip_btih(value: &str) -> Option<&str> {
    let prefix = value.get(..BTIH_PREFIX.len())?;
    prefix
        .eq_ignore_ascii_case(BTIH_PREFIX)
        .then(|| &value[BTIH_PREFIX.len()..])
}

impl FromStr for MagnetLocator {
    type Err = LocatorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Display for MagnetLocator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

/// File entry of a resolved transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmFile {
    /// Position of the file within the transfer.
    pub index: usize,
    /// Path relative to the transfer root, `/` separated.
    pub path: String,
    /// File length in bytes.
    pub length: u64,
}

/// Completed and total byte counts for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileProgress {
    /// Bytes verified and written locally.
    pub completed: u64,
    /// File length, zero while unknown.
    pub total: u64,
}

impl FileProgress {
    /// Whether the total is known and reached.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.total > 0 && self.completed >= self.total
    }

    /// Percentage complete in the 0-100 range.
    #[expect(
        clippy::cast_precision_loss,
        reason = "byte counts only feed a display percentage"
    )]
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            ((self.completed as f64 / self.total as f64) * 100.0).min(100.0)
        }
    }
}

/// One progress report of an acquisition task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Content identifier of the transfer.
    pub content_id: ContentId,
    /// Display path of the selected file.
    pub path: String,
    /// Percentage complete, 100 exactly on the final report.
    pub percent: f64,
    /// Peers currently connected for the transfer.
    pub active_peers: usize,
}
