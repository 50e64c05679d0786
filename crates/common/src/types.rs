use std::{
    fmt,
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

use crate::Error;

/// A platform family. Each family owns exactly one account registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Page-based messengers (pages and their linked Instagram accounts).
    Messenger,
    /// Business-phone messaging (business accounts owning phone numbers).
    WhatsApp,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Messenger, Platform::WhatsApp];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Messenger => "messenger",
            Self::WhatsApp => "whatsapp",
        }
    }

    /// Stable one-byte tag used by the backup format.
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            Self::Messenger => 1,
            Self::WhatsApp => 2,
        }
    }

    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Messenger),
            2 => Some(Self::WhatsApp),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "messenger" | "facebook" => Ok(Self::Messenger),
            "whatsapp" => Ok(Self::WhatsApp),
            other => Err(Error::UnknownPlatform(other.to_string())),
        }
    }
}

/// The network an inbound message arrived on.
///
/// Instagram traffic is carried by pages, so it belongs to the messenger family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Messenger,
    Instagram,
    WhatsApp,
}

impl Network {
    #[must_use]
    pub fn platform(self) -> Platform {
        match self {
            Self::Messenger | Self::Instagram => Platform::Messenger,
            Self::WhatsApp => Platform::WhatsApp,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Messenger => "messenger",
            Self::Instagram => "instagram",
            Self::WhatsApp => "whatsapp",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Seconds since the Unix epoch.
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
