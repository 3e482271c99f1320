use crate::error::ProbeError;
use crate::model::ServerEra;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use tracing::warn;

/// Dotted server version, e.g. `5.6.51` out of `5.6.51-log`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServerVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl ServerVersion {
    /// First version that handles per-statement isolation syntax.
    pub const MODERN_FLOOR: ServerVersion = ServerVersion::new(5, 7, 0);

    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parses the leading `major.minor[.patch]` of a reported version string.
    /// Vendor suffixes (`-log`, `-MariaDB`, `-0ubuntu0.22.04.1`) are ignored.
    pub fn parse(input: &str) -> Result<Self, ProbeError> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| {
            Regex::new(r"^\s*(\d+)\.(\d+)(?:\.(\d+)(?:\.\d+)?)?(?:[^\d.]|$)")
                .expect("valid version regex")
        });
        let caps = re
            .captures(input)
            .ok_or_else(|| ProbeError::VersionParse(input.to_string()))?;

        let component = |idx: usize| -> Result<u16, ProbeError> {
            match caps.get(idx) {
                Some(m) => m
                    .as_str()
                    .parse()
                    .map_err(|_| ProbeError::VersionParse(input.to_string())),
                None => Ok(0),
            }
        };

        Ok(Self {
            major: component(1)?,
            minor: component(2)?,
            patch: component(3)?,
        })
    }

    pub fn era(&self) -> ServerEra {
        if *self < Self::MODERN_FLOOR {
            ServerEra::Legacy
        } else {
            ServerEra::Modern
        }
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Classifies a reported version string. Unparseable strings are treated as
/// modern servers.
pub fn server_era(version: &str) -> ServerEra {
    match ServerVersion::parse(version) {
        Ok(v) => v.era(),
        Err(err) => {
            warn!(%err, "treating server as 5.7+");
            ServerEra::Modern
        }
    }
}

pub fn is_legacy_server(version: &str) -> bool {
    server_era(version) == ServerEra::Legacy
}
