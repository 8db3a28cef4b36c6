//! Build version reporting

use serde::{Deserialize, Serialize};
use std::io::{self, Write};

const UNSET: &str = "unset";

/// Release, build time and commit baked in at compile time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub release: String,
    #[serde(rename = "build-time")]
    pub build_time: String,
    pub commit: String,
}

impl VersionInfo {
    /// Version of this build; commit and build time come from
    /// `SPA_SERVER_COMMIT` and `SPA_SERVER_BUILD_TIME` at compile time
    pub fn current() -> Self {
        Self {
            release: env!("CARGO_PKG_VERSION").to_string(),
            build_time: option_env!("SPA_SERVER_BUILD_TIME")
                .unwrap_or(UNSET)
                .to_string(),
            commit: option_env!("SPA_SERVER_COMMIT").unwrap_or(UNSET).to_string(),
        }
    }
}

/// Write the current version as pretty JSON followed by a newline
pub fn print(writer: &mut impl Write) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *writer, &VersionInfo::current())?;
    writer.write_all(b"\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prints_version_to_writer() {
        let mut out = Vec::new();
        print(&mut out).unwrap();

        assert!(out.ends_with(b"}\n"));
        let parsed: VersionInfo = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed, VersionInfo::current());
        assert_eq!(parsed.release, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_build_time_key_is_hyphenated() {
        let json = serde_json::to_value(VersionInfo::current()).unwrap();
        assert!(json.get("build-time").is_some());
        assert!(json.get("build_time").is_none());
    }
}
