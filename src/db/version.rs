// PostgreSQL Version Detection
// Parses `SELECT version()` output and answers capability questions from (major, minor)

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::db::queries::SELECT_VERSION;
use crate::db::traits::DiagnosticError;

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"PostgreSQL (\d+)\.(\d+)(?:\.(\d+))?").expect("version pattern is valid")
});

/// Detected server version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    /// Raw `version()` output, kept verbatim for display
    pub full_string: String,
}

impl ServerVersion {
    pub fn new(major: u32, minor: u32, patch: u32, full_string: impl Into<String>) -> Self {
        Self {
            major,
            minor,
            patch,
            full_string: full_string.into(),
        }
    }

    /// Parse the leading `PostgreSQL <major>.<minor>[.<patch>]` of a version string
    pub fn parse(version_string: &str) -> Result<Self, DiagnosticError> {
        let unparsable = || DiagnosticError::VersionUnparsable(version_string.to_string());

        let caps = VERSION_PATTERN
            .captures(version_string)
            .ok_or_else(unparsable)?;

        let major = caps[1].parse::<u32>().map_err(|_| unparsable())?;
        let minor = caps[2].parse::<u32>().map_err(|_| unparsable())?;
        let patch = match caps.get(3) {
            Some(m) => m.as_str().parse::<u32>().map_err(|_| unparsable())?,
            None => 0,
        };

        Ok(Self::new(major, minor, patch, version_string))
    }

    /// pg_stat_wal exists from 14 on
    pub fn supports_wal_stats(&self) -> bool {
        self.major >= 14
    }

    /// Checkpoint counters moved from pg_stat_bgwriter to pg_stat_checkpointer in 17
    pub fn supports_checkpointer_view(&self) -> bool {
        self.major >= 17
    }

    /// pg_blocking_pids() appeared in 9.6
    pub fn supports_blocking_pid_function(&self) -> bool {
        self.major >= 10 || (self.major == 9 && self.minor >= 6)
    }

    /// pg_stat_statements renamed total_time & co. to *_exec_time in 13
    pub fn supports_exec_time_columns(&self) -> bool {
        self.major >= 13
    }

    pub(crate) fn require(
        &self,
        supported: bool,
        feature: &'static str,
        required: &'static str,
    ) -> Result<(), DiagnosticError> {
        if supported {
            Ok(())
        } else {
            Err(DiagnosticError::UnsupportedOnVersion {
                feature,
                required,
                major: self.major,
                minor: self.minor,
            })
        }
    }
}

impl std::fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Query and parse the version of the server behind `client`
pub async fn detect_version(
    client: &tokio_postgres::Client,
) -> Result<ServerVersion, DiagnosticError> {
    let row = client
        .query_one(SELECT_VERSION, &[])
        .await
        .map_err(|e| DiagnosticError::VersionQueryFailed(e.to_string()))?;

    let version_string: String = row
        .try_get(0)
        .map_err(|e| DiagnosticError::VersionQueryFailed(e.to_string()))?;

    ServerVersion::parse(&version_string)
}
