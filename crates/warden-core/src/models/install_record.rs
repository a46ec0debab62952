//! The persisted version stamp of an install directory.

use crate::config::InstallConfig;
use crate::models::release::parse_version;
use chrono::Utc;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What is installed and when the registry was last asked about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRecord {
    /// Installed version (semantic version string).
    pub version: String,
    /// Epoch milliseconds of the last registry check.
    pub last_update: i64,
}

impl InstallRecord {
    pub fn new(version: impl Into<String>, last_update: i64) -> Self {
        Self {
            version: version.into(),
            last_update,
        }
    }

    /// The record used when nothing valid is installed.
    ///
    /// Its check time lies infinitely far in the past, so the next check
    /// always goes to the registry.
    pub fn sentinel() -> Self {
        Self {
            version: InstallConfig::SENTINEL_VERSION.to_string(),
            last_update: i64::MIN,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.last_update == i64::MIN && self.version == InstallConfig::SENTINEL_VERSION
    }

    /// Parsed version, or `None` if the stored string is not a semantic version.
    pub fn parsed_version(&self) -> Option<Version> {
        parse_version(&self.version).ok()
    }

    /// Milliseconds elapsed between the last check and `now_ms`.
    pub fn millis_since_check(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.last_update)
    }

    /// Whether the last check happened no more than `interval` before `now_ms`.
    ///
    /// A check stamped after `now_ms` is stale, so a clock that ran ahead
    /// cannot suppress update checks.
    pub fn is_fresh(&self, now_ms: i64, interval: Duration) -> bool {
        let interval_ms = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX);
        let elapsed = self.millis_since_check(now_ms);
        (0..=interval_ms).contains(&elapsed)
    }

    /// Copy of this record stamped with a new check time.
    pub fn checked_at(&self, version: impl Into<String>, now_ms: i64) -> Self {
        Self {
            version: version.into(),
            last_update: now_ms,
        }
    }
}

impl Default for InstallRecord {
    fn default() -> Self {
        Self::sentinel()
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_field_names() {
        let record = InstallRecord::new("1.2.0", 1_700_000_000_000);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"version":"1.2.0","lastUpdate":1700000000000}"#);
    }

    #[test]
    fn test_sentinel_is_never_fresh() {
        let sentinel = InstallRecord::sentinel();
        assert!(sentinel.is_sentinel());
        assert!(!sentinel.is_fresh(now_millis(), InstallConfig::CHECK_INTERVAL));
        assert_eq!(sentinel.parsed_version(), Some(Version::new(0, 0, 0)));
    }

    #[test]
    fn test_freshness_window() {
        let now = now_millis();
        let recent = InstallRecord::new("1.2.0", now - 10_000);
        assert!(recent.is_fresh(now, InstallConfig::CHECK_INTERVAL));

        let at_limit = InstallRecord::new("1.2.0", now - 480_000);
        assert!(at_limit.is_fresh(now, InstallConfig::CHECK_INTERVAL));

        let stale = InstallRecord::new("1.2.0", now - 480_001);
        assert!(!stale.is_fresh(now, InstallConfig::CHECK_INTERVAL));
    }

    #[test]
    fn test_check_from_the_future_is_stale() {
        let now = now_millis();
        let ahead = InstallRecord::new("1.2.0", now + 1);
        assert!(!ahead.is_fresh(now, InstallConfig::CHECK_INTERVAL));

        let far_ahead = InstallRecord::new("1.2.0", now + 86_400_000);
        assert!(!far_ahead.is_fresh(now, InstallConfig::CHECK_INTERVAL));
    }
}
