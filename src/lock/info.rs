// ABOUTME: Lock record and file path normalization.
// ABOUTME: Every lock key is derived from a normalized path, so spellings of one file share a lock.

use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::clock;
use crate::error::CoordError;

static REPEATED_SLASHES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/{2,}").expect("valid slash regex"));

static CURRENT_DIR_SEGMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(?:\./)+").expect("valid dot-segment regex"));

/// Canonical form of a file path used for lock keys.
///
/// Backslashes become forward slashes, repeated slashes and `./` segments
/// collapse, and leading `/` or `./` is stripped. An empty result is
/// rejected.
pub fn normalize_path(raw: &str) -> Result<String, CoordError> {
    let path = raw.trim().replace('\\', "/");
    let path = REPEATED_SLASHES.replace_all(&path, "/");
    let path = CURRENT_DIR_SEGMENTS.replace_all(&path, "/");

    let mut path: &str = &path;
    loop {
        if let Some(rest) = path.strip_prefix("./") {
            path = rest;
        } else if let Some(rest) = path.strip_prefix('/') {
            path = rest;
        } else {
            break;
        }
    }
    let path = path.strip_suffix("/.").unwrap_or(path);

    if path.is_empty() || path == "." {
        return Err(CoordError::InvalidParams(format!(
            "file path {raw:?} is empty after normalization"
        )));
    }
    Ok(path.to_string())
}

/// An advisory lock on one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    /// Normalized path.
    pub file: String,
    pub agent_id: String,
    #[serde(default)]
    pub reason: String,
    pub locked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LockInfo {
    pub fn new(
        file: impl Into<String>,
        agent_id: impl Into<String>,
        reason: impl Into<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            file: file.into(),
            agent_id: agent_id.into(),
            reason: reason.into(),
            locked_at: now,
            expires_at: clock::after(now, ttl),
        }
    }

    /// A lock is expired once `now` reaches `expires_at`, whatever the store says.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_held_by(&self, agent_id: &str) -> bool {
        self.agent_id == agent_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_equivalent_spellings() {
        for raw in [
            "src/x.ts",
            "/src/x.ts",
            "./src/x.ts",
            "src//x.ts",
            "src\\x.ts",
            "\\src\\x.ts",
            "src/./x.ts",
            " ./src/././x.ts ",
        ] {
            assert_eq!(normalize_path(raw).unwrap(), "src/x.ts", "input {raw:?}");
        }
    }

    #[test]
    fn test_normalize_keeps_distinct_paths_distinct() {
        assert_ne!(
            normalize_path("src/x.ts").unwrap(),
            normalize_path("src/y.ts").unwrap()
        );
        assert_eq!(normalize_path("../x.ts").unwrap(), "../x.ts");
    }

    #[test]
    fn test_normalize_rejects_empty() {
        for raw in ["", "   ", "/", "./", "//"] {
            assert!(
                matches!(normalize_path(raw), Err(CoordError::InvalidParams(_))),
                "input {raw:?}"
            );
        }
    }

    #[test]
    fn test_expiry_is_inclusive() {
        let now = Utc::now();
        let info = LockInfo::new("a", "A", "", now, Duration::from_secs(1));
        assert!(!info.is_expired(now));
        assert!(info.is_expired(info.expires_at));
    }

    #[test]
    fn test_serializes_camel_case() {
        let info = LockInfo::new("a.ts", "A", "edit", Utc::now(), Duration::from_secs(60));
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["agentId"], "A");
        assert!(json.get("expiresAt").is_some());
        assert!(json.get("lockedAt").is_some());
    }
}
