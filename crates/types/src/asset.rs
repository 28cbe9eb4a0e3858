//! Asset records tracked by the asset contract.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Number of positional arguments taken by `CreateAsset`.
pub const CREATE_ASSET_ARG_COUNT: usize = 9;

/// Commit timestamp of a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LedgerTimestamp {
    pub seconds: i64,
    pub nanos: i32,
}

impl LedgerTimestamp {
    pub fn from_micros(micros: u64) -> Self {
        Self {
            seconds: (micros / 1_000_000) as i64,
            nanos: ((micros % 1_000_000) * 1_000) as i32,
        }
    }

    pub fn as_micros(&self) -> u64 {
        (self.seconds.max(0) as u64) * 1_000_000 + (self.nanos.max(0) as u64) / 1_000
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.seconds, self.nanos.max(0) as u32)
    }
}

impl std::fmt::Display for LedgerTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_datetime() {
            Some(dt) => f.write_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => write!(f, "{}.{:09}", self.seconds, self.nanos),
        }
    }
}

/// Asset record keyed by the content identifier of the uploaded bytes.
///
/// Everything except `owner_info` and `description` is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub hash_id: String,
    pub file_name: String,
    pub file_type: String,
    pub file_extension: String,
    pub file_size: u64,
    pub upload_time: DateTime<Utc>,
    pub content_path: String,
    pub owner_info: String,
    pub description: String,
}

impl Asset {
    /// Positional arguments for a `CreateAsset` transaction.
    pub fn create_args(&self) -> Vec<String> {
        vec![
            self.hash_id.clone(),
            self.file_name.clone(),
            self.file_type.clone(),
            self.file_extension.clone(),
            self.file_size.to_string(),
            self.upload_time.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.content_path.clone(),
            self.owner_info.clone(),
            self.description.clone(),
        ]
    }

    /// True when the immutable creation fields of both records agree.
    pub fn same_origin(&self, other: &Asset) -> bool {
        self.hash_id == other.hash_id
            && self.file_name == other.file_name
            && self.file_type == other.file_type
            && self.file_extension == other.file_extension
            && self.file_size == other.file_size
            && self.upload_time == other.upload_time
            && self.content_path == other.content_path
    }
}

/// One committed version of an asset's mutable fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetHistoryEntry {
    pub tx_id: String,
    pub timestamp: LedgerTimestamp,
    #[serde(default)]
    pub is_delete: bool,
    pub owner_info: String,
    pub description: String,
}

/// Listing row returned by `GetAssetsByRange`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AssetRecord {
    pub key: String,
    pub record: Asset,
}

/// Extension of a file name: the text after the last `.`, or empty.
pub fn file_extension(file_name: &str) -> String {
    match file_name.rfind('.') {
        Some(idx) => file_name[idx + 1..].to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_asset() -> Asset {
        Asset {
            hash_id: "abc".into(),
            file_name: "notes.txt".into(),
            file_type: "text/plain".into(),
            file_extension: "txt".into(),
            file_size: 5,
            upload_time: DateTime::parse_from_rfc3339("2024-03-01T10:00:00.123456Z")
                .unwrap()
                .with_timezone(&Utc),
            content_path: "/content/abc".into(),
            owner_info: "alice".into(),
            description: "test".into(),
        }
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("photo.jpeg"), "jpeg");
        assert_eq!(file_extension("archive.tar.gz"), "gz");
        assert_eq!(file_extension("README"), "");
        assert_eq!(file_extension("trailing."), "");
        assert_eq!(file_extension(".env"), "env");
    }

    #[test]
    fn test_asset_json_uses_camel_case() {
        let json = serde_json::to_value(sample_asset()).unwrap();
        assert_eq!(json["hashId"], "abc");
        assert_eq!(json["fileSize"], 5);
        assert_eq!(json["ownerInfo"], "alice");
        assert!(json.get("hash_id").is_none());
    }

    #[test]
    fn test_create_args_order() {
        let args = sample_asset().create_args();
        assert_eq!(args.len(), CREATE_ASSET_ARG_COUNT);
        assert_eq!(args[0], "abc");
        assert_eq!(args[4], "5");
        assert_eq!(args[5], "2024-03-01T10:00:00.123456Z");
        assert_eq!(args[8], "test");
    }

    #[test]
    fn test_same_origin_ignores_mutable_fields() {
        let original = sample_asset();
        let mut edited = original.clone();
        edited.owner_info = "bob".into();
        edited.description = "changed".into();
        assert!(original.same_origin(&edited));

        edited.file_size = 6;
        assert!(!original.same_origin(&edited));
    }

    #[test]
    fn test_timestamp_conversion() {
        let ts = LedgerTimestamp::from_micros(1_700_000_000_250_000);
        assert_eq!(ts.seconds, 1_700_000_000);
        assert_eq!(ts.nanos, 250_000_000);
        assert_eq!(ts.as_micros(), 1_700_000_000_250_000);
        assert!(ts < LedgerTimestamp::from_micros(1_700_000_000_250_001));
        assert_eq!(ts.to_string(), "2023-11-14T22:13:20.250Z");
    }
}
