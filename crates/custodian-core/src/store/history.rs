//! History records of applied migrations.

use rkyv::{Archive, Deserialize, Serialize};

use crate::error::Error;

/// One applied migration.
///
/// Records are written on forward apply and deleted on rollback; they are
/// never updated. `operations` and `meta_state` hold the JSON of the
/// migration's operation list and resulting description.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Migration id.
    pub id: String,
    /// Target type name at apply time, empty for type creation.
    pub apply_to: String,
    /// Type the migration left behind: its resulting name, or the deleted
    /// type's name.
    pub object: String,
    /// Parent migration ids.
    pub depends_on: Vec<String>,
    /// Operation list, as JSON.
    pub operations: String,
    /// Resulting description, as JSON. Empty when the type was deleted.
    pub meta_state: String,
    /// blake3 digest of `meta_state`, hex encoded.
    pub meta_state_digest: String,
    /// Free-form description.
    pub description: String,
    /// Creation time in microseconds since the Unix epoch.
    pub created: i64,
    /// Store-assigned, monotonically increasing application order.
    pub order: u64,
}

/// Hex-encoded blake3 digest of a snapshot.
pub fn snapshot_digest(snapshot: &str) -> String {
    hex::encode(blake3::hash(snapshot.as_bytes()).as_bytes())
}

impl HistoryRecord {
    /// Build a record stamped with the current time. `order` is assigned
    /// when the record is written.
    pub fn new(
        id: impl Into<String>,
        apply_to: impl Into<String>,
        object: impl Into<String>,
        depends_on: Vec<String>,
        operations: String,
        meta_state: String,
        description: impl Into<String>,
    ) -> Self {
        let meta_state_digest = snapshot_digest(&meta_state);
        Self {
            id: id.into(),
            apply_to: apply_to.into(),
            object: object.into(),
            depends_on,
            operations,
            meta_state,
            meta_state_digest,
            description: description.into(),
            created: chrono::Utc::now().timestamp_micros(),
            order: 0,
        }
    }

    /// Whether the stored snapshot still matches its digest.
    pub fn verify(&self) -> bool {
        snapshot_digest(&self.meta_state) == self.meta_state_digest
    }

    /// Creation time.
    pub fn created_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp_micros(self.created)
    }

    /// Serialize the record using rkyv.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a record using rkyv.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_bytes() {
        let mut record = HistoryRecord::new(
            "m1",
            "a",
            "a",
            vec!["m0".to_string()],
            "[]".to_string(),
            r#"{"name":"a"}"#.to_string(),
            "add title",
        );
        record.order = 7;

        let decoded = HistoryRecord::from_bytes(&record.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, record);
        assert!(decoded.verify());
        assert!(decoded.created_at().is_some());
    }

    #[test]
    fn test_tampered_snapshot() {
        let mut record = HistoryRecord::new("m1", "a", "a", Vec::new(), "[]".to_string(), "{}".to_string(), "");
        record.meta_state = r#"{"name":"b"}"#.to_string();
        assert!(!record.verify());
    }
}
