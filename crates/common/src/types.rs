use uuid::Uuid;

/// Unique identifier for a global transaction.
///
/// An id is minted by the storage backend when a transaction is first saved,
/// and from then on keys everything the coordinator persists: the
/// transaction row, every per-step result, and the retry index entry. The
/// coordinator itself never creates ids; a transaction without one has never
/// been saved.
///
/// Backed by a UUID so independently minted ids cannot collide, but the
/// wrapper deliberately exposes no conversions beyond what the storage
/// boundary needs: ids are opaque to everything above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxId(Uuid);

impl TxId {
    /// Mints a fresh id. For storage backends assigning an id on first save.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Rebuilds an id from its stored column value.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The raw UUID, for binding to a database column.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn generated_ids_do_not_collide() {
        let id1 = TxId::generate();
        let id2 = TxId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn survives_a_column_round_trip() {
        let id = TxId::generate();
        assert_eq!(TxId::from_uuid(id.as_uuid()), id);
    }

    #[test]
    fn display_matches_the_stored_uuid() {
        let uuid = Uuid::new_v4();
        assert_eq!(TxId::from_uuid(uuid).to_string(), uuid.to_string());
    }

    #[test]
    fn keys_step_results_like_the_stores_do() {
        let mut results: HashMap<(TxId, usize), &str> = HashMap::new();
        let id = TxId::generate();

        results.insert((id, 0), "success");
        results.insert((id, 0), "fail");
        results.insert((id, 1), "success");

        // Same key upserts, different offsets do not collide.
        assert_eq!(results.len(), 2);
        assert_eq!(results[&(TxId::from_uuid(id.as_uuid()), 0)], "fail");
        assert!(!results.contains_key(&(TxId::generate(), 0)));
    }
}
