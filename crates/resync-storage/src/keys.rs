//! Key encoding and decoding for storage layer.
//!
//! Key formats:
//! - `item:{item_id}`
//! - `collection:{collection_id}`
//! - `member:{collection_id}:{item_id}`
//! - `lease:{job_name}`
//!
//! Ids are ULIDs, so item keys sort in creation order and a collection's
//! membership keys form one contiguous prefix range.

use crate::error::StorageError;

/// Key for item records
/// Format: item:{item_id}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemKey {
    pub item_id: String,
}

impl ItemKey {
    pub fn new(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("item:{}", self.item_id).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;
        match s.strip_prefix("item:") {
            Some(id) if !id.is_empty() => Ok(Self::new(id)),
            _ => Err(StorageError::Key(format!("Invalid item key format: {}", s))),
        }
    }
}

/// Key for collection records
/// Format: collection:{collection_id}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionKey {
    pub collection_id: String,
}

impl CollectionKey {
    pub fn new(collection_id: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("collection:{}", self.collection_id).into_bytes()
    }
}

/// Key for collection membership entries
/// Format: member:{collection_id}:{item_id}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipKey {
    pub collection_id: String,
    pub item_id: String,
}

impl MembershipKey {
    pub fn new(collection_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            item_id: item_id.into(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("member:{}:{}", self.collection_id, self.item_id).into_bytes()
    }

    /// Prefix shared by every member of a collection
    pub fn prefix(collection_id: &str) -> Vec<u8> {
        format!("member:{}:", collection_id).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;

        let parts: Vec<&str> = s.splitn(3, ':').collect();
        if parts.len() != 3 || parts[0] != "member" || parts[1].is_empty() || parts[2].is_empty()
        {
            return Err(StorageError::Key(format!(
                "Invalid membership key format: {}",
                s
            )));
        }

        Ok(Self::new(parts[1], parts[2]))
    }
}

/// Key for run leases
/// Format: lease:{job_name}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseKey {
    pub job_name: String,
}

impl LeaseKey {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("lease:{}", self.job_name).into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_key_roundtrip() {
        let key = ItemKey::new("01HN4QXKN6YWXVKZ3JMHP4BCDE");
        let decoded = ItemKey::from_bytes(&key.to_bytes()).unwrap();
        assert_eq!(key, decoded);
        assert!(ItemKey::from_bytes(b"collection:abc").is_err());
        assert!(ItemKey::from_bytes(b"item:").is_err());
    }

    #[test]
    fn test_membership_key_parse() {
        let key = MembershipKey::new("col1", "item1");
        assert_eq!(key.to_bytes(), b"member:col1:item1".to_vec());
        let decoded = MembershipKey::from_bytes(&key.to_bytes()).unwrap();
        assert_eq!(decoded.collection_id, "col1");
        assert_eq!(decoded.item_id, "item1");
        assert!(MembershipKey::from_bytes(b"member:col1").is_err());
    }

    #[test]
    fn test_membership_prefix_covers_members() {
        let prefix = MembershipKey::prefix("col1");
        assert!(MembershipKey::new("col1", "x").to_bytes().starts_with(&prefix));
        assert!(!MembershipKey::new("col10", "x").to_bytes().starts_with(&prefix));
    }

    #[test]
    fn test_lease_key() {
        assert_eq!(
            LeaseKey::new("index-db-resync").to_bytes(),
            b"lease:index-db-resync".to_vec()
        );
    }
}
