use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use redis::{AsyncCommands, aio::ConnectionManager};

use crate::wstrust::error::ProviderError;

type Result<T> = std::result::Result<T, ProviderError>;

/// Records canceled tokens by token type and id.
///
/// Entries are never removed: a canceled token stays canceled.
#[async_trait]
pub trait RevocationRegistry: Send + Sync {
    async fn is_revoked(&self, token_type: &str, id: &str) -> Result<bool>;

    async fn revoke(&self, token_type: &str, id: &str) -> Result<()>;
}

/// An in-memory revocation registry.
///
/// Lost on restart, useful for testing and single-node deployments.
#[derive(Debug, Default, Clone)]
pub struct MemoryRevocationRegistry {
    revoked: Arc<DashMap<String, DashSet<String>>>,
}

#[async_trait]
impl RevocationRegistry for MemoryRevocationRegistry {
    async fn is_revoked(&self, token_type: &str, id: &str) -> Result<bool> {
        Ok(self
            .revoked
            .get(token_type)
            .is_some_and(|ids| ids.contains(id)))
    }

    async fn revoke(&self, token_type: &str, id: &str) -> Result<()> {
        self.revoked
            .entry(token_type.to_string())
            .or_default()
            .insert(id.to_string());
        Ok(())
    }
}

/// A Redis revocation registry, one set per token type.
#[derive(Clone)]
pub struct RedisRevocationRegistry {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisRevocationRegistry {
    /// Creates a new registry from a connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            prefix: "sts:revoked:".to_string(),
        }
    }

    fn key(&self, token_type: &str) -> String {
        format!("{}{token_type}", self.prefix)
    }
}

#[async_trait]
impl RevocationRegistry for RedisRevocationRegistry {
    async fn is_revoked(&self, token_type: &str, id: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let revoked: bool = conn.sismember(self.key(token_type), id).await?;
        Ok(revoked)
    }

    async fn revoke(&self, token_type: &str, id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.sadd(self.key(token_type), id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_registry_flow() {
        let registry = MemoryRevocationRegistry::default();
        assert!(!registry.is_revoked("urn:saml2", "ID_1").await.unwrap());

        registry.revoke("urn:saml2", "ID_1").await.unwrap();
        assert!(registry.is_revoked("urn:saml2", "ID_1").await.unwrap());
        assert!(!registry.is_revoked("urn:saml2", "ID_2").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_registry_separates_token_types() {
        let registry = MemoryRevocationRegistry::default();
        registry.revoke("urn:saml2", "ID_1").await.unwrap();
        assert!(!registry.is_revoked("urn:special", "ID_1").await.unwrap());

        // Revoking twice is harmless
        registry.revoke("urn:saml2", "ID_1").await.unwrap();
        assert!(registry.is_revoked("urn:saml2", "ID_1").await.unwrap());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let registry = MemoryRevocationRegistry::default();
        let clone = registry.clone();
        clone.revoke("urn:saml2", "ID_9").await.unwrap();
        assert!(registry.is_revoked("urn:saml2", "ID_9").await.unwrap());
    }
}
