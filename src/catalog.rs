use crate::error::CatalogError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// A persisted service record owned by the catalog.
///
/// Created on first discovery; its metric list is fully replaced on every
/// cycle in which the service is observed again. Never deleted by this crate.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogService {
    pub id: Uuid,
    pub name: String,
    pub namespace: String,
    pub labels: HashMap<String, String>,
    pub metrics: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The external Service Catalog collaborator consumed by the discovery
/// engine. The engine creates and updates, never deletes.
#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    async fn get_service_by_name(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<CatalogService>, CatalogError>;

    async fn create_service(
        &self,
        name: &str,
        namespace: &str,
        labels: &HashMap<String, String>,
    ) -> Result<CatalogService, CatalogError>;

    /// Replace (not merge) the metric list of a service.
    async fn update_service_metrics(
        &self,
        service_id: Uuid,
        metrics: &[String],
    ) -> Result<(), CatalogError>;

    async fn list_services(&self) -> Result<Vec<CatalogService>, CatalogError>;
}

/// In-memory catalog backing the bundled server and the tests.
#[derive(Default)]
pub struct InMemoryCatalog {
    // Keyed by (namespace, name).
    services: DashMap<(String, String), CatalogService>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServiceCatalog for InMemoryCatalog {
    async fn get_service_by_name(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<CatalogService>, CatalogError> {
        let key = (namespace.to_string(), name.to_string());
        Ok(self.services.get(&key).map(|s| s.clone()))
    }

    async fn create_service(
        &self,
        name: &str,
        namespace: &str,
        labels: &HashMap<String, String>,
    ) -> Result<CatalogService, CatalogError> {
        let now = Utc::now();
        let service = CatalogService {
            id: Uuid::new_v4(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            labels: labels.clone(),
            metrics: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        debug!(service = name, namespace = namespace, "creating catalog service");
        self.services
            .insert((namespace.to_string(), name.to_string()), service.clone());
        Ok(service)
    }

    async fn update_service_metrics(
        &self,
        service_id: Uuid,
        metrics: &[String],
    ) -> Result<(), CatalogError> {
        for mut entry in self.services.iter_mut() {
            if entry.id == service_id {
                entry.metrics = metrics.to_vec();
                entry.updated_at = Utc::now();
                return Ok(());
            }
        }

        Err(CatalogError(format!(
            "no service with id {} in catalog",
            service_id
        )))
    }

    async fn list_services(&self) -> Result<Vec<CatalogService>, CatalogError> {
        Ok(self.services.iter().map(|s| s.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_lookup() {
        let catalog = InMemoryCatalog::new();
        let labels = HashMap::from([("team".to_string(), "core".to_string())]);

        let created = catalog
            .create_service("api", "production", &labels)
            .await
            .unwrap();

        let found = catalog
            .get_service_by_name("api", "production")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.labels.get("team").unwrap(), "core");

        assert!(catalog
            .get_service_by_name("api", "staging")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_update_replaces_metric_list() {
        let catalog = InMemoryCatalog::new();
        let service = catalog
            .create_service("api", "default", &HashMap::new())
            .await
            .unwrap();

        catalog
            .update_service_metrics(service.id, &["a_total".to_string(), "b_total".to_string()])
            .await
            .unwrap();
        catalog
            .update_service_metrics(service.id, &["c_total".to_string()])
            .await
            .unwrap();

        let found = catalog
            .get_service_by_name("api", "default")
            .await
            .unwrap()
            .unwrap();
        // Full replace, not a merge.
        assert_eq!(found.metrics, vec!["c_total".to_string()]);
    }

    #[tokio::test]
    async fn test_update_unknown_id_errors() {
        let catalog = InMemoryCatalog::new();
        let result = catalog
            .update_service_metrics(Uuid::new_v4(), &["x".to_string()])
            .await;
        assert!(result.is_err());
    }
}
