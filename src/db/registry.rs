// Instance Registry
// Maps instance names to live, connected diagnostics clients

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::db::traits::{ClientFactory, DiagnosticError, DiagnosticsClient};
use crate::storage::Instance;

/// Registry of connected instance clients
pub struct InstanceRegistry {
    clients: RwLock<HashMap<String, Arc<dyn DiagnosticsClient>>>,
    factory: Arc<dyn ClientFactory>,
}

impl InstanceRegistry {
    /// Create an empty registry
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            factory,
        }
    }

    /// Build a registry from the stored instances. Instances that fail to
    /// connect are logged and left out.
    pub async fn build(instances: &[Instance], factory: Arc<dyn ClientFactory>) -> Self {
        let registry = Self::new(factory);
        let target = &registry;

        let attempts = instances
            .iter()
            .map(|instance| async move { (instance, target.add_instance_to_registry(instance).await) });

        for (instance, result) in join_all(attempts).await {
            if let Err(e) = result {
                tracing::warn!(
                    instance = %instance.name,
                    "[Registry] Skipping instance {}: {}",
                    instance.name,
                    e
                );
            }
        }

        tracing::info!(
            "[Registry] Built with {}/{} instances connected",
            registry.len().await,
            instances.len()
        );
        registry
    }

    /// Create, connect and register a client for `instance`, replacing any
    /// existing entry under the same name. Nothing is inserted on failure.
    pub async fn add_instance_to_registry(&self, instance: &Instance) -> Result<(), DiagnosticError> {
        let client = self.factory.create_client(instance).map_err(|e| match e {
            DiagnosticError::ClientCreationFailed { .. } => e,
            other => DiagnosticError::ClientCreationFailed {
                instance: instance.name.clone(),
                reason: other.to_string(),
            },
        })?;

        // Network-bound; runs without holding the map lock
        client.connect().await?;

        let replaced = {
            let mut clients = self.clients.write().await;
            clients.insert(instance.name.clone(), client)
        };

        if replaced.is_some() {
            tracing::info!("[Registry] Replaced client for instance {}", instance.name);
        } else {
            tracing::info!("[Registry] Registered instance {}", instance.name);
        }
        Ok(())
    }

    /// Look up the live client for `instance`; `None` if it never connected
    pub async fn get_instance_client(&self, instance: &Instance) -> Option<Arc<dyn DiagnosticsClient>> {
        self.get_client(&instance.name).await
    }

    pub async fn get_client(&self, name: &str) -> Option<Arc<dyn DiagnosticsClient>> {
        let clients = self.clients.read().await;
        clients.get(name).map(Arc::clone)
    }

    /// Registered instance names, sorted
    pub async fn instance_names(&self) -> Vec<String> {
        let clients = self.clients.read().await;
        let mut names: Vec<String> = clients.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn contains(&self, name: &str) -> bool {
        let clients = self.clients.read().await;
        clients.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}
