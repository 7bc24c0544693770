// Instance Manager
// Ties the metadata store to the live registry: registration, lookup and query entry point

use std::sync::Arc;
use thiserror::Error;

use crate::db::registry::InstanceRegistry;
use crate::db::router::{QueryRequest, QueryResponse, QueryRouter, RouteError};
use crate::db::traits::DiagnosticError;
use crate::storage::{CreateInstanceInput, DatabaseManager, Instance, StorageError};

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("instance {0} already exists")]
    AlreadyExists(String),
    #[error("instance {0} not found")]
    InstanceNotFound(String),
    #[error(transparent)]
    Storage(StorageError),
    #[error("instance {name} saved but not connected: {source}")]
    Registration {
        name: String,
        source: DiagnosticError,
    },
    #[error(transparent)]
    Route(RouteError),
}

impl From<StorageError> for ManagerError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(name) => ManagerError::InstanceNotFound(name),
            StorageError::AlreadyExists(name) => ManagerError::AlreadyExists(name),
            other => ManagerError::Storage(other),
        }
    }
}

pub type ManagerResult<T> = Result<T, ManagerError>;

/// Entry point for adapters: owns the store, registry and router
pub struct InstanceManager {
    store: Arc<DatabaseManager>,
    registry: Arc<InstanceRegistry>,
    router: QueryRouter,
}

impl InstanceManager {
    pub fn new(store: Arc<DatabaseManager>, registry: Arc<InstanceRegistry>) -> Self {
        let router = QueryRouter::new(Arc::clone(&registry));
        Self {
            store,
            registry,
            router,
        }
    }

    pub fn registry(&self) -> &Arc<InstanceRegistry> {
        &self.registry
    }

    /// Store a new instance and connect it. A failed connection is reported
    /// but the stored row stays, so the next startup retries it.
    pub async fn register_instance(&self, input: CreateInstanceInput) -> ManagerResult<Instance> {
        match self.store.get_instance_by_name(&input.name) {
            Ok(_) => return Err(ManagerError::AlreadyExists(input.name)),
            Err(StorageError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let instance = self.store.create_instance(input)?;

        if let Err(source) = self.registry.add_instance_to_registry(&instance).await {
            tracing::warn!(
                instance = %instance.name,
                "[Manager] Stored instance {} but could not connect: {}",
                instance.name,
                source
            );
            return Err(ManagerError::Registration {
                name: instance.name,
                source,
            });
        }

        Ok(instance)
    }

    pub fn get_instance(&self, name: &str) -> ManagerResult<Instance> {
        Ok(self.store.get_instance_by_name(name)?)
    }

    pub fn list_instances(&self) -> ManagerResult<Vec<Instance>> {
        Ok(self.store.list_instances()?)
    }

    /// Resolve the request's instance in the store, then route it
    pub async fn query(&self, request: &QueryRequest) -> ManagerResult<QueryResponse> {
        let instance = self.get_instance(&request.instance_name)?;
        self.router
            .route_query(request, &instance)
            .await
            .map_err(ManagerError::Route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fakes::FakeFactory;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn create_test_db() -> (Arc<DatabaseManager>, PathBuf) {
        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let db_path = std::env::temp_dir().join(format!(
            "psql_registry_manager_test_{}_{}.db",
            std::process::id(),
            counter
        ));
        let _ = std::fs::remove_file(&db_path);
        (Arc::new(DatabaseManager::new(db_path.clone()).unwrap()), db_path)
    }

    fn manager_with(factory: FakeFactory) -> (InstanceManager, PathBuf) {
        let (store, path) = create_test_db();
        let registry = Arc::new(InstanceRegistry::new(Arc::new(factory)));
        (InstanceManager::new(store, registry), path)
    }

    fn input(name: &str) -> CreateInstanceInput {
        CreateInstanceInput {
            name: name.to_string(),
            database_name: "postgres".to_string(),
            description: None,
            creator_username: Some("dba".to_string()),
        }
    }

    #[tokio::test]
    async fn test_register_and_query() {
        let (manager, path) = manager_with(FakeFactory::new().with_server("analytics", 15, 2));

        let instance = manager.register_instance(input("analytics")).await.unwrap();
        assert_eq!(instance.name, "analytics");
        assert!(manager.registry().contains("analytics").await);

        let response = manager
            .query(&QueryRequest::new("analytics", "connection_stats"))
            .await
            .unwrap();
        assert!(response.success);

        drop(manager);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_register_duplicate() {
        let (manager, path) = manager_with(FakeFactory::new().with_server("analytics", 15, 2));

        manager.register_instance(input("analytics")).await.unwrap();
        let err = manager.register_instance(input("analytics")).await.unwrap_err();
        assert!(matches!(err, ManagerError::AlreadyExists(_)));

        drop(manager);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_failed_connect_keeps_row() {
        let (manager, path) = manager_with(FakeFactory::new().with_unreachable("flaky"));

        let err = manager.register_instance(input("flaky")).await.unwrap_err();
        assert!(matches!(err, ManagerError::Registration { .. }));

        assert_eq!(manager.get_instance("flaky").unwrap().name, "flaky");
        assert!(!manager.registry().contains("flaky").await);

        // Stored but not live: routing reports the missing client
        let err = manager
            .query(&QueryRequest::new("flaky", "version"))
            .await
            .unwrap_err();
        match err {
            ManagerError::Route(route) => assert_eq!(route.source.kind(), "client_not_found"),
            other => panic!("unexpected error: {other}"),
        }

        drop(manager);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_query_unknown_instance() {
        let (manager, path) = manager_with(FakeFactory::new());

        let err = manager
            .query(&QueryRequest::new("nowhere", "version"))
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::InstanceNotFound(name) if name == "nowhere"));

        drop(manager);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_startup_from_store() {
        let (store, path) = create_test_db();
        store.create_instance(input("one")).unwrap();
        store.create_instance(input("two")).unwrap();

        let factory = Arc::new(FakeFactory::new().with_server("one", 14, 1).with_server("two", 17, 0));
        let registry = InstanceRegistry::build(&store.list_instances().unwrap(), factory).await;

        assert_eq!(registry.len().await, 2);
        for name in ["one", "two"] {
            assert!(registry.get_client(name).await.unwrap().is_ready().await);
        }

        drop(store);
        let _ = std::fs::remove_file(path);
    }
}
