use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use sea_orm::{DatabaseConnection, EntityTrait};
use tracing::debug;
use uuid::Uuid;

use crate::entities::user;
use crate::errors::ServiceError;
use crate::object_store::ObjectStore;

type Teardown = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Per-request resource container. Resources register a teardown callback
/// when constructed; `close` drains the stack in reverse construction
/// order, so dependents are released before their dependencies.
#[derive(Default)]
pub struct RequestScope {
    teardowns: Vec<(&'static str, Teardown)>,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a teardown callback for a resource constructed in this scope.
    pub fn on_close<F, Fut>(&mut self, name: &'static str, teardown: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.teardowns.push((name, Box::new(move || Box::pin(teardown()))));
    }

    pub fn len(&self) -> usize {
        self.teardowns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teardowns.is_empty()
    }

    /// Releases every managed resource, last constructed first.
    pub async fn close(mut self) {
        while let Some((name, teardown)) = self.teardowns.pop() {
            debug!(resource = name, "releasing request-scoped resource");
            teardown().await;
        }
    }
}

/// Runs `fut` and closes the scope afterwards, on success and on error alike.
pub async fn with_scope<T, Fut>(scope: RequestScope, fut: Fut) -> Result<T, ServiceError>
where
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let result = fut.await;
    scope.close().await;
    result
}

/// Request-scoped entity loader with a per-request cache, so repeated
/// lookups within one request hit the database once.
pub struct LoaderService {
    db: Arc<DatabaseConnection>,
    users: DashMap<Uuid, user::Model>,
}

impl LoaderService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            users: DashMap::new(),
        }
    }

    pub async fn user(&self, id: Uuid) -> Result<Option<user::Model>, ServiceError> {
        if let Some(cached) = self.users.get(&id) {
            return Ok(Some(cached.clone()));
        }
        let found = user::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        if let Some(model) = &found {
            self.users.insert(id, model.clone());
        }
        Ok(found)
    }

    pub fn cached_users(&self) -> usize {
        self.users.len()
    }

    pub fn clear(&self) {
        self.users.clear();
    }
}

/// The per-request collaborator graph handed to request handlers.
#[derive(Clone)]
pub struct RequestResources {
    /// Request-scoped outbound HTTP client; bounds header/cookie state to
    /// one request.
    pub http: reqwest::Client,
    /// Handle borrowed from the process-wide object store.
    pub store: Arc<dyn ObjectStore>,
    pub loaders: Arc<LoaderService>,
}

/// Process-wide factory constructing the per-request graph. The database
/// pool and object store backing are shared; everything else is built
/// fresh per request.
#[derive(Clone)]
pub struct ScopeFactory {
    db: Arc<DatabaseConnection>,
    store: Arc<dyn ObjectStore>,
}

impl ScopeFactory {
    pub fn new(db: Arc<DatabaseConnection>, store: Arc<dyn ObjectStore>) -> Self {
        Self { db, store }
    }

    /// Builds the request graph leaves-first and registers teardowns as it
    /// goes, so `close` releases in reverse construction order.
    pub fn request_scope(&self) -> (RequestResources, RequestScope) {
        let mut scope = RequestScope::new();

        let http = reqwest::Client::new();
        scope.on_close("http_client", || async {});

        let store = self.store.clone();
        scope.on_close("object_store_handle", || async {});

        let loaders = Arc::new(LoaderService::new(self.db.clone()));
        let loaders_for_close = loaders.clone();
        scope.on_close("loader_service", move || async move {
            loaders_for_close.clear();
        });

        (
            RequestResources {
                http,
                store,
                loaders,
            },
            scope,
        )
    }
}
