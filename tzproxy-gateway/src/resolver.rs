use std::sync::Arc;

use chrono::Utc;
use tzproxy_core::error::GatewayError;
use tzproxy_core::ports::{ProjectCache, ProjectStore};

/// Resolves a project UUID via cache-then-store, populating the cache on a
/// store hit. The cache is write-through only on miss-then-store-hit;
/// invalidation is out of scope — projects are treated as effectively
/// immutable for the proxy's lifetime.
pub struct ProjectResolver {
    store: Arc<dyn ProjectStore>,
    cache: Arc<dyn ProjectCache>,
}

impl ProjectResolver {
    pub fn new(store: Arc<dyn ProjectStore>, cache: Arc<dyn ProjectCache>) -> Self {
        Self { store, cache }
    }

    /// Confirms `uuid` names a known project, populating the cache from the
    /// durable store on a cold lookup. Returns `ProjectNotFound` if neither
    /// knows the UUID, or `ProjectLookupFailed` if the store itself errored.
    pub async fn ensure_project_known(&self, uuid: &str) -> Result<(), GatewayError> {
        if self.cache.find_by_uuid(uuid).await.is_some() {
            return Ok(());
        }

        match self.store.find_by_uuid(uuid).await? {
            Some(project) => {
                self.cache.save(project.title, project.uuid, project.creation_date).await;
                Ok(())
            }
            None => Err(GatewayError::ProjectNotFound(uuid.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tzproxy_core::model::Project;
    use tzproxy_store::InMemoryProjectCache;

    struct CountingStore {
        calls: AtomicUsize,
        project: Option<Project>,
        fail: bool,
    }

    #[async_trait]
    impl ProjectStore for CountingStore {
        async fn find_by_uuid(&self, uuid: &str) -> Result<Option<Project>, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(GatewayError::ProjectLookupFailed("db down".into()));
            }
            Ok(self.project.clone().filter(|p| p.uuid == uuid))
        }
    }

    fn project(uuid: &str) -> Project {
        Project {
            uuid: uuid.to_string(),
            title: "Project".to_string(),
            creation_date: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn store_hit_populates_cache_and_succeeds() {
        let store = Arc::new(CountingStore { calls: AtomicUsize::new(0), project: Some(project("p1")), fail: false });
        let cache = Arc::new(InMemoryProjectCache::new());
        let resolver = ProjectResolver::new(store.clone(), cache.clone());

        resolver.ensure_project_known("p1").await.unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert!(cache.find_by_uuid("p1").await.is_some());
    }

    #[tokio::test]
    async fn second_resolve_does_not_touch_the_store() {
        let store = Arc::new(CountingStore { calls: AtomicUsize::new(0), project: Some(project("p1")), fail: false });
        let cache = Arc::new(InMemoryProjectCache::new());
        let resolver = ProjectResolver::new(store.clone(), cache.clone());

        resolver.ensure_project_known("p1").await.unwrap();
        resolver.ensure_project_known("p1").await.unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 1, "second resolve must hit the cache only");
    }

    #[tokio::test]
    async fn store_miss_is_project_not_found() {
        let store = Arc::new(CountingStore { calls: AtomicUsize::new(0), project: None, fail: false });
        let cache = Arc::new(InMemoryProjectCache::new());
        let resolver = ProjectResolver::new(store, cache);

        let err = resolver.ensure_project_known("ghost").await.unwrap_err();
        assert!(matches!(err, GatewayError::ProjectNotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn store_error_is_project_lookup_failed() {
        let store = Arc::new(CountingStore { calls: AtomicUsize::new(0), project: None, fail: true });
        let cache = Arc::new(InMemoryProjectCache::new());
        let resolver = ProjectResolver::new(store, cache);

        let err = resolver.ensure_project_known("p1").await.unwrap_err();
        assert!(matches!(err, GatewayError::ProjectLookupFailed(_)));
    }
}
