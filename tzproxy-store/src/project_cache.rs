use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tzproxy_core::model::Project;
use tzproxy_core::ports::ProjectCache;

/// The hot project cache, populated write-through on a durable-store hit.
/// Projects are treated as effectively immutable for the proxy's lifetime —
/// there is no invalidation path, matching the resolver's contract.
#[derive(Default)]
pub struct InMemoryProjectCache {
    entries: DashMap<String, Project>,
}

impl InMemoryProjectCache {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ProjectCache for InMemoryProjectCache {
    async fn find_by_uuid(&self, uuid: &str) -> Option<Project> {
        self.entries.get(uuid).map(|e| e.value().clone())
    }

    async fn save(&self, title: String, uuid: String, creation_date: DateTime<Utc>) {
        self.entries.insert(uuid.clone(), Project { uuid, title, creation_date });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn miss_on_empty_cache() {
        let cache = InMemoryProjectCache::new();
        assert!(cache.find_by_uuid("p1").await.is_none());
    }

    #[tokio::test]
    async fn hit_after_save() {
        let cache = InMemoryProjectCache::new();
        let now = Utc::now();
        cache.save("Project One".into(), "p1".into(), now).await;
        let project = cache.find_by_uuid("p1").await.unwrap();
        assert_eq!(project.uuid, "p1");
        assert_eq!(project.title, "Project One");
        assert_eq!(project.creation_date, now);
        assert_eq!(cache.len(), 1);
    }
}
