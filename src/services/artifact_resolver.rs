//! Artifact resolution.
//!
//! Speclets and the agent config name binaries by namespace path. Release
//! tooling usually publishes a stable link (`.../latest`) pointing at a
//! versioned file, so every path is resolved through at most one link
//! before it goes into an operation's file manifest.

use std::sync::Arc;

use crate::domain::models::artifact::{DATA_BUNDLE, LOG_TAILER, QUERY_ENGINE, TRAMPOLINE};
use crate::domain::models::{Artifact, ArtifactDefaults, ArtifactSet, Speclet};
use crate::domain::ports::{NamespaceError, NamespaceStore, NodeType};

/// Resolves artifact paths against the namespace store.
pub struct ArtifactResolver {
    store: Arc<dyn NamespaceStore>,
}

impl ArtifactResolver {
    pub fn new(store: Arc<dyn NamespaceStore>) -> Self {
        Self { store }
    }

    /// Resolve `path` through at most one link.
    ///
    /// A link pointing at another link resolves to the intermediate link;
    /// the target is never inspected.
    pub async fn resolve(&self, path: &str) -> Result<String, NamespaceError> {
        let resolved = match self.store.get_node_type(path).await? {
            NodeType::Link => self.store.get_link_target(path).await?,
            _ => path.to_string(),
        };

        tracing::debug!(path = %path, resolved = %resolved, "resolved artifact path");
        Ok(resolved)
    }

    /// Resolve every artifact the speclet's operation needs.
    ///
    /// Fails as a whole if any artifact fails to resolve.
    pub async fn build_artifacts(
        &self,
        speclet: &Speclet,
        defaults: &ArtifactDefaults,
    ) -> Result<ArtifactSet, NamespaceError> {
        let mut wanted = vec![
            (
                QUERY_ENGINE,
                speclet
                    .query_engine_path
                    .as_deref()
                    .unwrap_or(&defaults.query_engine_path),
            ),
            (
                LOG_TAILER,
                speclet
                    .log_tailer_path
                    .as_deref()
                    .unwrap_or(&defaults.log_tailer_path),
            ),
            (
                TRAMPOLINE,
                speclet
                    .trampoline_path
                    .as_deref()
                    .unwrap_or(&defaults.trampoline_path),
            ),
        ];
        if speclet.enable_data_bundle {
            wanted.push((
                DATA_BUNDLE,
                speclet
                    .data_bundle_path
                    .as_deref()
                    .unwrap_or(&defaults.data_bundle_path),
            ));
        }

        let mut artifacts = ArtifactSet::default();
        for (name, path) in wanted {
            let resolved = self.resolve(path).await?;
            artifacts.push(Artifact::new(name, resolved));
        }
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryNamespaceStore;

    fn resolver_with(store: &Arc<InMemoryNamespaceStore>) -> ArtifactResolver {
        ArtifactResolver::new(store.clone() as Arc<dyn NamespaceStore>)
    }

    #[tokio::test]
    async fn test_direct_path_resolves_to_itself() {
        let store = Arc::new(InMemoryNamespaceStore::new());
        store.put_file("//sys/bin/engine-23.8");

        let resolved = resolver_with(&store)
            .resolve("//sys/bin/engine-23.8")
            .await
            .unwrap();

        assert_eq!(resolved, "//sys/bin/engine-23.8");
        assert_eq!(store.link_reads(), 0);
    }

    #[tokio::test]
    async fn test_link_resolves_to_target() {
        let store = Arc::new(InMemoryNamespaceStore::new());
        store.put_file("//sys/bin/engine-23.8");
        store.put_link("//sys/bin/engine-latest", "//sys/bin/engine-23.8");

        let resolved = resolver_with(&store)
            .resolve("//sys/bin/engine-latest")
            .await
            .unwrap();

        assert_eq!(resolved, "//sys/bin/engine-23.8");
        assert_eq!(store.link_reads(), 1);
    }

    #[tokio::test]
    async fn test_link_chain_is_followed_once() {
        let store = Arc::new(InMemoryNamespaceStore::new());
        store.put_file("//sys/bin/engine-23.8");
        store.put_link("//sys/bin/engine-stable", "//sys/bin/engine-23.8");
        store.put_link("//sys/bin/engine-latest", "//sys/bin/engine-stable");

        let resolved = resolver_with(&store)
            .resolve("//sys/bin/engine-latest")
            .await
            .unwrap();

        assert_eq!(resolved, "//sys/bin/engine-stable");
        assert_eq!(store.link_reads(), 1);
    }

    #[tokio::test]
    async fn test_missing_path_propagates_error() {
        let store = Arc::new(InMemoryNamespaceStore::new());

        let err = resolver_with(&store)
            .resolve("//sys/bin/missing")
            .await
            .unwrap_err();

        assert_eq!(err, NamespaceError::NotFound("//sys/bin/missing".to_string()));
    }

    #[tokio::test]
    async fn test_build_artifacts_fixed_set() {
        let store = Arc::new(InMemoryNamespaceStore::new());
        let defaults = ArtifactDefaults::default();
        store.put_file(&defaults.query_engine_path);
        store.put_file(&defaults.log_tailer_path);
        store.put_file("//sys/bin/trampoline-7");
        store.put_link(&defaults.trampoline_path, "//sys/bin/trampoline-7");

        let artifacts = resolver_with(&store)
            .build_artifacts(&Speclet::default(), &defaults)
            .await
            .unwrap();

        assert_eq!(artifacts.names(), vec![QUERY_ENGINE, LOG_TAILER, TRAMPOLINE]);
        assert_eq!(
            artifacts.description.get(TRAMPOLINE).map(String::as_str),
            Some("//sys/bin/trampoline-7")
        );
    }

    #[tokio::test]
    async fn test_build_artifacts_with_data_bundle_override() {
        let store = Arc::new(InMemoryNamespaceStore::new());
        let defaults = ArtifactDefaults::default();
        store.put_file(&defaults.query_engine_path);
        store.put_file(&defaults.log_tailer_path);
        store.put_file(&defaults.trampoline_path);
        store.put_file("//home/geo/bundle-2024");

        let speclet = Speclet {
            enable_data_bundle: true,
            data_bundle_path: Some("//home/geo/bundle-2024".to_string()),
            ..Default::default()
        };
        let artifacts = resolver_with(&store)
            .build_artifacts(&speclet, &defaults)
            .await
            .unwrap();

        assert!(artifacts.contains(DATA_BUNDLE));
        assert_eq!(artifacts.manifest.len(), 4);
        assert_eq!(artifacts.manifest[3].path, "//home/geo/bundle-2024");
    }

    #[tokio::test]
    async fn test_build_artifacts_fails_atomically() {
        let store = Arc::new(InMemoryNamespaceStore::new());
        let defaults = ArtifactDefaults::default();
        store.put_file(&defaults.query_engine_path);
        store.put_file(&defaults.log_tailer_path);

        let result = resolver_with(&store)
            .build_artifacts(&Speclet::default(), &defaults)
            .await;

        assert!(matches!(result, Err(NamespaceError::NotFound(_))));
    }
}
