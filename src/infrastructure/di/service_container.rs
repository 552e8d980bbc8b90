//! Service container for dependency injection
//!
//! Wires up all services with their dependencies. One container is one
//! session: it owns the tree store and hands out the services sharing it.

use std::sync::Arc;

use crate::application::services::{
    ComponentLoader, Instantiator, NodeDuplicator, NodeStore, ParamSetService, QueryEngine,
    TemplateBuilder, TreeClassifier,
};
use crate::config::Settings;
use crate::infrastructure::error::InfraResult;
use crate::infrastructure::traits::{FileSystem, RealFileSystem};
use crate::infrastructure::TreeStore;

/// Container holding all application services.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Filesystem abstraction
    pub fs: Arc<dyn FileSystem>,

    /// Shared tree store
    pub store: Arc<TreeStore>,

    pub nodes: Arc<NodeStore>,
    pub classifier: TreeClassifier,
    pub templates: TemplateBuilder,
    pub duplicator: NodeDuplicator,
    pub instantiator: Instantiator,
    pub query: QueryEngine,
    pub paramsets: ParamSetService,
    pub components: ComponentLoader,
}

impl ServiceContainer {
    /// Open the store under `settings.store_dir` with real implementations.
    pub fn new(settings: Settings) -> InfraResult<Self> {
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        let store = TreeStore::open(fs.clone(), &settings.store_dir)?;
        Ok(Self::with_deps(settings, fs, store))
    }

    /// A container whose trees live in memory only.
    pub fn in_memory(settings: Settings) -> Self {
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        let store = TreeStore::in_memory(fs.clone());
        Self::with_deps(settings, fs, store)
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(settings: Settings, fs: Arc<dyn FileSystem>, store: TreeStore) -> Self {
        let settings = Arc::new(settings);
        let store = Arc::new(store);
        let nodes = Arc::new(NodeStore::new(store.clone()));

        Self {
            classifier: TreeClassifier::new(store.clone(), settings.clone()),
            templates: TemplateBuilder::new(store.clone(), settings.clone()),
            duplicator: NodeDuplicator::new(store.clone(), nodes.clone()),
            instantiator: Instantiator::new(store.clone(), settings.clone()),
            query: QueryEngine::new(store.clone(), nodes.clone()),
            paramsets: ParamSetService::new(fs.clone(), store.clone(), nodes.clone()),
            components: ComponentLoader::new(fs.clone(), store.clone(), settings.clone()),
            nodes,
            store,
            fs,
            settings,
        }
    }
}
