use parking_lot::RwLock;
use rmap_core::memory::MemoryBackend;
use rmap_core::{
    Config, MapEntries, ProviderFlags, ProviderMode, ProviderRegistry, Resource, ResourceMapper,
    ResourceResolverControl,
};
use std::sync::Arc;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub map_entries: Arc<MapEntries>,
    pub registry: RwLock<ProviderRegistry>,
    pub mapper: ResourceMapper,
}

impl AppState {
    /// Mounts a single in-memory provider at `/`, seeded with `resources`.
    /// Concrete storage adapters are out of scope for the core library; this
    /// gives the service something to route requests to out of the box.
    pub fn new(config: Config, resources: Vec<Resource>) -> Self {
        let map_entries = MapEntries::new(config);
        let mapper = ResourceMapper::new(Arc::clone(&map_entries));
        let mut registry = ProviderRegistry::new();
        registry.register(
            "/",
            ProviderMode::Overlay,
            ProviderFlags {
                modifiable: true,
                adaptable: true,
                refreshable: true,
                attributable: true,
                queryable: true,
            },
            0,
            Arc::new(MemoryBackend::with_resources(resources)),
        );
        Self {
            map_entries,
            registry: RwLock::new(registry),
            mapper,
        }
    }

    /// Open a fresh per-request session against the current provider snapshot.
    pub fn resolver(&self) -> ResourceResolverControl {
        let snapshot = self.registry.read().snapshot();
        ResourceResolverControl::open(snapshot, Arc::clone(&self.map_entries))
    }
}
