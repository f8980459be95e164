use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::ContentError;

use super::flow::Flow;
use super::pack::{SeedPack, SeedPackSet};
use super::source::{ContentSource, DirectorySource};

/// Loader settings.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Fixed "now" for expiry checks. None uses the wall clock.
    pub reference_time: Option<DateTime<Utc>>,
    /// Keep loaded packs and flows in memory, keyed by path.
    pub cache_enabled: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            reference_time: None,
            cache_enabled: true,
        }
    }
}

/// Everything one module needs to build stacks.
#[derive(Debug, Clone)]
pub struct ModuleSeeds {
    pub packs: SeedPackSet,
    pub flow: Arc<Flow>,
}

/// Loads versioned seed packs and flows for modules.
///
/// Loaded records are cached by path. Expiry is re-checked every time a
/// record is handed out, cached or not.
pub struct SeedLoader {
    source: Arc<dyn ContentSource>,
    config: LoaderConfig,
    packs: RwLock<HashMap<String, Arc<SeedPack>>>,
    flows: RwLock<HashMap<String, Arc<Flow>>>,
}

impl SeedLoader {
    #[must_use]
    pub fn new(source: Arc<dyn ContentSource>) -> Self {
        Self::with_config(source, LoaderConfig::default())
    }

    #[must_use]
    pub fn with_config(source: Arc<dyn ContentSource>, config: LoaderConfig) -> Self {
        Self {
            source,
            config,
            packs: RwLock::new(HashMap::new()),
            flows: RwLock::new(HashMap::new()),
        }
    }

    /// Loader over a content directory.
    pub fn from_directory(base_path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(DirectorySource::new(base_path)))
    }

    #[must_use]
    pub const fn config(&self) -> &LoaderConfig {
        &self.config
    }

    fn reference_time(&self) -> DateTime<Utc> {
        self.config.reference_time.unwrap_or_else(Utc::now)
    }

    fn read_document(&self, path: &str) -> Result<Value, ContentError> {
        let bytes = self.source.read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| ContentError::InvalidJson {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    /// Loads one seed pack and checks it has not expired.
    ///
    /// # Errors
    ///
    /// Returns a `ContentError` if the document is missing, malformed or expired.
    pub fn load_pack(&self, path: &str) -> Result<Arc<SeedPack>, ContentError> {
        let reference = self.reference_time();
        if let Some(pack) = self.cached(&self.packs, path) {
            pack.ensure_active(reference)?;
            return Ok(pack);
        }

        let doc = self.read_document(path)?;
        let pack = SeedPack::from_document(path, &doc)?;
        pack.ensure_active(reference)?;
        tracing::info!(
            pack = path,
            version = pack.version(),
            items = pack.len(),
            "seed pack loaded"
        );

        let pack = Arc::new(pack);
        self.store(&self.packs, path, &pack);
        Ok(pack)
    }

    /// Loads one flow and checks it has not expired.
    ///
    /// # Errors
    ///
    /// Returns a `ContentError` if the document is missing, malformed or expired.
    pub fn load_flow(&self, path: &str) -> Result<Arc<Flow>, ContentError> {
        let reference = self.reference_time();
        if let Some(flow) = self.cached(&self.flows, path) {
            flow.ensure_active(reference)?;
            return Ok(flow);
        }

        let doc = self.read_document(path)?;
        let flow = Flow::from_document(path, &doc)?;
        flow.ensure_active(reference)?;
        tracing::info!(
            flow = path,
            version = flow.version(),
            cards = flow.sequence().len(),
            guards = flow.guards().len(),
            "flow loaded"
        );

        let flow = Arc::new(flow);
        self.store(&self.flows, path, &flow);
        Ok(flow)
    }

    /// Loads several packs, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first `ContentError` encountered.
    pub fn load_many<'a, I>(&self, paths: I) -> Result<SeedPackSet, ContentError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut set = SeedPackSet::new();
        for path in paths {
            set.insert(self.load_pack(path)?);
        }
        Ok(set)
    }

    /// Loads a module's packs and flow and checks they all belong to
    /// `module_code`.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::ModuleMismatch` if any record names another
    /// module, or any load error.
    pub fn resolve_module_seeds<'a, I>(
        &self,
        module_code: &str,
        pack_paths: I,
        flow_path: &str,
    ) -> Result<ModuleSeeds, ContentError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let packs = self.load_many(pack_paths)?;
        let flow = self.load_flow(flow_path)?;

        for pack in packs.iter() {
            if pack.module_code() != module_code {
                return Err(ContentError::ModuleMismatch {
                    kind: "Seed pack",
                    name: pack.name().to_string(),
                    expected: module_code.to_string(),
                    actual: pack.module_code().to_string(),
                });
            }
        }
        if flow.module_code() != module_code {
            return Err(ContentError::ModuleMismatch {
                kind: "Flow",
                name: flow.name().to_string(),
                expected: module_code.to_string(),
                actual: flow.module_code().to_string(),
            });
        }

        Ok(ModuleSeeds { packs, flow })
    }

    /// Drops every cached record.
    pub fn clear_cache(&self) {
        self.packs.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.flows.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn cached<T>(&self, cache: &RwLock<HashMap<String, Arc<T>>>, path: &str) -> Option<Arc<T>> {
        if !self.config.cache_enabled {
            return None;
        }
        cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    fn store<T>(&self, cache: &RwLock<HashMap<String, Arc<T>>>, path: &str, value: &Arc<T>) {
        if !self.config.cache_enabled {
            return;
        }
        cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), Arc::clone(value));
    }
}

impl std::fmt::Debug for SeedLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedLoader")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
