//! Compiled mapper cache.
//!
//! Mappers are deduplicated by the [`StructuralKey`] of their plan. Readers
//! take a shared lock; a miss compiles outside any lock and then registers
//! the result, so compiling a nested plan may re-enter the cache. When two
//! threads race on the same key, the first registration wins and both get
//! the same mapper.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::converter::ConverterRegistry;
use crate::error::{MapperError, MapperResult};
use crate::error_handler::FieldErrorHandler;
use crate::key::StructuralKey;
use crate::mapper::CompiledMapper;
use crate::plan::MappingPlan;
use crate::value::Formats;

/// Everything compilation needs besides the plan
pub struct CompileEnv<'a> {
    pub cache: &'a MapperCache,
    pub converters: &'a ConverterRegistry,
    pub formats: Arc<Formats>,
    pub field_handler: Arc<dyn FieldErrorHandler>,
}

type CachedMapper = Arc<dyn Any + Send + Sync>;

/// Append-only store of compiled mappers
#[derive(Default)]
pub struct MapperCache {
    index: RwLock<HashMap<StructuralKey, usize>>,
    mappers: RwLock<Vec<CachedMapper>>,
    compiled: AtomicUsize,
}

impl MapperCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct mappers registered
    pub fn len(&self) -> usize {
        self.mappers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of compilations performed, including ones that lost a race
    pub fn compilations(&self) -> usize {
        self.compiled.load(Ordering::Relaxed)
    }

    /// Look up a mapper by key
    pub fn get<T: 'static>(&self, key: &StructuralKey) -> MapperResult<Option<Arc<CompiledMapper<T>>>> {
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        let Some(&slot) = index.get(key) else {
            return Ok(None);
        };
        let mappers = self.mappers.read().unwrap_or_else(|e| e.into_inner());
        downcast(&mappers[slot], key).map(Some)
    }

    /// Cached mapper for the plan, compiling it on a miss
    pub fn get_or_compile<T: 'static>(
        &self,
        plan: &MappingPlan<T>,
        env: &CompileEnv<'_>,
    ) -> MapperResult<Arc<CompiledMapper<T>>> {
        let key = plan.structural_key();
        if let Some(mapper) = self.get::<T>(&key)? {
            tracing::trace!("Mapper cache hit for {}", key);
            return Ok(mapper);
        }

        let compiled = Arc::new(CompiledMapper::compile(plan, env)?);
        self.compiled.fetch_add(1, Ordering::Relaxed);

        let mut index = self.index.write().unwrap_or_else(|e| e.into_inner());
        let mut mappers = self.mappers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(&slot) = index.get(&key) {
            tracing::debug!("Discarding concurrently compiled mapper for {}", key);
            return downcast(&mappers[slot], &key);
        }
        mappers.push(compiled.clone());
        index.insert(key.clone(), mappers.len() - 1);
        tracing::debug!("Compiled mapper #{} for {}", mappers.len(), key);
        Ok(compiled)
    }
}

fn downcast<T: 'static>(entry: &CachedMapper, key: &StructuralKey) -> MapperResult<Arc<CompiledMapper<T>>> {
    entry.clone().downcast::<CompiledMapper<T>>().map_err(|_| {
        MapperError::AccessorResolution(format!("cached mapper for {} has an unexpected type", key))
    })
}
