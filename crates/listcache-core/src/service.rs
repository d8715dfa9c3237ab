//! Cached data access for the application.
//!
//! `ListService` is the single entry point consumers use: reads go through
//! the request cache, writes go straight to the gateway and invalidate
//! afterwards, and the preload cycle fills the named slots that the
//! introspection helpers read from. One instance per application (or per
//! test); nothing is global.

use std::collections::HashMap;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use tracing::{debug, info, warn};

use crate::api::{DataError, ListClient};
use crate::cache::{CacheKey, CacheStats, CachedValue, RequestCache};
use crate::config::AppConfig;
use crate::models::{ListQueryOptions, Record};
use crate::preload::{self, DataSlots, PreloadSummary};

/// Field on the current user record holding the account name.
const LOGIN_NAME_FIELD: &str = "LoginName";

pub struct ListService {
    client: ListClient,
    cache: RequestCache,
    config: Arc<AppConfig>,
    slots: RwLock<DataSlots>,
    /// Per-alias counter bumped whenever a slot refresh starts. A load may
    /// only land in its slot if the counter is unchanged when it finishes.
    slot_generations: Mutex<HashMap<String, u64>>,
}

impl ListService {
    pub fn new(config: AppConfig) -> Result<Self, DataError> {
        let config = Arc::new(config);
        let client = ListClient::new(Arc::clone(&config))?;
        let cache = RequestCache::new(config.cache_ttl());
        Ok(Self {
            client,
            cache,
            config,
            slots: RwLock::new(DataSlots::new()),
            slot_generations: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn client(&self) -> &ListClient {
        &self.client
    }

    pub fn cache(&self) -> &RequestCache {
        &self.cache
    }

    fn read_slots(&self) -> RwLockReadGuard<'_, DataSlots> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_slots(&self) -> RwLockWriteGuard<'_, DataSlots> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn generations(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        self.slot_generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn bump_generation(&self, alias: &str) -> u64 {
        let mut generations = self.generations();
        let generation = generations.entry(alias.to_string()).or_insert(0);
        *generation += 1;
        *generation
    }

    fn generation(&self, alias: &str) -> u64 {
        self.generations().get(alias).copied().unwrap_or(0)
    }

    // ===== Cached reads =====

    pub async fn list_items(
        &self,
        list: &str,
        options: &ListQueryOptions,
    ) -> Result<Arc<Vec<Record>>, DataError> {
        let key = CacheKey::list(list, options);
        let client = self.client.clone();
        let (list, options) = (list.to_string(), options.clone());
        let loader = async move {
            client
                .fetch_collection(&list, &options)
                .await
                .map(CachedValue::collection)
        };
        self.cache.get(key.clone(), loader).await?.into_collection(&key)
    }

    pub async fn list_item(
        &self,
        list: &str,
        id: i64,
        options: &ListQueryOptions,
    ) -> Result<Arc<Record>, DataError> {
        let key = CacheKey::list_item(list, id, options);
        let client = self.client.clone();
        let (list, options) = (list.to_string(), options.clone());
        let loader = async move {
            client
                .fetch_item(&list, id, &options)
                .await
                .map(CachedValue::item)
        };
        self.cache.get(key.clone(), loader).await?.into_item(&key)
    }

    pub async fn current_user(&self, options: &ListQueryOptions) -> Result<Arc<Record>, DataError> {
        let key = CacheKey::current_user(options);
        let client = self.client.clone();
        let options = options.clone();
        let loader = async move {
            client
                .fetch_current_user(&options)
                .await
                .map(CachedValue::item)
        };
        self.cache.get(key.clone(), loader).await?.into_item(&key)
    }

    pub async fn site_users(
        &self,
        options: &ListQueryOptions,
    ) -> Result<Arc<Vec<Record>>, DataError> {
        let key = CacheKey::site_users(options);
        let client = self.client.clone();
        let options = options.clone();
        let loader = async move {
            client
                .fetch_site_users(&options)
                .await
                .map(CachedValue::collection)
        };
        self.cache.get(key.clone(), loader).await?.into_collection(&key)
    }

    /// The site's list catalogue.
    pub async fn site_lists(
        &self,
        options: &ListQueryOptions,
    ) -> Result<Arc<Vec<Record>>, DataError> {
        let key = CacheKey::site_lists(options);
        let client = self.client.clone();
        let options = options.clone();
        let loader = async move {
            client
                .fetch_lists(&options)
                .await
                .map(CachedValue::collection)
        };
        self.cache.get(key.clone(), loader).await?.into_collection(&key)
    }

    /// Profile properties for `login_name`, or for the current user when `None`.
    pub async fn user_profile(&self, login_name: Option<&str>) -> Result<Arc<Record>, DataError> {
        let login = match login_name {
            Some(login) => login.to_string(),
            None => {
                let me = self.current_user(&ListQueryOptions::default()).await?;
                me.get_str(LOGIN_NAME_FIELD)
                    .map(str::to_string)
                    .ok_or_else(|| DataError::InvalidResponse {
                        target: "currentUser".to_string(),
                        message: format!("missing {}", LOGIN_NAME_FIELD),
                    })?
            }
        };

        let key = CacheKey::user_profile(&login);
        let client = self.client.clone();
        let loader = async move { client.fetch_user_profile(&login).await.map(CachedValue::item) };
        self.cache.get(key.clone(), loader).await?.into_item(&key)
    }

    pub async fn get_credential(&self) -> Result<String, DataError> {
        self.client.get_credential().await
    }

    // ===== Writes =====

    pub async fn create_item(&self, list: &str, fields: &Record) -> Result<Record, DataError> {
        let created = self.client.create_item(list, fields).await?;
        self.cache.invalidate(list);
        self.refresh_slot_for(list).await;
        Ok(created)
    }

    pub async fn update_item(&self, list: &str, id: i64, fields: &Record) -> Result<(), DataError> {
        self.client.update_item(list, id, fields).await?;
        self.cache.invalidate(list);
        self.cache.invalidate_item(list, id);
        self.refresh_slot_for(list).await;
        Ok(())
    }

    pub async fn delete_item(&self, list: &str, id: i64) -> Result<(), DataError> {
        self.client.delete_item(list, id).await?;
        self.cache.invalidate(list);
        self.cache.invalidate_item(list, id);
        self.refresh_slot_for(list).await;
        Ok(())
    }

    /// Re-fetch the slot backed by `list` after a confirmed write.
    /// A failure here leaves the old slot in place, and so does a result
    /// overtaken by a later refresh of the same slot.
    async fn refresh_slot_for(&self, list: &str) {
        let Some((alias, list_config)) = self.config.list_by_name(list) else {
            return;
        };
        let generation = self.bump_generation(alias);
        match self.list_items(&list_config.name, &list_config.query).await {
            Ok(records) => {
                let relationships = &self.config.relationships;
                let mut slots = self.write_slots();
                if self.generation(alias) != generation {
                    debug!(alias = alias, "Slot refresh superseded, result dropped");
                    return;
                }
                slots.set_list(alias, records);
                if alias == relationships.parent_list || alias == relationships.requirement_list {
                    slots.relink(relationships);
                }
                info!(alias = alias, "Refreshed list slot after write");
            }
            Err(e) => warn!(alias = alias, error = %e, "Failed to refresh list slot after write"),
        }
    }

    // ===== Cache control =====

    pub fn invalidate(&self, list: &str) -> usize {
        self.cache.invalidate(list)
    }

    pub fn invalidate_item(&self, list: &str, id: i64) -> usize {
        self.cache.invalidate_item(list, id)
    }

    /// Run the preload cycle and replace the named slots on success.
    ///
    /// A list slot refreshed by a write while the cycle was running keeps
    /// that newer data instead of the preloaded copy.
    pub async fn preload(&self) -> Result<PreloadSummary, DataError> {
        let started_at = self.generations().clone();
        let (mut loaded, summary) = preload::run(self).await?;

        let mut slots = self.write_slots();
        let generations = self.generations();
        let mut kept = false;
        for (alias, generation) in generations.iter() {
            if started_at.get(alias) == Some(generation) {
                continue;
            }
            if let Some(records) = slots.list(alias) {
                debug!(alias = %alias, "Keeping slot refreshed during preload");
                loaded.set_list(alias.clone(), Arc::clone(records));
                kept = true;
            }
        }
        if kept {
            loaded.relink(&self.config.relationships);
        }
        *slots = loaded;
        Ok(summary)
    }

    /// Hard reset: drop every entry and slot, then preload again.
    pub async fn clear(&self) -> Result<PreloadSummary, DataError> {
        info!("Clearing cache and reloading");
        self.cache.clear();
        self.write_slots().reset();
        self.preload().await
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats::new(self.cache.counters(), self.read_slots().counts())
    }

    // ===== Slot introspection =====

    /// Cheap copy of the current slots (records are shared).
    pub fn slots(&self) -> DataSlots {
        self.read_slots().clone()
    }

    pub fn sample(&self, alias: &str, n: usize) -> Vec<Record> {
        self.read_slots().sample(alias, n)
    }

    pub fn find<P>(&self, alias: &str, predicate: P) -> Vec<Record>
    where
        P: Fn(&Record) -> bool,
    {
        self.read_slots().find(alias, predicate)
    }

    pub fn find_by_id(&self, alias: &str, id: i64) -> Option<Record> {
        self.read_slots().find_by_id(alias, id)
    }

    pub fn user_by_id(&self, id: i64) -> Option<Record> {
        self.read_slots().user_by_id(id)
    }

    pub fn requirements_for(&self, parent_id: i64) -> Vec<Record> {
        let requirement_list = &self.config.relationships.requirement_list;
        self.read_slots().requirements_for(requirement_list, parent_id)
    }

    pub fn parent_of(&self, requirement_id: i64) -> Option<Record> {
        let parent_list = &self.config.relationships.parent_list;
        self.read_slots().parent_of(parent_list, requirement_id)
    }
}
