//! Startup preload and parent/requirement relationships.
//!
//! The preload cycle acquires a request digest, then loads every configured
//! list plus the current user and the site users concurrently through the
//! request cache. Results land in named `DataSlots`; a relationship index is
//! then built between the configured parent and requirement lists.
//!
//! Any failing slot fails the whole cycle. Callers get either a complete set
//! of slots or an error naming the slot that failed.

pub mod introspect;
pub mod relationships;
pub mod slots;

use std::collections::BTreeMap;
use std::time::Duration;

use futures::future::try_join_all;
use serde::Serialize;
use tokio::time::Instant;
use tracing::info;

use crate::api::DataError;
use crate::models::ListQueryOptions;
use crate::service::ListService;

pub use relationships::RelationshipIndex;
pub use slots::DataSlots;

pub const DIGEST_SLOT: &str = "digest";
pub const CURRENT_USER_SLOT: &str = "currentUser";
pub const SITE_USERS_SLOT: &str = "siteUsers";

/// Outcome of a completed preload cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadSummary {
    pub list_counts: BTreeMap<String, usize>,
    pub site_user_count: usize,
    pub current_user: Option<String>,
    pub linked_requirements: usize,
    pub unlinked_requirements: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Run one preload cycle and return freshly built slots.
pub async fn run(service: &ListService) -> Result<(DataSlots, PreloadSummary), DataError> {
    let started = Instant::now();
    let config = service.config();
    info!(lists = config.lists.len(), "Starting preload");

    service
        .get_credential()
        .await
        .map_err(|e| DataError::preload(DIGEST_SLOT, e))?;

    let list_loads = config.lists.iter().map(|(alias, list)| async move {
        service
            .list_items(&list.name, &list.query)
            .await
            .map(|records| (alias.clone(), records))
            .map_err(|e| DataError::preload(alias, e))
    });
    let default_options = ListQueryOptions::default();

    let (lists, current_user, site_users) = tokio::try_join!(
        try_join_all(list_loads),
        async {
            service
                .current_user(&default_options)
                .await
                .map_err(|e| DataError::preload(CURRENT_USER_SLOT, e))
        },
        async {
            service
                .site_users(&default_options)
                .await
                .map_err(|e| DataError::preload(SITE_USERS_SLOT, e))
        },
    )?;

    let mut slots = DataSlots::new();
    for (alias, records) in lists {
        info!(alias = %alias, count = records.len(), "Loaded list");
        slots.set_list(alias, records);
    }
    slots.set_current_user(current_user);
    slots.set_site_users(site_users);
    slots.relink(&config.relationships);

    let summary = PreloadSummary {
        list_counts: slots.counts(),
        site_user_count: slots.site_users().map_or(0, |users| users.len()),
        current_user: slots.current_user().map(|user| user.title()),
        linked_requirements: slots.relationships().linked_count(),
        unlinked_requirements: slots.relationships().unlinked_count(),
        elapsed: started.elapsed(),
    };
    info!(
        lists = summary.list_counts.len(),
        site_users = summary.site_user_count,
        linked = summary.linked_requirements,
        elapsed_ms = u64::try_from(summary.elapsed.as_millis()).unwrap_or(u64::MAX),
        "Preload complete"
    );

    Ok((slots, summary))
}
