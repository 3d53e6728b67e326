use std::{collections::HashSet, sync::Arc};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use shared::{
    domain::{Tutor, TutorId},
    protocol::{FilterCriteria, FilterField},
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

/// Read seam over the local favorites store. The screen only ever reads; the
/// write path lives with the detail view that does the favoriting.
#[async_trait]
pub trait FavoritesSource: Send + Sync {
    /// Raw JSON value under the favorites key, `None` when no favorites were
    /// ever stored.
    async fn favorites_json(&self) -> Result<Option<String>>;
}

pub struct MissingFavoritesSource;

#[async_trait]
impl FavoritesSource for MissingFavoritesSource {
    async fn favorites_json(&self) -> Result<Option<String>> {
        Err(anyhow!("favorites store is unavailable"))
    }
}

#[async_trait]
impl FavoritesSource for storage::Storage {
    async fn favorites_json(&self) -> Result<Option<String>> {
        self.load_favorites_json().await
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to send catalog query: {0}")]
    Request(String),
    #[error("catalog rejected the query with status {0}")]
    Status(u16),
    #[error("invalid tutor list payload: {0}")]
    Decode(String),
}

#[derive(Debug, Clone)]
pub enum ScreenEvent {
    FavoritesReloaded { favorite_count: usize },
    TutorsReplaced { tutor_count: usize },
    FilterVisibilityChanged { visible: bool },
    Error(String),
}

/// One rendered list row: the record plus the flag derived from the current
/// favorite-id set.
#[derive(Debug, Clone, PartialEq)]
pub struct TutorRow {
    pub tutor: Tutor,
    pub favorited: bool,
}

#[derive(Debug, Clone)]
pub struct ScreenSnapshot {
    pub filter_visible: bool,
    pub filter: FilterCriteria,
    pub rows: Vec<TutorRow>,
    pub favorite_ids: HashSet<TutorId>,
    pub last_error: Option<String>,
    pub submit_in_flight: bool,
}

/// Pure row derivation: `favorited` iff the record's id is in the set. Rows
/// are recomputed from the two inputs on every call, never cached.
pub fn annotate_rows(tutors: &[Tutor], favorite_ids: &HashSet<TutorId>) -> Vec<TutorRow> {
    tutors
        .iter()
        .map(|tutor| TutorRow {
            tutor: tutor.clone(),
            favorited: favorite_ids.contains(&tutor.id),
        })
        .collect()
}

struct ScreenState {
    filter_visible: bool,
    filter: FilterCriteria,
    tutors: Vec<Tutor>,
    favorite_ids: HashSet<TutorId>,
    last_error: Option<String>,
    submit_generation: u64,
    submit_in_flight: bool,
}

#[derive(Debug, Deserialize)]
struct StoredFavorite {
    id: TutorId,
}

fn parse_favorite_ids(raw: &str) -> serde_json::Result<HashSet<TutorId>> {
    let records: Vec<StoredFavorite> = serde_json::from_str(raw)?;
    Ok(records.into_iter().map(|record| record.id).collect())
}

/// The tutor list screen: a collapsible filter form over a remote catalog
/// query, with rows annotated from the local favorites store.
pub struct TutorListScreen {
    http: Client,
    server_url: String,
    favorites: Arc<dyn FavoritesSource>,
    inner: Mutex<ScreenState>,
    events: broadcast::Sender<ScreenEvent>,
}

impl TutorListScreen {
    pub fn new(server_url: impl Into<String>, favorites: Arc<dyn FavoritesSource>) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            http: Client::new(),
            server_url: server_url.into(),
            favorites,
            inner: Mutex::new(ScreenState {
                filter_visible: false,
                filter: FilterCriteria::default(),
                tutors: Vec::new(),
                favorite_ids: HashSet::new(),
                last_error: None,
                submit_generation: 0,
                submit_in_flight: false,
            }),
            events,
        })
    }

    pub fn new_without_favorites(server_url: impl Into<String>) -> Arc<Self> {
        Self::new(server_url, Arc::new(MissingFavoritesSource))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ScreenEvent> {
        self.events.subscribe()
    }

    /// Screen-focus hook: favorites are re-read so changes made on another
    /// screen since the last render are reflected.
    pub async fn on_focus(&self) {
        self.reload_favorites().await;
    }

    pub async fn toggle_filter_visibility(&self) -> bool {
        let visible = {
            let mut inner = self.inner.lock().await;
            inner.filter_visible = !inner.filter_visible;
            inner.filter_visible
        };
        let _ = self
            .events
            .send(ScreenEvent::FilterVisibilityChanged { visible });
        visible
    }

    /// Updates one filter field. Empty strings are accepted and mean "no
    /// filter" for that dimension; no validation is performed.
    pub async fn set_filter_field(&self, field: FilterField, value: impl Into<String>) {
        self.inner.lock().await.filter.set(field, value);
    }

    /// Submits the filter form: reloads favorites, queries the catalog once,
    /// and on success replaces the list verbatim and hides the form. On
    /// failure the previous list and the form visibility are left untouched,
    /// the error is recorded on the screen and returned.
    ///
    /// Each submit supersedes any still-pending one: a response that resolves
    /// after a newer submit began is dropped without touching state.
    pub async fn submit_filters(&self) -> Result<()> {
        let (criteria, token) = {
            let mut inner = self.inner.lock().await;
            inner.submit_generation += 1;
            inner.submit_in_flight = true;
            (inner.filter.clone(), inner.submit_generation)
        };

        self.reload_favorites().await;

        let fetched = self.fetch_available_tutors(&criteria).await;

        let mut inner = self.inner.lock().await;
        if inner.submit_generation != token {
            info!(
                token,
                current = inner.submit_generation,
                "dropping stale catalog response"
            );
            return Ok(());
        }
        inner.submit_in_flight = false;

        match fetched {
            Ok(tutors) => {
                let tutor_count = tutors.len();
                let mut seen = HashSet::new();
                for tutor in &tutors {
                    if !seen.insert(tutor.id) {
                        warn!(tutor_id = tutor.id.0, "catalog response repeats a tutor id");
                    }
                }
                inner.tutors = tutors;
                inner.last_error = None;
                inner.filter_visible = false;
                drop(inner);
                let _ = self.events.send(ScreenEvent::TutorsReplaced { tutor_count });
                let _ = self
                    .events
                    .send(ScreenEvent::FilterVisibilityChanged { visible: false });
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                inner.last_error = Some(message.clone());
                drop(inner);
                let _ = self.events.send(ScreenEvent::Error(message));
                Err(err.into())
            }
        }
    }

    /// Current render inputs. Rows are derived on every call so the
    /// favorited flag always reflects the favorite-id set at render time.
    pub async fn snapshot(&self) -> ScreenSnapshot {
        let inner = self.inner.lock().await;
        ScreenSnapshot {
            filter_visible: inner.filter_visible,
            filter: inner.filter.clone(),
            rows: annotate_rows(&inner.tutors, &inner.favorite_ids),
            favorite_ids: inner.favorite_ids.clone(),
            last_error: inner.last_error.clone(),
            submit_in_flight: inner.submit_in_flight,
        }
    }

    /// Rebuilds the favorite-id set from the store. Read failures and
    /// malformed entries degrade to an empty set; bad local data must never
    /// take the screen down.
    async fn reload_favorites(&self) {
        let ids = match self.favorites.favorites_json().await {
            Ok(Some(raw)) => match parse_favorite_ids(&raw) {
                Ok(ids) => ids,
                Err(err) => {
                    warn!("favorites entry is malformed; treating as empty: {err}");
                    HashSet::new()
                }
            },
            Ok(None) => HashSet::new(),
            Err(err) => {
                warn!("failed to read favorites store; treating as empty: {err}");
                HashSet::new()
            }
        };

        let favorite_count = ids.len();
        self.inner.lock().await.favorite_ids = ids;
        let _ = self
            .events
            .send(ScreenEvent::FavoritesReloaded { favorite_count });
    }

    /// One catalog query. All three parameters are always sent, empty or
    /// not; the service treats an empty string as "match all" for that
    /// dimension.
    async fn fetch_available_tutors(
        &self,
        criteria: &FilterCriteria,
    ) -> std::result::Result<Vec<Tutor>, CatalogError> {
        let response = self
            .http
            .get(format!("{}/classes", self.server_url))
            .query(&[
                ("subject", criteria.subject.as_str()),
                ("week_day", criteria.week_day.as_str()),
                ("time", criteria.time.as_str()),
            ])
            .send()
            .await
            .map_err(|err| CatalogError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status(status.as_u16()));
        }

        response
            .json::<Vec<Tutor>>()
            .await
            .map_err(|err| CatalogError::Decode(err.to_string()))
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
