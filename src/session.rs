use std::{collections::{BTreeMap, HashMap}, sync::Arc};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::{sync::watch, task::JoinHandle};
use uuid::Uuid;

use crate::{
    aggregator::CategoryMemo,
    models::{categories_of, Category, ImageState, Recommendation, RecommendedItem, SessionSnapshot, StyleProfile},
};

/// Everything one recommendation request produced, kept while the caller
/// polls for the illustration and browses categories.
pub struct Session {
    pub id: Uuid,
    pub style: StyleProfile,
    pub items: Vec<RecommendedItem>,
    pub categories: Vec<Category>,
    pub created_at: DateTime<Utc>,
    image: watch::Receiver<ImageState>,
    image_task: Mutex<Option<JoinHandle<()>>>,
    pub results: CategoryMemo,
}

impl Session {
    pub fn new(recommendation: Recommendation, image: watch::Receiver<ImageState>) -> Self {
        let categories = categories_of(&recommendation.items);
        Self {
            id: Uuid::new_v4(),
            style: recommendation.style,
            items: recommendation.items,
            categories,
            created_at: Utc::now(),
            image,
            image_task: Mutex::new(None),
            results: CategoryMemo::default(),
        }
    }

    pub fn attach_image_task(&self, handle: JoinHandle<()>) {
        *self.image_task.lock() = Some(handle);
    }

    pub fn image_state(&self) -> ImageState { self.image.borrow().clone() }

    /// Wait until the illustration is attached (placeholder included).
    pub async fn wait_for_image(&self) -> ImageState {
        let mut rx = self.image.clone();
        // A closed channel still holds the last value sent.
        let _ = rx.wait_for(|state| !matches!(state, ImageState::Pending)).await;
        let state = rx.borrow().clone();
        state
    }

    /// Style profile with the image field filled in once it is available.
    pub fn style_profile(&self) -> StyleProfile {
        StyleProfile { image: self.image_state().image().map(str::to_string), ..self.style.clone() }
    }

    pub fn has_category(&self, category: Category) -> bool { self.categories.contains(&category) }

    pub fn snapshot(&self) -> SessionSnapshot {
        let results: BTreeMap<_, _> = self.categories.iter().map(|c| (*c, self.results.get(*c))).collect();
        SessionSnapshot { session_id: self.id, style: self.style_profile(), items: self.items.clone(), results }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(handle) = self.image_task.get_mut().take() {
            if !handle.is_finished() {
                handle.abort();
            }
        }
    }
}

/// In-memory session registry; sessions older than the TTL are pruned on insert.
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
    ttl: chrono::Duration,
}

impl SessionStore {
    pub fn new(ttl: chrono::Duration) -> Self { Self { sessions: RwLock::default(), ttl } }

    pub fn insert(&self, session: Arc<Session>) {
        let mut guard = self.sessions.write();
        // A TTL reaching past the representable range never expires anything.
        if let Some(cutoff) = Utc::now().checked_sub_signed(self.ttl) {
            let before = guard.len();
            guard.retain(|_, s| s.created_at > cutoff);
            if guard.len() < before {
                tracing::info!("🧹 Pruned {} expired session(s)", before - guard.len());
            }
        }
        guard.insert(session.id, session);
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<Session>> { self.sessions.read().get(id).cloned() }
}
