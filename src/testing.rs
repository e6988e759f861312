//! In-memory record store backing the unit tests. Mirrors the DynamoDB
//! semantics the services rely on: the rating upsert is keyed by the
//! (meme, user) pair and preserves the rating's identity and creation
//! timestamp across overwrites.

use crate::{
    aggregation::AggregationService,
    config::Config,
    domain::{MemeRepository, RatingRepository, RatingUpsert, TemplateRepository, UserRepository},
    errors::RepoError,
    models::{Meme, MemeTemplate, Rating, User},
    rating::RatingEngine,
    selection::SelectionService,
    AppState,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Builds a full `AppState` on top of one in-memory store, for tests
/// that drive handlers directly.
pub fn test_state(store: &Arc<MemStore>) -> Arc<AppState> {
    Arc::new(AppState {
        config: Config {
            bind_address: "127.0.0.1:0".parse().expect("loopback address"),
            aws_region: "ca-central-1".to_string(),
            localstack_endpoint: None,
            store_timeout: Duration::from_millis(500),
            default_page_size: 10,
        },
        templates: store.clone(),
        memes: store.clone(),
        ratings: store.clone(),
        users: store.clone(),
        rating_engine: RatingEngine::new(store.clone(), store.clone()),
        aggregation: AggregationService::new(store.clone(), store.clone()),
        selection: SelectionService::new(store.clone()),
    })
}

#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    templates: HashMap<Uuid, MemeTemplate>,
    memes: HashMap<Uuid, Meme>,
    // id index kept separate from the records so tests can simulate an
    // id set that briefly outlives a deleted record
    meme_ids: Vec<Uuid>,
    ratings: HashMap<(Uuid, Uuid), Rating>,
    users: HashMap<Uuid, User>,
    tokens: HashMap<String, Uuid>,
}

impl MemStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("test store mutex poisoned")
    }

    // --- seeding helpers ---

    pub fn add_template(&self) -> Uuid {
        let template = MemeTemplate {
            id: Uuid::new_v4(),
            name: "Distracted Boyfriend".to_string(),
            image_url: "https://memes.example.com/distracted.jpg".to_string(),
            default_top_text: "Top".to_string(),
            default_bottom_text: "Bottom".to_string(),
        };
        let id = template.id;
        self.lock().templates.insert(id, template);
        id
    }

    pub fn add_user(&self) -> Uuid {
        let user = User {
            id: Uuid::new_v4(),
            username: "tester".to_string(),
            email: "tester@example.com".to_string(),
        };
        let id = user.id;
        self.lock().users.insert(id, user);
        id
    }

    pub fn add_meme(&self) -> Uuid {
        let meme = Meme {
            id: Uuid::new_v4(),
            template_id: Uuid::new_v4(),
            top_text: "top".to_string(),
            bottom_text: "bottom".to_string(),
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
        };
        let id = meme.id;
        let mut inner = self.lock();
        inner.memes.insert(id, meme);
        inner.meme_ids.push(id);
        id
    }

    pub fn add_rating(&self, meme_id: Uuid, user_id: Uuid, score: i32) {
        let rating = Rating {
            id: Uuid::new_v4(),
            meme_id,
            user_id,
            score,
            created_at: Utc::now(),
        };
        self.lock().ratings.insert((meme_id, user_id), rating);
    }

    /// Drops the meme record but leaves its id in the index, simulating a
    /// deletion racing a projection scan.
    pub fn remove_meme_record_only(&self, meme_id: Uuid) {
        self.lock().memes.remove(&meme_id);
    }

    // --- inspection helpers ---

    pub fn rating_count_for_meme(&self, meme_id: Uuid) -> usize {
        self.lock().ratings.keys().filter(|(m, _)| *m == meme_id).count()
    }

    pub fn stored_score(&self, meme_id: Uuid, user_id: Uuid) -> Option<i32> {
        self.lock().ratings.get(&(meme_id, user_id)).map(|r| r.score)
    }

    pub fn rating_identity(&self, meme_id: Uuid, user_id: Uuid) -> Option<(Uuid, DateTime<Utc>)> {
        self.lock()
            .ratings
            .get(&(meme_id, user_id))
            .map(|r| (r.id, r.created_at))
    }
}

#[async_trait]
impl TemplateRepository for MemStore {
    async fn create(&self, template: &MemeTemplate) -> Result<(), RepoError> {
        let mut inner = self.lock();
        if inner.templates.contains_key(&template.id) {
            return Err(RepoError::AlreadyExists(format!("template {}", template.id)));
        }
        inner.templates.insert(template.id, template.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<MemeTemplate>, RepoError> {
        Ok(self.lock().templates.get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<MemeTemplate>, RepoError> {
        Ok(self.lock().templates.values().cloned().collect())
    }

    async fn update(&self, template: &MemeTemplate) -> Result<(), RepoError> {
        self.lock().templates.insert(template.id, template.clone());
        Ok(())
    }
}

#[async_trait]
impl MemeRepository for MemStore {
    async fn create(&self, meme: &Meme) -> Result<(), RepoError> {
        let mut inner = self.lock();
        if inner.memes.contains_key(&meme.id) {
            return Err(RepoError::AlreadyExists(format!("meme {}", meme.id)));
        }
        inner.memes.insert(meme.id, meme.clone());
        inner.meme_ids.push(meme.id);
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Meme>, RepoError> {
        Ok(self.lock().memes.get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Meme>, RepoError> {
        Ok(self.lock().memes.values().cloned().collect())
    }

    async fn list_ids(&self) -> Result<Vec<Uuid>, RepoError> {
        Ok(self.lock().meme_ids.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        let mut inner = self.lock();
        inner.memes.remove(&id);
        inner.meme_ids.retain(|candidate| *candidate != id);
        Ok(())
    }
}

#[async_trait]
impl RatingRepository for MemStore {
    async fn upsert(&self, meme_id: Uuid, user_id: Uuid, score: i32) -> Result<RatingUpsert, RepoError> {
        let mut inner = self.lock();
        match inner.ratings.get_mut(&(meme_id, user_id)) {
            Some(existing) => {
                existing.score = score;
                Ok(RatingUpsert { score, created: false })
            }
            None => {
                inner.ratings.insert(
                    (meme_id, user_id),
                    Rating {
                        id: Uuid::new_v4(),
                        meme_id,
                        user_id,
                        score,
                        created_at: Utc::now(),
                    },
                );
                Ok(RatingUpsert { score, created: true })
            }
        }
    }

    async fn scores_for_meme(&self, meme_id: Uuid) -> Result<Vec<i32>, RepoError> {
        Ok(self
            .lock()
            .ratings
            .values()
            .filter(|r| r.meme_id == meme_id)
            .map(|r| r.score)
            .collect())
    }

    async fn scores_by_meme(&self) -> Result<Vec<(Uuid, i32)>, RepoError> {
        Ok(self.lock().ratings.values().map(|r| (r.meme_id, r.score)).collect())
    }

    async fn list_all(&self) -> Result<Vec<Rating>, RepoError> {
        Ok(self.lock().ratings.values().cloned().collect())
    }

    async fn delete_for_meme(&self, meme_id: Uuid) -> Result<(), RepoError> {
        self.lock().ratings.retain(|(m, _), _| *m != meme_id);
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemStore {
    async fn create(&self, user: &User) -> Result<(), RepoError> {
        let mut inner = self.lock();
        if inner.users.contains_key(&user.id) {
            return Err(RepoError::AlreadyExists(format!("user {}", user.id)));
        }
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        Ok(self.lock().users.get(&id).cloned())
    }

    async fn store_token(&self, token: &str, user_id: Uuid) -> Result<(), RepoError> {
        self.lock().tokens.insert(token.to_string(), user_id);
        Ok(())
    }

    async fn user_for_token(&self, token: &str) -> Result<Option<User>, RepoError> {
        let inner = self.lock();
        Ok(inner
            .tokens
            .get(token)
            .and_then(|user_id| inner.users.get(user_id))
            .cloned())
    }
}
