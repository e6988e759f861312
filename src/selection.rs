use crate::{
    domain::{retry_read, MemeRepository},
    errors::AppError,
    models::Meme,
};
use rand::Rng;
use std::sync::Arc;

/// Picks a uniformly random meme from the collection. Every meme is
/// equally likely; successive calls are independent draws.
#[derive(Clone)]
pub struct SelectionService {
    memes: Arc<dyn MemeRepository>,
}

impl SelectionService {
    pub fn new(memes: Arc<dyn MemeRepository>) -> Self {
        Self { memes }
    }

    /// Draws from the current id set rather than asking the store to
    /// shuffle whole records: one projection read for the ids, one point
    /// read for the winner. An id whose meme vanished between the two
    /// reads is discarded and the draw repeats over the rest.
    pub async fn random_meme(&self) -> Result<Meme, AppError> {
        let mut ids = retry_read(|| self.memes.list_ids()).await?;

        loop {
            if ids.is_empty() {
                return Err(AppError::NoMemes);
            }
            let index = rand::thread_rng().gen_range(0..ids.len());
            let id = ids.swap_remove(index);
            if let Some(meme) = retry_read(|| self.memes.get_by_id(id)).await? {
                return Ok(meme);
            }
            tracing::debug!(meme_id = %id, "Drawn meme no longer exists, redrawing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemStore;
    use std::collections::HashSet;
    use uuid::Uuid;

    #[tokio::test]
    async fn empty_collection_is_not_found() {
        let store = Arc::new(MemStore::default());
        let err = SelectionService::new(store).random_meme().await.expect_err("no memes");
        assert!(matches!(err, AppError::NoMemes));
    }

    #[tokio::test]
    async fn always_returns_a_member_of_the_collection() {
        let store = Arc::new(MemStore::default());
        let ids: HashSet<Uuid> = (0..5).map(|_| store.add_meme()).collect();
        let service = SelectionService::new(store);

        for _ in 0..20 {
            let meme = service.random_meme().await.expect("non-empty collection");
            assert!(ids.contains(&meme.id));
        }
    }

    #[tokio::test]
    async fn repeated_draws_cover_the_collection() {
        let store = Arc::new(MemStore::default());
        let ids: HashSet<Uuid> = (0..3).map(|_| store.add_meme()).collect();
        let service = SelectionService::new(store);

        let mut seen = HashSet::new();
        for _ in 0..100 {
            seen.insert(service.random_meme().await.expect("non-empty collection").id);
        }
        // 100 independent uniform draws over 3 memes miss one with
        // probability ~3e-18
        assert_eq!(seen, ids);
    }

    #[tokio::test]
    async fn dangling_ids_are_skipped_not_fatal() {
        let store = Arc::new(MemStore::default());
        let kept = store.add_meme();
        let doomed = store.add_meme();
        store.remove_meme_record_only(doomed);
        let service = SelectionService::new(store);

        for _ in 0..10 {
            let meme = service.random_meme().await.expect("one live meme remains");
            assert_eq!(meme.id, kept);
        }
    }
}
