use crate::errors::RepoError;
use crate::models::{Meme, MemeTemplate, Rating, User};
use async_trait::async_trait;
use backoff::backoff::Backoff;
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

/// Outcome of the atomic rating upsert: the effective score and whether
/// the store inserted a new row or overwrote an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingUpsert {
    pub score: i32,
    pub created: bool,
}

/// Trait defining operations for storing and retrieving meme templates.
#[async_trait]
pub trait TemplateRepository: Send + Sync + 'static {
    async fn create(&self, template: &MemeTemplate) -> Result<(), RepoError>;

    /// Returns Ok(None) if the template is not found.
    async fn get_by_id(&self, id: Uuid) -> Result<Option<MemeTemplate>, RepoError>;

    async fn list_all(&self) -> Result<Vec<MemeTemplate>, RepoError>;

    /// Overwrites an existing template in place.
    async fn update(&self, template: &MemeTemplate) -> Result<(), RepoError>;
}

/// Trait defining operations for storing and retrieving meme records.
#[async_trait]
pub trait MemeRepository: Send + Sync + 'static {
    async fn create(&self, meme: &Meme) -> Result<(), RepoError>;

    /// Returns Ok(None) if the meme is not found.
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Meme>, RepoError>;

    /// Lists all memes.
    /// WARNING: This can be inefficient on large datasets. Consider pagination.
    async fn list_all(&self) -> Result<Vec<Meme>, RepoError>;

    /// Lists only the meme ids (projection read; cheaper than `list_all`
    /// when the caller needs nothing but the id set).
    async fn list_ids(&self) -> Result<Vec<Uuid>, RepoError>;

    async fn delete(&self, id: Uuid) -> Result<(), RepoError>;
}

/// Trait defining operations over the per-user meme ratings.
///
/// The store keys ratings by the (meme, user) pair, so `upsert` is the
/// only write path and cannot produce a second row for the same pair.
#[async_trait]
pub trait RatingRepository: Send + Sync + 'static {
    /// Creates or overwrites the caller's rating for a meme as one atomic
    /// store operation. The rating's identity and creation timestamp
    /// survive overwrites.
    async fn upsert(&self, meme_id: Uuid, user_id: Uuid, score: i32) -> Result<RatingUpsert, RepoError>;

    /// All scores recorded for one meme.
    async fn scores_for_meme(&self, meme_id: Uuid) -> Result<Vec<i32>, RepoError>;

    /// Every (meme id, score) pair in the store, for aggregate ranking.
    async fn scores_by_meme(&self) -> Result<Vec<(Uuid, i32)>, RepoError>;

    async fn list_all(&self) -> Result<Vec<Rating>, RepoError>;

    /// Removes every rating attached to a meme (cascade on meme deletion).
    async fn delete_for_meme(&self, meme_id: Uuid) -> Result<(), RepoError>;
}

/// Trait defining operations for users and their auth tokens.
#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    async fn create(&self, user: &User) -> Result<(), RepoError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError>;

    /// Records an issued token key for a user.
    async fn store_token(&self, token: &str, user_id: Uuid) -> Result<(), RepoError>;

    /// Resolves a token key to its user. Returns Ok(None) for unknown tokens.
    async fn user_for_token(&self, token: &str) -> Result<Option<User>, RepoError>;
}

/// Backoff policy that grants exactly one retry after a short pause.
#[derive(Debug, Default)]
struct RetryOnce {
    spent: bool,
}

impl Backoff for RetryOnce {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.spent {
            None
        } else {
            self.spent = true;
            Some(Duration::from_millis(50))
        }
    }

    fn reset(&mut self) {
        self.spent = false;
    }
}

/// Runs a read-only store call, retrying it at most once if the store
/// reports itself unavailable. Write paths must not go through here: the
/// rating upsert is only retried by the caller's own choice.
pub async fn retry_read<T, Fut, F>(op: F) -> Result<T, RepoError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, RepoError>>,
{
    backoff::future::retry(RetryOnce::default(), || {
        let attempt = op();
        async move {
            attempt.await.map_err(|err| match err {
                RepoError::Unavailable(_) => {
                    tracing::warn!("Read-only store call reported unavailable");
                    backoff::Error::transient(err)
                }
                other => backoff::Error::permanent(other),
            })
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn flaky(calls: &AtomicUsize, fail_first: usize, err: fn() -> RepoError) -> Result<u32, RepoError> {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        if n < fail_first {
            Err(err())
        } else {
            Ok(7)
        }
    }

    fn unavailable() -> RepoError {
        RepoError::Unavailable(anyhow::anyhow!("store down"))
    }

    fn backend() -> RepoError {
        RepoError::Backend(anyhow::anyhow!("boom"))
    }

    #[tokio::test]
    async fn retries_once_on_unavailable() {
        let calls = AtomicUsize::new(0);
        let result = retry_read(|| flaky(&calls, 1, unavailable)).await;
        assert_eq!(result.ok(), Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_second_unavailable() {
        let calls = AtomicUsize::new(0);
        let result = retry_read(|| flaky(&calls, 5, unavailable)).await;
        assert!(matches!(result, Err(RepoError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_backend_errors() {
        let calls = AtomicUsize::new(0);
        let result = retry_read(|| flaky(&calls, 5, backend)).await;
        assert!(matches!(result, Err(RepoError::Backend(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
