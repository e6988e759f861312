use crate::{
    domain::{MemeRepository, RatingRepository},
    errors::AppError,
};
use std::sync::Arc;
use uuid::Uuid;

pub const MIN_SCORE: i32 = 1;
pub const MAX_SCORE: i32 = 5;

/// Result of a rating submission. `created` records whether the store
/// inserted a fresh rating or overwrote an earlier one; callers don't
/// need it, but it is worth logging.
#[derive(Debug, Clone, Copy)]
pub struct RatingReceipt {
    pub meme_id: Uuid,
    pub score: i32,
    pub created: bool,
}

/// Applies per-user ratings to memes: first submission creates the
/// rating, later submissions by the same user overwrite it in place.
#[derive(Clone)]
pub struct RatingEngine {
    memes: Arc<dyn MemeRepository>,
    ratings: Arc<dyn RatingRepository>,
}

impl RatingEngine {
    pub fn new(memes: Arc<dyn MemeRepository>, ratings: Arc<dyn RatingRepository>) -> Self {
        Self { memes, ratings }
    }

    /// Validates and records a rating. Out-of-range scores are rejected
    /// before any store access; an unknown meme is a not-found. The
    /// write itself is one atomic upsert keyed by (meme, user) and is
    /// never retried here — it is idempotent by key, so the caller may
    /// resubmit safely.
    pub async fn submit(&self, meme_id: Uuid, user_id: Uuid, score: i32) -> Result<RatingReceipt, AppError> {
        if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
            return Err(AppError::InvalidScore(score));
        }

        if self.memes.get_by_id(meme_id).await?.is_none() {
            return Err(AppError::MemeNotFound(meme_id));
        }

        let outcome = self.ratings.upsert(meme_id, user_id, score).await?;
        tracing::info!(
            %meme_id,
            %user_id,
            score = outcome.score,
            created = outcome.created,
            "Rating applied"
        );

        Ok(RatingReceipt {
            meme_id,
            score: outcome.score,
            created: outcome.created,
        })
    }
}
