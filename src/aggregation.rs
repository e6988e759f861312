use crate::{
    domain::{retry_read, MemeRepository, RatingRepository},
    errors::AppError,
    models::Meme,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A meme together with its mean score, as ranked by `top_rated`.
#[derive(Serialize, Debug, Clone)]
pub struct RankedMeme {
    #[serde(flatten)]
    pub meme: Meme,
    #[serde(rename = "avg_rating")]
    pub average: f64,
}

/// Read-only aggregate views over the rating collection. Safe to run
/// concurrently with anything; store reads are retried once on
/// unavailability.
#[derive(Clone)]
pub struct AggregationService {
    memes: Arc<dyn MemeRepository>,
    ratings: Arc<dyn RatingRepository>,
}

impl AggregationService {
    pub fn new(memes: Arc<dyn MemeRepository>, ratings: Arc<dyn RatingRepository>) -> Self {
        Self { memes, ratings }
    }

    /// Mean score for one meme, or `None` when it has no ratings at all.
    /// A missing average is not a zero average.
    pub async fn average_score(&self, meme_id: Uuid) -> Result<Option<f64>, AppError> {
        let scores = retry_read(|| self.ratings.scores_for_meme(meme_id)).await?;
        if scores.is_empty() {
            return Ok(None);
        }
        let sum: i64 = scores.iter().map(|s| *s as i64).sum();
        Ok(Some(sum as f64 / scores.len() as f64))
    }

    /// The `n` best-rated memes, descending by mean score, ties broken by
    /// meme id ascending so results are reproducible across calls. Memes
    /// with zero ratings have no average to order by and are left out
    /// entirely; fewer than `n` qualifying memes is not an error.
    pub async fn top_rated(&self, n: usize) -> Result<Vec<RankedMeme>, AppError> {
        let mut tally: HashMap<Uuid, (i64, u32)> = HashMap::new();
        for (meme_id, score) in retry_read(|| self.ratings.scores_by_meme()).await? {
            let entry = tally.entry(meme_id).or_default();
            entry.0 += score as i64;
            entry.1 += 1;
        }

        let mut averages: Vec<(Uuid, f64)> = tally
            .into_iter()
            .map(|(id, (sum, count))| (id, sum as f64 / count as f64))
            .collect();
        averages.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        averages.truncate(n);

        let mut ranked = Vec::with_capacity(averages.len());
        for (id, average) in averages {
            // a meme deleted after its ratings were scanned simply drops out
            match retry_read(|| self.memes.get_by_id(id)).await? {
                Some(meme) => ranked.push(RankedMeme { meme, average }),
                None => tracing::debug!(meme_id = %id, "Skipping rated meme that no longer exists"),
            }
        }

        tracing::debug!(requested = n, returned = ranked.len(), "Computed top-rated memes");
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemStore;

    fn service(store: &Arc<MemStore>) -> AggregationService {
        AggregationService::new(store.clone(), store.clone())
    }

    #[tokio::test]
    async fn average_is_the_mean_of_all_scores() {
        let store = Arc::new(MemStore::default());
        let meme = store.add_meme();
        for score in [3, 4, 5] {
            store.add_rating(meme, store.add_user(), score);
        }

        let avg = service(&store).average_score(meme).await.expect("read ok");
        assert_eq!(avg, Some(4.0));
    }

    #[tokio::test]
    async fn average_of_unrated_meme_is_undefined_not_zero() {
        let store = Arc::new(MemStore::default());
        let meme = store.add_meme();

        let avg = service(&store).average_score(meme).await.expect("read ok");
        assert_eq!(avg, None);
    }

    #[tokio::test]
    async fn re_rating_moves_the_average_without_adding_rows() {
        let store = Arc::new(MemStore::default());
        let meme = store.add_meme();
        let user = store.add_user();
        let engine = crate::rating::RatingEngine::new(store.clone(), store.clone());

        engine.submit(meme, user, 3).await.expect("rate");
        engine.submit(meme, user, 5).await.expect("re-rate");

        let avg = service(&store).average_score(meme).await.expect("read ok");
        assert_eq!(avg, Some(5.0));
        assert_eq!(store.rating_count_for_meme(meme), 1);
    }

    #[tokio::test]
    async fn top_rated_orders_descending_by_average() {
        let store = Arc::new(MemStore::default());
        let low = store.add_meme();
        let mid = store.add_meme();
        let high = store.add_meme();
        store.add_rating(low, store.add_user(), 1);
        store.add_rating(mid, store.add_user(), 3);
        store.add_rating(high, store.add_user(), 5);

        let ranked = service(&store).top_rated(10).await.expect("read ok");
        let ids: Vec<Uuid> = ranked.iter().map(|r| r.meme.id).collect();
        assert_eq!(ids, vec![high, mid, low]);
        assert_eq!(ranked[0].average, 5.0);
        assert_eq!(ranked[2].average, 1.0);
    }

    #[tokio::test]
    async fn fewer_qualifying_memes_than_requested_is_not_an_error() {
        let store = Arc::new(MemStore::default());
        for _ in 0..3 {
            let meme = store.add_meme();
            store.add_rating(meme, store.add_user(), 4);
        }

        let ranked = service(&store).top_rated(10).await.expect("read ok");
        assert_eq!(ranked.len(), 3);
    }

    #[tokio::test]
    async fn unrated_memes_are_excluded_from_the_ranking() {
        let store = Arc::new(MemStore::default());
        let rated = store.add_meme();
        let _unrated = store.add_meme();
        store.add_rating(rated, store.add_user(), 2);

        let ranked = service(&store).top_rated(10).await.expect("read ok");
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].meme.id, rated);
    }

    #[tokio::test]
    async fn equal_averages_tie_break_by_meme_id_ascending() {
        let store = Arc::new(MemStore::default());
        let a = store.add_meme();
        let b = store.add_meme();
        store.add_rating(a, store.add_user(), 3);
        store.add_rating(b, store.add_user(), 3);

        let ranked = service(&store).top_rated(10).await.expect("read ok");
        let ids: Vec<Uuid> = ranked.iter().map(|r| r.meme.id).collect();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn truncates_to_the_requested_count() {
        let store = Arc::new(MemStore::default());
        let best = store.add_meme();
        store.add_rating(best, store.add_user(), 5);
        for score in [1, 2, 3] {
            let meme = store.add_meme();
            store.add_rating(meme, store.add_user(), score);
        }

        let ranked = service(&store).top_rated(2).await.expect("read ok");
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].meme.id, best);
    }
}
