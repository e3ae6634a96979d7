use std::sync::Arc;
use tokio::sync::Mutex;

use crate::engine::random::RandomSource;
use crate::types::{FrontierIdea, IdeaId, MIN_SPONSORS};

/// Owns the frontier pool. Every read-modify-write runs under one lock, so an
/// idea can be activated at most once even with concurrent selectors.
pub struct FrontierPool {
    ideas: Mutex<Vec<FrontierIdea>>,
    min_sponsors: u32,
    rng: Arc<dyn RandomSource>,
}

impl FrontierPool {
    /// `min_sponsors` below two is raised to two.
    pub fn new(min_sponsors: u32, rng: Arc<dyn RandomSource>) -> Self {
        Self {
            ideas: Mutex::new(Vec::new()),
            min_sponsors: min_sponsors.max(MIN_SPONSORS),
            rng,
        }
    }

    /// Adds a new idea, or sponsors an existing one with the same normalized text.
    pub async fn propose(&self, idea_text: &str) -> FrontierIdea {
        let key = FrontierIdea::normalized_text(idea_text);
        let mut ideas = self.ideas.lock().await;

        if let Some(existing) = ideas
            .iter_mut()
            .find(|i| FrontierIdea::normalized_text(&i.idea_text) == key)
        {
            existing.sponsor_count += 1;
            return existing.clone();
        }

        let idea = FrontierIdea::new(idea_text.trim().to_string());
        ideas.push(idea.clone());
        idea
    }

    pub async fn sponsor(&self, id: IdeaId) -> Option<FrontierIdea> {
        let mut ideas = self.ideas.lock().await;
        ideas.iter_mut().find(|i| i.id == id).map(|idea| {
            idea.sponsor_count += 1;
            idea.clone()
        })
    }

    pub async fn eligible(&self) -> Vec<FrontierIdea> {
        let ideas = self.ideas.lock().await;
        ideas
            .iter()
            .filter(|i| i.is_eligible(self.min_sponsors))
            .cloned()
            .collect()
    }

    pub async fn has_eligible(&self) -> bool {
        let ideas = self.ideas.lock().await;
        ideas.iter().any(|i| i.is_eligible(self.min_sponsors))
    }

    /// Weighted draw over eligible ideas. The chosen idea is activated before
    /// the lock is released and will never be returned again.
    pub async fn select_weighted(&self) -> Option<FrontierIdea> {
        let mut ideas = self.ideas.lock().await;

        let candidates: Vec<usize> = ideas
            .iter()
            .enumerate()
            .filter(|(_, i)| i.is_eligible(self.min_sponsors))
            .map(|(idx, _)| idx)
            .collect();

        if candidates.is_empty() {
            return None;
        }

        let total: f64 = candidates.iter().map(|&idx| ideas[idx].weight()).sum();
        let mut target = self.rng.next_unit() * total;

        let mut chosen = candidates[candidates.len() - 1];
        for &idx in &candidates {
            let w = ideas[idx].weight();
            if target < w {
                chosen = idx;
                break;
            }
            target -= w;
        }

        let idea = &mut ideas[chosen];
        idea.activated = true;
        log::info!(
            "Activated frontier idea \"{}\" ({} sponsors, {} cycles old)",
            idea.idea_text,
            idea.sponsor_count,
            idea.cycles_alive
        );
        Some(idea.clone())
    }

    /// Advances every idea's age by one cycle.
    pub async fn age(&self) {
        let mut ideas = self.ideas.lock().await;
        for idea in ideas.iter_mut() {
            idea.cycles_alive += 1;
        }
    }

    /// Drops unactivated ideas older than `max_age`. Returns how many were removed.
    pub async fn prune(&self, max_age: u32) -> usize {
        let mut ideas = self.ideas.lock().await;
        let before = ideas.len();
        ideas.retain(|i| i.activated || i.cycles_alive <= max_age);
        before - ideas.len()
    }

    pub async fn all(&self) -> Vec<FrontierIdea> {
        self.ideas.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::random::{FixedRandom, SeededRandom};

    fn pool(rng: Arc<dyn RandomSource>) -> FrontierPool {
        FrontierPool::new(2, rng)
    }

    #[tokio::test]
    async fn test_propose_merges_duplicates() {
        let pool = pool(Arc::new(FixedRandom::always(0.0)));
        pool.propose("Consider open systems").await;
        let merged = pool.propose("  consider OPEN systems ").await;

        assert_eq!(merged.sponsor_count, 2);
        assert_eq!(pool.all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_single_sponsor_is_never_selected() {
        let pool = pool(Arc::new(FixedRandom::always(0.0)));
        pool.propose("lonely idea").await;

        assert!(!pool.has_eligible().await);
        assert!(pool.select_weighted().await.is_none());
    }

    #[tokio::test]
    async fn test_sponsor_floor_cannot_be_lowered() {
        let pool = FrontierPool::new(1, Arc::new(FixedRandom::always(0.0)));
        pool.propose("lonely idea").await;

        assert!(pool.eligible().await.is_empty());
        assert!(pool.select_weighted().await.is_none());
    }

    #[tokio::test]
    async fn test_selected_idea_is_activated_once() {
        let pool = pool(Arc::new(FixedRandom::always(0.5)));
        let idea = pool.propose("pivot").await;
        pool.sponsor(idea.id).await;

        let chosen = pool.select_weighted().await.unwrap();
        assert_eq!(chosen.id, idea.id);
        assert!(chosen.activated);

        assert!(pool.select_weighted().await.is_none());
        assert!(pool.eligible().await.is_empty());
    }

    #[tokio::test]
    async fn test_draw_walks_cumulative_weights() {
        // weights: a = 2/1, b = 4/1 -> total 6; draw 0.5 -> target 3 -> b
        let pool = pool(Arc::new(FixedRandom::new(vec![0.5, 0.0])));
        let a = pool.propose("a").await;
        pool.sponsor(a.id).await;
        let b = pool.propose("b").await;
        for _ in 0..3 {
            pool.sponsor(b.id).await;
        }

        assert_eq!(pool.select_weighted().await.unwrap().id, b.id);
        assert_eq!(pool.select_weighted().await.unwrap().id, a.id);
    }

    #[tokio::test]
    async fn test_more_sponsors_win_more_often() {
        let mut strong_wins = 0;
        for seed in 0..400 {
            let pool = pool(Arc::new(SeededRandom::from_seed(seed)));
            let weak = pool.propose("weak").await;
            pool.sponsor(weak.id).await;
            let strong = pool.propose("strong").await;
            for _ in 0..4 {
                pool.sponsor(strong.id).await;
            }
            if pool.select_weighted().await.unwrap().id == strong.id {
                strong_wins += 1;
            }
        }
        assert!(strong_wins > 200, "strong idea won {} of 400", strong_wins);
    }

    #[tokio::test]
    async fn test_age_and_prune() {
        let pool = pool(Arc::new(FixedRandom::always(0.0)));
        let keep = pool.propose("keep").await;
        pool.sponsor(keep.id).await;
        pool.select_weighted().await;
        pool.propose("stale").await;

        for _ in 0..3 {
            pool.age().await;
        }
        assert!(pool.all().await.iter().all(|i| i.cycles_alive == 3));

        assert_eq!(pool.prune(2).await, 1);
        let remaining = pool.all().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, keep.id);
    }
}
