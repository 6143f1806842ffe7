use std::cmp::Ordering;
use std::sync::Arc;

use crate::errors::RetrievalError;
use crate::models::{EmbeddingModel, KnowledgeEntry, ScoredEntry};
use crate::services::similarity::cosine_similarity;
use crate::services::store::KnowledgeStore;

/// Score candidates against a query vector and keep the best
///
/// Candidates without an embedding, or whose embedding cannot be scored
/// against the query, are dropped. Survivors at or above `threshold` are
/// ordered by similarity descending, ties by entry id, and cut to `limit`.
pub fn rank<I>(query_embedding: &[f32], candidates: I, threshold: f32, limit: usize) -> Vec<ScoredEntry>
where
  I: IntoIterator<Item = KnowledgeEntry>,
{
  if limit == 0 {
    return Vec::new();
  }

  let mut scored: Vec<ScoredEntry> = candidates
    .into_iter()
    .filter_map(|entry| {
      let similarity = cosine_similarity(query_embedding, &entry.embedding.as_ref()?.values)?;
      (similarity >= threshold).then_some(ScoredEntry { entry, similarity })
    })
    .collect();

  scored.sort_by(|a, b| {
    b.similarity.partial_cmp(&a.similarity).unwrap_or(Ordering::Equal).then_with(|| a.entry.id.cmp(&b.entry.id))
  });
  scored.truncate(limit);
  scored
}

/// Agent-scoped nearest-passage lookup for one embedding model
pub struct VectorMatcher {
  store: Arc<dyn KnowledgeStore>,
  model: EmbeddingModel,
}

impl VectorMatcher {
  pub fn new(store: Arc<dyn KnowledgeStore>, model: EmbeddingModel) -> Self {
    Self { store, model }
  }

  pub fn model(&self) -> &EmbeddingModel {
    &self.model
  }

  /// Best-matching passages of one agent for an already-embedded query
  pub async fn find_matches(
    &self,
    query_embedding: &[f32],
    agent_slug: &str,
    threshold: f32,
    limit: usize,
  ) -> Result<Vec<ScoredEntry>, RetrievalError> {
    if query_embedding.len() != self.model.dimension {
      return Err(RetrievalError::DimensionMismatch {
        model: self.model.name.clone(),
        expected: self.model.dimension,
        actual: query_embedding.len(),
      });
    }

    if limit == 0 {
      return Ok(Vec::new());
    }

    let matches = self.store.search_similar(query_embedding, agent_slug, &self.model, threshold, limit).await?;
    Ok(matches)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::StoredEmbedding;
  use crate::services::store::MockKnowledgeStore;
  use chrono::Utc;

  fn model() -> EmbeddingModel {
    EmbeddingModel::new("test-model", 2)
  }

  fn entry(id: &str, values: Option<Vec<f32>>) -> KnowledgeEntry {
    KnowledgeEntry {
      id: id.to_string(),
      section_id: "section".to_string(),
      content: format!("content of {id}"),
      source: format!("source of {id}"),
      embedding: values.map(|v| StoredEmbedding::new(&model(), v)),
      created_at: Utc::now(),
    }
  }

  fn ids(scored: &[ScoredEntry]) -> Vec<&str> {
    scored.iter().map(|s| s.entry.id.as_str()).collect()
  }

  #[test]
  fn test_rank_orders_by_similarity() {
    let candidates = vec![
      entry("far", Some(vec![0.0, 1.0])),
      entry("exact", Some(vec![1.0, 0.0])),
      entry("near", Some(vec![0.9, 0.3])),
    ];

    let ranked = rank(&[1.0, 0.0], candidates, -1.0, 10);
    assert_eq!(ids(&ranked), vec!["exact", "near", "far"]);
    assert!(ranked.windows(2).all(|w| w[0].similarity >= w[1].similarity));
  }

  #[test]
  fn test_rank_applies_threshold_inclusively() {
    let candidates = vec![entry("exact", Some(vec![1.0, 0.0])), entry("orthogonal", Some(vec![0.0, 1.0]))];

    let ranked = rank(&[1.0, 0.0], candidates.clone(), 0.1, 10);
    assert_eq!(ids(&ranked), vec!["exact"]);

    let ranked = rank(&[1.0, 0.0], candidates, 1.0, 10);
    assert_eq!(ids(&ranked), vec!["exact"]);
  }

  #[test]
  fn test_rank_breaks_ties_by_id() {
    let candidates = vec![entry("b", Some(vec![1.0, 0.0])), entry("a", Some(vec![2.0, 0.0])), entry("c", Some(vec![1.0, 0.0]))];

    let ranked = rank(&[1.0, 0.0], candidates, 0.0, 10);
    assert_eq!(ids(&ranked), vec!["a", "b", "c"]);
  }

  #[test]
  fn test_rank_skips_unscorable_candidates() {
    let candidates = vec![
      entry("pending", None),
      entry("zero", Some(vec![0.0, 0.0])),
      entry("short", Some(vec![1.0])),
      entry("ok", Some(vec![1.0, 0.1])),
    ];

    let ranked = rank(&[1.0, 0.0], candidates, -1.0, 10);
    assert_eq!(ids(&ranked), vec!["ok"]);
  }

  #[test]
  fn test_rank_limits() {
    let candidates: Vec<_> = (0..7).map(|i| entry(&format!("e{i}"), Some(vec![1.0, i as f32 * 0.1]))).collect();

    let top = rank(&[1.0, 0.0], candidates.clone(), 0.1, 5);
    assert_eq!(ids(&top), vec!["e0", "e1", "e2", "e3", "e4"]);
    assert!(top.iter().all(|s| s.similarity >= 0.1));
    assert!(rank(&[1.0, 0.0], candidates, 0.1, 0).is_empty());
  }

  #[tokio::test]
  async fn test_find_matches_rejects_wrong_dimension() {
    let mut store = MockKnowledgeStore::new();
    store.expect_search_similar().never();

    let matcher = VectorMatcher::new(Arc::new(store), model());
    let result = matcher.find_matches(&[1.0, 0.0, 0.0], "privacy", 0.1, 5).await;

    assert!(matches!(result, Err(RetrievalError::DimensionMismatch { expected: 2, actual: 3, .. })));
  }

  #[tokio::test]
  async fn test_find_matches_with_zero_limit_skips_store() {
    let mut store = MockKnowledgeStore::new();
    store.expect_search_similar().never();

    let matcher = VectorMatcher::new(Arc::new(store), model());
    let result = matcher.find_matches(&[1.0, 0.0], "privacy", 0.1, 0).await.unwrap();

    assert!(result.is_empty());
  }

  #[tokio::test]
  async fn test_find_matches_delegates_to_store() {
    let mut store = MockKnowledgeStore::new();
    store
      .expect_search_similar()
      .withf(|query, slug, model, threshold, limit| {
        *query == [1.0f32, 0.0] && slug == "privacy" && model.dimension == 2 && *threshold == 0.1 && *limit == 5
      })
      .times(1)
      .returning(|_, _, _, _, _| Ok(vec![ScoredEntry { entry: entry("hit", Some(vec![1.0, 0.0])), similarity: 1.0 }]));

    let matcher = VectorMatcher::new(Arc::new(store), model());
    let result = matcher.find_matches(&[1.0, 0.0], "privacy", 0.1, 5).await.unwrap();

    assert_eq!(ids(&result), vec!["hit"]);
  }
}
