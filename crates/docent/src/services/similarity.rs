/// Cosine similarity between two embeddings
///
/// Returns `None` when the pair cannot be scored: mismatched or empty
/// lengths, a zero-magnitude vector, or a non-finite result.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
  if a.is_empty() || a.len() != b.len() {
    return None;
  }

  let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
  let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
  let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

  let denominator = magnitude_a * magnitude_b;
  if denominator == 0.0 || !denominator.is_finite() {
    return None;
  }

  let similarity = dot_product / denominator;
  similarity.is_finite().then(|| similarity.clamp(-1.0, 1.0))
}

/// Encode an embedding as little-endian f32 bytes
pub fn embedding_to_bytes(values: &[f32]) -> Vec<u8> {
  values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode little-endian f32 bytes; `None` if the length is not a multiple of four
pub fn bytes_to_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
  if bytes.len() % 4 != 0 {
    return None;
  }

  Some(bytes.chunks_exact(4).map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])).collect())
}
