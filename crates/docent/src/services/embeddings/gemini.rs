//! Gemini embedding backend
//!
//! - Single: `POST {base}/{model}:embedContent`
//! - Batch: `POST {base}/{model}:batchEmbedContents`, at most 100 requests each
//! - Auth: `x-goog-api-key` header
//!
//! `outputDimensionality` pins the vector length to the configured dimension.

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{prepare_input, validate_dimension, Embedder, EmbeddingTask};
use crate::config::EmbeddingConfig;
use crate::errors::EmbeddingError;
use crate::models::EmbeddingModel;

const API_KEY_HEADER: &str = "x-goog-api-key";
const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
  model: &'a str,
  content: Content<'a>,
  task_type: &'static str,
  output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
  parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
  text: &'a str,
}

#[derive(Debug, Serialize)]
struct BatchEmbedContentsRequest<'a> {
  requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
  embedding: ContentEmbedding,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedContentsResponse {
  #[serde(default)]
  embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
  values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
  error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
  message: Option<String>,
}

pub struct GeminiEmbedder {
  client: reqwest::Client,
  api_key: String,
  base_url: String,
  /// Model path as the API expects it, e.g. `models/gemini-embedding-001`
  model_path: String,
  model: EmbeddingModel,
  max_input_chars: usize,
}

impl GeminiEmbedder {
  pub fn new(config: &EmbeddingConfig, api_key: &str) -> Result<Self, EmbeddingError> {
    let client = reqwest::Client::builder()
      .timeout(config.timeout())
      .build()
      .map_err(|e| EmbeddingError::network(format!("failed to build HTTP client: {e}")))?;

    Ok(Self {
      client,
      api_key: api_key.to_string(),
      base_url: config.base_url.trim_end_matches('/').to_string(),
      model_path: qualified_model(&config.model),
      model: config.embedding_model(),
      max_input_chars: config.max_input_chars,
    })
  }

  fn endpoint(&self, method: &str) -> String {
    format!("{}/{}:{}", self.base_url, self.model_path, method)
  }

  fn request<'a>(&'a self, text: &'a str, task: EmbeddingTask) -> EmbedContentRequest<'a> {
    EmbedContentRequest {
      model: &self.model_path,
      content: Content { parts: vec![Part { text }] },
      task_type: task.as_api_str(),
      output_dimensionality: self.model.dimension,
    }
  }

  async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(&self, url: &str, body: &B) -> Result<R, EmbeddingError> {
    tracing::debug!(url, "sending embedding request");

    let response = self
      .client
      .post(url)
      .header(API_KEY_HEADER, &self.api_key)
      .json(body)
      .send()
      .await
      .map_err(map_reqwest_error)?;

    let status = response.status().as_u16();
    if response.status().is_success() {
      let text = response
        .text()
        .await
        .map_err(|e| EmbeddingError::network(format!("failed to read response body: {e}")))?;
      return serde_json::from_str::<R>(&text)
        .map_err(|e| EmbeddingError::parse(format!("failed to parse embedding response: {e}")));
    }

    let retry_after = response
      .headers()
      .get(RETRY_AFTER)
      .and_then(|value| value.to_str().ok())
      .and_then(|value| value.trim().parse::<u64>().ok())
      .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();
    Err(map_http_error(status, &body, &self.model.name, retry_after))
  }

  async fn embed_chunk(&self, texts: &[&str], task: EmbeddingTask) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let body = BatchEmbedContentsRequest { requests: texts.iter().map(|text| self.request(text, task)).collect() };
    let response: BatchEmbedContentsResponse = self.post(&self.endpoint("batchEmbedContents"), &body).await?;

    if response.embeddings.len() != texts.len() {
      return Err(EmbeddingError::parse(format!(
        "expected {} embeddings but the model returned {}",
        texts.len(),
        response.embeddings.len()
      )));
    }

    response.embeddings.into_iter().map(|embedding| validate_dimension(&self.model, embedding.values)).collect()
  }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
  fn model(&self) -> &EmbeddingModel {
    &self.model
  }

  async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>, EmbeddingError> {
    let text = prepare_input(text, self.max_input_chars)?;
    let response: EmbedContentResponse = self.post(&self.endpoint("embedContent"), &self.request(text, task)).await?;
    validate_dimension(&self.model, response.embedding.values)
  }

  async fn embed_batch(&self, texts: &[String], task: EmbeddingTask) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let prepared =
      texts.iter().map(|text| prepare_input(text, self.max_input_chars)).collect::<Result<Vec<_>, _>>()?;

    let mut vectors = Vec::with_capacity(prepared.len());
    for chunk in prepared.chunks(MAX_BATCH_SIZE) {
      vectors.extend(self.embed_chunk(chunk, task).await?);
    }
    Ok(vectors)
  }
}

/// The API addresses models as `models/<name>`
fn qualified_model(model: &str) -> String {
  let model = model.trim();
  if model.starts_with("models/") {
    model.to_string()
  } else {
    format!("models/{model}")
  }
}

fn map_reqwest_error(err: reqwest::Error) -> EmbeddingError {
  if err.is_timeout() {
    EmbeddingError::network(format!("embedding request timed out: {err}"))
  } else {
    EmbeddingError::network(err.to_string())
  }
}

fn map_http_error(status: u16, body: &str, model: &str, retry_after: Option<Duration>) -> EmbeddingError {
  let message = serde_json::from_str::<ApiErrorResponse>(body)
    .ok()
    .and_then(|response| response.error)
    .and_then(|detail| detail.message)
    .unwrap_or_else(|| body.to_string());

  match status {
    401 | 403 => EmbeddingError::Authentication { message },
    429 => EmbeddingError::rate_limited(message, retry_after),
    400 => EmbeddingError::InvalidInput { message },
    404 => EmbeddingError::ModelNotFound { model: model.to_string() },
    _ => EmbeddingError::Server { status, message },
  }
}
