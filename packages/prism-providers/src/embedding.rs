use serde::Deserialize;

use crate::{Result, invalid_response};

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
	data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
	index: Option<usize>,
	embedding: Vec<f32>,
}

/// Embeds `texts` with `model` through an OpenAI-compatible `/embeddings` endpoint. The output
/// has exactly one vector per input, in input order.
pub async fn embed(
	cfg: &prism_config::EmbeddingProviderConfig,
	model: &str,
	texts: &[String],
) -> Result<Vec<Vec<f32>>> {
	let body = serde_json::json!({
		"model": model,
		"input": texts,
		"dimensions": cfg.dimensions,
	});
	let headers = crate::auth_headers(&cfg.api_key, &cfg.default_headers)?;
	let response: EmbeddingResponse =
		crate::post_json(cfg.timeout_ms, &cfg.api_base, &cfg.path, headers, &body).await?;

	into_vectors(response, texts.len())
}

fn into_vectors(response: EmbeddingResponse, inputs: usize) -> Result<Vec<Vec<f32>>> {
	let mut slots: Vec<Option<Vec<f32>>> = vec![None; inputs];

	for (position, datum) in response.data.into_iter().enumerate() {
		// Providers that omit `index` answer in input order.
		let index = datum.index.unwrap_or(position);
		let slot = slots.get_mut(index).ok_or_else(|| {
			invalid_response(format!("Embedding index {index} is out of range for {inputs} inputs."))
		})?;

		if slot.is_some() {
			return Err(invalid_response(format!("Embedding index {index} appears twice.")));
		}
		if datum.embedding.is_empty() || datum.embedding.iter().any(|value| !value.is_finite()) {
			return Err(invalid_response(format!("Embedding {index} is empty or non-finite.")));
		}

		*slot = Some(datum.embedding);
	}

	slots
		.into_iter()
		.enumerate()
		.map(|(index, slot)| {
			slot.ok_or_else(|| invalid_response(format!("No embedding returned for input {index}.")))
		})
		.collect()
}
