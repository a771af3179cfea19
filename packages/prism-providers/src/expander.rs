use serde_json::Value;

use crate::{Result, invalid_response};

const MAX_ATTEMPTS: usize = 3;

/// Asks a chat-completions model for query variants. Returns the raw variant strings; callers
/// de-duplicate and cap them.
pub async fn expand(
	cfg: &prism_config::LlmProviderConfig,
	query: &str,
	kinds: &[String],
	max_queries: u32,
) -> Result<Vec<String>> {
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": build_expansion_messages(query, kinds, max_queries),
	});
	let mut last_err = None;

	// Only malformed model output is retried; transport errors return immediately.
	for _ in 0..MAX_ATTEMPTS {
		let headers = crate::auth_headers(&cfg.api_key, &cfg.default_headers)?;
		let json: Value =
			crate::post_json(cfg.timeout_ms, &cfg.api_base, &cfg.path, headers, &body).await?;

		match parse_expansion_response(json) {
			Ok(queries) => return Ok(queries),
			Err(err) => last_err = Some(err),
		}
	}

	Err(last_err.unwrap_or_else(|| invalid_response("Expansion response is not valid JSON.")))
}

pub fn build_expansion_messages(query: &str, kinds: &[String], max_queries: u32) -> Vec<Value> {
	let schema = serde_json::json!({ "queries": ["string"] });
	let schema_text = serde_json::to_string_pretty(&schema)
		.unwrap_or_else(|_| "{\"queries\": [\"string\"]}".to_string());
	let kinds_text = if kinds.is_empty() { "synonyms".to_string() } else { kinds.join(", ") };
	let system_prompt = "You are a query expansion engine for a semantic retrieval system. \
Output must be valid JSON only and must match the provided schema exactly. \
Generate short query variations that preserve the original intent. \
Do not repeat the original query. Do not add explanations or extra fields.";
	let user_prompt = format!(
		"Return JSON matching this exact schema:\n{schema_text}\nConstraints:\n- MAX_QUERIES = {max_queries}\n- STRATEGIES = {kinds_text}\n\
Strategy meanings: synonyms rephrases with related terms; decomposition splits into sub-questions; \
hypothetical writes a one-sentence passage that would answer the query.\nOriginal query:\n{query}"
	);

	vec![
		serde_json::json!({ "role": "system", "content": system_prompt }),
		serde_json::json!({ "role": "user", "content": user_prompt }),
	]
}

fn parse_expansion_response(json: Value) -> Result<Vec<String>> {
	let payload = if let Some(content) = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
	{
		serde_json::from_str(content)
			.map_err(|_| invalid_response("Expansion content is not valid JSON."))?
	} else if json.is_object() {
		json
	} else {
		return Err(invalid_response("Expansion response is missing JSON content."));
	};
	let queries = payload
		.get("queries")
		.and_then(|v| v.as_array())
		.ok_or_else(|| invalid_response("Expansion payload is missing queries array."))?;

	Ok(queries.iter().filter_map(|v| v.as_str()).map(str::to_string).collect())
}
