pub mod embedding;
pub mod expander;
pub mod rerank;

mod error;

pub use error::{Error, Result};

use std::time::Duration;

use reqwest::{
	Client,
	header::{AUTHORIZATION, HeaderMap, HeaderName},
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let raw = value.as_str().ok_or_else(|| Error::InvalidConfig {
			message: format!("Default header {key:?} must be a string."),
		})?;

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

/// POSTs `body` as JSON and decodes a successful response into `T`. Non-2xx statuses surface as
/// [`Error::Reqwest`].
pub(crate) async fn post_json<T>(
	timeout_ms: u64,
	api_base: &str,
	path: &str,
	headers: HeaderMap,
	body: &Value,
) -> Result<T>
where
	T: DeserializeOwned,
{
	let client = Client::builder().timeout(Duration::from_millis(timeout_ms)).build()?;
	let res = client.post(format!("{api_base}{path}")).headers(headers).json(body).send().await?;

	Ok(res.error_for_status()?.json().await?)
}

pub(crate) fn invalid_response(message: impl Into<String>) -> Error {
	Error::InvalidResponse { message: message.into() }
}
