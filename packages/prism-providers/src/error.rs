pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Provider request failed: {0}")]
	Reqwest(#[from] reqwest::Error),
	#[error("Provider payload is not valid JSON: {0}")]
	SerdeJson(#[from] serde_json::Error),
	#[error("Invalid provider header name: {0}")]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error("Invalid provider header value: {0}")]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("Invalid provider config: {message}")]
	InvalidConfig { message: String },
	#[error("Unexpected provider response: {message}")]
	InvalidResponse { message: String },
}
