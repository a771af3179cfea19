pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Search cancelled during {stage}.")]
	Cancelled { stage: String },
	#[error("Search deadline exceeded during {stage}.")]
	DeadlineExceeded { stage: String },
}
impl Error {
	/// Whether a transport should report this as a caller mistake (4xx) rather than a server
	/// failure (5xx).
	pub fn is_client_error(&self) -> bool {
		matches!(self, Self::InvalidRequest { .. })
	}

	pub(crate) fn invalid(message: impl Into<String>) -> Self {
		Self::InvalidRequest { message: message.into() }
	}

	/// Prefixes the message with the failing operation, e.g. `"search by vector: ..."`.
	pub(crate) fn context(self, op: &str) -> Self {
		match self {
			Self::InvalidRequest { message } =>
				Self::InvalidRequest { message: format!("{op}: {message}") },
			Self::Provider { message } => Self::Provider { message: format!("{op}: {message}") },
			Self::Storage { message } => Self::Storage { message: format!("{op}: {message}") },
			other => other,
		}
	}
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}
impl From<prism_storage::Error> for Error {
	fn from(err: prism_storage::Error) -> Self {
		match err {
			prism_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			prism_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			prism_storage::Error::MalformedVector(message) =>
				Self::Storage { message: format!("malformed pgvector value: {message}") },
		}
	}
}
impl From<prism_providers::Error> for Error {
	fn from(err: prism_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
