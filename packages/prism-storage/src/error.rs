pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	/// The database returned a `vector` column this crate cannot read back.
	#[error("Malformed pgvector value: {0}")]
	MalformedVector(String),
}
