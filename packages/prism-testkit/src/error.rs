pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("PRISM_PG_DSN is not a valid Postgres DSN: {0}")]
	InvalidDsn(String),
	#[error("No maintenance database is reachable ({tried}): {message}")]
	MaintenanceUnavailable { tried: String, message: String },
	#[error("The pgvector extension is not available on this server.")]
	VectorUnavailable,
	#[error("Failed to {action} test database {name}: {source}")]
	Database {
		action: &'static str,
		name: String,
		#[source]
		source: sqlx::Error,
	},
	#[error("Fixture failed: {0}")]
	Fixture(String),

	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
}
