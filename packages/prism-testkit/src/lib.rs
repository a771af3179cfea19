//! Disposable Postgres databases for the ignored integration tests.
//!
//! Tests read `PRISM_PG_DSN`, create a uniquely named sibling database on the same server, run
//! against it, and drop it afterwards. The server must offer the `vector` extension.

mod error;

pub use error::{Error, Result};

use std::{env, future::Future, str::FromStr, thread};

use sqlx::{
	ConnectOptions, Connection, Executor,
	postgres::{PgConnectOptions, PgConnection},
};
use tokio::runtime::Builder;
use uuid::Uuid;

pub const DSN_ENV: &str = "PRISM_PG_DSN";

const MAINTENANCE_DATABASES: [&str; 2] = ["postgres", "template1"];
const DATABASE_PREFIX: &str = "prism_test_";

pub struct TestDatabase {
	name: String,
	dsn: String,
	maintenance: PgConnectOptions,
	dropped: bool,
}
impl TestDatabase {
	/// Creates an empty database next to the one `base_dsn` names. Fails with
	/// [`Error::VectorUnavailable`] before creating anything when pgvector is not installed.
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base = PgConnectOptions::from_str(base_dsn)
			.map_err(|err| Error::InvalidDsn(err.to_string()))?;
		let (maintenance, mut conn) = connect_maintenance(&base).await?;

		require_vector(&mut conn).await?;

		let name = format!("{DATABASE_PREFIX}{}", Uuid::new_v4().simple());

		conn.execute(format!(r#"CREATE DATABASE "{name}""#).as_str())
			.await
			.map_err(|source| Error::Database { action: "create", name: name.clone(), source })?;

		let dsn = base.database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, maintenance, dropped: false })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub async fn cleanup(mut self) -> Result<()> {
		self.drop_now().await
	}

	async fn drop_now(&mut self) -> Result<()> {
		if !self.dropped {
			drop_database(&self.name, &self.maintenance).await?;

			self.dropped = true;
		}

		Ok(())
	}
}
impl Drop for TestDatabase {
	// A panicking test never reaches `cleanup`; drop the database on a private runtime instead.
	fn drop(&mut self) {
		if self.dropped {
			return;
		}

		let name = self.name.clone();
		let maintenance = self.maintenance.clone();
		let handle = thread::spawn(move || {
			let outcome = Builder::new_current_thread()
				.enable_all()
				.build()
				.map_err(|err| err.to_string())
				.and_then(|runtime| {
					runtime
						.block_on(drop_database(&name, &maintenance))
						.map_err(|err| err.to_string())
				});

			if let Err(message) = outcome {
				eprintln!("Leaked test database {name}: {message}");
			}
		});

		let _ = handle.join();
	}
}

pub fn env_dsn() -> Option<String> {
	env::var(DSN_ENV).ok().filter(|dsn| !dsn.trim().is_empty())
}

/// Runs `f` against a fresh database and drops it afterwards. A cleanup failure is reported only
/// when `f` itself succeeded.
pub async fn with_test_db<F, Fut, T>(base_dsn: &str, f: F) -> Result<T>
where
	F: FnOnce(&TestDatabase) -> Fut,
	Fut: Future<Output = Result<T>>,
{
	let mut db = TestDatabase::new(base_dsn).await?;
	let out = f(&db).await;
	let cleanup = db.drop_now().await;

	match (out, cleanup) {
		(Ok(value), Ok(())) => Ok(value),
		(Ok(_), Err(err)) => Err(err),
		(Err(err), cleanup) => {
			if let Err(cleanup_err) = cleanup {
				eprintln!("Test database cleanup also failed: {cleanup_err}");
			}

			Err(err)
		},
	}
}

async fn connect_maintenance(base: &PgConnectOptions) -> Result<(PgConnectOptions, PgConnection)> {
	let mut last_err = None;

	for database in MAINTENANCE_DATABASES {
		let options = base.clone().database(database);

		match PgConnection::connect_with(&options).await {
			Ok(conn) => return Ok((options, conn)),
			Err(err) => last_err = Some(err),
		}
	}

	Err(Error::MaintenanceUnavailable {
		tried: MAINTENANCE_DATABASES.join(", "),
		message: last_err.map(|err| err.to_string()).unwrap_or_default(),
	})
}

async fn require_vector(conn: &mut PgConnection) -> Result<()> {
	let available: bool = sqlx::query_scalar(
		"SELECT EXISTS (SELECT 1 FROM pg_available_extensions WHERE name = 'vector')",
	)
	.fetch_one(&mut *conn)
	.await?;

	if available { Ok(()) } else { Err(Error::VectorUnavailable) }
}

async fn drop_database(name: &str, maintenance: &PgConnectOptions) -> Result<()> {
	let mut conn = PgConnection::connect_with(maintenance).await?;

	// Pools from the test may still hold sessions.
	let _ = sqlx::query(
		"SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
		 WHERE datname = $1 AND pid <> pg_backend_pid()",
	)
	.bind(name)
	.fetch_all(&mut conn)
	.await;

	conn.execute(format!(r#"DROP DATABASE IF EXISTS "{name}""#).as_str())
		.await
		.map_err(|source| Error::Database { action: "drop", name: name.to_string(), source })?;

	Ok(())
}
