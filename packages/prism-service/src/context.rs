use std::{future::Future, time::Duration};

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{Error, Result};

/// Per-call identity and lifetime. Cloning shares the cancellation token and deadline, so clones
/// handed to fan-out tasks stop together with the caller.
#[derive(Debug, Clone)]
pub struct SearchContext {
	pub tenant_id: Uuid,
	pub correlation_id: Uuid,
	pub cancel: CancellationToken,
	pub deadline: Option<Instant>,
}
impl SearchContext {
	pub fn new(tenant_id: Uuid) -> Self {
		Self {
			tenant_id,
			correlation_id: Uuid::new_v4(),
			cancel: CancellationToken::new(),
			deadline: None,
		}
	}

	pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
		self.correlation_id = correlation_id;

		self
	}

	pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
		self.cancel = cancel;

		self
	}

	pub fn with_deadline(mut self, deadline: Instant) -> Self {
		self.deadline = Some(deadline);

		self
	}

	pub fn with_timeout(self, timeout: Duration) -> Self {
		self.with_deadline(Instant::now() + timeout)
	}

	/// Fails fast when the call is already cancelled or past its deadline.
	pub fn check(&self, stage: &str) -> Result<()> {
		if self.cancel.is_cancelled() {
			return Err(Error::Cancelled { stage: stage.to_string() });
		}
		if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
			return Err(Error::DeadlineExceeded { stage: stage.to_string() });
		}

		Ok(())
	}

	/// Drives `fut` until it completes, the call is cancelled, or the deadline passes. The future
	/// is dropped on cancellation, which aborts any in-flight request it owns.
	pub async fn run<F, T>(&self, stage: &str, fut: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		self.check(stage)?;

		let deadline = async {
			match self.deadline {
				Some(deadline) => time::sleep_until(deadline).await,
				None => std::future::pending::<()>().await,
			}
		};

		tokio::select! {
			biased;
			_ = self.cancel.cancelled() => Err(Error::Cancelled { stage: stage.to_string() }),
			_ = deadline => Err(Error::DeadlineExceeded { stage: stage.to_string() }),
			out = fut => out,
		}
	}
}
