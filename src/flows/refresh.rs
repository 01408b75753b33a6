//! Serialized refresh of the stored credential.
//!
//! Refreshes run one at a time behind `refresh_guard`. A caller that queued behind a running
//! refresh re-reads the stored record after acquiring the guard and reuses the new token instead
//! of sending a second refresh grant, which many authorization servers treat as token theft.

// self
use crate::{
	_prelude::*,
	auth::{TokenRecord, TokenSecret},
	flows::{AuthState, TokenManager},
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, OpSpan, Operation, Outcome},
	store::PENDING_AUTHORIZATION_KEY,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RefreshMode {
	// Refresh only if still inside the skew after acquiring the guard.
	IfDue,
	// Refresh unless another caller already replaced the record seen before waiting.
	Force { seen_issued_at: Option<OffsetDateTime> },
}

impl<C, M> TokenManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Returns an access token that is valid beyond the refresh skew, or `None` when the user
	/// must authorize again.
	///
	/// A token inside the skew is refreshed first. A failed refresh clears every stored
	/// credential and yields `None`.
	pub async fn get_valid_token(&self) -> Result<Option<TokenSecret>> {
		let Some(record) = self.load_record().await? else {
			self.settle_state(AuthState::Unauthenticated).await?;

			return Ok(None);
		};

		if !record.needs_refresh_at(OffsetDateTime::now_utc(), self.config.refresh_skew()) {
			self.settle_state(AuthState::Authenticated).await?;

			return Ok(Some(record.access_token));
		}

		match self.refresh_serialized(RefreshMode::IfDue).await {
			Ok(token) => Ok(Some(token)),
			Err(Error::RefreshFailed { .. } | Error::Unauthorized) => Ok(None),
			Err(err) => Err(err),
		}
	}

	/// Refreshes regardless of remaining lifetime.
	///
	/// Fails with [`Error::Unauthorized`] when no credential is stored and with
	/// [`Error::RefreshFailed`] (after clearing the credential) when the grant is refused.
	pub async fn force_refresh(&self) -> Result<TokenSecret> {
		let seen_issued_at = self.load_record().await?.map(|record| record.issued_at);

		self.refresh_serialized(RefreshMode::Force { seen_issued_at }).await
	}

	async fn refresh_serialized(&self, mode: RefreshMode) -> Result<TokenSecret> {
		const OP: Operation = Operation::Refresh;

		OpSpan::new(OP, "refresh")
			.instrument(async {
				let _singleflight = self.refresh_guard.lock().await;
				let Some(current) = self.load_record().await? else {
					return Err(Error::Unauthorized);
				};
				let now = OffsetDateTime::now_utc();
				let reuse = match mode {
					RefreshMode::IfDue => !current.needs_refresh_at(now, self.config.refresh_skew()),
					RefreshMode::Force { seen_issued_at } =>
						seen_issued_at.is_some_and(|seen| seen != current.issued_at),
				};

				if reuse {
					return Ok(current.access_token);
				}

				obs::record_operation_outcome(OP, Outcome::Attempt);

				let refreshed = self.refresh_grant(current).await;

				obs::record_operation_outcome(OP, Outcome::of(&refreshed));

				refreshed
			})
			.await
	}

	async fn refresh_grant(&self, current: TokenRecord) -> Result<TokenSecret> {
		let epoch = self.current_epoch();
		let prior = self.state();

		self.metrics.record_refresh_attempt();
		self.set_state(AuthState::RefreshPending);

		let refreshed = match (&current.refresh_token, self.facade()) {
			(Some(refresh_token), Ok(facade)) => facade
				.refresh(refresh_token, &current.scope)
				.await
				.map(|mut record| {
					// Servers that do not rotate keep the previous refresh token valid.
					if record.refresh_token.is_none() {
						record.refresh_token = current.refresh_token.clone();
					}

					record
				}),
			(None, _) => Err(Error::Unauthorized),
			(_, Err(err)) => Err(err),
		};

		match refreshed {
			Ok(record) => match self.persist_record(&record, epoch).await {
				Ok(true) => {
					self.metrics.record_refresh_success();
					self.set_state(AuthState::Authenticated);

					Ok(record.access_token)
				},
				Ok(false) => {
					self.metrics.record_refresh_failure();

					Err(Error::Unauthorized)
				},
				// The previous credential is still stored.
				Err(err) => {
					self.metrics.record_refresh_failure();
					self.set_state(prior);

					Err(err)
				},
			},
			Err(err) => {
				self.metrics.record_refresh_failure();
				obs::trace_event(Operation::Refresh, "refresh_failed", &err);
				self.clear().await?;

				Err(Error::RefreshFailed { source: Arc::new(err) })
			},
		}
	}

	/// Moves to `next` unless a handshake is still live.
	///
	/// `Authorizing` only counts as live while its pending authorization exists; once that has
	/// expired or been removed the redirect was abandoned.
	async fn settle_state(&self, next: AuthState) -> Result<()> {
		let abandoned = self.state() == AuthState::Authorizing
			&& self.scratch.get(PENDING_AUTHORIZATION_KEY).await?.is_none();
		let mut state = self.state.lock();

		match *state {
			AuthState::Exchanging => {},
			AuthState::Authorizing if !abandoned => {},
			_ => *state = next,
		}

		Ok(())
	}
}
