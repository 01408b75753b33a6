//! Authorization Code + PKCE handshake.

// self
use crate::{
	_prelude::*,
	auth::PendingAuthorization,
	flows::{AuthState, TokenManager},
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, OpSpan, Operation, Outcome},
	store::{self, PENDING_AUTHORIZATION_KEY},
};

/// Where to send the user, plus the state nonce embedded in the URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationRequest {
	/// Fully formed authorization URL.
	pub url: Url,
	/// CSRF nonce the callback must echo back.
	pub state: String,
}

impl<C, M> TokenManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Starts a new authorization, replacing any pending one.
	///
	/// Generates a fresh PKCE verifier and state nonce, keeps them in the scratch store, and
	/// returns the authorization URL carrying the S256 challenge.
	pub async fn begin_authorization(&self) -> Result<AuthorizationRequest> {
		const OP: Operation = Operation::Authorize;

		let span = OpSpan::new(OP, "begin_authorization");

		obs::record_operation_outcome(OP, Outcome::Attempt);

		let result = span
			.instrument(async {
				let pending = PendingAuthorization::generate();
				let url = self.authorization_url(&pending);

				store::save_json(
					self.scratch.as_ref(),
					PENDING_AUTHORIZATION_KEY,
					&pending,
					Some(self.config.pending_ttl()),
				)
				.await?;
				self.set_state(AuthState::Authorizing);

				Ok(AuthorizationRequest { url, state: pending.state })
			})
			.await;

		obs::record_operation_outcome(OP, Outcome::of(&result));

		result
	}

	/// Finishes the handshake with the `code` and `state` from the redirect.
	///
	/// The pending authorization is consumed before anything else happens, so a replayed callback
	/// fails with [`Error::CsrfMismatch`] and never reaches the token endpoint. A rejected
	/// exchange clears all stored credential state and fails with [`Error::ExchangeFailed`].
	pub async fn complete_authorization(&self, code: &str, state: &str) -> Result<()> {
		const OP: Operation = Operation::Exchange;

		let span = OpSpan::new(OP, "complete_authorization");

		obs::record_operation_outcome(OP, Outcome::Attempt);

		let result = span.instrument(self.complete_inner(code, state)).await;

		obs::record_operation_outcome(OP, Outcome::of(&result));

		result
	}

	async fn complete_inner(&self, code: &str, returned_state: &str) -> Result<()> {
		let _exchange = self.exchange_guard.lock().await;
		let pending = store::load_json::<PendingAuthorization>(
			self.scratch.as_ref(),
			PENDING_AUTHORIZATION_KEY,
		)
		.await?;

		self.scratch.delete(PENDING_AUTHORIZATION_KEY).await?;

		let Some(pending) = pending.filter(|pending| pending.state_matches(returned_state)) else {
			self.abandon_handshake();

			return Err(Error::CsrfMismatch);
		};
		let epoch = self.current_epoch();

		self.set_state(AuthState::Exchanging);
		self.metrics.record_exchange();

		let exchanged = match self.facade() {
			Ok(facade) =>
				facade
					.exchange_code(
						code,
						&pending.code_verifier,
						&self.config.scopes,
						&self.config.redirect_uri,
					)
					.await,
			Err(err) => Err(err),
		};

		match exchanged {
			Ok(record) => match self.persist_record(&record, epoch).await {
				Ok(true) => {
					self.set_state(AuthState::Authenticated);

					Ok(())
				},
				// Logged out mid-exchange; the credential is dropped on purpose.
				Ok(false) => Err(Error::Unauthorized),
				Err(err) => {
					self.set_state(AuthState::Unauthenticated);

					Err(err)
				},
			},
			Err(err) => {
				obs::trace_event(Operation::Exchange, "exchange_failed", &err);
				self.clear().await?;

				Err(Error::ExchangeFailed { source: Arc::new(err) })
			},
		}
	}

	fn abandon_handshake(&self) {
		let mut state = self.state.lock();

		if matches!(*state, AuthState::Authorizing | AuthState::Exchanging) {
			*state = AuthState::Unauthenticated;
		}
	}

	fn authorization_url(&self, pending: &PendingAuthorization) -> Url {
		let mut url = self.descriptor.endpoints.authorization.clone();
		let challenge = pending.code_challenge();

		{
			let mut query = url.query_pairs_mut();

			query
				.append_pair("response_type", "code")
				.append_pair("client_id", &self.config.client_id)
				.append_pair("redirect_uri", self.config.redirect_uri.as_str());

			match self.config.scopes.join(self.descriptor.scope_format.delimiter) {
				Some(scope) => {
					query.append_pair("scope", &scope);
				},
				None if self.descriptor.scope_format.send_when_empty => {
					query.append_pair("scope", "");
				},
				None => {},
			}

			query
				.append_pair("state", &pending.state)
				.append_pair("code_challenge", &challenge)
				.append_pair("code_challenge_method", pending.code_challenge_method().as_str());
		}

		url
	}
}
