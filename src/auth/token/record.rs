//! Persisted bearer credential and its builder.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, token::secret::TokenSecret},
};

/// Errors produced by [`TokenRecordBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenRecordBuilderError {
	/// No access token was supplied.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Neither `expires_at` nor `expires_in` was supplied.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
}

/// Bearer credential owned by the token manager and persisted to durable storage.
///
/// At most one exists per manager. It is replaced wholesale on completion or refresh and
/// removed on logout or on any refresh failure.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenRecord {
	/// Value sent in the `Authorization` header.
	pub access_token: TokenSecret,
	/// Present when the authorization server allows silent renewal.
	pub refresh_token: Option<TokenSecret>,
	/// Reported token type, normally `bearer`.
	pub token_type: String,
	/// Granted scopes.
	pub scope: ScopeSet,
	/// Minting instant.
	pub issued_at: OffsetDateTime,
	/// First instant at which the access token is rejected.
	pub expires_at: OffsetDateTime,
}
impl TokenRecord {
	/// Starts a record for `scope`.
	pub fn builder(scope: ScopeSet) -> TokenRecordBuilder {
		TokenRecordBuilder { scope, ..Default::default() }
	}

	/// Whether the access token is dead at `now`.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		now >= self.expires_at
	}

	/// Whether `now` is within `skew` of expiry, which is when renewal should start.
	pub fn needs_refresh_at(&self, now: OffsetDateTime, skew: Duration) -> bool {
		self.remaining_at(now) <= skew
	}

	/// Lifetime left at `now`, never negative.
	pub fn remaining_at(&self, now: OffsetDateTime) -> Duration {
		(self.expires_at - now).max(Duration::ZERO)
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("access_token", &self.access_token)
			.field("has_refresh_token", &self.refresh_token.is_some())
			.field("scope", &self.scope)
			.field("expires_at", &self.expires_at)
			.finish_non_exhaustive()
	}
}

#[derive(Clone, Copy, Debug)]
enum Expiry {
	At(OffsetDateTime),
	In(Duration),
}

/// Builder for [`TokenRecord`].
#[derive(Clone, Debug, Default)]
pub struct TokenRecordBuilder {
	scope: ScopeSet,
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	token_type: Option<String>,
	issued_at: Option<OffsetDateTime>,
	expiry: Option<Expiry>,
}
impl TokenRecordBuilder {
	/// Access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Token type; `bearer` when unset.
	pub fn token_type(mut self, token_type: impl Into<String>) -> Self {
		self.token_type = Some(token_type.into());

		self
	}

	/// Minting instant; the build time when unset.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Absolute expiry. The last of `expires_at`/`expires_in` called wins.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expiry = Some(Expiry::At(instant));

		self
	}

	/// Expiry relative to the minting instant.
	pub fn expires_in(mut self, lifetime: Duration) -> Self {
		self.expiry = Some(Expiry::In(lifetime));

		self
	}

	/// Produces the record.
	pub fn build(self) -> Result<TokenRecord, TokenRecordBuilderError> {
		let Self { scope, access_token, refresh_token, token_type, issued_at, expiry } = self;
		let access_token = access_token.ok_or(TokenRecordBuilderError::MissingAccessToken)?;
		let issued_at = issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match expiry.ok_or(TokenRecordBuilderError::MissingExpiry)? {
			Expiry::At(instant) => instant,
			Expiry::In(lifetime) => issued_at + lifetime,
		};

		Ok(TokenRecord {
			access_token,
			refresh_token,
			token_type: token_type.unwrap_or_else(|| "bearer".into()),
			scope,
			issued_at,
			expires_at,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn read_scope() -> ScopeSet {
		ScopeSet::new(["data.records:read"]).expect("Scope fixture should be valid.")
	}

	#[test]
	fn renewal_starts_inside_the_skew() {
		let record = TokenRecord::builder(read_scope())
			.access_token("access")
			.issued_at(macros::datetime!(2025-03-10 08:00 UTC))
			.expires_in(Duration::minutes(60))
			.build()
			.expect("Record should build.");
		let skew = Duration::seconds(60);

		assert_eq!(record.expires_at, macros::datetime!(2025-03-10 09:00 UTC));
		assert!(!record.needs_refresh_at(macros::datetime!(2025-03-10 08:58:59 UTC), skew));
		assert!(record.needs_refresh_at(macros::datetime!(2025-03-10 08:59 UTC), skew));
		assert!(!record.is_expired_at(macros::datetime!(2025-03-10 08:59:59 UTC)));
		assert!(record.is_expired_at(macros::datetime!(2025-03-10 09:00 UTC)));
		assert_eq!(record.remaining_at(macros::datetime!(2025-03-10 10:00 UTC)), Duration::ZERO);
	}

	#[test]
	fn last_expiry_setter_wins_and_both_fields_are_required() {
		let record = TokenRecord::builder(read_scope())
			.access_token("a")
			.issued_at(macros::datetime!(2025-03-10 08:00 UTC))
			.expires_at(macros::datetime!(2030-01-01 00:00 UTC))
			.expires_in(Duration::minutes(5))
			.build()
			.expect("Record should build.");

		assert_eq!(record.expires_at, macros::datetime!(2025-03-10 08:05 UTC));
		assert_eq!(record.token_type, "bearer");
		assert_eq!(
			TokenRecord::builder(read_scope()).expires_in(Duration::HOUR).build().err(),
			Some(TokenRecordBuilderError::MissingAccessToken)
		);
		assert_eq!(
			TokenRecord::builder(read_scope()).access_token("a").build().err(),
			Some(TokenRecordBuilderError::MissingExpiry)
		);
	}

	#[test]
	fn debug_output_hides_both_secrets() {
		let record = TokenRecord::builder(read_scope())
			.access_token("access-secret")
			.refresh_token("refresh-secret")
			.expires_in(Duration::HOUR)
			.build()
			.expect("Record should build.");
		let rendered = format!("{record:?}");

		assert!(!rendered.contains("access-secret"));
		assert!(!rendered.contains("refresh-secret"));
		assert!(rendered.contains("has_refresh_token: true"));
	}
}
