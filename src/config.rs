//! Serde-backed configuration for every access-layer component.
//!
//! Every struct fills missing fields with its defaults, so a deployment only spells out what it
//! changes. [`AccessConfig::from_json_str`] reports the JSON path of the first bad field.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	error::ConfigError,
	provider::ProviderDescriptor,
	retry::RetryPolicy,
};

/// Sliding-window admission limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
	/// Calls admitted per window.
	pub max_per_window: u32,
	/// Window length in milliseconds.
	pub window_ms: u64,
	/// Extra wait added after the oldest admission leaves the window.
	pub safety_margin_ms: u64,
}
impl SchedulerConfig {
	/// Window length.
	pub fn window(&self) -> StdDuration {
		StdDuration::from_millis(self.window_ms)
	}

	/// Safety margin added to computed waits.
	pub fn safety_margin(&self) -> StdDuration {
		StdDuration::from_millis(self.safety_margin_ms)
	}

	/// Rejects limits that would never admit anything.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_per_window == 0 {
			return Err(ConfigError::Malformed {
				path: "scheduler.max_per_window".into(),
				message: "must be at least 1".into(),
			});
		}
		if self.window_ms == 0 {
			return Err(ConfigError::Malformed {
				path: "scheduler.window_ms".into(),
				message: "must be at least 1".into(),
			});
		}

		Ok(())
	}
}
impl Default for SchedulerConfig {
	fn default() -> Self {
		Self { max_per_window: 5, window_ms: 1_000, safety_margin_ms: 10 }
	}
}

/// Per-call freshness limits for the tiered cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
	/// Lifetime of durable entries; zero skips the durable tier.
	pub l2_ttl_ms: u64,
	/// Age after which in-process entries are ignored.
	pub l1_stale_ms: u64,
}
impl CacheOptions {
	/// Overrides the durable lifetime.
	pub fn with_l2_ttl(mut self, ttl: StdDuration) -> Self {
		self.l2_ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);

		self
	}

	/// Overrides the in-process staleness bound.
	pub fn with_l1_stale(mut self, stale: StdDuration) -> Self {
		self.l1_stale_ms = u64::try_from(stale.as_millis()).unwrap_or(u64::MAX);

		self
	}

	/// In-process staleness bound.
	pub fn l1_stale(&self) -> StdDuration {
		StdDuration::from_millis(self.l1_stale_ms)
	}

	/// Durable lifetime, or `None` when the durable tier is disabled.
	pub fn l2_ttl(&self) -> Option<Duration> {
		(self.l2_ttl_ms > 0).then(|| {
			Duration::milliseconds(i64::try_from(self.l2_ttl_ms).unwrap_or(i64::MAX))
		})
	}
}
impl Default for CacheOptions {
	fn default() -> Self {
		Self { l2_ttl_ms: 300_000, l1_stale_ms: 30_000 }
	}
}

/// OAuth client registration and token timing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenConfig {
	/// Registered client identifier.
	pub client_id: String,
	/// Client secret; omit for public PKCE clients.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client_secret: Option<TokenSecret>,
	/// Redirect target registered with the authorization server.
	pub redirect_uri: Url,
	/// Scopes requested during authorization.
	#[serde(default)]
	pub scopes: ScopeSet,
	/// Refresh this long before the access token expires.
	#[serde(default = "default_refresh_skew_secs")]
	pub refresh_skew_secs: u64,
	/// Lifetime of a pending authorization in the scratch store.
	#[serde(default = "default_pending_ttl_secs")]
	pub pending_ttl_secs: u64,
}
impl TokenConfig {
	/// Creates a configuration with the default refresh skew and pending lifetime.
	pub fn new(client_id: impl Into<String>, redirect_uri: Url, scopes: ScopeSet) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: None,
			redirect_uri,
			scopes,
			refresh_skew_secs: default_refresh_skew_secs(),
			pending_ttl_secs: default_pending_ttl_secs(),
		}
	}

	/// Sets the client secret.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(TokenSecret::new(secret));

		self
	}

	/// Overrides the refresh skew.
	pub fn with_refresh_skew_secs(mut self, secs: u64) -> Self {
		self.refresh_skew_secs = secs;

		self
	}

	/// Refresh skew as a duration.
	pub fn refresh_skew(&self) -> Duration {
		Duration::seconds(i64::try_from(self.refresh_skew_secs).unwrap_or(i64::MAX))
	}

	/// Pending authorization lifetime as a duration.
	pub fn pending_ttl(&self) -> Duration {
		Duration::seconds(i64::try_from(self.pending_ttl_secs).unwrap_or(i64::MAX))
	}
}

fn default_refresh_skew_secs() -> u64 {
	300
}

fn default_pending_ttl_secs() -> u64 {
	600
}

/// Slug probing limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlugConfig {
	/// Candidates probed before giving up.
	pub max_attempts: u32,
	/// Cache freshness for probe answers.
	pub probe: CacheOptions,
}
impl Default for SlugConfig {
	fn default() -> Self {
		Self { max_attempts: 1_000, probe: CacheOptions::default() }
	}
}

/// Everything the [`AccessLayer`](crate::layer::AccessLayer) needs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessConfig {
	/// Authorization server.
	pub provider: ProviderDescriptor,
	/// Base URL of the record service.
	pub remote_base_url: Url,
	/// OAuth client settings.
	pub token: TokenConfig,
	/// Admission limits.
	#[serde(default)]
	pub scheduler: SchedulerConfig,
	/// Backoff applied to cached fetches.
	#[serde(default)]
	pub retry: RetryPolicy,
	/// Slug probing limits.
	#[serde(default)]
	pub slug: SlugConfig,
}
impl AccessConfig {
	/// Parses and validates a JSON configuration document.
	pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
		let mut deserializer = serde_json::Deserializer::from_str(raw);
		let config: Self = serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
			ConfigError::Malformed { path: e.path().to_string(), message: e.inner().to_string() }
		})?;

		config.validate()?;

		Ok(config)
	}

	/// Checks cross-field invariants serde cannot express.
	pub fn validate(&self) -> Result<(), ConfigError> {
		self.provider.validate()?;
		self.scheduler.validate()?;

		if self.remote_base_url.cannot_be_a_base() {
			return Err(ConfigError::Malformed {
				path: "remote_base_url".into(),
				message: "must be a base URL".into(),
			});
		}

		Ok(())
	}
}
