//! Loads a configuration, starts a PKCE authorization, and shows how slugs are derived.
//!
//! Paste the `code` and `state` from the redirect into `complete_authorization` to finish the
//! handshake in a real application.

// std
use std::{env, sync::Arc};
// crates.io
use color_eyre::Result;
// self
use record_broker::{
	layer::AccessLayer,
	slug,
	store::{FileStore, KvStore, MemoryStore},
};

const CONFIG: &str = r#"{
	"provider": {
		"id": "records-cloud",
		"endpoints": {
			"authorization": "https://auth.records.example.com/oauth2/authorize",
			"token": "https://auth.records.example.com/oauth2/token"
		},
		"client_auth_method": "none_with_pkce"
	},
	"remote_base_url": "https://api.records.example.com/v0/",
	"token": {
		"client_id": "demo-web-app",
		"redirect_uri": "https://app.example.com/oauth/callback",
		"scopes": ["data.records:read", "data.records:write"]
	},
	"scheduler": { "max_per_window": 5, "window_ms": 1000 }
}"#;

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let config = record_broker::config::AccessConfig::from_json_str(CONFIG)?;
	let durable: Arc<dyn KvStore> =
		Arc::new(FileStore::open(env::temp_dir().join("record_broker_demo.json"))?);
	let scratch: Arc<dyn KvStore> = Arc::new(MemoryStore::default());
	let layer = AccessLayer::new(config, durable, scratch)?;
	let request = layer.tokens().begin_authorization().await?;

	println!("Send your user to {}.", request.url);
	println!("Expect state `{}` on the callback.", request.state);
	println!("State now: {:?}.", layer.tokens().state());

	for raw in ["Hà Nội", "Crème Brûlée Recipe", "  Q3 / Budget -- Draft  "] {
		println!("{raw:?} -> {}", slug::normalize_slug(raw)?);
	}

	layer.close();

	Ok(())
}
