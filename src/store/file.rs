//! File-backed [`KvStore`] that survives restarts.

// std
use std::{
	fs, io,
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{KvStore, StoreError, StoreFuture, StoredValue},
};

type Snapshot = BTreeMap<String, StoredValue>;

/// Keeps every live entry in memory and rewrites one JSON snapshot per mutation.
///
/// The snapshot is written next to the target as `<name>.tmp`, synced, then renamed over the
/// target, so a crash leaves either the old or the new snapshot and never a torn one. Expired
/// entries are dropped on open and on every write.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	entries: Arc<RwLock<Snapshot>>,
}
impl FileStore {
	/// Opens the snapshot at `path`, creating parent directories if needed.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
			fs::create_dir_all(dir).map_err(|e| backend("create", dir, e))?;
		}

		let mut entries = match fs::read(&path) {
			Ok(bytes) if bytes.is_empty() => Snapshot::new(),
			Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {}: {e}", path.display()),
			})?,
			Err(e) if e.kind() == io::ErrorKind::NotFound => Snapshot::new(),
			Err(e) => return Err(backend("read", &path, e)),
		};
		let now = OffsetDateTime::now_utc();

		entries.retain(|_, stored| !stored.is_expired_at(now));

		Ok(Self { path, entries: Arc::new(RwLock::new(entries)) })
	}

	/// Snapshot location.
	pub fn path(&self) -> &Path {
		&self.path
	}

	// Called with the write lock held so snapshots land in mutation order.
	fn write_snapshot(&self, entries: &Snapshot) -> Result<(), StoreError> {
		let bytes = serde_json::to_vec(entries).map_err(|e| StoreError::Serialization {
			message: format!("Failed to encode store snapshot: {e}"),
		})?;
		let staging = self.path.with_extension("tmp");
		let mut file = fs::File::create(&staging).map_err(|e| backend("create", &staging, e))?;

		file.write_all(&bytes).map_err(|e| backend("write", &staging, e))?;
		file.sync_all().map_err(|e| backend("sync", &staging, e))?;
		drop(file);

		fs::rename(&staging, &self.path).map_err(|e| backend("replace", &self.path, e))
	}
}
impl KvStore for FileStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		let now = OffsetDateTime::now_utc();
		let value = self
			.entries
			.read()
			.get(key)
			.filter(|stored| !stored.is_expired_at(now))
			.map(|stored| stored.value.clone());

		Box::pin(async move { Ok(value) })
	}

	fn set<'a>(
		&'a self,
		key: &'a str,
		value: String,
		ttl: Option<Duration>,
	) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();
			let mut entries = self.entries.write();

			entries.retain(|_, stored| !stored.is_expired_at(now));
			entries.insert(key.to_owned(), StoredValue::new(value, ttl, now));

			self.write_snapshot(&entries)
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut entries = self.entries.write();

			match entries.remove(key) {
				Some(_) => self.write_snapshot(&entries),
				None => Ok(()),
			}
		})
	}
}

fn backend(action: &str, path: &Path, e: io::Error) -> StoreError {
	StoreError::Backend { message: format!("Failed to {action} {}: {e}", path.display()) }
}
