//! File-based storage backend for the pickup service.
//!
//! Documents are stored as JSON files under a base directory, one
//! subdirectory per collection:
//!
//! - `orders/<order id>.json`: the order document
//! - `tokens/<token>.json`: unique index entry holding the order id
//! - `accounts/<account id>.json`: account counters
//! - `pending/<expires_at>_<order id>.json`: index entry for a pending order,
//!   named so that listing order is deadline order
//!
//! Every mutation is taken under an exclusive lock on `<base>/.lock`, so
//! several processes sharing the directory still see exactly one winner per
//! transition. Documents are replaced via temp file and rename, which lets
//! plain reads run without the lock. Mutations run on the blocking pool and
//! finish even if the caller stops waiting for them.

use crate::{
	AccountEffect, ExpiryCursor, StorageError, StorageFactory, StorageInterface,
	StorageRegistry, TransitionOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use pickup_types::{
	Account, ConfigSchema, Field, FieldType, ImplementationRegistry, Order, OrderStatus, Schema,
	StorageKey, TransitionFields, ValidationError,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const LOCK_FILE: &str = ".lock";

/// Fixed-width timestamp format, so index names sort by deadline.
const INDEX_TIMESTAMP: &str = "%Y%m%dT%H%M%S%.9fZ";

/// File-based storage implementation.
pub struct FileStorage {
	store: Arc<FileStore>,
}

impl FileStorage {
	/// Creates a new FileStorage rooted at `base_path`, creating the
	/// collection directories if needed.
	pub fn new(base_path: PathBuf) -> Result<Self, StorageError> {
		for key in StorageKey::all() {
			fs::create_dir_all(base_path.join(key.as_str())).map_err(backend_error)?;
		}
		Ok(Self {
			store: Arc::new(FileStore { base_path }),
		})
	}

	/// Runs a synchronous filesystem operation on the blocking pool.
	async fn run<T, F>(&self, operation: F) -> Result<T, StorageError>
	where
		T: Send + 'static,
		F: FnOnce(&FileStore) -> Result<T, StorageError> + Send + 'static,
	{
		let store = self.store.clone();
		tokio::task::spawn_blocking(move || operation(&store))
			.await
			.map_err(|e| StorageError::Backend(format!("storage task failed: {}", e)))?
	}
}

/// Exclusive directory lock, released on drop.
struct DirLock {
	file: File,
}

impl Drop for DirLock {
	fn drop(&mut self) {
		if let Err(e) = FileExt::unlock(&self.file) {
			tracing::warn!("Failed to release storage lock: {}", e);
		}
	}
}

struct FileStore {
	base_path: PathBuf,
}

impl FileStore {
	fn lock(&self) -> Result<DirLock, StorageError> {
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.truncate(false)
			.open(self.base_path.join(LOCK_FILE))
			.map_err(backend_error)?;
		file.lock_exclusive().map_err(backend_error)?;
		Ok(DirLock { file })
	}

	/// Maps a key to its document path.
	fn document_path(&self, collection: StorageKey, key: &str) -> PathBuf {
		self.base_path
			.join(collection.as_str())
			.join(format!("{}.json", file_stem(key)))
	}

	/// Path of the pending-index entry for an order.
	fn pending_path(&self, expires_at: DateTime<Utc>, order_id: &str) -> PathBuf {
		self.document_path_raw(StorageKey::Pending, &pending_name(expires_at, order_id))
	}

	fn document_path_raw(&self, collection: StorageKey, name: &str) -> PathBuf {
		self.base_path
			.join(collection.as_str())
			.join(format!("{}.json", name))
	}

	fn read_order(&self, order_id: &str) -> Result<Order, StorageError> {
		read_document(&self.document_path(StorageKey::Orders, order_id))?
			.ok_or(StorageError::NotFound)
	}

	fn read_account(&self, account_id: &str) -> Result<Account, StorageError> {
		Ok(
			read_document(&self.document_path(StorageKey::Accounts, account_id))?
				.unwrap_or_else(|| Account::new(account_id)),
		)
	}

	fn create_order(&self, order: &Order) -> Result<(), StorageError> {
		let _lock = self.lock()?;

		let order_path = self.document_path(StorageKey::Orders, &order.id);
		if order_path.exists() {
			return Err(StorageError::AlreadyExists(order.id.clone()));
		}

		let token_path = self.document_path(StorageKey::Tokens, &order.qr_token);
		let mut token_file = match OpenOptions::new()
			.write(true)
			.create_new(true)
			.open(&token_path)
		{
			Ok(file) => file,
			Err(e) if e.kind() == ErrorKind::AlreadyExists => {
				return Err(StorageError::DuplicateToken)
			},
			Err(e) => return Err(backend_error(e)),
		};
		let index_entry = serde_json::to_vec(&order.id).map_err(serialization_error)?;
		let pending_path = (order.status == OrderStatus::Pending)
			.then(|| self.pending_path(order.expires_at, &order.id));

		// The pending entry goes first: an entry without its order is skipped
		// by the scan, an order without its entry would never be reaped.
		let written = token_file
			.write_all(&index_entry)
			.and_then(|_| token_file.sync_all())
			.map_err(backend_error)
			.and_then(|_| match &pending_path {
				Some(path) => write_document(path, &order.id),
				None => Ok(()),
			})
			.and_then(|_| write_document(&order_path, order));
		if written.is_err() {
			for path in std::iter::once(&token_path).chain(pending_path.as_ref()) {
				if let Err(e) = remove_if_exists(path) {
					tracing::warn!("Failed to roll back index entry: {}", e);
				}
			}
		}
		written
	}

	fn find_by_token(&self, token: &str) -> Result<Order, StorageError> {
		let order_id: String = read_document(&self.document_path(StorageKey::Tokens, token))?
			.ok_or(StorageError::NotFound)?;
		self.read_order(&order_id)
	}

	fn try_transition(
		&self,
		order_id: &str,
		expected: OrderStatus,
		new: OrderStatus,
		fields: &TransitionFields,
		effect: Option<AccountEffect>,
	) -> Result<TransitionOutcome, StorageError> {
		let _lock = self.lock()?;

		let mut order = self.read_order(order_id)?;
		if order.status != expected {
			return Ok(TransitionOutcome::Conflict(order));
		}

		let account = match effect {
			Some(effect) => {
				let mut account = self.read_account(&order.account_id)?;
				effect.apply(&mut account);
				Some(account)
			},
			None => None,
		};
		let was_due_at = order.expires_at;
		order.status = new;
		fields.apply(&mut order);

		write_document(&self.document_path(StorageKey::Orders, order_id), &order)?;
		if expected == OrderStatus::Pending {
			remove_if_exists(&self.pending_path(was_due_at, order_id))?;
		}
		if let Some(account) = &account {
			write_document(
				&self.document_path(StorageKey::Accounts, &order.account_id),
				account,
			)?;
		}
		Ok(TransitionOutcome::Applied { order, account })
	}

	fn find_expired_pending(
		&self,
		now: DateTime<Utc>,
		after: Option<&ExpiryCursor>,
		limit: usize,
	) -> Result<Vec<Order>, StorageError> {
		let due_until = now.format(INDEX_TIMESTAMP).to_string();
		let after = after.map(|cursor| pending_name(cursor.expires_at, &cursor.order_id));

		let mut names = Vec::new();
		let entries = fs::read_dir(self.base_path.join(StorageKey::Pending.as_str()))
			.map_err(backend_error)?;
		for entry in entries {
			let file_name = entry.map_err(backend_error)?.file_name();
			let Some(name) = file_name.to_str().and_then(|n| n.strip_suffix(".json")) else {
				continue;
			};
			let Some((stamp, _)) = name.split_once('_') else {
				continue;
			};
			if stamp <= due_until.as_str() && after.as_deref().is_none_or(|a| name > a) {
				names.push(name.to_string());
			}
		}
		names.sort_unstable();

		let mut expired = Vec::new();
		for name in names {
			if expired.len() >= limit {
				break;
			}
			// Entries may vanish or go stale between listing and reading.
			let Some(order_id) =
				read_document::<String>(&self.document_path_raw(StorageKey::Pending, &name))?
			else {
				continue;
			};
			match self.read_order(&order_id) {
				Ok(order) if order.status == OrderStatus::Pending => expired.push(order),
				Ok(_) | Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e),
			}
		}
		Ok(expired)
	}
}

/// Maps a key to a file stem that is unique even on case-insensitive
/// filesystems.
///
/// Keys made of lowercase filename characters are used as-is; anything else
/// is hex-encoded behind a `~` prefix, which a plain key can never start
/// with.
fn file_stem(key: &str) -> String {
	let plain = !key.is_empty()
		&& key.len() <= 128
		&& !key.starts_with('.')
		&& key.chars().all(|c| {
			c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.')
		});
	if plain {
		key.to_string()
	} else {
		format!("~{}", hex::encode(key))
	}
}

fn pending_name(expires_at: DateTime<Utc>, order_id: &str) -> String {
	format!("{}_{}", expires_at.format(INDEX_TIMESTAMP), file_stem(order_id))
}

fn remove_if_exists(path: &Path) -> Result<(), StorageError> {
	match fs::remove_file(path) {
		Ok(()) => Ok(()),
		Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
		Err(e) => Err(backend_error(e)),
	}
}

fn backend_error(e: std::io::Error) -> StorageError {
	StorageError::Backend(e.to_string())
}

fn serialization_error(e: serde_json::Error) -> StorageError {
	StorageError::Serialization(e.to_string())
}

/// Reads a JSON document, returning `None` if it does not exist.
fn read_document<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
	match fs::read(path) {
		Ok(bytes) => serde_json::from_slice(&bytes)
			.map(Some)
			.map_err(serialization_error),
		Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
		Err(e) => Err(backend_error(e)),
	}
}

/// Writes a JSON document atomically by writing a temp file and renaming it.
fn write_document<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
	let bytes = serde_json::to_vec_pretty(value).map_err(serialization_error)?;
	let temp_path = path.with_extension("tmp");
	let mut file = File::create(&temp_path).map_err(backend_error)?;
	file.write_all(&bytes)
		.and_then(|_| file.sync_all())
		.map_err(backend_error)?;
	fs::rename(&temp_path, path).map_err(backend_error)
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn create_order(&self, order: &Order) -> Result<(), StorageError> {
		let order = order.clone();
		self.run(move |store| store.create_order(&order)).await
	}

	async fn get_order(&self, order_id: &str) -> Result<Order, StorageError> {
		let order_id = order_id.to_string();
		self.run(move |store| store.read_order(&order_id)).await
	}

	async fn find_by_token(&self, token: &str) -> Result<Order, StorageError> {
		let token = token.to_string();
		self.run(move |store| store.find_by_token(&token)).await
	}

	async fn try_transition(
		&self,
		order_id: &str,
		expected: OrderStatus,
		new: OrderStatus,
		fields: &TransitionFields,
		effect: Option<AccountEffect>,
	) -> Result<TransitionOutcome, StorageError> {
		let order_id = order_id.to_string();
		let fields = fields.clone();
		self.run(move |store| store.try_transition(&order_id, expected, new, &fields, effect))
			.await
	}

	async fn find_expired_pending(
		&self,
		now: DateTime<Utc>,
		after: Option<&ExpiryCursor>,
		limit: usize,
	) -> Result<Vec<Order>, StorageError> {
		let after = after.cloned();
		self.run(move |store| store.find_expired_pending(now, after.as_ref(), limit))
			.await
	}

	async fn get_account(&self, account_id: &str) -> Result<Account, StorageError> {
		let account_id = account_id.to_string();
		self.run(move |store| store.read_account(&account_id)).await
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![Field::new("storage_path", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(path) if !path.trim().is_empty() => Ok(()),
					_ => Err("storage_path cannot be empty".to_string()),
				}
			})],
		);
		schema.validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for file storage (default: "./data/storage")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");

	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))?))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}
