use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

// Maximum allowed size for state files to prevent DoS attacks (10MB)
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const MAX_ITEMS: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse JSON data in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("File {path} exceeds security limits ({size} bytes)")]
    TooLarge { path: PathBuf, size: u64 },
    #[error("Too many items in {path} ({count}, maximum {MAX_ITEMS})")]
    TooManyItems { path: PathBuf, count: usize },
}

// Trait for values that can be persisted as a single JSON document
pub trait Persistent: Sized + Serialize + DeserializeOwned + Default {
    fn filename() -> &'static str;

    fn item_count(&self) -> usize;
}

/// A JSON document on disk holding one `Persistent` value.
pub struct JsonStore<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Persistent> JsonStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), _marker: PhantomData }
    }

    /// Store located at `dir/<T::filename()>`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(T::filename()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored value, never failing.
    ///
    /// A missing file is created with `default`. An unreadable file (corrupt,
    /// oversized or over the item limit) is moved to `<name>.bak` first and
    /// only then replaced by `default`; if it cannot be moved it is left alone.
    pub fn load_or(&self, default: T) -> T {
        if !self.path.exists() {
            info!("No state file at {}, creating it", self.path.display());
            if let Err(e) = self.save(&default) {
                error!("Could not create {}: {}", self.path.display(), e);
            }
            return default;
        }

        match self.read() {
            Ok(value) => {
                info!("Loaded {} item(s) from {}", value.item_count(), self.path.display());
                value
            }
            Err(e) => {
                let backup = self.backup_path();
                if let Err(rename_err) = std::fs::rename(&self.path, &backup) {
                    error!(
                        "{}; could not move it to {} ({}), leaving it untouched",
                        e,
                        backup.display(),
                        rename_err
                    );
                    return default;
                }
                warn!("{}; moved it to {} and starting from defaults", e, backup.display());
                if let Err(e) = self.save(&default) {
                    error!("Could not reset {}: {}", self.path.display(), e);
                }
                default
            }
        }
    }

    pub fn read(&self) -> Result<T, StoreError> {
        let io_err = |source| StoreError::Io { path: self.path.clone(), source };

        // Check file size before loading to prevent DoS attacks
        let metadata = std::fs::metadata(&self.path).map_err(io_err)?;
        if metadata.len() > MAX_FILE_SIZE {
            return Err(StoreError::TooLarge { path: self.path.clone(), size: metadata.len() });
        }

        let file = File::open(&self.path).map_err(io_err)?;
        let json_value: serde_json::Value = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| StoreError::Json { path: self.path.clone(), source })?;

        let count = match &json_value {
            serde_json::Value::Array(items) => items.len(),
            serde_json::Value::Object(items) => items.len(),
            _ => 0,
        };
        if count > MAX_ITEMS {
            return Err(StoreError::TooManyItems { path: self.path.clone(), count });
        }

        serde_json::from_value(json_value)
            .map_err(|source| StoreError::Json { path: self.path.clone(), source })
    }

    /// Write the value to a sibling temp file and rename it over the target.
    ///
    /// Values that `read` would reject are refused, so a successful save can
    /// always be loaded again.
    pub fn save(&self, value: &T) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io { path: self.path.clone(), source };

        let count = value.item_count();
        if count > MAX_ITEMS {
            return Err(StoreError::TooManyItems { path: self.path.clone(), count });
        }
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|source| StoreError::Json { path: self.path.clone(), source })?;
        if bytes.len() as u64 > MAX_FILE_SIZE {
            return Err(StoreError::TooLarge { path: self.path.clone(), size: bytes.len() as u64 });
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp_path = self.tmp_path();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&bytes).map_err(io_err)?;
        writer.flush().map_err(io_err)?;
        drop(writer);

        std::fs::rename(&tmp_path, &self.path).map_err(io_err)?;
        debug!("Saved {} item(s) to {}", value.item_count(), self.path.display());
        Ok(())
    }

    /// Where an unreadable file is moved before the store starts over.
    pub fn backup_path(&self) -> PathBuf {
        self.sibling(".bak")
    }

    fn tmp_path(&self) -> PathBuf {
        self.sibling(".tmp")
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(suffix);
        self.path.with_file_name(name)
    }
}
