//! On-disk machine store: one directory per machine under
//! `<root>/machines/<name>/`, holding the driver record in `config.json`
//! next to the machine's SSH key.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

use crate::base::{MACHINES_DIR, machine_dir};
use crate::registry::DriverRecord;

const RECORD_FILE: &str = "config.json";

/// Errors raised while reading or writing the machine store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when a stored record cannot be encoded or decoded.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path of the offending record.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when no record exists for the machine.
    #[error("machine {name} does not exist in {root}")]
    NotFound {
        /// Machine name.
        name: String,
        /// Store root that was searched.
        root: Utf8PathBuf,
    },
}

/// File-backed store of machine records.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MachineStore {
    root: Utf8PathBuf,
}

impl MachineStore {
    /// Creates a store rooted at `root`. Nothing is touched on disk until the
    /// first write.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the store root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns the directory of `name`.
    #[must_use]
    pub fn machine_dir(&self, name: &str) -> Utf8PathBuf {
        machine_dir(&self.root, name)
    }

    /// Reports whether a record exists for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the store cannot be inspected.
    pub fn exists(&self, name: &str) -> Result<bool, StoreError> {
        let Some(dir) = self.open_machines_dir()? else {
            return Ok(false);
        };
        let relative = Utf8PathBuf::from(name).join(RECORD_FILE);
        dir.try_exists(&relative)
            .map_err(|err| io_error(&self.machine_dir(name).join(RECORD_FILE), &err))
    }

    /// Writes the record for `name`, creating its directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the directory cannot be created or the
    /// record cannot be written.
    pub fn save(&self, name: &str, record: &DriverRecord) -> Result<Utf8PathBuf, StoreError> {
        let dir_path = self.machine_dir(name);
        let path = dir_path.join(RECORD_FILE);
        Dir::create_ambient_dir_all(&dir_path, ambient_authority())
            .map_err(|err| io_error(&dir_path, &err))?;
        let dir = Dir::open_ambient_dir(&dir_path, ambient_authority())
            .map_err(|err| io_error(&dir_path, &err))?;

        let rendered = serde_json::to_string_pretty(record).map_err(|err| StoreError::Parse {
            path: path.clone(),
            message: err.to_string(),
        })?;
        dir.write(RECORD_FILE, rendered)
            .map_err(|err| io_error(&path, &err))?;
        Ok(path)
    }

    /// Reads the record for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no record exists, and
    /// [`StoreError::Io`] or [`StoreError::Parse`] when it cannot be read.
    pub fn load(&self, name: &str) -> Result<DriverRecord, StoreError> {
        if !self.exists(name)? {
            return Err(self.not_found(name));
        }
        let dir_path = self.machine_dir(name);
        let path = dir_path.join(RECORD_FILE);
        let dir = Dir::open_ambient_dir(&dir_path, ambient_authority())
            .map_err(|err| io_error(&dir_path, &err))?;
        let contents = dir
            .read_to_string(RECORD_FILE)
            .map_err(|err| io_error(&path, &err))?;

        serde_json::from_str(&contents).map_err(|err| StoreError::Parse {
            path,
            message: err.to_string(),
        })
    }

    /// Deletes the directory of `name`, including its keys.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the machine has no directory and
    /// [`StoreError::Io`] when deletion fails.
    pub fn remove(&self, name: &str) -> Result<(), StoreError> {
        let Some(dir) = self.open_machines_dir()? else {
            return Err(self.not_found(name));
        };
        match dir.remove_dir_all(name) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(self.not_found(name)),
            Err(err) => Err(io_error(&self.machine_dir(name), &err)),
        }
    }

    /// Lists machines that have a record, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the store cannot be listed.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let Some(dir) = self.open_machines_dir()? else {
            return Ok(Vec::new());
        };
        let machines_path = self.root.join(MACHINES_DIR);
        let entries = dir
            .entries()
            .map_err(|err| io_error(&machines_path, &err))?;

        let mut names = Vec::new();
        for item in entries {
            let entry = item.map_err(|err| io_error(&machines_path, &err))?;
            let name = entry
                .file_name()
                .map_err(|err| io_error(&machines_path, &err))?;
            if self.exists(&name)? {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn open_machines_dir(&self) -> Result<Option<Dir>, StoreError> {
        let path = self.root.join(MACHINES_DIR);
        match Dir::open_ambient_dir(&path, ambient_authority()) {
            Ok(dir) => Ok(Some(dir)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(&path, &err)),
        }
    }

    fn not_found(&self, name: &str) -> StoreError {
        StoreError::NotFound {
            name: name.to_owned(),
            root: self.root.clone(),
        }
    }
}

fn io_error(path: &Utf8Path, err: &io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
