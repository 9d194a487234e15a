use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::*;

pub const DEFAULT_CREDENTIALS_PATH: &str = "~/.config/bookcase/credentials.json";

/// Synchronous string key-value persistence, the shape of browser local storage.
/// Reads never fail; writes are flushed before returning.
pub trait CredentialStore {
    fn get(&self, key: &str) -> Option<String>;

    /// Applies every change or none of them. `None` removes the key.
    fn update(&mut self, changes: &[(&str, Option<&str>)]) -> Result<()>;

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.update(&[(key, Some(value))])
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.update(&[(key, None)])
    }
}

fn apply(entries: &mut BTreeMap<String, String>, changes: &[(&str, Option<&str>)]) {
    for (key, value) in changes {
        match value {
            Some(value) => entries.insert((*key).to_owned(), (*value).to_owned()),
            None => entries.remove(*key),
        };
    }
}

/// Store backed by a small JSON object on disk, written with 0600 permissions.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    pub fn open(path: &Path) -> Result<FileStore> {
        let entries = read_if_found(path)?
            .map(|c| {
                serde_json::from_str::<BTreeMap<String, String>>(&c)
                    .with_context(|| format!("Error de-serialising credentials file {:?}", path))
            })
            .unwrap_or_else(|| Ok(BTreeMap::new()))?;
        debug!("Opened credential store {:?} with {} keys", path, entries.len());
        Ok(FileStore {
            path: path.to_owned(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Error ensuring path {:?} exists", parent))?;
        }
        let contents = serde_json::to_string_pretty(entries)?;
        write_private(&self.path, &contents)
            .with_context(|| format!("Error writing credentials file {:?}", self.path))
    }
}

impl CredentialStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    // Memory only changes once the whole batch is on disk
    fn update(&mut self, changes: &[(&str, Option<&str>)]) -> Result<()> {
        let mut next = self.entries.clone();
        apply(&mut next, changes);
        if next == self.entries {
            return Ok(());
        }
        self.flush(&next)?;
        self.entries = next;
        Ok(())
    }
}

/// In-process store. Nothing survives the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn update(&mut self, changes: &[(&str, Option<&str>)]) -> Result<()> {
        apply(&mut self.entries, changes);
        Ok(())
    }
}

pub fn expand_path(raw: &str) -> Result<PathBuf> {
    let path = shellexpand::full(raw).with_context(|| format!("Credentials path {} is invalid", raw))?;
    Ok(Path::new(path.as_ref()).to_owned())
}

fn read_if_found(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(c) => Ok(Some(c)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents.as_bytes())
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(contents.as_bytes())
}
