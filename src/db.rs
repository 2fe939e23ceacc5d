use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::Mutex;

pub type SharedDB<T> = Arc<Mutex<DB<T>>>;

#[derive(Debug, Error)]
pub enum DBError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A named table of rows keyed by string id.
///
/// Tables created with [`load_db`] are mirrored to `<location>/<name>.json`
/// on every [`DB::save`]; tables created with [`DB::in_memory`] never touch
/// the filesystem.
#[derive(Debug, Clone)]
pub struct DB<T> {
    name: String,
    path: Option<PathBuf>,
    rows: HashMap<String, T>,
}

impl<T> DB<T> {
    pub fn in_memory(name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: None,
            rows: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn insert(&mut self, id: String, row: T) {
        self.rows.insert(id, row);
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.rows.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.rows.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<T> {
        self.rows.remove(id)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.rows.values()
    }

    pub fn shared(self) -> SharedDB<T> {
        Arc::new(Mutex::new(self))
    }
}

impl<T: Serialize> DB<T> {
    /// Writes the table to disk through a temp file so a crash never leaves
    /// a half-written table behind.
    pub fn save(&self) -> Result<(), DBError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let body = serde_json::to_vec_pretty(&self.rows)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|source| DBError::Io {
            path: tmp.display().to_string(),
            source,
        })?;
        fs::rename(&tmp, path).map_err(|source| DBError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

pub fn load_db<T: DeserializeOwned>(location: &str, name: &str) -> Result<DB<T>, DBError> {
    let dir = PathBuf::from(location);
    fs::create_dir_all(&dir).map_err(|source| DBError::Io {
        path: dir.display().to_string(),
        source,
    })?;
    let path = dir.join(format!("{}.json", name));
    let rows = match fs::read(&path) {
        Ok(bytes) if bytes.is_empty() => HashMap::new(),
        Ok(bytes) => serde_json::from_slice(&bytes)?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => HashMap::new(),
        Err(source) => {
            return Err(DBError::Io {
                path: path.display().to_string(),
                source,
            });
        }
    };
    Ok(DB {
        name: name.to_string(),
        path: Some(path),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_rows_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let location = dir.path().to_str().unwrap();

        let mut db: DB<String> = load_db(location, "notes").unwrap();
        assert!(db.is_empty());
        db.insert("1".to_string(), "first".to_string());
        db.save().unwrap();

        let reloaded: DB<String> = load_db(location, "notes").unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("1").map(String::as_str), Some("first"));
        assert!(!dir.path().join("notes.json.tmp").exists());
    }

    #[test]
    fn in_memory_save_is_a_noop() {
        let mut db: DB<u32> = DB::in_memory("scratch");
        db.insert("a".to_string(), 1);
        db.save().unwrap();
        assert_eq!(db.name(), "scratch");
        assert_eq!(db.get("a"), Some(&1));
    }

    #[test]
    fn corrupt_table_reports_serde_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.json"), b"{not json").unwrap();
        let result: Result<DB<u32>, DBError> = load_db(dir.path().to_str().unwrap(), "bad");
        assert!(matches!(result, Err(DBError::Serde(_))));
    }
}
