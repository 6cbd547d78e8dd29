//! File-backed persistent store for the simulated bench.
//!
//! One flat JSON object per instrument, written through on every save. The
//! `PersistentStore` contract is fire-and-forget, so write failures are
//! logged and swallowed rather than surfaced into the control loop.

use std::fs;
use std::path::{Path, PathBuf};

use eyre::WrapErr;
use gravidose_traits::PersistentStore;
use serde_json::{Map, Value};

pub struct JsonFileStore {
    path: PathBuf,
    map: Map<String, Value>,
}

impl JsonFileStore {
    /// Open (or create) the state file. A malformed file is an error; a
    /// missing one starts empty.
    pub fn open(path: &Path) -> eyre::Result<Self> {
        let map = if path.exists() {
            let text = fs::read_to_string(path)
                .wrap_err_with(|| format!("state file {} is unreadable", path.display()))?;
            let parsed: Value = serde_json::from_str(&text)
                .wrap_err_with(|| format!("state file {} is corrupt", path.display()))?;
            match parsed {
                Value::Object(m) => m,
                other => eyre::bail!("state file {} is not a JSON object: {other}", path.display()),
            }
        } else {
            Map::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            map,
        })
    }

    fn flush(&self) {
        let text = Value::Object(self.map.clone()).to_string();
        if let Err(e) = fs::write(&self.path, text) {
            tracing::warn!(path = %self.path.display(), error = %e, "state write failed");
        }
    }
}

impl PersistentStore for JsonFileStore {
    fn load_i32(&mut self, key: &str, default: i32) -> i32 {
        self.map
            .get(key)
            .and_then(Value::as_i64)
            .and_then(|v| i32::try_from(v).ok())
            .unwrap_or(default)
    }

    fn save_i32(&mut self, key: &str, value: i32) {
        self.map.insert(key.to_owned(), Value::from(value));
        self.flush();
    }

    fn load_f32(&mut self, key: &str, default: f32) -> f32 {
        self.map
            .get(key)
            .and_then(Value::as_f64)
            .map_or(default, |v| v as f32)
    }

    fn save_f32(&mut self, key: &str, value: f32) {
        self.map.insert(key.to_owned(), Value::from(f64::from(value)));
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        {
            let mut s = JsonFileStore::open(&path).unwrap();
            s.save_i32("cal_q16", 8_481);
            s.save_f32("kv", 42.5);
        }
        let mut s = JsonFileStore::open(&path).unwrap();
        assert_eq!(s.load_i32("cal_q16", 0), 8_481);
        assert_eq!(s.load_f32("kv", 0.0), 42.5);
        assert_eq!(s.load_i32("missing", 7), 7);
    }

    #[test]
    fn malformed_state_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(JsonFileStore::open(&path).is_err());
    }
}
