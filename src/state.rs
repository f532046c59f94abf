//! Flat key-value persistence for playback state, one file per key under the
//! config directory: `playlist` (JSON-encoded name list), `index`, `time`.

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;

use crate::error::PersistedStateError;

const KEY_PLAYLIST: &str = "playlist";
const KEY_INDEX: &str = "index";
const KEY_TIME: &str = "time";

#[derive(Debug, Clone, PartialEq)]
pub struct SavedState {
    pub playlist: Vec<String>,
    pub index: usize,
    pub time: f64,
}

pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: PathBuf) -> Self {
        StateStore { dir }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Load the saved state. Corrupt contents clear every key and yield
    /// `None`; a missing store is simply `None`.
    pub fn load(&self) -> Option<SavedState> {
        match self.read() {
            Ok(state) => state,
            Err(err) => {
                warn!("clearing persisted state: {err}");
                self.clear();
                None
            }
        }
    }

    fn read(&self) -> Result<Option<SavedState>, PersistedStateError> {
        let raw = match fs::read_to_string(self.key_path(KEY_PLAYLIST)) {
            Ok(raw) => raw,
            Err(_) => return Ok(None),
        };
        let playlist: Vec<String> = serde_json::from_str(&raw)?;
        if playlist.is_empty() {
            return Ok(None);
        }
        let index = match self.read_key(KEY_INDEX) {
            Some(raw) => parse_scalar(KEY_INDEX, &raw)?,
            None => 0,
        };
        let time: f64 = match self.read_key(KEY_TIME) {
            Some(raw) => parse_scalar(KEY_TIME, &raw)?,
            None => 0.0,
        };
        if !time.is_finite() || time < 0.0 {
            return Err(PersistedStateError::Scalar {
                key: KEY_TIME,
                value: time.to_string(),
            });
        }
        Ok(Some(SavedState {
            playlist,
            index,
            time,
        }))
    }

    fn read_key(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.key_path(key)).ok()
    }

    /// Mirror the full state to disk. An empty playlist is never written.
    pub fn save(&self, playlist: &[String], index: usize, time: f64) {
        if playlist.is_empty() {
            return;
        }
        if let Err(err) = fs::create_dir_all(&self.dir) {
            warn!("cannot create state dir {:?}: {err}", self.dir);
            return;
        }
        let json = match serde_json::to_string(playlist) {
            Ok(json) => json,
            Err(_) => return,
        };
        let _ = fs::write(self.key_path(KEY_PLAYLIST), json);
        let _ = fs::write(self.key_path(KEY_INDEX), index.to_string());
        let _ = fs::write(self.key_path(KEY_TIME), time.to_string());
    }

    /// Remove every persisted key.
    pub fn clear(&self) {
        for key in [KEY_PLAYLIST, KEY_INDEX, KEY_TIME] {
            let _ = fs::remove_file(self.key_path(key));
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn parse_scalar<T: std::str::FromStr>(
    key: &'static str,
    raw: &str,
) -> Result<T, PersistedStateError> {
    raw.trim()
        .parse()
        .map_err(|_| PersistedStateError::Scalar {
            key,
            value: raw.trim().to_string(),
        })
}
