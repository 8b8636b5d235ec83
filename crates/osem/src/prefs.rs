//! Participant-to-template preferences, one small JSON document.
//!
//! Seeds the template choice when an event is created from a mail whose
//! participants were seen before. Never consulted by the matching engine.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use log::{info, warn};

use crate::error::PrefsError;
use crate::text::normalize_participant;

pub struct TemplatePreferences {
    path: PathBuf,
    map: Mutex<BTreeMap<String, String>>,
}

impl TemplatePreferences {
    /// Loads the preference map. A missing file is an empty map; unreadable
    /// JSON is a hard error.
    pub fn open(path: PathBuf) -> Result<Self, PrefsError> {
        let map = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(PrefsError::ReadFile {
                    path: path.clone(),
                    source: e,
                })
            }
        };
        info!("Loaded {} template preferences", map.len());

        Ok(Self {
            path,
            map: Mutex::new(map),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        match self.map.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Template preference lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// First matching template in the caller's iteration order.
    pub fn get_preferred<I, S>(&self, participants: I) -> Option<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let map = self.lock();
        for participant in participants {
            let Some(key) = normalize_participant(participant.as_ref()) else {
                continue;
            };
            if let Some(template) = map.get(&key) {
                return Some(template.clone());
            }
        }
        None
    }

    /// Associates a participant with a template and rewrites the document.
    pub fn set(&self, participant: &str, template_id: &str) -> Result<(), PrefsError> {
        let Some(key) = normalize_participant(participant) else {
            return Ok(());
        };
        let snapshot = {
            let mut map = self.lock();
            map.insert(key, template_id.to_string());
            map.clone()
        };
        self.save(&snapshot)
    }

    /// Drops a participant's preference and rewrites the document.
    pub fn remove(&self, participant: &str) -> Result<(), PrefsError> {
        let Some(key) = normalize_participant(participant) else {
            return Ok(());
        };
        let snapshot = {
            let mut map = self.lock();
            if map.remove(&key).is_none() {
                return Ok(());
            }
            map.clone()
        };
        self.save(&snapshot)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn save(&self, map: &BTreeMap<String, String>) -> Result<(), PrefsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PrefsError::WriteFile {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let json = serde_json::to_string_pretty(map)?;
        std::fs::write(&self.path, json).map_err(|e| PrefsError::WriteFile {
            path: self.path.clone(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> TemplatePreferences {
        TemplatePreferences::open(dir.path().join("template_preferences.json")).unwrap()
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let prefs = open(&dir);
        assert!(prefs.is_empty());
    }

    #[test]
    fn test_set_and_reload() {
        let dir = TempDir::new().unwrap();
        {
            let prefs = open(&dir);
            prefs.set("alice@acme", "tpl-logistics").unwrap();
        }
        let prefs = open(&dir);
        assert_eq!(
            prefs.get_preferred(["ALICE@ACME"]),
            Some("tpl-logistics".to_string())
        );
    }

    #[test]
    fn test_caller_order_wins() {
        let dir = TempDir::new().unwrap();
        let prefs = open(&dir);
        prefs.set("alice@acme", "tpl-a").unwrap();
        prefs.set("bob@corp", "tpl-b").unwrap();

        assert_eq!(
            prefs.get_preferred(["bob@corp", "alice@acme"]),
            Some("tpl-b".to_string())
        );
        assert_eq!(
            prefs.get_preferred(["alice@acme", "bob@corp"]),
            Some("tpl-a".to_string())
        );
    }

    #[test]
    fn test_no_match() {
        let dir = TempDir::new().unwrap();
        let prefs = open(&dir);
        prefs.set("alice@acme", "tpl-a").unwrap();
        assert_eq!(prefs.get_preferred(["dan@other"]), None);
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let prefs = open(&dir);
        prefs.set("alice@acme", "tpl-a").unwrap();
        prefs.remove("ALICE@ACME").unwrap();
        assert_eq!(prefs.get_preferred(["alice@acme"]), None);
        assert!(prefs.is_empty());
    }

    #[test]
    fn test_corrupt_file_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("template_preferences.json");
        std::fs::write(&path, "oops").unwrap();
        assert!(TemplatePreferences::open(path).is_err());
    }
}
