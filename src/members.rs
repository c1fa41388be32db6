//! Registry of known employees and their Telegram chat ids.
//!
//! Persisted as pretty JSON keyed by normalized handle. The employees sheet
//! decides who is a member; `/start` fills in the chat id so the scheduler
//! can message the employee directly.

use crate::error::{BotError, Result};
use crate::model::{Employee, normalize_handle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{error, info};

/// A registered employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Handle as written in the sheet (original case, no `@`).
    pub handle: String,
    pub name: String,
    /// Telegram user id, known once the employee has sent `/start`.
    #[serde(default)]
    pub user_id: Option<i64>,
}

/// Thread-safe members registry backed by a JSON file.
#[derive(Debug)]
pub struct MembersRegistry {
    path: PathBuf,
    members: Mutex<BTreeMap<String, Member>>,
}

impl MembersRegistry {
    /// Load the registry from `path`. A missing or unreadable file starts empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let members = match Self::read(&path) {
            Ok(members) => {
                info!(count = members.len(), path = %path.display(), "loaded members");
                members
            }
            Err(err) => {
                error!(path = %path.display(), error = %err, "failed to load members, starting empty");
                BTreeMap::new()
            }
        };
        Self {
            path,
            members: Mutex::new(members),
        }
    }

    fn read(path: &Path) -> Result<BTreeMap<String, Member>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = std::fs::read_to_string(path)?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Member>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn save(&self, members: &BTreeMap<String, Member>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                BotError::Members(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let json = serde_json::to_string_pretty(members)?;
        std::fs::write(&self.path, json).map_err(|e| {
            BotError::Members(format!("cannot write {}: {e}", self.path.display()))
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or update a member with a known chat id.
    pub fn add_member(&self, handle: &str, user_id: i64, name: &str) -> Result<()> {
        let key = normalize_handle(handle);
        let mut members = self.lock();
        if let Some(existing) = members.get(&key) {
            if existing.user_id == Some(user_id) {
                return Ok(());
            }
            if let Some(old) = existing.user_id {
                info!(handle = %key, old, new = user_id, "member user id changed");
            }
        }
        members.insert(
            key.clone(),
            Member {
                handle: handle.trim().trim_start_matches('@').to_owned(),
                name: name.to_owned(),
                user_id: Some(user_id),
            },
        );
        self.save(&members)?;
        info!(handle = %key, user_id, "member registered");
        Ok(())
    }

    pub fn get_user_id(&self, handle: &str) -> Option<i64> {
        self.lock()
            .get(&normalize_handle(handle))
            .and_then(|m| m.user_id)
    }

    pub fn is_member(&self, handle: &str) -> bool {
        let key = normalize_handle(handle);
        !key.is_empty() && self.lock().contains_key(&key)
    }

    pub fn is_member_by_id(&self, user_id: i64) -> bool {
        self.lock().values().any(|m| m.user_id == Some(user_id))
    }

    pub fn member(&self, handle: &str) -> Option<Member> {
        self.lock().get(&normalize_handle(handle)).cloned()
    }

    /// Make the registry mirror the employees sheet.
    ///
    /// New handles are added without a chat id, handles missing from the
    /// sheet are removed, and names are refreshed. Returns `(added, removed)`.
    pub fn sync_with_table(&self, employees: &[Employee]) -> Result<(usize, usize)> {
        let mut members = self.lock();
        let table: BTreeMap<String, &Employee> = employees
            .iter()
            .filter(|e| !normalize_handle(&e.handle).is_empty())
            .map(|e| (normalize_handle(&e.handle), e))
            .collect();

        let before = members.len();
        members.retain(|key, _| table.contains_key(key));
        let removed = before - members.len();

        let mut added = 0;
        for (key, employee) in &table {
            match members.get_mut(key) {
                Some(member) => member.name.clone_from(&employee.name),
                None => {
                    members.insert(
                        key.clone(),
                        Member {
                            handle: employee.handle.trim_start_matches('@').to_owned(),
                            name: employee.name.clone(),
                            user_id: None,
                        },
                    );
                    added += 1;
                }
            }
        }

        self.save(&members)?;
        info!(added, removed, total = members.len(), "members synced with employees sheet");
        Ok((added, removed))
    }

    /// Snapshot of all members keyed by normalized handle.
    pub fn all(&self) -> BTreeMap<String, Member> {
        self.lock().clone()
    }
}
