//! In-memory directory backend
//!
//! [`MemoryDirectory`] implements [`DirectoryConnection`] against a process
//! local entry store. It backs tests and embedded setups that need directory
//! semantics without a server. Every operation is appended to a log so tests
//! can assert ordering and counts.
//!
//! Derived sessions share the same store and log, the same way derived LDAP
//! sessions land on the same server.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::config::DirectoryConnectionConfig;
use crate::dn::split_first_rdn;
use crate::entry::DirectoryEntry;
use crate::error::{DirectoryError, DirectoryResult};
use crate::traits::DirectoryConnection;

/// One recorded directory operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Connect,
    Search { attribute: String, value: String },
    Bind { dn: String, success: bool },
    Create { dn: String },
    Save { dn: String, attributes: Vec<String> },
    Rename { dn: String, new_rdn: String },
    Delete { dn: String },
}

#[derive(Debug, Clone)]
struct StoredEntry {
    dn: String,
    attributes: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    // Keyed by lowercased DN; the stored entry keeps the original casing.
    entries: BTreeMap<String, StoredEntry>,
    operations: Vec<Operation>,
}

/// Directory connection over an in-memory entry store.
pub struct MemoryDirectory {
    config: DirectoryConnectionConfig,
    state: Arc<RwLock<MemoryState>>,
    offline: Arc<AtomicBool>,
}

impl MemoryDirectory {
    pub fn new(config: DirectoryConnectionConfig) -> DirectoryResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: Arc::new(RwLock::new(MemoryState::default())),
            offline: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Seed an entry directly into the store, bypassing the operation log.
    pub async fn insert(&self, entry: DirectoryEntry) {
        let mut state = self.state.write().await;
        let dn = entry.dn().to_string();
        let attributes = entry
            .attributes()
            .map(|(name, values)| (name.to_string(), values.to_vec()))
            .collect();
        state
            .entries
            .insert(dn.to_ascii_lowercase(), StoredEntry { dn, attributes });
    }

    /// Current state of the entry at `dn`, if present.
    pub async fn entry(&self, dn: &str) -> Option<DirectoryEntry> {
        let state = self.state.read().await;
        state.entries.get(&dn.to_ascii_lowercase()).map(|stored| {
            DirectoryEntry::with_attributes(stored.dn.clone(), stored.attributes.clone())
        })
    }

    /// Snapshot of the operation log.
    pub async fn operations(&self) -> Vec<Operation> {
        self.state.read().await.operations.clone()
    }

    /// Simulate the directory going away. Affects derived sessions too.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> DirectoryResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(DirectoryError::unavailable("directory offline"))
        } else {
            Ok(())
        }
    }

    fn in_search_base(&self, dn: &str) -> bool {
        let base = self.config.search_base().to_ascii_lowercase();
        if base.is_empty() {
            return true;
        }
        let dn = dn.to_ascii_lowercase();
        dn == base || dn.ends_with(&format!(",{base}"))
    }
}

#[async_trait]
impl DirectoryConnection for MemoryDirectory {
    fn config(&self) -> &DirectoryConnectionConfig {
        &self.config
    }

    async fn connect(&self) -> DirectoryResult<()> {
        self.check_online()?;
        self.state.write().await.operations.push(Operation::Connect);
        Ok(())
    }

    async fn search(&self, attribute: &str, value: &str) -> DirectoryResult<Vec<DirectoryEntry>> {
        self.check_online()?;
        let attribute = attribute.to_ascii_lowercase();
        let mut state = self.state.write().await;
        state.operations.push(Operation::Search {
            attribute: attribute.clone(),
            value: value.to_string(),
        });

        let matches = state
            .entries
            .values()
            .filter(|stored| self.in_search_base(&stored.dn))
            .filter(|stored| {
                stored.attributes.get(&attribute).is_some_and(|values| {
                    values.iter().any(|v| v.eq_ignore_ascii_case(value))
                })
            })
            .map(|stored| {
                DirectoryEntry::with_attributes(stored.dn.clone(), stored.attributes.clone())
            })
            .collect();
        Ok(matches)
    }

    async fn bind(&self, login: &str, password: &str) -> DirectoryResult<bool> {
        self.check_online()?;
        let dn = self.config.bind_dn_for(login);
        let mut state = self.state.write().await;

        let success = !password.is_empty()
            && state
                .entries
                .get(&dn.to_ascii_lowercase())
                .and_then(|stored| stored.attributes.get("userpassword"))
                .is_some_and(|values| values.iter().any(|v| v == password));

        state.operations.push(Operation::Bind {
            dn,
            success,
        });
        Ok(success)
    }

    async fn create_entry(&self, entry: &DirectoryEntry) -> DirectoryResult<()> {
        self.check_online()?;
        let mut state = self.state.write().await;
        let key = entry.dn().to_ascii_lowercase();
        if state.entries.contains_key(&key) {
            return Err(DirectoryError::already_exists(entry.dn()));
        }

        let attributes = entry
            .attributes()
            .filter(|(_, values)| !values.is_empty())
            .map(|(name, values)| (name.to_string(), values.to_vec()))
            .collect();
        state.entries.insert(
            key,
            StoredEntry {
                dn: entry.dn().to_string(),
                attributes,
            },
        );
        state.operations.push(Operation::Create {
            dn: entry.dn().to_string(),
        });
        Ok(())
    }

    async fn save_entry(&self, entry: &DirectoryEntry) -> DirectoryResult<()> {
        self.check_online()?;
        let modified: Vec<String> = entry
            .modified_attributes()
            .map(str::to_string)
            .collect();
        if modified.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write().await;
        let key = entry.dn().to_ascii_lowercase();
        let stored = state
            .entries
            .get_mut(&key)
            .ok_or_else(|| DirectoryError::entry_missing(entry.dn()))?;

        for name in &modified {
            let values = entry.values(name);
            if values.is_empty() {
                stored.attributes.remove(name);
            } else {
                stored.attributes.insert(name.clone(), values.to_vec());
            }
        }
        state.operations.push(Operation::Save {
            dn: entry.dn().to_string(),
            attributes: modified,
        });
        Ok(())
    }

    async fn rename_entry(&self, entry: &DirectoryEntry, new_rdn: &str) -> DirectoryResult<()> {
        self.check_online()?;
        let mut state = self.state.write().await;
        let key = entry.dn().to_ascii_lowercase();
        if !state.entries.contains_key(&key) {
            return Err(DirectoryError::entry_missing(entry.dn()));
        }

        let (_, parent) = split_first_rdn(entry.dn());
        let new_dn = if parent.is_empty() {
            new_rdn.to_string()
        } else {
            format!("{new_rdn},{parent}")
        };
        let new_key = new_dn.to_ascii_lowercase();
        if new_key != key && state.entries.contains_key(&new_key) {
            return Err(DirectoryError::already_exists(&new_dn));
        }

        let mut stored = state.entries.remove(&key).expect("checked above");
        stored.dn = new_dn.clone();
        // delete_old_rdn semantics: the RDN attribute takes the new value.
        if let Some((attr, value)) = new_rdn.split_once('=') {
            stored
                .attributes
                .insert(attr.to_ascii_lowercase(), vec![value.to_string()]);
        }
        state.entries.insert(new_key, stored);
        state.operations.push(Operation::Rename {
            dn: entry.dn().to_string(),
            new_rdn: new_rdn.to_string(),
        });
        Ok(())
    }

    async fn delete_entry(&self, entry: &DirectoryEntry) -> DirectoryResult<()> {
        self.check_online()?;
        let mut state = self.state.write().await;
        let key = entry.dn().to_ascii_lowercase();
        if state.entries.remove(&key).is_none() {
            return Err(DirectoryError::entry_missing(entry.dn()));
        }
        state.operations.push(Operation::Delete {
            dn: entry.dn().to_string(),
        });
        Ok(())
    }

    async fn open_derived(
        &self,
        config: DirectoryConnectionConfig,
    ) -> DirectoryResult<Box<dyn DirectoryConnection>> {
        config.validate()?;
        let derived = MemoryDirectory {
            config,
            state: Arc::clone(&self.state),
            offline: Arc::clone(&self.offline),
        };
        derived.connect().await?;
        Ok(Box::new(derived))
    }
}
