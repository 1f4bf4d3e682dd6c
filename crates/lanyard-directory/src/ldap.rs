//! LDAP directory backend
//!
//! [`LdapDirectory`] implements [`DirectoryConnection`] over the `ldap3`
//! async client. The service session is established lazily and shared;
//! end-user credential checks always run on a short-lived connection of
//! their own.

use std::collections::HashSet;
use std::sync::Arc;

use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Mod, Scope, SearchEntry};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use async_trait::async_trait;

use crate::config::DirectoryConnectionConfig;
use crate::dn::{escape_filter_value, is_valid_attribute_name};
use crate::entry::DirectoryEntry;
use crate::error::{DirectoryError, DirectoryResult};
use crate::traits::DirectoryConnection;

const RC_SUCCESS: u32 = 0;
const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_INVALID_CREDENTIALS: u32 = 49;
const RC_ENTRY_ALREADY_EXISTS: u32 = 68;

/// Directory connection over LDAP.
pub struct LdapDirectory {
    config: DirectoryConnectionConfig,
    session: Arc<RwLock<Option<Ldap>>>,
}

impl LdapDirectory {
    /// Create a connection from a validated configuration. No network
    /// traffic happens until the first operation.
    pub fn new(config: DirectoryConnectionConfig) -> DirectoryResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            session: Arc::new(RwLock::new(None)),
        })
    }

    fn settings(&self) -> LdapConnSettings {
        LdapConnSettings::new()
            .set_conn_timeout(self.config.connection_timeout())
            .set_starttls(self.config.use_starttls)
            .set_no_tls_verify(!self.config.verify_certificates)
    }

    /// Open a raw connection without binding anyone.
    async fn open_connection(&self) -> DirectoryResult<Ldap> {
        let url = self.config.url();
        let (conn, mut ldap) = LdapConnAsync::with_settings(self.settings(), &url)
            .await
            .map_err(|e| {
                DirectoryError::unavailable_with_source(format!("cannot reach {url}"), e)
            })?;
        ldap3::drive!(conn);
        ldap.with_timeout(self.config.operation_timeout());
        Ok(ldap)
    }

    /// Open a connection and bind the service account, or leave it
    /// anonymous when none is configured.
    async fn open_service_session(&self) -> DirectoryResult<Ldap> {
        let mut ldap = self.open_connection().await?;

        if let Some(bind_dn) = &self.config.bind_dn {
            let password = self.config.bind_password.as_deref().unwrap_or("");
            let result = ldap
                .simple_bind(bind_dn, password)
                .await
                .map_err(|e| {
                    DirectoryError::unavailable_with_source("service bind failed", e)
                })?;
            if result.rc != RC_SUCCESS {
                return Err(DirectoryError::operation_failed(
                    result.rc,
                    format!("service bind as {bind_dn} rejected: {}", result.text),
                ));
            }
            debug!(bind_dn = %bind_dn, "service session bound");
        } else {
            debug!("service session is anonymous");
        }

        Ok(ldap)
    }

    /// Handle on the shared service session, connecting on first use.
    async fn session(&self) -> DirectoryResult<Ldap> {
        if let Some(ldap) = self.session.read().await.as_ref() {
            return Ok(ldap.clone());
        }

        let mut guard = self.session.write().await;
        if let Some(ldap) = guard.as_ref() {
            return Ok(ldap.clone());
        }
        let ldap = self.open_service_session().await?;
        *guard = Some(ldap.clone());
        Ok(ldap)
    }

    /// Equality filter for one attribute, ANDed with the configured extra
    /// filter when present. The value is escaped here.
    fn equality_filter(&self, attribute: &str, value: &str) -> DirectoryResult<String> {
        if !is_valid_attribute_name(attribute) {
            return Err(DirectoryError::configuration(format!(
                "invalid search attribute name: {attribute}"
            )));
        }
        let clause = format!("({}={})", attribute, escape_filter_value(value));
        Ok(match &self.config.search_filter {
            Some(extra) => format!("(&{extra}{clause})"),
            None => clause,
        })
    }
}

fn unreachable_error(e: ldap3::LdapError) -> DirectoryError {
    DirectoryError::unavailable_with_source("directory operation failed", e)
}

/// Map a non-success LDAP result code onto the error taxonomy.
fn result_code_error(rc: u32, text: &str, dn: &str) -> DirectoryError {
    match rc {
        RC_ENTRY_ALREADY_EXISTS => DirectoryError::already_exists(dn),
        RC_NO_SUCH_OBJECT => DirectoryError::entry_missing(dn),
        _ => DirectoryError::operation_failed(rc, format!("{dn}: {text}")),
    }
}

#[async_trait]
impl DirectoryConnection for LdapDirectory {
    fn config(&self) -> &DirectoryConnectionConfig {
        &self.config
    }

    async fn connect(&self) -> DirectoryResult<()> {
        let mut guard = self.session.write().await;
        let ldap = self.open_service_session().await?;
        *guard = Some(ldap);
        Ok(())
    }

    #[instrument(skip(self, value), fields(host = %self.config.host))]
    async fn search(&self, attribute: &str, value: &str) -> DirectoryResult<Vec<DirectoryEntry>> {
        let filter = self.equality_filter(attribute, value)?;
        let base = self.config.search_base().to_string();

        let mut ldap = self.session().await?;
        let ldap3::SearchResult(entries, result) = ldap
            .search(&base, Scope::Subtree, &filter, vec!["*"])
            .await
            .map_err(unreachable_error)?;

        match result.rc {
            RC_SUCCESS => {}
            // A search base that does not exist reads as no matches.
            RC_NO_SUCH_OBJECT => return Ok(Vec::new()),
            rc => return Err(result_code_error(rc, &result.text, &base)),
        }

        let entries = entries
            .into_iter()
            .map(|raw| {
                let parsed = SearchEntry::construct(raw);
                DirectoryEntry::with_attributes(parsed.dn, parsed.attrs)
            })
            .collect::<Vec<_>>();

        debug!(filter = %filter, matches = entries.len(), "directory search");
        Ok(entries)
    }

    #[instrument(skip(self, password), fields(host = %self.config.host))]
    async fn bind(&self, login: &str, password: &str) -> DirectoryResult<bool> {
        // An empty password would turn the bind into an anonymous one,
        // which every server accepts.
        if password.is_empty() {
            return Ok(false);
        }

        let bind_dn = self.config.bind_dn_for(login);
        let mut ldap = self.open_connection().await?;
        let result = ldap
            .simple_bind(&bind_dn, password)
            .await
            .map_err(unreachable_error)?;
        let _ = ldap.unbind().await;

        match result.rc {
            RC_SUCCESS => Ok(true),
            RC_INVALID_CREDENTIALS | RC_NO_SUCH_OBJECT => {
                debug!(bind_dn = %bind_dn, rc = result.rc, "bind rejected");
                Ok(false)
            }
            rc => Err(result_code_error(rc, &result.text, &bind_dn)),
        }
    }

    #[instrument(skip(self, entry), fields(dn = %entry.dn()))]
    async fn create_entry(&self, entry: &DirectoryEntry) -> DirectoryResult<()> {
        let attrs: Vec<(String, HashSet<String>)> = entry
            .attributes()
            .filter(|(_, values)| !values.is_empty())
            .map(|(name, values)| (name.to_string(), values.iter().cloned().collect()))
            .collect();

        let mut ldap = self.session().await?;
        let result = ldap
            .add(entry.dn(), attrs)
            .await
            .map_err(unreachable_error)?;

        match result.rc {
            RC_SUCCESS => {
                debug!("entry created");
                Ok(())
            }
            rc => Err(result_code_error(rc, &result.text, entry.dn())),
        }
    }

    #[instrument(skip(self, entry), fields(dn = %entry.dn()))]
    async fn save_entry(&self, entry: &DirectoryEntry) -> DirectoryResult<()> {
        let mods: Vec<Mod<String>> = entry
            .modified_attributes()
            .map(|name| {
                let values: HashSet<String> = entry.values(name).iter().cloned().collect();
                if values.is_empty() {
                    Mod::Delete(name.to_string(), HashSet::new())
                } else {
                    Mod::Replace(name.to_string(), values)
                }
            })
            .collect();

        if mods.is_empty() {
            return Ok(());
        }

        let mut ldap = self.session().await?;
        let result = ldap
            .modify(entry.dn(), mods)
            .await
            .map_err(unreachable_error)?;

        match result.rc {
            RC_SUCCESS => {
                debug!(attributes = entry.modified_attributes().count(), "entry saved");
                Ok(())
            }
            rc => Err(result_code_error(rc, &result.text, entry.dn())),
        }
    }

    #[instrument(skip(self, entry), fields(dn = %entry.dn(), new_rdn = %new_rdn))]
    async fn rename_entry(&self, entry: &DirectoryEntry, new_rdn: &str) -> DirectoryResult<()> {
        let mut ldap = self.session().await?;
        let result = ldap
            .modifydn(entry.dn(), new_rdn, true, None)
            .await
            .map_err(unreachable_error)?;

        match result.rc {
            RC_SUCCESS => {
                debug!("entry renamed");
                Ok(())
            }
            rc => Err(result_code_error(rc, &result.text, entry.dn())),
        }
    }

    #[instrument(skip(self, entry), fields(dn = %entry.dn()))]
    async fn delete_entry(&self, entry: &DirectoryEntry) -> DirectoryResult<()> {
        let mut ldap = self.session().await?;
        let result = ldap
            .delete(entry.dn())
            .await
            .map_err(unreachable_error)?;

        match result.rc {
            RC_SUCCESS => {
                debug!("entry deleted");
                Ok(())
            }
            rc => Err(result_code_error(rc, &result.text, entry.dn())),
        }
    }

    async fn open_derived(
        &self,
        config: DirectoryConnectionConfig,
    ) -> DirectoryResult<Box<dyn DirectoryConnection>> {
        let derived = LdapDirectory::new(config)?;
        if let Err(e) = derived.connect().await {
            warn!(error = %e, "derived session could not connect");
            return Err(e);
        }
        Ok(Box::new(derived))
    }
}
