//! Synchronization engine
//!
//! Owns the dispatch table over account lifecycle events and the write
//! procedures against the sync directory. The engine keeps no state of its
//! own; every handler re-queries the directory and is idempotent.
//!
//! Authentication runs against the primary directory (with organizational
//! unit fallback). Provisioning writes go to the optional sync directory;
//! without one, every write handler reports `Skipped(SyncDisabled)`.

use std::sync::Arc;

use lanyard_directory::dn::{escape_dn_value, is_valid_attribute_name};
use lanyard_directory::{DirectoryConnection, DirectoryEntry, DirectoryError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::auth::OrganizationalUnitFallback;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventKind, EventSource, LifecycleEvent};
use crate::finder::{DirectoryUserFinder, FindOutcome};
use crate::mapping::{AttributeMapper, AttributeMapping, PasswordScheme, PASSWORD_ATTRIBUTE};
use crate::store::{
    LocalUser, Notifier, RoleAssigner, SyncNotification, UserField, UserStore, PASSWORD_SENTINEL,
};

/// Engine-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Roles granted to accounts provisioned from the directory.
    #[serde(default)]
    pub default_roles: Vec<String>,

    /// Digest used for directory password values.
    #[serde(default)]
    pub password_scheme: PasswordScheme,

    /// Whether the host's local password recovery stays enabled. When the
    /// directory owns passwords this is usually off, and users are pointed
    /// at the recovery redirect instead.
    #[serde(default = "default_true")]
    pub password_recovery_enabled: bool,

    /// Where to send users for password recovery when the local flow is
    /// disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_redirect_url: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_roles: Vec::new(),
            password_scheme: PasswordScheme::default(),
            password_recovery_enabled: true,
            recovery_redirect_url: None,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> SyncResult<()> {
        if !self.password_recovery_enabled && self.recovery_redirect_url.is_none() {
            return Err(SyncError::configuration(
                "password recovery is disabled but no recovery_redirect_url is set",
            ));
        }
        Ok(())
    }
}

/// Why a handler chose not to write anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No sync directory is configured.
    SyncDisabled,
    /// The directory has no entry for the user.
    NotFound,
    /// The operation needs a plaintext password and none was available.
    NoPassword,
    /// The entry is already there.
    AlreadyExists,
    /// Nothing changed since the last synchronization.
    NoChanges,
}

/// What a sync handler did to the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    Updated,
    Renamed { from: String, to: String },
    Deleted,
    Skipped(SkipReason),
}

/// How a login attempt should proceed.
#[derive(Debug, Clone)]
pub enum LoginDecision {
    /// The directory accepted the credentials; this is the local account.
    Directory(LocalUser),
    /// Leave the attempt to the host's local password check.
    FallThrough,
}

/// Result of dispatching one lifecycle event.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    Login(LoginDecision),
    Sync(SyncOutcome),
}

/// The identity bridge between the local user store and the directories.
pub struct SyncEngine {
    authenticator: OrganizationalUnitFallback,
    sync_directory: Option<Arc<dyn DirectoryConnection>>,
    store: Arc<dyn UserStore>,
    roles: Arc<dyn RoleAssigner>,
    notifier: Arc<dyn Notifier>,
    mapper: AttributeMapper,
    config: SyncConfig,
}

impl SyncEngine {
    /// Build the engine. Fails when the configuration is unusable or when
    /// the sync directory has no account suffix to create entries under.
    pub fn new(
        authenticator: OrganizationalUnitFallback,
        sync_directory: Option<Arc<dyn DirectoryConnection>>,
        store: Arc<dyn UserStore>,
        roles: Arc<dyn RoleAssigner>,
        notifier: Arc<dyn Notifier>,
        mapping: AttributeMapping,
        config: SyncConfig,
    ) -> SyncResult<Self> {
        config.validate()?;
        if let Some(directory) = &sync_directory {
            if directory.config().account_suffix.is_none() {
                return Err(SyncError::configuration(
                    "the sync directory requires an account_suffix to place created entries",
                ));
            }
        }
        let mapper = AttributeMapper::new(mapping, config.password_scheme);
        Ok(Self {
            authenticator,
            sync_directory,
            store,
            roles,
            notifier,
            mapper,
            config,
        })
    }

    /// Announce every handled event kind to the host's event system, with
    /// its priority mark. Called once at startup.
    pub fn register(&self, source: &mut dyn EventSource) {
        for kind in EventKind::ALL {
            source.subscribe(kind, kind.priority());
        }
    }

    /// Route one event occurrence to its handler.
    pub async fn dispatch(&self, event: LifecycleEvent) -> SyncResult<EventOutcome> {
        debug!(kind = %event.kind(), "dispatching lifecycle event");
        match event {
            LifecycleEvent::BeforeLogin { username, password } => self
                .before_login(&username, &password)
                .await
                .map(EventOutcome::Login),
            LifecycleEvent::AfterLogin { user } => {
                self.after_login(&user).await.map(EventOutcome::Sync)
            }
            LifecycleEvent::UserCreated { user } => {
                self.user_created(&user).await.map(EventOutcome::Sync)
            }
            LifecycleEvent::UserConfirmed { user } => {
                self.user_confirmed(&user).await.map(EventOutcome::Sync)
            }
            LifecycleEvent::UserUpdated { user } => {
                self.user_updated(&user).await.map(EventOutcome::Sync)
            }
            LifecycleEvent::AccountSettingsUpdated { user } => self
                .account_settings_updated(&user)
                .await
                .map(EventOutcome::Sync),
            LifecycleEvent::PasswordResetCompleted { user } => self
                .password_reset_completed(&user)
                .await
                .map(EventOutcome::Sync),
            LifecycleEvent::UserDeleted { user } => {
                self.user_deleted(&user).await.map(EventOutcome::Sync)
            }
        }
    }

    /// Check credentials against the directory, with unit fallback. Never
    /// errors; an unreachable directory reads as a failed login.
    pub async fn authenticate(&self, username: &str, password: &str) -> bool {
        self.authenticator.authenticate(username, password).await
    }

    /// Whether the primary directory knows this login. An ambiguous match
    /// still counts as known.
    pub async fn is_directory_user(&self, username: &str) -> bool {
        let finder = DirectoryUserFinder::new(self.authenticator.primary());
        match finder.find_first(username).await {
            Ok(FindOutcome::Found(_)) => true,
            Ok(FindOutcome::Ambiguous { attribute, count }) => {
                warn!(username, attribute, count, "login is ambiguous in the directory");
                true
            }
            Ok(FindOutcome::NotFound) => false,
            Err(e) => {
                warn!(username, error = %e, "directory lookup failed");
                false
            }
        }
    }

    /// Write one attribute of the user's sync-directory entry. Returns
    /// `Ok(false)` when sync is disabled or the entry does not exist. An
    /// empty value removes the attribute.
    #[instrument(skip(self, value))]
    pub async fn update_directory_attribute(
        &self,
        username: &str,
        attribute: &str,
        value: &str,
    ) -> SyncResult<bool> {
        let Some(directory) = &self.sync_directory else {
            return Ok(false);
        };
        if !is_valid_attribute_name(attribute) {
            return Err(SyncError::configuration(format!(
                "invalid attribute name: {attribute}"
            )));
        }

        let finder = DirectoryUserFinder::new(directory.as_ref());
        match finder.find("cn", username).await? {
            FindOutcome::NotFound => Ok(false),
            FindOutcome::Ambiguous { attribute, .. } => {
                Err(SyncError::ambiguous(attribute, username))
            }
            FindOutcome::Found(identity) => {
                let mut entry = identity.into_entry();
                let values = if value.is_empty() {
                    Vec::new()
                } else {
                    vec![value.to_string()]
                };
                entry.set(attribute, values);
                directory.save_entry(&entry).await?;
                Ok(true)
            }
        }
    }

    // ------------------------------------------------------------------
    // Event handlers
    // ------------------------------------------------------------------

    /// Directory-first login. A directory success resolves to the local
    /// account, provisioning it on first sight; anything else falls
    /// through to the host's local password check.
    #[instrument(skip(self, password))]
    async fn before_login(&self, username: &str, password: &str) -> SyncResult<LoginDecision> {
        if !self.authenticator.authenticate(username, password).await {
            return Ok(LoginDecision::FallThrough);
        }

        if let Some(user) = self.store.find_by_username(username).await? {
            debug!(username, user_id = user.id(), "directory login for existing account");
            return Ok(LoginDecision::Directory(user));
        }

        let finder = DirectoryUserFinder::new(self.authenticator.primary());
        let identity = match finder.find_first(username).await {
            Ok(FindOutcome::Found(identity)) => identity,
            Ok(FindOutcome::NotFound) => {
                warn!(username, "authenticated but no entry found, not provisioning");
                return Ok(LoginDecision::FallThrough);
            }
            Ok(FindOutcome::Ambiguous { attribute, count }) => {
                warn!(username, attribute, count, "ambiguous identity, not provisioning");
                return Ok(LoginDecision::FallThrough);
            }
            Err(e) => {
                warn!(username, error = %e, "identity lookup failed after login");
                return Ok(LoginDecision::FallThrough);
            }
        };

        let new_user = self.mapper.new_user_from_entry(username, identity.entry());
        if new_user.email.is_empty() {
            debug!(username, "directory entry carries no mail attribute");
        }
        let user = self.store.create(new_user).await?;
        for role in &self.config.default_roles {
            self.roles.assign(role, user.id()).await?;
        }
        info!(username, user_id = user.id(), "provisioned local account from directory");
        Ok(LoginDecision::Directory(user))
    }

    /// Backfill the sync directory for accounts that predate it. The just
    /// submitted plaintext is the only chance to create the entry with a
    /// usable password.
    #[instrument(skip_all, fields(username = %user.username()))]
    async fn after_login(&self, user: &LocalUser) -> SyncResult<SyncOutcome> {
        let Some(directory) = &self.sync_directory else {
            return Ok(SyncOutcome::Skipped(SkipReason::SyncDisabled));
        };

        let finder = DirectoryUserFinder::new(directory.as_ref());
        match finder.find("cn", user.username()).await? {
            FindOutcome::Found(_) => Ok(SyncOutcome::Skipped(SkipReason::AlreadyExists)),
            FindOutcome::Ambiguous { attribute, .. } => {
                Err(SyncError::ambiguous(attribute, user.username()))
            }
            FindOutcome::NotFound => {
                if user.password().is_none() {
                    return Ok(SyncOutcome::Skipped(SkipReason::NoPassword));
                }
                self.create_in_directory(directory, user).await?;
                Ok(SyncOutcome::Created)
            }
        }
    }

    /// Admin-side account creation. An entry that already exists is fine.
    #[instrument(skip_all, fields(username = %user.username()))]
    async fn user_created(&self, user: &LocalUser) -> SyncResult<SyncOutcome> {
        let Some(directory) = &self.sync_directory else {
            return Ok(SyncOutcome::Skipped(SkipReason::SyncDisabled));
        };

        match self.create_in_directory(directory, user).await {
            Ok(()) => Ok(SyncOutcome::Created),
            Err(SyncError::Directory(DirectoryError::AlreadyExists { dn })) => {
                debug!(dn, "entry already present, nothing to create");
                Ok(SyncOutcome::Skipped(SkipReason::AlreadyExists))
            }
            Err(e) => Err(e),
        }
    }

    /// Registration confirmation. Runs high priority, before the host
    /// commits the confirmation; every failure aborts it.
    #[instrument(skip_all, fields(username = %user.username()))]
    async fn user_confirmed(&self, user: &LocalUser) -> SyncResult<SyncOutcome> {
        let Some(directory) = &self.sync_directory else {
            return Ok(SyncOutcome::Skipped(SkipReason::SyncDisabled));
        };
        self.create_in_directory(directory, user).await?;
        Ok(SyncOutcome::Created)
    }

    /// Admin-side account edit.
    async fn user_updated(&self, user: &LocalUser) -> SyncResult<SyncOutcome> {
        self.sync_account_changes(user).await
    }

    /// User-side settings change.
    async fn account_settings_updated(&self, user: &LocalUser) -> SyncResult<SyncOutcome> {
        self.sync_account_changes(user).await
    }

    /// Push a completed password reset into the directory, creating the
    /// entry when it is missing. Exactly one notification either way.
    #[instrument(skip_all, fields(username = %user.username()))]
    async fn password_reset_completed(&self, user: &LocalUser) -> SyncResult<SyncOutcome> {
        let Some(directory) = &self.sync_directory else {
            return Ok(SyncOutcome::Skipped(SkipReason::SyncDisabled));
        };
        let Some(plaintext) = user.password() else {
            return Ok(SyncOutcome::Skipped(SkipReason::NoPassword));
        };

        let finder = DirectoryUserFinder::new(directory.as_ref());
        match finder.find("cn", user.username()).await? {
            FindOutcome::NotFound => {
                self.create_in_directory(directory, user).await?;
                self.notifier
                    .notify(SyncNotification::InitialPasswordSet {
                        username: user.username().to_string(),
                    })
                    .await?;
                Ok(SyncOutcome::Created)
            }
            FindOutcome::Ambiguous { attribute, .. } => {
                Err(SyncError::ambiguous(attribute, user.username()))
            }
            FindOutcome::Found(identity) => {
                let mut entry = identity.into_entry();
                entry.set_single(PASSWORD_ATTRIBUTE, self.mapper.hash_password(plaintext));
                directory.save_entry(&entry).await?;
                self.notifier
                    .notify(SyncNotification::PasswordResetSynced {
                        username: user.username().to_string(),
                    })
                    .await?;
                info!(dn = entry.dn(), "reset password synchronized");
                Ok(SyncOutcome::Updated)
            }
        }
    }

    /// Remove the user's directory entry. Runs high priority, before the
    /// host removes the local record.
    #[instrument(skip_all, fields(username = %user.username()))]
    async fn user_deleted(&self, user: &LocalUser) -> SyncResult<SyncOutcome> {
        let Some(directory) = &self.sync_directory else {
            return Ok(SyncOutcome::Skipped(SkipReason::SyncDisabled));
        };

        let finder = DirectoryUserFinder::new(directory.as_ref());
        match finder.find("cn", user.username()).await? {
            FindOutcome::NotFound => Ok(SyncOutcome::Skipped(SkipReason::NotFound)),
            FindOutcome::Ambiguous { attribute, .. } => {
                Err(SyncError::ambiguous(attribute, user.username()))
            }
            FindOutcome::Found(identity) => {
                let entry = identity.into_entry();
                directory.delete_entry(&entry).await?;
                info!(dn = entry.dn(), "directory entry deleted");
                Ok(SyncOutcome::Deleted)
            }
        }
    }

    // ------------------------------------------------------------------
    // Write procedures
    // ------------------------------------------------------------------

    /// Create the user's directory entry and mark the local account as
    /// directory-managed.
    async fn create_in_directory(
        &self,
        directory: &Arc<dyn DirectoryConnection>,
        user: &LocalUser,
    ) -> SyncResult<()> {
        // Presence of the suffix is checked at engine construction.
        let suffix = directory.config().account_suffix.as_deref().unwrap_or_default();
        let dn = format!("cn={}{}", escape_dn_value(user.username()), suffix);

        let mut entry = DirectoryEntry::new(&dn);
        entry.set("objectclass", directory.config().object_classes.clone());
        entry.set_single("cn", user.username());
        for (attribute, value) in self.mapper.attributes_to_write(user, false) {
            // Empty values cannot be written at create time.
            if !value.is_empty() {
                entry.set_single(&attribute, value);
            }
        }

        directory.create_entry(&entry).await?;

        let mut updated = user.clone();
        updated.set_password_hash(PASSWORD_SENTINEL);
        self.store.save(&updated).await?;
        info!(dn, "directory entry created");
        Ok(())
    }

    /// Search by the name the directory still knows, write what changed,
    /// and rename last.
    #[instrument(skip_all, fields(username = %user.username()))]
    async fn sync_account_changes(&self, user: &LocalUser) -> SyncResult<SyncOutcome> {
        let Some(directory) = &self.sync_directory else {
            return Ok(SyncOutcome::Skipped(SkipReason::SyncDisabled));
        };

        let previous = user.previous_username();
        let finder = DirectoryUserFinder::new(directory.as_ref());
        let identity = match finder.find("cn", previous).await? {
            FindOutcome::Found(identity) => identity,
            FindOutcome::Ambiguous { attribute, .. } => {
                return Err(SyncError::ambiguous(attribute, previous));
            }
            FindOutcome::NotFound => {
                if user.password().is_some() {
                    self.create_in_directory(directory, user).await?;
                    return Ok(SyncOutcome::Created);
                }
                return Ok(SyncOutcome::Skipped(SkipReason::NotFound));
            }
        };

        let mut entry = identity.into_entry();
        for (attribute, value) in self.mapper.attributes_to_write(user, true) {
            if value.is_empty() {
                entry.set(&attribute, Vec::new());
            } else {
                entry.set_single(&attribute, value);
            }
        }

        let saved = entry.is_modified();
        if saved {
            directory.save_entry(&entry).await?;
        }

        // The rename is a separate operation and must come after the save.
        if user.is_changed(UserField::Username) && user.username() != previous {
            let new_rdn = format!("cn={}", escape_dn_value(user.username()));
            directory.rename_entry(&entry, &new_rdn).await?;
            info!(from = previous, to = user.username(), "directory entry renamed");
            return Ok(SyncOutcome::Renamed {
                from: previous.to_string(),
                to: user.username().to_string(),
            });
        }

        if saved {
            Ok(SyncOutcome::Updated)
        } else {
            Ok(SyncOutcome::Skipped(SkipReason::NoChanges))
        }
    }
}
