//! Local user model and host-side interfaces
//!
//! [`LocalUser`] is the synchronization layer's view of one account in the
//! local store. Setters record the previous value of every field they touch,
//! so the engine can later find the directory entry under the name it was
//! created with and write back only what changed.
//!
//! The traits at the bottom are the seams the host application implements:
//! persistence, role grants, and user notifications.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SyncResult;

/// Local password hash value marking an account whose password lives in the
/// directory. Login against such an account can never succeed through the
/// local hash check, only through a directory bind.
pub const PASSWORD_SENTINEL: &str = "{DIRECTORY}";

/// A user field the synchronization layer tracks changes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UserField {
    Username,
    Email,
    DisplayName,
    Password,
}

impl UserField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Username => "username",
            Self::Email => "email",
            Self::DisplayName => "display_name",
            Self::Password => "password",
        }
    }
}

/// One account in the local user store.
///
/// The `password` field carries a plaintext password only transiently,
/// during the login or reset request that produced it. It is never
/// persisted and never printed.
#[derive(Clone)]
pub struct LocalUser {
    id: i64,
    username: String,
    email: String,
    display_name: Option<String>,
    password: Option<String>,
    password_hash: String,
    confirmed_at: Option<DateTime<Utc>>,
    // Field -> value before the first change in this unit of work.
    changes: BTreeMap<UserField, Option<String>>,
}

impl std::fmt::Debug for LocalUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalUser")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .field(
                "password",
                &self.password.as_ref().map(|_| "***REDACTED***"),
            )
            .field("password_hash", &self.password_hash)
            .field("confirmed_at", &self.confirmed_at)
            .field("changes", &self.changes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl LocalUser {
    pub fn new(id: i64, username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            email: email.into(),
            display_name: None,
            password: None,
            password_hash: String::new(),
            confirmed_at: None,
            changes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    #[must_use]
    pub fn with_password_hash(mut self, hash: impl Into<String>) -> Self {
        self.password_hash = hash.into();
        self
    }

    #[must_use]
    pub fn with_confirmed_at(mut self, at: DateTime<Utc>) -> Self {
        self.confirmed_at = Some(at);
        self
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Transient plaintext password, when this unit of work carries one.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.confirmed_at
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed_at.is_some()
    }

    /// Whether the local hash is the sentinel pointing at the directory.
    pub fn uses_directory_password(&self) -> bool {
        self.password_hash == PASSWORD_SENTINEL
    }

    pub fn set_username(&mut self, username: impl Into<String>) {
        let previous = std::mem::replace(&mut self.username, username.into());
        self.record_change(UserField::Username, Some(previous));
    }

    pub fn set_email(&mut self, email: impl Into<String>) {
        let previous = std::mem::replace(&mut self.email, email.into());
        self.record_change(UserField::Email, Some(previous));
    }

    pub fn set_display_name(&mut self, display_name: Option<String>) {
        let previous = std::mem::replace(&mut self.display_name, display_name);
        self.record_change(UserField::DisplayName, previous);
    }

    /// Attach a transient plaintext password. The previous plaintext is
    /// never retained.
    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = Some(password.into());
        self.record_change(UserField::Password, None);
    }

    /// Replace the stored hash. Not tracked as a change; the hash is local
    /// bookkeeping, not an attribute pushed to the directory.
    pub fn set_password_hash(&mut self, hash: impl Into<String>) {
        self.password_hash = hash.into();
    }

    fn record_change(&mut self, field: UserField, previous: Option<String>) {
        // The first change keeps the original value; later changes in the
        // same unit of work do not overwrite it.
        self.changes.entry(field).or_insert(previous);
    }

    pub fn is_changed(&self, field: UserField) -> bool {
        self.changes.contains_key(&field)
    }

    /// The value a field had before this unit of work changed it.
    pub fn previous(&self, field: UserField) -> Option<&str> {
        self.changes.get(&field).and_then(|v| v.as_deref())
    }

    /// The username the directory still knows this user under: the value
    /// before an in-flight rename, or the current one.
    pub fn previous_username(&self) -> &str {
        self.previous(UserField::Username).unwrap_or(&self.username)
    }

    /// Current value of a tracked field.
    pub fn field_value(&self, field: UserField) -> Option<&str> {
        match field {
            UserField::Username => Some(&self.username),
            UserField::Email => Some(&self.email),
            UserField::DisplayName => self.display_name(),
            UserField::Password => self.password(),
        }
    }

    /// Forget change tracking, e.g. after the changes were synchronized.
    pub fn clear_changes(&mut self) {
        self.changes.clear();
    }
}

/// Input for creating a local account from a directory entry.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
}

/// Persistence seam to the local user store.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> SyncResult<Option<LocalUser>>;

    async fn find_by_id(&self, id: i64) -> SyncResult<Option<LocalUser>>;

    /// Create a local account. The store allocates the id.
    async fn create(&self, user: NewUser) -> SyncResult<LocalUser>;

    /// Persist the user's current state.
    async fn save(&self, user: &LocalUser) -> SyncResult<()>;
}

/// Grants local roles to accounts the bridge creates.
#[async_trait]
pub trait RoleAssigner: Send + Sync {
    /// Grant `role` to the user. Fails with
    /// [`SyncError::RoleNotFound`](crate::SyncError) when the role does not
    /// exist locally.
    async fn assign(&self, role: &str, user_id: i64) -> SyncResult<()>;
}

/// A user-facing notification produced by synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncNotification {
    /// A directory entry was created for the user during a password reset,
    /// carrying their new initial password.
    InitialPasswordSet { username: String },
    /// The user's reset password was written to their directory entry.
    PasswordResetSynced { username: String },
}

/// Delivery seam for user notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: SyncNotification) -> SyncResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setters_record_first_previous_value() {
        let mut user = LocalUser::new(7, "jdoe", "jdoe@example.com");
        user.set_username("jsmith");
        user.set_username("jbrown");

        assert_eq!(user.username(), "jbrown");
        assert!(user.is_changed(UserField::Username));
        // The original name survives a second rename in the same unit of work.
        assert_eq!(user.previous(UserField::Username), Some("jdoe"));
        assert_eq!(user.previous_username(), "jdoe");
    }

    #[test]
    fn test_previous_username_without_change() {
        let user = LocalUser::new(7, "jdoe", "jdoe@example.com");
        assert_eq!(user.previous_username(), "jdoe");
        assert!(!user.is_changed(UserField::Username));
    }

    #[test]
    fn test_display_name_change_tracks_none_previous() {
        let mut user = LocalUser::new(7, "jdoe", "jdoe@example.com");
        user.set_display_name(Some("John Doe".to_string()));
        assert!(user.is_changed(UserField::DisplayName));
        assert_eq!(user.previous(UserField::DisplayName), None);
        assert_eq!(user.field_value(UserField::DisplayName), Some("John Doe"));
    }

    #[test]
    fn test_password_is_transient_and_redacted() {
        let mut user = LocalUser::new(7, "jdoe", "jdoe@example.com");
        user.set_password("hunter2");

        assert_eq!(user.password(), Some("hunter2"));
        assert!(user.is_changed(UserField::Password));
        let rendered = format!("{user:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("***REDACTED***"));
    }

    #[test]
    fn test_directory_password_sentinel() {
        let mut user = LocalUser::new(7, "jdoe", "jdoe@example.com")
            .with_password_hash("$2y$something");
        assert!(!user.uses_directory_password());
        user.set_password_hash(PASSWORD_SENTINEL);
        assert!(user.uses_directory_password());
        // Hash replacement is not a tracked change.
        assert!(!user.is_changed(UserField::Password));
    }

    #[test]
    fn test_clear_changes() {
        let mut user = LocalUser::new(7, "jdoe", "jdoe@example.com");
        user.set_email("new@example.com");
        user.clear_changes();
        assert!(!user.is_changed(UserField::Email));
        assert_eq!(user.email(), "new@example.com");
        assert_eq!(user.previous_username(), "jdoe");
    }

    #[test]
    fn test_confirmation() {
        let user = LocalUser::new(7, "jdoe", "jdoe@example.com");
        assert!(!user.is_confirmed());
        let confirmed = user.with_confirmed_at(Utc::now());
        assert!(confirmed.is_confirmed());
    }
}
