//! Account lifecycle events
//!
//! The host application emits these at fixed points in an account's life.
//! The engine registers its interest once through [`EventSource`] and the
//! host hands each occurrence to
//! [`SyncEngine::dispatch`](crate::engine::SyncEngine::dispatch).

use crate::store::LocalUser;

/// The points in an account's life the bridge reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BeforeLogin,
    AfterLogin,
    UserCreated,
    UserConfirmed,
    UserUpdated,
    AccountSettingsUpdated,
    PasswordResetCompleted,
    UserDeleted,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::BeforeLogin,
        EventKind::AfterLogin,
        EventKind::UserCreated,
        EventKind::UserConfirmed,
        EventKind::UserUpdated,
        EventKind::AccountSettingsUpdated,
        EventKind::PasswordResetCompleted,
        EventKind::UserDeleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeLogin => "before_login",
            Self::AfterLogin => "after_login",
            Self::UserCreated => "user_created",
            Self::UserConfirmed => "user_confirmed",
            Self::UserUpdated => "user_updated",
            Self::AccountSettingsUpdated => "account_settings_updated",
            Self::PasswordResetCompleted => "password_reset_completed",
            Self::UserDeleted => "user_deleted",
        }
    }

    /// Ordering hint for the host's handler chain. Confirmation and
    /// deletion run ahead of other handlers for the same occurrence, so
    /// the directory reflects the account before anything else reacts.
    pub fn priority(&self) -> HandlerPriority {
        match self {
            Self::UserConfirmed | Self::UserDeleted => HandlerPriority::High,
            _ => HandlerPriority::Normal,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where in the host's handler chain a subscription lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HandlerPriority {
    Normal,
    High,
}

/// One occurrence of a lifecycle event, with its payload.
#[derive(Clone)]
pub enum LifecycleEvent {
    /// A login attempt is about to be checked locally.
    BeforeLogin { username: String, password: String },
    /// A login attempt succeeded locally.
    AfterLogin { user: LocalUser },
    UserCreated { user: LocalUser },
    UserConfirmed { user: LocalUser },
    UserUpdated { user: LocalUser },
    AccountSettingsUpdated { user: LocalUser },
    PasswordResetCompleted { user: LocalUser },
    UserDeleted { user: LocalUser },
}

impl LifecycleEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::BeforeLogin { .. } => EventKind::BeforeLogin,
            Self::AfterLogin { .. } => EventKind::AfterLogin,
            Self::UserCreated { .. } => EventKind::UserCreated,
            Self::UserConfirmed { .. } => EventKind::UserConfirmed,
            Self::UserUpdated { .. } => EventKind::UserUpdated,
            Self::AccountSettingsUpdated { .. } => EventKind::AccountSettingsUpdated,
            Self::PasswordResetCompleted { .. } => EventKind::PasswordResetCompleted,
            Self::UserDeleted { .. } => EventKind::UserDeleted,
        }
    }
}

impl std::fmt::Debug for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BeforeLogin { username, .. } => f
                .debug_struct("BeforeLogin")
                .field("username", username)
                .field("password", &"***REDACTED***")
                .finish(),
            Self::AfterLogin { user } => f.debug_struct("AfterLogin").field("user", user).finish(),
            Self::UserCreated { user } => {
                f.debug_struct("UserCreated").field("user", user).finish()
            }
            Self::UserConfirmed { user } => {
                f.debug_struct("UserConfirmed").field("user", user).finish()
            }
            Self::UserUpdated { user } => {
                f.debug_struct("UserUpdated").field("user", user).finish()
            }
            Self::AccountSettingsUpdated { user } => f
                .debug_struct("AccountSettingsUpdated")
                .field("user", user)
                .finish(),
            Self::PasswordResetCompleted { user } => f
                .debug_struct("PasswordResetCompleted")
                .field("user", user)
                .finish(),
            Self::UserDeleted { user } => {
                f.debug_struct("UserDeleted").field("user", user).finish()
            }
        }
    }
}

/// Registration seam to the host's event system. The engine announces the
/// kinds it handles and the priority each handler should get; the host
/// delivers occurrences back through the engine's dispatch entry point.
pub trait EventSource {
    fn subscribe(&mut self, kind: EventKind, priority: HandlerPriority);
}
