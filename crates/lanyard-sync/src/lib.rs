//! # Identity Synchronization Engine
//!
//! Bridges a host application's local user store with LDAP-style
//! directories, in both directions:
//!
//! - **Inbound**: directory-first authentication with organizational-unit
//!   and alternate-attribute fallback, provisioning local accounts for
//!   directory users on first login.
//! - **Outbound**: mirroring account lifecycle events (creation,
//!   confirmation, profile changes, password resets, deletion) into a sync
//!   directory.
//!
//! The host implements the seams in [`store`] (persistence, roles,
//! notifications) and [`events`] (lifecycle delivery), wires them into a
//! [`SyncEngine`], registers it once, and hands every event occurrence to
//! [`SyncEngine::dispatch`].
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lanyard_directory::{DirectoryConnectionConfig, LdapDirectory};
//! use lanyard_sync::{
//!     AttributeMapping, OrganizationalUnitFallback, SyncConfig, SyncEngine,
//! };
//!
//! let config = DirectoryConnectionConfig::new("ldap.example.com", "dc=example,dc=com")
//!     .with_account_suffix(",ou=people,dc=example,dc=com");
//! let primary = Arc::new(LdapDirectory::new(config)?);
//!
//! let auth = OrganizationalUnitFallback::with_units(
//!     primary.clone(),
//!     &["ou=contractors".to_string()],
//! )
//! .await?;
//!
//! let engine = SyncEngine::new(
//!     auth,
//!     Some(primary),
//!     store,
//!     roles,
//!     notifier,
//!     AttributeMapping::standard(),
//!     SyncConfig::default(),
//! )?;
//! engine.register(&mut event_source);
//! ```

pub mod auth;
pub mod engine;
pub mod error;
pub mod events;
pub mod finder;
pub mod mapping;
pub mod store;

// Re-exports
pub use auth::{AuthenticationResolver, OrganizationalUnitFallback};
pub use engine::{
    EventOutcome, LoginDecision, SkipReason, SyncConfig, SyncEngine, SyncOutcome,
};
pub use error::{SyncError, SyncResult};
pub use events::{EventKind, EventSource, HandlerPriority, LifecycleEvent};
pub use finder::{DirectoryUserFinder, FindOutcome, LOGIN_ATTRIBUTES};
pub use mapping::{
    AttributeMapper, AttributeMapping, PasswordScheme, PASSWORD_ATTRIBUTE,
};
pub use store::{
    LocalUser, NewUser, Notifier, RoleAssigner, SyncNotification, UserField, UserStore,
    PASSWORD_SENTINEL,
};
