//! # Directory Connection Layer
//!
//! Connection layer for LDAP-style directories: configuration, the typed
//! entry model, and the [`DirectoryConnection`] operation surface the sync
//! layer drives.
//!
//! ## Features
//!
//! - LDAP v3 over `ldap3`, with SSL/TLS and STARTTLS
//! - Generic and OpenLDAP-style tree layouts
//! - Derived sessions for alternate organizational units and bind shapes
//! - Escaping for DN values and search filters
//! - An in-memory backend with an operation log for tests
//!
//! ## Example
//!
//! ```ignore
//! use lanyard_directory::{DirectoryConnection, DirectoryConnectionConfig, LdapDirectory};
//!
//! let config = DirectoryConnectionConfig::new("ldap.example.com", "dc=example,dc=com")
//!     .with_service_account("cn=admin,dc=example,dc=com", "secret")
//!     .with_account_suffix(",ou=people,dc=example,dc=com");
//!
//! let directory = LdapDirectory::new(config)?;
//! directory.connect().await?;
//! let accepted = directory.bind("jdoe", "password").await?;
//! ```

pub mod config;
pub mod dn;
pub mod entry;
pub mod error;
pub mod ldap;
pub mod memory;
pub mod traits;

// Re-exports
pub use config::{DirectoryConnectionConfig, DirectorySchemaKind};
pub use entry::{DirectoryEntry, DirectoryIdentity};
pub use error::{DirectoryError, DirectoryResult};
pub use ldap::LdapDirectory;
pub use memory::{MemoryDirectory, Operation};
pub use traits::DirectoryConnection;
