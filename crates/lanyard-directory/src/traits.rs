//! Directory connection trait
//!
//! The operation surface every directory backend implements. The trait is
//! object-safe: callers hold connections as `Arc<dyn DirectoryConnection>`
//! or `Box<dyn DirectoryConnection>` and never see the wire protocol.

use async_trait::async_trait;

use crate::config::DirectoryConnectionConfig;
use crate::entry::DirectoryEntry;
use crate::error::DirectoryResult;

/// A session against one directory endpoint.
///
/// Implementations hold their service session lazily: `connect` establishes
/// and binds it, and the operation methods reuse it. Credential checks for
/// end users never run on the service session; `bind` opens a short-lived
/// connection of its own so a failed check cannot poison service state.
#[async_trait]
pub trait DirectoryConnection: Send + Sync {
    /// The configuration this connection was built from.
    fn config(&self) -> &DirectoryConnectionConfig;

    /// Establish the service session and bind the service account
    /// (anonymously when no service account is configured).
    async fn connect(&self) -> DirectoryResult<()>;

    /// Search for entries whose `attribute` equals `value`, under the
    /// configured search base and extra filter.
    ///
    /// The value is escaped before it reaches the filter; callers pass it
    /// raw. Returns every matching entry, in server order.
    async fn search(&self, attribute: &str, value: &str) -> DirectoryResult<Vec<DirectoryEntry>>;

    /// Check a user's credentials by binding as them.
    ///
    /// The bind DN is composed from the configuration's account prefix and
    /// suffix. Returns `Ok(true)` when the directory accepts the
    /// credentials, `Ok(false)` when it rejects them, and an error only
    /// when the directory cannot be reached or the bind fails for a reason
    /// other than the credentials.
    ///
    /// An empty password is rejected locally without contacting the
    /// directory: LDAP treats a bind with a DN and no password as
    /// anonymous, which would report success for any user.
    async fn bind(&self, login: &str, password: &str) -> DirectoryResult<bool>;

    /// Create a new entry at its DN with all of its attributes.
    ///
    /// Fails with [`DirectoryError::AlreadyExists`](crate::DirectoryError)
    /// when an entry already occupies the DN.
    async fn create_entry(&self, entry: &DirectoryEntry) -> DirectoryResult<()>;

    /// Write the entry's modified attributes back to the directory.
    ///
    /// Only attributes marked modified are sent; an attribute modified to
    /// an empty value list is removed. Saving an entry with no modified
    /// attributes is a no-op.
    async fn save_entry(&self, entry: &DirectoryEntry) -> DirectoryResult<()>;

    /// Rename the entry to a new leading RDN, keeping its position in the
    /// tree. The old RDN attribute value is deleted from the entry.
    async fn rename_entry(&self, entry: &DirectoryEntry, new_rdn: &str) -> DirectoryResult<()>;

    /// Delete the entry.
    async fn delete_entry(&self, entry: &DirectoryEntry) -> DirectoryResult<()>;

    /// Open an independent session against the same directory under a
    /// different configuration, typically one derived with
    /// [`DirectoryConnectionConfig::for_unit`] or a changed account prefix.
    ///
    /// The returned session shares nothing with this one and is dropped by
    /// the caller when done.
    async fn open_derived(
        &self,
        config: DirectoryConnectionConfig,
    ) -> DirectoryResult<Box<dyn DirectoryConnection>>;
}
