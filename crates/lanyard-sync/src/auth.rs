//! Directory authentication
//!
//! Two layers of fallback wrap a plain credential bind. The
//! [`AuthenticationResolver`] retries a failed bind under the login
//! attribute the user's entry actually sits under. The
//! [`OrganizationalUnitFallback`] runs the resolver against the primary
//! tree and then against each configured alternate unit.
//!
//! Authentication never raises: an unreachable directory or an ambiguous
//! lookup reads as a failed login, so the host can fall through to its
//! local password check.

use std::sync::Arc;

use lanyard_directory::dn::attribute_before_suffix;
use lanyard_directory::DirectoryConnection;
use tracing::{debug, instrument, warn};

use crate::error::SyncResult;
use crate::finder::{DirectoryUserFinder, FindOutcome};

/// Checks credentials against one directory, with alternate-attribute
/// fallback.
pub struct AuthenticationResolver<'a> {
    connection: &'a dyn DirectoryConnection,
}

impl<'a> AuthenticationResolver<'a> {
    pub fn new(connection: &'a dyn DirectoryConnection) -> Self {
        Self { connection }
    }

    /// Whether the directory accepts these credentials. Directory failures
    /// and ambiguous lookups read as `false`.
    #[instrument(skip(self, password), fields(host = %self.connection.config().host))]
    pub async fn authenticate(&self, username: &str, password: &str) -> bool {
        match self.try_authenticate(username, password).await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(username, error = %e, "directory authentication errored");
                false
            }
        }
    }

    async fn try_authenticate(&self, username: &str, password: &str) -> SyncResult<bool> {
        if username.is_empty() || password.is_empty() {
            return Ok(false);
        }

        if self.connection.bind(username, password).await? {
            return Ok(true);
        }

        // The entry may sit under a different RDN attribute than the
        // configured prefix. Find it, read the attribute its DN actually
        // starts with, and retry the bind under that attribute's value.
        let config = self.connection.config();
        let Some(suffix) = config.account_suffix.clone() else {
            return Ok(false);
        };

        let finder = DirectoryUserFinder::new(self.connection);
        let identity = match finder.find_first(username).await? {
            FindOutcome::Found(identity) => identity,
            FindOutcome::NotFound => return Ok(false),
            FindOutcome::Ambiguous { attribute, count } => {
                warn!(username, attribute, count, "ambiguous login, rejecting");
                return Ok(false);
            }
        };

        let Some(prefix) = attribute_before_suffix(identity.entry().dn(), &suffix) else {
            debug!(dn = identity.entry().dn(), "entry DN is outside the account suffix");
            return Ok(false);
        };
        let Some(alternate_login) = identity.entry().first(prefix) else {
            debug!(dn = identity.entry().dn(), prefix, "entry has no value for its own RDN attribute");
            return Ok(false);
        };

        let derived = config.clone().with_account_prefix(prefix);
        let session = self.connection.open_derived(derived).await?;
        let accepted = session.bind(alternate_login, password).await?;
        if accepted {
            debug!(username, prefix, "authenticated under alternate attribute");
        }
        Ok(accepted)
    }
}

/// Runs directory authentication against a primary tree and a list of
/// alternate organizational units.
pub struct OrganizationalUnitFallback {
    primary: Arc<dyn DirectoryConnection>,
    alternates: Vec<Box<dyn DirectoryConnection>>,
}

impl OrganizationalUnitFallback {
    /// Fallback over the primary tree only.
    pub fn new(primary: Arc<dyn DirectoryConnection>) -> Self {
        Self {
            primary,
            alternates: Vec::new(),
        }
    }

    /// Derive one session per alternate unit up front. Derivation reuses
    /// the primary configuration with the unit segment spliced in, so a
    /// failure here means the directory itself is not usable.
    pub async fn with_units(
        primary: Arc<dyn DirectoryConnection>,
        units: &[String],
    ) -> SyncResult<Self> {
        let mut alternates = Vec::with_capacity(units.len());
        for unit in units {
            let config = primary.config().for_unit(unit);
            let session = primary.open_derived(config).await?;
            alternates.push(session);
        }
        Ok(Self { primary, alternates })
    }

    /// The primary connection, used for searches and provisioning.
    pub fn primary(&self) -> &dyn DirectoryConnection {
        self.primary.as_ref()
    }

    pub fn alternate_count(&self) -> usize {
        self.alternates.len()
    }

    /// True as soon as any tree accepts the credentials. Each attempt is a
    /// full resolver run, so alternate-attribute fallback applies within
    /// every unit.
    pub async fn authenticate(&self, username: &str, password: &str) -> bool {
        if AuthenticationResolver::new(self.primary.as_ref())
            .authenticate(username, password)
            .await
        {
            return true;
        }

        for (index, alternate) in self.alternates.iter().enumerate() {
            if AuthenticationResolver::new(alternate.as_ref())
                .authenticate(username, password)
                .await
            {
                debug!(username, unit_index = index, "authenticated against alternate unit");
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanyard_directory::{
        DirectoryConnectionConfig, DirectoryEntry, DirectorySchemaKind, MemoryDirectory, Operation,
    };

    fn config() -> DirectoryConnectionConfig {
        DirectoryConnectionConfig::new("memory", "dc=example,dc=com")
            .with_account_prefix("uid")
            .with_account_suffix(",dc=example,dc=com")
    }

    fn person(dn: &str, attrs: &[(&str, &str)]) -> DirectoryEntry {
        DirectoryEntry::with_attributes(
            dn,
            attrs
                .iter()
                .map(|(name, value)| ((*name).to_string(), vec![(*value).to_string()])),
        )
    }

    #[tokio::test]
    async fn test_direct_bind_succeeds() {
        let dir = MemoryDirectory::new(config()).unwrap();
        dir.insert(person(
            "uid=jdoe,dc=example,dc=com",
            &[("uid", "jdoe"), ("userPassword", "secret")],
        ))
        .await;

        let resolver = AuthenticationResolver::new(&dir);
        assert!(resolver.authenticate("jdoe", "secret").await);
        assert!(!resolver.authenticate("jdoe", "wrong").await);
    }

    #[tokio::test]
    async fn test_empty_credentials_never_bind() {
        let dir = MemoryDirectory::new(config()).unwrap();
        dir.insert(person(
            "uid=jdoe,dc=example,dc=com",
            &[("uid", "jdoe"), ("userPassword", "secret")],
        ))
        .await;

        let resolver = AuthenticationResolver::new(&dir);
        assert!(!resolver.authenticate("jdoe", "").await);
        assert!(!resolver.authenticate("", "secret").await);
        // No bind operation reached the directory.
        assert!(dir
            .operations()
            .await
            .iter()
            .all(|op| !matches!(op, Operation::Bind { .. })));
    }

    #[tokio::test]
    async fn test_alternate_attribute_fallback() {
        // The entry sits under cn, not under the configured uid prefix.
        let dir = MemoryDirectory::new(config()).unwrap();
        dir.insert(person(
            "cn=John Doe,dc=example,dc=com",
            &[
                ("cn", "John Doe"),
                ("uid", "jdoe"),
                ("userPassword", "secret"),
            ],
        ))
        .await;

        let resolver = AuthenticationResolver::new(&dir);
        assert!(resolver.authenticate("jdoe", "secret").await);

        // The winning bind used the DN the entry actually has.
        let ops = dir.operations().await;
        assert!(ops.contains(&Operation::Bind {
            dn: "cn=John Doe,dc=example,dc=com".to_string(),
            success: true,
        }));
    }

    #[tokio::test]
    async fn test_fallback_requires_suffix() {
        let mut cfg = config();
        cfg.account_suffix = None;
        let dir = MemoryDirectory::new(cfg).unwrap();
        dir.insert(person(
            "cn=John Doe,dc=example,dc=com",
            &[("cn", "John Doe"), ("uid", "jdoe"), ("userPassword", "secret")],
        ))
        .await;

        let resolver = AuthenticationResolver::new(&dir);
        assert!(!resolver.authenticate("jdoe", "secret").await);
    }

    #[tokio::test]
    async fn test_ambiguous_login_is_rejected() {
        let dir = MemoryDirectory::new(config()).unwrap();
        dir.insert(person(
            "cn=a,dc=example,dc=com",
            &[("uid", "jdoe"), ("userPassword", "secret")],
        ))
        .await;
        dir.insert(person(
            "cn=b,dc=example,dc=com",
            &[("uid", "jdoe"), ("userPassword", "secret")],
        ))
        .await;

        let resolver = AuthenticationResolver::new(&dir);
        assert!(!resolver.authenticate("jdoe", "secret").await);
    }

    #[tokio::test]
    async fn test_unreachable_directory_reads_as_failure() {
        let dir = MemoryDirectory::new(config()).unwrap();
        dir.set_offline(true);
        let resolver = AuthenticationResolver::new(&dir);
        assert!(!resolver.authenticate("jdoe", "secret").await);
    }

    #[tokio::test]
    async fn test_unit_fallback_accepts_on_alternate_tree() {
        let cfg = DirectoryConnectionConfig::new("memory", "dc=example,dc=com")
            .with_schema(DirectorySchemaKind::OpenLdap)
            .with_account_prefix("uid")
            .with_account_suffix(",dc=example,dc=com");
        let dir = MemoryDirectory::new(cfg).unwrap();
        dir.insert(person(
            "uid=jdoe,ou=contractors,dc=example,dc=com",
            &[("uid", "jdoe"), ("userPassword", "secret")],
        ))
        .await;

        let primary: Arc<dyn DirectoryConnection> = Arc::new(dir);
        let fallback = OrganizationalUnitFallback::with_units(
            Arc::clone(&primary),
            &["ou=contractors".to_string(), "ou=staff".to_string()],
        )
        .await
        .unwrap();
        assert_eq!(fallback.alternate_count(), 2);

        // Fails on the primary suffix, succeeds on the contractors unit.
        assert!(fallback.authenticate("jdoe", "secret").await);
        assert!(!fallback.authenticate("jdoe", "wrong").await);
        assert!(!fallback.authenticate("ghost", "secret").await);
    }

    #[tokio::test]
    async fn test_unit_fallback_stops_at_first_success() {
        let cfg = DirectoryConnectionConfig::new("memory", "dc=example,dc=com")
            .with_schema(DirectorySchemaKind::OpenLdap)
            .with_account_prefix("uid")
            .with_account_suffix(",dc=example,dc=com");
        let dir = Arc::new(MemoryDirectory::new(cfg).unwrap());
        dir.insert(person(
            "uid=jdoe,dc=example,dc=com",
            &[("uid", "jdoe"), ("userPassword", "secret")],
        ))
        .await;

        let primary: Arc<dyn DirectoryConnection> = dir.clone();
        let fallback = OrganizationalUnitFallback::with_units(
            primary,
            &["ou=contractors".to_string()],
        )
        .await
        .unwrap();

        assert!(fallback.authenticate("jdoe", "secret").await);

        // Exactly one successful bind; the alternate unit was never tried.
        let successes = dir
            .operations()
            .await
            .iter()
            .filter(|op| matches!(op, Operation::Bind { success: true, .. }))
            .count();
        assert_eq!(successes, 1);
    }
}
