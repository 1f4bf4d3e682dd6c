//! Directory connection configuration
//!
//! Connection parameters for one directory endpoint. A configuration is
//! immutable once constructed; derived variants (per organizational unit, or
//! with a different account prefix) are produced by value through
//! [`DirectoryConnectionConfig::for_unit`] and
//! [`DirectoryConnectionConfig::with_account_prefix`].

use serde::{Deserialize, Serialize};

use crate::dn::escape_dn_value;
use crate::error::{DirectoryError, DirectoryResult};

/// How the directory lays out its tree, which decides where the account
/// suffix is required and where an organizational unit is spliced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectorySchemaKind {
    /// Searches run under `base_dn`; the account suffix is optional and only
    /// used for bind-login composition.
    #[default]
    Generic,

    /// OpenLDAP-style layout: the account suffix doubles as the search scope
    /// and is therefore required.
    OpenLdap,
}

/// Configuration for one directory endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct DirectoryConnectionConfig {
    /// Directory server hostname or IP address.
    pub host: String,

    /// Directory server port (389 for LDAP, 636 for LDAPS).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Use SSL/TLS (LDAPS).
    #[serde(default)]
    pub use_ssl: bool,

    /// Use STARTTLS upgrade on a plain connection.
    #[serde(default)]
    pub use_starttls: bool,

    /// Verify the server certificate when TLS is in use.
    #[serde(default = "default_true")]
    pub verify_certificates: bool,

    /// Service-account DN used for searches and entry writes. Absent means
    /// the service session binds anonymously.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_dn: Option<String>,

    /// Service-account password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    /// Base DN for searches under the generic schema kind
    /// (e.g., "dc=example,dc=com").
    #[serde(default)]
    pub base_dn: String,

    /// Attribute name composed in front of a login when building a bind DN.
    #[serde(default = "default_account_prefix")]
    pub account_prefix: String,

    /// Suffix appended after the login when building a bind DN, starting
    /// with a comma (e.g., ",ou=people,dc=example,dc=com").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_suffix: Option<String>,

    /// Tree layout of this directory.
    #[serde(default)]
    pub schema: DirectorySchemaKind,

    /// Extra filter ANDed into every search
    /// (e.g., "(objectClass=inetOrgPerson)").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_filter: Option<String>,

    /// Object classes written onto created entries.
    #[serde(default = "default_object_classes")]
    pub object_classes: Vec<String>,

    /// Connection establishment timeout in seconds.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Per-operation timeout in seconds.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,
}

impl std::fmt::Debug for DirectoryConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("use_starttls", &self.use_starttls)
            .field("verify_certificates", &self.verify_certificates)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "***REDACTED***"),
            )
            .field("base_dn", &self.base_dn)
            .field("account_prefix", &self.account_prefix)
            .field("account_suffix", &self.account_suffix)
            .field("schema", &self.schema)
            .field("search_filter", &self.search_filter)
            .field("object_classes", &self.object_classes)
            .field("connection_timeout_secs", &self.connection_timeout_secs)
            .field("operation_timeout_secs", &self.operation_timeout_secs)
            .finish()
    }
}

fn default_port() -> u16 {
    389
}

fn default_true() -> bool {
    true
}

fn default_account_prefix() -> String {
    "uid".to_string()
}

fn default_object_classes() -> Vec<String> {
    vec![
        "top".to_string(),
        "person".to_string(),
        "organizationalPerson".to_string(),
        "inetOrgPerson".to_string(),
    ]
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_operation_timeout() -> u64 {
    60
}

impl DirectoryConnectionConfig {
    /// Create a new configuration with required fields and defaults.
    pub fn new(host: impl Into<String>, base_dn: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            use_ssl: false,
            use_starttls: false,
            verify_certificates: true,
            bind_dn: None,
            bind_password: None,
            base_dn: base_dn.into(),
            account_prefix: default_account_prefix(),
            account_suffix: None,
            schema: DirectorySchemaKind::default(),
            search_filter: None,
            object_classes: default_object_classes(),
            connection_timeout_secs: default_connection_timeout(),
            operation_timeout_secs: default_operation_timeout(),
        }
    }

    /// Set the service account used for searches and writes.
    pub fn with_service_account(
        mut self,
        bind_dn: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.bind_dn = Some(bind_dn.into());
        self.bind_password = Some(password.into());
        self
    }

    /// Enable SSL (LDAPS) and switch to the LDAPS port.
    #[must_use]
    pub fn with_ssl(mut self) -> Self {
        self.use_ssl = true;
        self.port = 636;
        self
    }

    /// Enable STARTTLS.
    #[must_use]
    pub fn with_starttls(mut self) -> Self {
        self.use_starttls = true;
        self
    }

    /// Set the account prefix used in bind-DN composition.
    #[must_use]
    pub fn with_account_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.account_prefix = prefix.into();
        self
    }

    /// Set the account suffix used in bind-DN composition.
    #[must_use]
    pub fn with_account_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.account_suffix = Some(suffix.into());
        self
    }

    /// Set the schema kind.
    #[must_use]
    pub fn with_schema(mut self, schema: DirectorySchemaKind) -> Self {
        self.schema = schema;
        self
    }

    /// Set the extra search filter.
    pub fn with_search_filter(mut self, filter: impl Into<String>) -> Self {
        self.search_filter = Some(filter.into());
        self
    }

    /// Get the directory URL.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// The DN under which searches run.
    #[must_use]
    pub fn search_base(&self) -> &str {
        match self.schema {
            DirectorySchemaKind::OpenLdap => self
                .account_suffix
                .as_deref()
                .map_or("", |suffix| suffix.trim_start_matches(',')),
            DirectorySchemaKind::Generic => &self.base_dn,
        }
    }

    /// Compose the bind DN for a login attempt. With a configured suffix the
    /// login is escaped and wrapped as `<prefix>=<login><suffix>`; without
    /// one the login is passed to the directory as given.
    #[must_use]
    pub fn bind_dn_for(&self, login: &str) -> String {
        match &self.account_suffix {
            Some(suffix) => format!(
                "{}={}{}",
                self.account_prefix,
                escape_dn_value(login),
                suffix
            ),
            None => login.to_string(),
        }
    }

    /// Derive the configuration for an alternate organizational unit by
    /// splicing the unit segment into the suffix (OpenLDAP-style) or into
    /// the base DN (generic), preserving the remainder.
    #[must_use]
    pub fn for_unit(&self, unit: &str) -> Self {
        let mut derived = self.clone();
        match self.schema {
            DirectorySchemaKind::OpenLdap => {
                if let Some(suffix) = &self.account_suffix {
                    derived.account_suffix = Some(format!(",{unit}{suffix}"));
                }
            }
            DirectorySchemaKind::Generic => {
                derived.base_dn = format!("{unit},{}", self.base_dn);
            }
        }
        derived
    }

    /// Validate the configuration. Called by connection constructors; a
    /// failure here prevents startup.
    pub fn validate(&self) -> DirectoryResult<()> {
        if self.host.is_empty() {
            return Err(DirectoryError::configuration("host is required"));
        }

        if self.use_ssl && self.use_starttls {
            return Err(DirectoryError::configuration(
                "cannot use both SSL and STARTTLS",
            ));
        }

        if let Some(suffix) = &self.account_suffix {
            if !suffix.starts_with(',') {
                return Err(DirectoryError::configuration(
                    "account_suffix must start with a comma",
                ));
            }
        }

        match self.schema {
            DirectorySchemaKind::OpenLdap => {
                if self.account_suffix.is_none() {
                    return Err(DirectoryError::configuration(
                        "the OpenLDAP schema kind requires an account_suffix",
                    ));
                }
            }
            DirectorySchemaKind::Generic => {
                if self.base_dn.is_empty() {
                    return Err(DirectoryError::configuration(
                        "base_dn is required for the generic schema kind",
                    ));
                }
            }
        }

        Ok(())
    }

    /// Create a redacted copy for logging and display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.bind_password.is_some() {
            config.bind_password = Some("***REDACTED***".to_string());
        }
        config
    }

    /// Connection establishment timeout as a Duration.
    pub fn connection_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.connection_timeout_secs)
    }

    /// Per-operation timeout as a Duration.
    pub fn operation_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.operation_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> DirectoryConnectionConfig {
        DirectoryConnectionConfig::new("ldap.example.com", "dc=example,dc=com")
    }

    #[test]
    fn test_defaults() {
        let config = base_config();
        assert_eq!(config.port, 389);
        assert_eq!(config.account_prefix, "uid");
        assert_eq!(config.schema, DirectorySchemaKind::Generic);
        assert!(config.verify_certificates);
        assert_eq!(config.connection_timeout_secs, 30);
        assert!(config.object_classes.contains(&"inetOrgPerson".to_string()));
    }

    #[test]
    fn test_url() {
        assert_eq!(base_config().url(), "ldap://ldap.example.com:389");
        assert_eq!(
            base_config().with_ssl().url(),
            "ldaps://ldap.example.com:636"
        );
    }

    #[test]
    fn test_validate_ok() {
        assert!(base_config().validate().is_ok());
        assert!(base_config()
            .with_schema(DirectorySchemaKind::OpenLdap)
            .with_account_suffix(",ou=people,dc=example,dc=com")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_host() {
        let config = DirectoryConnectionConfig::new("", "dc=example,dc=com");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_ssl_and_starttls() {
        let config = base_config().with_ssl().with_starttls();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_suffix_for_open_ldap() {
        let config = base_config().with_schema(DirectorySchemaKind::OpenLdap);
        let err = config.validate().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_validate_rejects_suffix_without_comma() {
        let config = base_config().with_account_suffix("ou=people,dc=example,dc=com");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_base_dn_for_generic() {
        let config = DirectoryConnectionConfig::new("ldap.example.com", "");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bind_dn_composition() {
        let config = base_config().with_account_suffix(",ou=people,dc=example,dc=com");
        assert_eq!(
            config.bind_dn_for("jdoe"),
            "uid=jdoe,ou=people,dc=example,dc=com"
        );

        let cn_config = config.with_account_prefix("cn");
        assert_eq!(
            cn_config.bind_dn_for("John Doe"),
            "cn=John Doe,ou=people,dc=example,dc=com"
        );
    }

    #[test]
    fn test_bind_dn_escapes_login() {
        let config = base_config().with_account_suffix(",dc=example,dc=com");
        assert_eq!(
            config.bind_dn_for("jdoe,ou=evil"),
            "uid=jdoe\\,ou\\=evil,dc=example,dc=com"
        );
    }

    #[test]
    fn test_bind_dn_without_suffix_passes_login_through() {
        assert_eq!(base_config().bind_dn_for("jdoe@corp.example"), "jdoe@corp.example");
    }

    #[test]
    fn test_search_base() {
        assert_eq!(base_config().search_base(), "dc=example,dc=com");

        let open_ldap = base_config()
            .with_schema(DirectorySchemaKind::OpenLdap)
            .with_account_suffix(",ou=people,dc=example,dc=com");
        assert_eq!(open_ldap.search_base(), "ou=people,dc=example,dc=com");
    }

    #[test]
    fn test_for_unit_open_ldap_splices_suffix() {
        let config = base_config()
            .with_schema(DirectorySchemaKind::OpenLdap)
            .with_account_suffix(",dc=example,dc=com");

        let derived = config.for_unit("ou=contractors");
        assert_eq!(
            derived.account_suffix.as_deref(),
            Some(",ou=contractors,dc=example,dc=com")
        );
        assert_eq!(derived.search_base(), "ou=contractors,dc=example,dc=com");
        // The remainder of the configuration is preserved.
        assert_eq!(derived.host, config.host);
        assert_eq!(derived.account_prefix, config.account_prefix);
    }

    #[test]
    fn test_for_unit_generic_splices_base_dn() {
        let config = base_config().with_account_suffix(",dc=example,dc=com");
        let derived = config.for_unit("ou=contractors");
        assert_eq!(derived.base_dn, "ou=contractors,dc=example,dc=com");
        // Generic splicing leaves the bind suffix alone.
        assert_eq!(derived.account_suffix.as_deref(), Some(",dc=example,dc=com"));
    }

    #[test]
    fn test_redacted_hides_password() {
        let config = base_config().with_service_account("cn=admin,dc=example,dc=com", "hunter2");
        let redacted = config.redacted();
        assert_eq!(redacted.bind_password.as_deref(), Some("***REDACTED***"));
        assert_eq!(redacted.bind_dn, config.bind_dn);
    }

    #[test]
    fn test_debug_never_prints_password() {
        let config = base_config().with_service_account("cn=admin,dc=example,dc=com", "hunter2");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("***REDACTED***"));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: DirectoryConnectionConfig = serde_json::from_str(
            r#"{"host": "ldap.example.com", "base_dn": "dc=example,dc=com"}"#,
        )
        .unwrap();
        assert_eq!(config.port, 389);
        assert_eq!(config.account_prefix, "uid");
        assert_eq!(config.schema, DirectorySchemaKind::Generic);
    }

    #[test]
    fn test_deserialize_schema_kind() {
        let config: DirectoryConnectionConfig = serde_json::from_str(
            r#"{
                "host": "ldap.example.com",
                "base_dn": "",
                "schema": "open_ldap",
                "account_suffix": ",ou=people,dc=example,dc=com"
            }"#,
        )
        .unwrap();
        assert_eq!(config.schema, DirectorySchemaKind::OpenLdap);
        assert!(config.validate().is_ok());
    }
}
