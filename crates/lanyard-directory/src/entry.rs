//! Directory entry model
//!
//! [`DirectoryEntry`] is the typed view of one directory object: its DN plus
//! a multi-valued attribute map. Attribute names are case-insensitive in
//! LDAP, so keys are folded to lowercase on every insert and lookup. The
//! entry tracks which attributes were modified after construction, letting a
//! save write back only what changed.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{DirectoryError, DirectoryResult};

/// One directory object: a DN and its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    dn: String,
    attributes: BTreeMap<String, Vec<String>>,
    modified: BTreeSet<String>,
}

impl DirectoryEntry {
    /// Create an empty entry at the given DN.
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: BTreeMap::new(),
            modified: BTreeSet::new(),
        }
    }

    /// Create an entry from a DN and pre-existing attributes, as read from
    /// the directory. Nothing is marked modified.
    pub fn with_attributes(
        dn: impl Into<String>,
        attributes: impl IntoIterator<Item = (String, Vec<String>)>,
    ) -> Self {
        let attributes = attributes
            .into_iter()
            .map(|(name, values)| (name.to_ascii_lowercase(), values))
            .collect();
        Self {
            dn: dn.into(),
            attributes,
            modified: BTreeSet::new(),
        }
    }

    /// The entry's distinguished name.
    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// Update the DN after a rename.
    pub fn set_dn(&mut self, dn: impl Into<String>) {
        self.dn = dn.into();
    }

    /// First value of an attribute, if present and non-empty.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// First value of an attribute, failing with the entry's DN and the
    /// attribute name when it is absent.
    pub fn require_first(&self, name: &str) -> DirectoryResult<&str> {
        self.first(name).ok_or_else(|| {
            DirectoryError::operation_failed(
                16,
                format!("entry {} has no value for attribute {name}", self.dn),
            )
        })
    }

    /// All values of an attribute. Empty when the attribute is absent.
    pub fn values(&self, name: &str) -> &[String] {
        self.attributes
            .get(&name.to_ascii_lowercase())
            .map_or(&[], Vec::as_slice)
    }

    /// Set an attribute to the given values, marking it modified. An empty
    /// value list marks the attribute for removal on save.
    pub fn set(&mut self, name: &str, values: Vec<String>) {
        let name = name.to_ascii_lowercase();
        self.modified.insert(name.clone());
        self.attributes.insert(name, values);
    }

    /// Set a single-valued attribute, marking it modified.
    pub fn set_single(&mut self, name: &str, value: impl Into<String>) {
        self.set(name, vec![value.into()]);
    }

    /// Whether any attribute has been modified since construction.
    pub fn is_modified(&self) -> bool {
        !self.modified.is_empty()
    }

    /// Names of the attributes modified since construction, in sorted order.
    pub fn modified_attributes(&self) -> impl Iterator<Item = &str> {
        self.modified.iter().map(String::as_str)
    }

    /// All attributes of the entry, in sorted name order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.attributes
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Clear modification tracking, e.g. after a successful save.
    pub fn clear_modified(&mut self) {
        self.modified.clear();
    }
}

/// A directory entry found through a search, together with the attribute
/// that matched it. The matched attribute is what authentication uses to
/// decide how the entry can be bound as.
#[derive(Debug, Clone)]
pub struct DirectoryIdentity {
    entry: DirectoryEntry,
    matched_attribute: String,
}

impl DirectoryIdentity {
    pub fn new(entry: DirectoryEntry, matched_attribute: impl Into<String>) -> Self {
        Self {
            entry,
            matched_attribute: matched_attribute.into(),
        }
    }

    pub fn entry(&self) -> &DirectoryEntry {
        &self.entry
    }

    /// The search attribute this entry was found under.
    pub fn matched_attribute(&self) -> &str {
        &self.matched_attribute
    }

    pub fn into_entry(self) -> DirectoryEntry {
        self.entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> DirectoryEntry {
        DirectoryEntry::with_attributes(
            "cn=jdoe,ou=people,dc=example,dc=com",
            [
                ("cn".to_string(), vec!["jdoe".to_string()]),
                ("mail".to_string(), vec!["jdoe@example.com".to_string()]),
                (
                    "objectClass".to_string(),
                    vec!["top".to_string(), "inetOrgPerson".to_string()],
                ),
            ],
        )
    }

    #[test]
    fn test_attribute_names_are_case_insensitive() {
        let entry = sample_entry();
        assert_eq!(entry.first("objectclass"), Some("top"));
        assert_eq!(entry.first("OBJECTCLASS"), Some("top"));
        assert_eq!(entry.first("Mail"), Some("jdoe@example.com"));
    }

    #[test]
    fn test_first_and_values() {
        let entry = sample_entry();
        assert_eq!(entry.first("cn"), Some("jdoe"));
        assert_eq!(entry.values("objectclass").len(), 2);
        assert_eq!(entry.first("missing"), None);
        assert!(entry.values("missing").is_empty());
    }

    #[test]
    fn test_require_first_reports_dn_and_attribute() {
        let entry = sample_entry();
        let err = entry.require_first("telephonenumber").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("cn=jdoe,ou=people,dc=example,dc=com"));
        assert!(message.contains("telephonenumber"));
    }

    #[test]
    fn test_construction_marks_nothing_modified() {
        let entry = sample_entry();
        assert!(!entry.is_modified());
        assert_eq!(entry.modified_attributes().count(), 0);
    }

    #[test]
    fn test_set_tracks_modification() {
        let mut entry = sample_entry();
        entry.set_single("mail", "new@example.com");
        entry.set("sn", vec!["Doe".to_string()]);

        assert!(entry.is_modified());
        let modified: Vec<&str> = entry.modified_attributes().collect();
        assert_eq!(modified, vec!["mail", "sn"]);
        assert_eq!(entry.first("mail"), Some("new@example.com"));
    }

    #[test]
    fn test_set_with_mixed_case_folds_the_name() {
        let mut entry = DirectoryEntry::new("cn=x,dc=example,dc=com");
        entry.set_single("userPassword", "{SHA}xyz");
        assert_eq!(entry.first("userpassword"), Some("{SHA}xyz"));
        let modified: Vec<&str> = entry.modified_attributes().collect();
        assert_eq!(modified, vec!["userpassword"]);
    }

    #[test]
    fn test_clear_modified() {
        let mut entry = sample_entry();
        entry.set_single("mail", "new@example.com");
        entry.clear_modified();
        assert!(!entry.is_modified());
        // The value itself stays.
        assert_eq!(entry.first("mail"), Some("new@example.com"));
    }

    #[test]
    fn test_identity_carries_matched_attribute() {
        let identity = DirectoryIdentity::new(sample_entry(), "cn");
        assert_eq!(identity.matched_attribute(), "cn");
        assert_eq!(identity.entry().first("cn"), Some("jdoe"));
        let entry = identity.into_entry();
        assert_eq!(entry.dn(), "cn=jdoe,ou=people,dc=example,dc=com");
    }
}
