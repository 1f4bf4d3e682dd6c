//! Attribute mapping and password hashing
//!
//! Translates between local user fields and directory attributes. The
//! mapping is fixed at construction; handing the same mapper to every
//! component keeps both directions consistent.
//!
//! Directory passwords use the legacy userPassword scheme notation: a
//! scheme tag followed by the base64 of the raw digest, as in
//! `{SHA}qUqP5cyxm6YcTAhz05Hph5gvu9M=`.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use lanyard_directory::DirectoryEntry;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::store::{LocalUser, NewUser, UserField};

/// Directory attribute holding the password value.
pub const PASSWORD_ATTRIBUTE: &str = "userpassword";

/// Digest behind the userPassword scheme tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordScheme {
    #[default]
    Sha1,
    Sha256,
}

impl PasswordScheme {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Sha1 => "{SHA}",
            Self::Sha256 => "{SHA256}",
        }
    }

    /// Hash a plaintext password into tagged scheme notation.
    pub fn hash(&self, plaintext: &str) -> String {
        let encoded = match self {
            Self::Sha1 => BASE64.encode(Sha1::digest(plaintext.as_bytes())),
            Self::Sha256 => BASE64.encode(Sha256::digest(plaintext.as_bytes())),
        };
        format!("{}{}", self.tag(), encoded)
    }
}

/// Ordered pairs of directory attribute and the local field it carries.
#[derive(Debug, Clone)]
pub struct AttributeMapping {
    pairs: Vec<(String, UserField)>,
}

impl AttributeMapping {
    pub fn new(pairs: impl IntoIterator<Item = (String, UserField)>) -> Self {
        let pairs = pairs
            .into_iter()
            .map(|(attr, field)| (attr.to_ascii_lowercase(), field))
            .collect();
        Self { pairs }
    }

    /// The stock mapping: surname and uid both carry the username, mail
    /// carries the email address.
    pub fn standard() -> Self {
        Self::new([
            ("sn".to_string(), UserField::Username),
            ("uid".to_string(), UserField::Username),
            ("mail".to_string(), UserField::Email),
        ])
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, UserField)> {
        self.pairs.iter().map(|(attr, field)| (attr.as_str(), *field))
    }
}

/// Maps local user state onto directory attribute values.
#[derive(Debug, Clone)]
pub struct AttributeMapper {
    mapping: AttributeMapping,
    scheme: PasswordScheme,
}

impl AttributeMapper {
    pub fn new(mapping: AttributeMapping, scheme: PasswordScheme) -> Self {
        Self { mapping, scheme }
    }

    /// Stock mapping with the default password scheme.
    pub fn standard() -> Self {
        Self::new(AttributeMapping::standard(), PasswordScheme::default())
    }

    pub fn mapping(&self) -> &AttributeMapping {
        &self.mapping
    }

    pub fn scheme(&self) -> PasswordScheme {
        self.scheme
    }

    pub fn hash_password(&self, plaintext: &str) -> String {
        self.scheme.hash(plaintext)
    }

    /// Attribute values to push for a user. With `changed_only`, fields the
    /// user has not changed in this unit of work are skipped. The password
    /// attribute is included, hashed, whenever a plaintext password is
    /// present (and, with `changed_only`, marked changed).
    ///
    /// An empty string value means the attribute should be removed.
    pub fn attributes_to_write(
        &self,
        user: &LocalUser,
        changed_only: bool,
    ) -> BTreeMap<String, String> {
        let mut attributes = BTreeMap::new();

        for (attr, field) in self.mapping.pairs() {
            if changed_only && !user.is_changed(field) {
                continue;
            }
            let value = user.field_value(field).unwrap_or_default();
            attributes.insert(attr.to_string(), value.to_string());
        }

        if let Some(plaintext) = user.password() {
            if !changed_only || user.is_changed(UserField::Password) {
                attributes.insert(
                    PASSWORD_ATTRIBUTE.to_string(),
                    self.hash_password(plaintext),
                );
            }
        }

        attributes
    }

    /// Build local account input from a directory entry, for users seen in
    /// the directory before they exist locally.
    pub fn new_user_from_entry(&self, username: &str, entry: &DirectoryEntry) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: entry.first("mail").unwrap_or_default().to_string(),
            display_name: entry.first("cn").map(str::to_string),
        }
    }
}
