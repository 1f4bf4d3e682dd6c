//! Directory user lookup
//!
//! Locates the directory entry for a login value. A lookup either finds
//! exactly one entry, finds none, or is ambiguous; ambiguity is a distinct
//! outcome because acting on the wrong one of several matches is worse than
//! refusing.

use lanyard_directory::{DirectoryConnection, DirectoryIdentity};
use tracing::debug;

use crate::error::SyncResult;

/// Login attributes probed in order by [`DirectoryUserFinder::find_first`].
pub const LOGIN_ATTRIBUTES: [&str; 3] = ["uid", "cn", "samaccountname"];

/// Result of one directory lookup.
#[derive(Debug, Clone)]
pub enum FindOutcome {
    /// Exactly one entry matched.
    Found(DirectoryIdentity),
    /// Nothing matched.
    NotFound,
    /// Several entries matched the same attribute value.
    Ambiguous { attribute: String, count: usize },
}

impl FindOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn into_found(self) -> Option<DirectoryIdentity> {
        match self {
            Self::Found(identity) => Some(identity),
            _ => None,
        }
    }
}

/// Searches a directory for the entry behind a login value.
pub struct DirectoryUserFinder<'a> {
    connection: &'a dyn DirectoryConnection,
}

impl<'a> DirectoryUserFinder<'a> {
    pub fn new(connection: &'a dyn DirectoryConnection) -> Self {
        Self { connection }
    }

    /// Look a value up under one attribute.
    pub async fn find(&self, attribute: &str, value: &str) -> SyncResult<FindOutcome> {
        if value.is_empty() {
            return Ok(FindOutcome::NotFound);
        }

        let mut entries = self.connection.search(attribute, value).await?;
        Ok(match entries.len() {
            0 => FindOutcome::NotFound,
            1 => {
                let entry = entries.remove(0);
                FindOutcome::Found(DirectoryIdentity::new(entry, attribute))
            }
            count => {
                debug!(attribute, value, count, "ambiguous directory lookup");
                FindOutcome::Ambiguous {
                    attribute: attribute.to_string(),
                    count,
                }
            }
        })
    }

    /// Look a value up under each login attribute in priority order,
    /// returning the first conclusive outcome. An ambiguous match is
    /// conclusive: it surfaces immediately instead of being papered over
    /// by a later attribute.
    pub async fn find_first(&self, value: &str) -> SyncResult<FindOutcome> {
        for attribute in LOGIN_ATTRIBUTES {
            match self.find(attribute, value).await? {
                FindOutcome::NotFound => continue,
                outcome => return Ok(outcome),
            }
        }
        Ok(FindOutcome::NotFound)
    }
}
