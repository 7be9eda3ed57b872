//! Repository model

use secrecy::SecretString;

/// Source repository an App is built from
///
/// The access token is kept behind [`SecretString`] so it never shows up in
/// `Debug` output or tracing fields.
#[derive(Debug, Clone)]
pub struct Repository {
    /// Unique repository ID
    pub id: i64,

    /// Display name
    pub name: String,

    /// Clone URL (https)
    pub git_url: String,

    /// Branch deployed by default
    pub default_branch: String,

    /// Optional access token embedded in the fetch URL
    pub access_token: Option<SecretString>,
}

impl Repository {
    pub fn new(id: i64, name: impl Into<String>, git_url: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            git_url: git_url.into(),
            default_branch: "main".to_string(),
            access_token: None,
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(SecretString::from(token.into()));
        self
    }
}
