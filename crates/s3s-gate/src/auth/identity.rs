use std::fmt;

/// A verified caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    user: String,
    access_key: Option<String>,
}

impl Identity {
    #[must_use]
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            access_key: None,
        }
    }

    #[must_use]
    pub fn with_access_key(user: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            access_key: Some(access_key.into()),
        }
    }

    /// The stable principal identifier.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// The access key the caller signed with, if known.
    #[must_use]
    pub fn access_key(&self) -> Option<&str> {
        self.access_key.as_deref()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user)
    }
}
