//! Access classification
//!
//! Every operation the gateway dispatches to carries exactly one [`AccessRequirement`]. The
//! requirements are declared centrally in an [`AccessRegistry`] at startup:
//!
//! ```
//! use s3s_gate::access::{AccessRegistry, AccessRequirement};
//!
//! let registry = AccessRegistry::builder()
//!     .declare("Health", AccessRequirement::Public)
//!     .declare("GetObject", AccessRequirement::S3)
//!     .declare("AssumeRole", AccessRequirement::STS)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(registry.requirement_of("GetObject"), Some(AccessRequirement::S3));
//! ```
//!
//! [`GateServiceBuilder::build`](crate::service::GateServiceBuilder::build) checks that every
//! registered operation has a declaration and refuses to start otherwise.

use crate::error::ConfigError;

use std::collections::BTreeMap;
use std::fmt;

/// The AWS service a SigV4 signature is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceKind {
    S3,
    Sts,
    Logs,
}

impl ServiceKind {
    /// The service name used in the SigV4 credential scope.
    #[must_use]
    pub const fn signing_name(self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::Sts => "sts",
            Self::Logs => "logs",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.signing_name())
    }
}

/// How a caller must authenticate before an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessRequirement {
    /// No authentication, no policy evaluation.
    Public,
    /// A SigV4 signature scoped to the given service.
    SigV4(ServiceKind),
}

impl AccessRequirement {
    pub const S3: Self = Self::SigV4(ServiceKind::S3);
    pub const STS: Self = Self::SigV4(ServiceKind::Sts);
    pub const LOGS: Self = Self::SigV4(ServiceKind::Logs);

    #[must_use]
    pub const fn is_public(self) -> bool {
        matches!(self, Self::Public)
    }

    #[must_use]
    pub const fn signing_service(self) -> Option<ServiceKind> {
        match self {
            Self::Public => None,
            Self::SigV4(service) => Some(service),
        }
    }
}

/// Immutable mapping from operation name to access requirement.
#[derive(Debug, Clone, Default)]
pub struct AccessRegistry {
    entries: BTreeMap<&'static str, AccessRequirement>,
}

impl AccessRegistry {
    #[must_use]
    pub fn builder() -> AccessRegistryBuilder {
        AccessRegistryBuilder::default()
    }

    #[must_use]
    pub fn requirement_of(&self, op: &str) -> Option<AccessRequirement> {
        self.entries.get(op).copied()
    }

    /// Returns the declared requirement or the startup error for an undeclared operation.
    ///
    /// # Errors
    /// Returns [`ConfigError::UnclassifiedOperation`] if `op` has no declaration.
    pub fn require(&self, op: &'static str) -> Result<AccessRequirement, ConfigError> {
        self.requirement_of(op).ok_or(ConfigError::UnclassifiedOperation(op))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, AccessRequirement)> + '_ {
        self.entries.iter().map(|(op, req)| (*op, *req))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builder for [`AccessRegistry`].
#[derive(Debug, Default)]
pub struct AccessRegistryBuilder {
    entries: BTreeMap<&'static str, AccessRequirement>,
    duplicate: Option<&'static str>,
}

impl AccessRegistryBuilder {
    #[must_use]
    pub fn declare(mut self, op: &'static str, requirement: AccessRequirement) -> Self {
        if self.entries.insert(op, requirement).is_some() && self.duplicate.is_none() {
            self.duplicate = Some(op);
        }
        self
    }

    /// # Errors
    /// Returns [`ConfigError::DuplicateDeclaration`] if an operation was declared twice.
    pub fn build(self) -> Result<AccessRegistry, ConfigError> {
        if let Some(op) = self.duplicate {
            return Err(ConfigError::DuplicateDeclaration(op));
        }
        Ok(AccessRegistry { entries: self.entries })
    }
}
