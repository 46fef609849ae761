//! Tenant domain model.
//!
//! A tenant is the pair (project, namespace). Every resource and backup
//! is scoped to exactly one tenant.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{OptimusError, OptimusResult};

pub const ENTITY_TENANT: &str = "tenant";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectName(String);

impl ProjectName {
    pub fn new(name: impl Into<String>) -> OptimusResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(OptimusError::invalid_argument(
                ENTITY_TENANT,
                "project name is empty",
            ));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceName(String);

impl NamespaceName {
    pub fn new(name: impl Into<String>) -> OptimusResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(OptimusError::invalid_argument(
                ENTITY_TENANT,
                "namespace name is empty",
            ));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NamespaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The (project, namespace) scope of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tenant {
    project_name: ProjectName,
    namespace_name: NamespaceName,
}

impl Tenant {
    /// Builds a tenant from raw names. The project is checked first, so a
    /// request missing both reports the empty project.
    pub fn new(project_name: &str, namespace_name: &str) -> OptimusResult<Self> {
        let project_name = ProjectName::new(project_name)?;
        let namespace_name = NamespaceName::new(namespace_name)?;
        Ok(Self {
            project_name,
            namespace_name,
        })
    }

    pub fn project_name(&self) -> &ProjectName {
        &self.project_name
    }

    pub fn namespace_name(&self) -> &NamespaceName {
        &self.namespace_name
    }

    /// Same project, different namespace.
    pub fn with_namespace(&self, namespace_name: NamespaceName) -> Self {
        Self {
            project_name: self.project_name.clone(),
            namespace_name,
        }
    }
}

impl fmt::Display for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project_name, self.namespace_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_project_is_rejected() {
        let err = Tenant::new("", "ns").unwrap_err();
        assert!(err.to_string().contains("project name is empty"));
    }

    #[test]
    fn empty_namespace_is_rejected() {
        let err = Tenant::new("proj", " ").unwrap_err();
        assert!(err.to_string().contains("namespace name is empty"));
    }

    #[test]
    fn display_joins_project_and_namespace() {
        let tnnt = Tenant::new("proj", "ns").unwrap();
        assert_eq!(tnnt.to_string(), "proj/ns");
        let moved = tnnt.with_namespace(NamespaceName::new("other").unwrap());
        assert_eq!(moved.project_name().as_str(), "proj");
        assert_eq!(moved.namespace_name().as_str(), "other");
    }
}
