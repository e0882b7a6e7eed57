//! Manifest document types and parsing

use crate::error::ManifestError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shellmesh_authz::{authorize, RoleSet};
use std::collections::BTreeMap;

/// One remote module entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescriptor {
    /// Logical name (the manifest key)
    #[serde(default, skip_serializing)]
    pub name: String,

    /// Location of the remote entry artifact
    pub url: String,

    /// Semantic version of the deployed remote
    #[serde(default)]
    pub version: String,

    /// User must hold at least one of these (empty = open to all)
    #[serde(default)]
    pub required_roles: Vec<String>,

    #[serde(default)]
    pub display_name: String,

    #[serde(default)]
    pub icon: String,

    #[serde(default)]
    pub description: String,
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            version: String::new(),
            required_roles: Vec::new(),
            display_name: String::new(),
            icon: String::new(),
            description: String::new(),
        }
    }

    pub fn with_required_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Whether a user holding `roles` may open this module
    pub fn is_visible_to(&self, roles: &RoleSet) -> bool {
        authorize(self.required_roles.as_slice(), roles).is_granted()
    }
}

/// Registry document describing every known remote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub version: String,
    pub remotes: BTreeMap<String, ModuleDescriptor>,
}

impl Manifest {
    /// Parse a manifest document
    ///
    /// # Errors
    ///
    /// [`ManifestError::Malformed`] when the body is not a JSON object, when
    /// `version` is present but not a string, when `remotes` is missing or
    /// not an object, or when an entry is not an object with a non-empty
    /// string `url`.
    pub fn parse(body: &[u8]) -> Result<Self, ManifestError> {
        let document: Value = serde_json::from_slice(body)
            .map_err(|e| ManifestError::Malformed(format!("invalid JSON: {}", e)))?;

        let Value::Object(mut root) = document else {
            return Err(ManifestError::Malformed(
                "document is not an object".to_string(),
            ));
        };

        let version = match root.get("version") {
            None => String::new(),
            Some(Value::String(version)) => version.clone(),
            Some(_) => {
                return Err(ManifestError::Malformed(
                    "'version' is not a string".to_string(),
                ))
            }
        };

        let remotes = match root.remove("remotes") {
            Some(Value::Object(remotes)) => remotes,
            Some(_) => {
                return Err(ManifestError::Malformed(
                    "'remotes' is not an object".to_string(),
                ))
            }
            None => {
                return Err(ManifestError::Malformed(
                    "missing 'remotes' field".to_string(),
                ))
            }
        };

        let mut parsed = BTreeMap::new();
        for (name, entry) in remotes {
            if !entry.is_object() {
                return Err(ManifestError::Malformed(format!(
                    "remote '{}' is not an object",
                    name
                )));
            }

            let mut descriptor: ModuleDescriptor = serde_json::from_value(entry)
                .map_err(|e| ManifestError::Malformed(format!("remote '{}': {}", name, e)))?;

            if descriptor.url.trim().is_empty() {
                return Err(ManifestError::Malformed(format!(
                    "remote '{}' has an empty url",
                    name
                )));
            }

            descriptor.name = name.clone();
            parsed.insert(name, descriptor);
        }

        Ok(Self {
            version,
            remotes: parsed,
        })
    }

    pub fn get(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.remotes.get(name)
    }

    pub fn len(&self) -> usize {
        self.remotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remotes.is_empty()
    }

    /// Descriptors a user holding `roles` may open, ordered by name
    pub fn visible_to<'a>(&'a self, roles: &'a RoleSet) -> impl Iterator<Item = &'a ModuleDescriptor> + 'a {
        self.remotes.values().filter(move |d| d.is_visible_to(roles))
    }
}
