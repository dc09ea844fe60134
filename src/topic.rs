//! Topic names
//!
//! Topics are addressed as `domain://tenant/namespace/local`. A bare local
//! name expands to the default tenant and namespace, so `orders` and
//! `persistent://public/default/orders` refer to the same topic.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SchemaError};

pub const DEFAULT_TENANT: &str = "public";
pub const DEFAULT_NAMESPACE: &str = "default";

/// Persistence domain of a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TopicDomain {
    Persistent,
    NonPersistent,
}

impl TopicDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicDomain::Persistent => "persistent",
            TopicDomain::NonPersistent => "non-persistent",
        }
    }
}

/// A fully qualified topic name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TopicName {
    full: String,
    domain_len: usize,
    tenant_end: usize,
    namespace_end: usize,
}

impl TopicName {
    /// Parse a short or fully qualified topic name
    pub fn parse(name: &str) -> Result<Self> {
        let name = name.trim();
        let (domain, rest) = match name.split_once("://") {
            Some(("persistent", rest)) => (TopicDomain::Persistent, rest),
            Some(("non-persistent", rest)) => (TopicDomain::NonPersistent, rest),
            Some((other, _)) => {
                return Err(SchemaError::InvalidTopic(format!(
                    "unknown domain '{}' in '{}'",
                    other, name
                )))
            }
            None => (TopicDomain::Persistent, name),
        };

        let parts: Vec<&str> = rest.split('/').collect();
        let (tenant, namespace, local) = match parts.as_slice() {
            [local] if !name.contains("://") => (DEFAULT_TENANT, DEFAULT_NAMESPACE, *local),
            [tenant, namespace, local] => (*tenant, *namespace, *local),
            _ => {
                return Err(SchemaError::InvalidTopic(format!(
                    "expected tenant/namespace/topic in '{}'",
                    name
                )))
            }
        };

        for part in [tenant, namespace, local] {
            if part.is_empty() || part.chars().any(|c| c.is_whitespace() || c == ':') {
                return Err(SchemaError::InvalidTopic(format!(
                    "empty or malformed segment in '{}'",
                    name
                )));
            }
        }

        Ok(Self::from_parts(domain, tenant, namespace, local))
    }

    fn from_parts(domain: TopicDomain, tenant: &str, namespace: &str, local: &str) -> Self {
        let domain_len = domain.as_str().len();
        let full = format!("{}://{}/{}/{}", domain.as_str(), tenant, namespace, local);
        let tenant_end = domain_len + 3 + tenant.len();
        let namespace_end = tenant_end + 1 + namespace.len();
        Self {
            full,
            domain_len,
            tenant_end,
            namespace_end,
        }
    }

    /// The canonical fully qualified name
    pub fn as_str(&self) -> &str {
        &self.full
    }

    pub fn domain(&self) -> TopicDomain {
        if &self.full[..self.domain_len] == "persistent" {
            TopicDomain::Persistent
        } else {
            TopicDomain::NonPersistent
        }
    }

    pub fn tenant(&self) -> &str {
        &self.full[self.domain_len + 3..self.tenant_end]
    }

    /// `tenant/namespace`, the key namespace policies are stored under
    pub fn namespace(&self) -> &str {
        &self.full[self.domain_len + 3..self.namespace_end]
    }

    pub fn local_name(&self) -> &str {
        &self.full[self.namespace_end + 1..]
    }
}

impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

impl FromStr for TopicName {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TopicName {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<TopicName> for String {
    fn from(topic: TopicName) -> Self {
        topic.full
    }
}

/// Normalize a `tenant/namespace` key
pub fn parse_namespace(namespace: &str) -> Result<String> {
    match namespace.trim().split('/').collect::<Vec<_>>().as_slice() {
        [tenant, ns] if !tenant.is_empty() && !ns.is_empty() => Ok(format!("{}/{}", tenant, ns)),
        _ => Err(SchemaError::InvalidTopic(format!(
            "expected tenant/namespace, got '{}'",
            namespace
        ))),
    }
}
