//! Domain primitive types used across the splitstack workspace.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StackError};

/// Maximum length CloudFormation accepts for a logical ID.
const MAX_LOGICAL_ID_LEN: usize = 255;

/// Logical identifier of a resource, parameter, or output inside a template.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalId(String);

impl LogicalId {
    /// Creates a logical ID, enforcing the CloudFormation naming rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is empty, longer than 255 characters,
    /// or contains anything other than ASCII letters and digits.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty()
            || id.len() > MAX_LOGICAL_ID_LEN
            || !id.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(StackError::Config {
                message: format!("invalid logical ID: \"{id}\""),
            });
        }
        Ok(Self(id))
    }

    /// Builds a child ID by appending an alphanumeric suffix.
    ///
    /// # Errors
    ///
    /// Returns an error if the combined ID is not a valid logical ID.
    pub fn child(&self, suffix: &str) -> Result<Self> {
        Self::new(format!("{}{suffix}", self.0))
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for LogicalId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for LogicalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The three subnet tiers of the virtual network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SubnetTier {
    /// Routed to the internet gateway; hosts the load balancer and NAT.
    Public,
    /// Outbound internet through NAT; hosts the orchestrated service.
    PrivateWithEgress,
    /// No route outside the network; hosts the database.
    PrivateIsolated,
}

impl SubnetTier {
    /// All tiers in allocation order.
    pub const ALL: [Self; 3] = [Self::Public, Self::PrivateWithEgress, Self::PrivateIsolated];

    /// Subnet group name used in logical IDs and tags.
    #[must_use]
    pub const fn group_name(self) -> &'static str {
        match self {
            Self::Public => "Public",
            Self::PrivateWithEgress => "Private",
            Self::PrivateIsolated => "Isolated",
        }
    }

    /// Value of the `aws-cdk:subnet-type` tag.
    #[must_use]
    pub const fn type_tag(self) -> &'static str {
        match self {
            Self::Public => "Public",
            Self::PrivateWithEgress => "Private",
            Self::PrivateIsolated => "Isolated",
        }
    }

    /// Whether instances launched in this tier receive a public IP.
    #[must_use]
    pub const fn maps_public_ip(self) -> bool {
        matches!(self, Self::Public)
    }
}

impl fmt::Display for SubnetTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::PrivateWithEgress => write!(f, "private-with-egress"),
            Self::PrivateIsolated => write!(f, "private-isolated"),
        }
    }
}

/// Target account and region of a deployment, when known at synth time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// AWS account ID.
    pub account: Option<String>,
    /// AWS region name.
    pub region: Option<String>,
}

impl Environment {
    /// Renders the environment as the `aws://account/region` URI used in
    /// assembly manifests, substituting `unknown-*` for missing parts.
    #[must_use]
    pub fn uri(&self) -> String {
        format!(
            "aws://{}/{}",
            self.account.as_deref().unwrap_or("unknown-account"),
            self.region.as_deref().unwrap_or("unknown-region"),
        )
    }
}
