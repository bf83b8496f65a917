//! Template values and CloudFormation intrinsic functions.
//!
//! A [`Value`] is either a literal or an intrinsic that the provisioning
//! engine evaluates at deploy time. Values serialize to the exact JSON shape
//! CloudFormation expects (`{"Ref": ...}`, `{"Fn::GetAtt": [...]}`, ...).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Serialize, Serializer};
use serde_json::json;
use splitstack_common::types::{Environment, LogicalId};

/// Domain suffix used by the `AWS::URLSuffix` pseudo parameter in the
/// standard partition.
const DEFAULT_URL_SUFFIX: &str = "amazonaws.com";

/// Pseudo parameters provided by the engine in every template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pseudo {
    /// `AWS::AccountId`
    AccountId,
    /// `AWS::Region`
    Region,
    /// `AWS::URLSuffix`
    UrlSuffix,
    /// `AWS::Partition`
    Partition,
    /// `AWS::StackName`
    StackName,
}

impl Pseudo {
    /// The `AWS::*` name of the pseudo parameter.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AccountId => "AWS::AccountId",
            Self::Region => "AWS::Region",
            Self::UrlSuffix => "AWS::URLSuffix",
            Self::Partition => "AWS::Partition",
            Self::StackName => "AWS::StackName",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "AWS::AccountId" => Some(Self::AccountId),
            "AWS::Region" => Some(Self::Region),
            "AWS::URLSuffix" => Some(Self::UrlSuffix),
            "AWS::Partition" => Some(Self::Partition),
            "AWS::StackName" => Some(Self::StackName),
            _ => None,
        }
    }

    fn resolve(self, env: &Environment) -> Option<String> {
        match self {
            Self::AccountId => env.account.clone(),
            Self::Region => env.region.clone(),
            Self::UrlSuffix => Some(DEFAULT_URL_SUFFIX.to_string()),
            Self::Partition => Some("aws".to_string()),
            Self::StackName => None,
        }
    }
}

/// A property value inside a template.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// JSON `null`.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Integer literal.
    Number(i64),
    /// String literal.
    String(String),
    /// Ordered list.
    List(Vec<Value>),
    /// Key-value object with stable key order.
    Map(BTreeMap<String, Value>),
    /// `Ref` to a resource or parameter in the same template.
    Ref(LogicalId),
    /// `Ref` to a pseudo parameter.
    Pseudo(Pseudo),
    /// `Fn::GetAtt` of a resource attribute.
    GetAtt(LogicalId, String),
    /// `Fn::Join` with a separator.
    Join(String, Vec<Value>),
    /// `Fn::Sub` over a template string.
    Sub(String),
    /// `Fn::Select` of one element of a list.
    Select(u32, Box<Value>),
    /// `Fn::GetAZs` for the current region.
    GetAzs,
    /// `Fn::ImportValue` of another stack's export.
    ImportValue(String),
    /// `Fn::Base64` encoding.
    Base64(Box<Value>),
}

impl Value {
    /// Builds a `Ref` to a logical ID.
    #[must_use]
    pub fn reference(id: &LogicalId) -> Self {
        Self::Ref(id.clone())
    }

    /// Builds an `Fn::GetAtt` for a resource attribute.
    #[must_use]
    pub fn get_att(id: &LogicalId, attribute: impl Into<String>) -> Self {
        Self::GetAtt(id.clone(), attribute.into())
    }

    /// Builds an `Fn::Join` with the empty separator.
    #[must_use]
    pub fn concat(parts: Vec<Self>) -> Self {
        Self::Join(String::new(), parts)
    }

    /// Builds an object from key-value pairs.
    #[must_use]
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Self)>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Builds a list from anything convertible into values.
    #[must_use]
    pub fn list<T: Into<Self>>(items: impl IntoIterator<Item = T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Returns the literal string, if this value is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the field of a map value.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Returns every logical ID this value refers to in its own template.
    ///
    /// Pseudo parameters and imports from other stacks are not included.
    #[must_use]
    pub fn references(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::Ref(id) | Self::GetAtt(id, _) => {
                let _ = out.insert(id.to_string());
            }
            Self::Sub(template) => {
                for name in sub_placeholders(template) {
                    if Pseudo::from_name(name).is_none() {
                        let target = name.split('.').next().unwrap_or(name);
                        let _ = out.insert(target.to_string());
                    }
                }
            }
            Self::List(items) | Self::Join(_, items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            Self::Map(map) => {
                for item in map.values() {
                    item.collect_references(out);
                }
            }
            Self::Select(_, inner) | Self::Base64(inner) => inner.collect_references(out),
            Self::Null
            | Self::Bool(_)
            | Self::Number(_)
            | Self::String(_)
            | Self::Pseudo(_)
            | Self::GetAzs
            | Self::ImportValue(_) => {}
        }
    }

    /// Returns every export name imported by this value.
    #[must_use]
    pub fn imports(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_imports(&mut out);
        out
    }

    fn collect_imports(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::ImportValue(name) => {
                let _ = out.insert(name.clone());
            }
            Self::List(items) | Self::Join(_, items) => {
                items.iter().for_each(|i| i.collect_imports(out));
            }
            Self::Map(map) => map.values().for_each(|i| i.collect_imports(out)),
            Self::Select(_, inner) | Self::Base64(inner) => inner.collect_imports(out),
            _ => {}
        }
    }

    /// Best-effort rendering to a literal string, given what is known
    /// about the target environment.
    ///
    /// Returns `None` when any part depends on a deploy-time value.
    #[must_use]
    pub fn resolve(&self, env: &Environment) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Number(n) => Some(n.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Pseudo(p) => p.resolve(env),
            Self::Join(sep, parts) => {
                let rendered: Option<Vec<String>> = parts.iter().map(|p| p.resolve(env)).collect();
                rendered.map(|r| r.join(sep))
            }
            Self::Sub(template) => resolve_sub(template, env),
            _ => None,
        }
    }

    /// Converts the value into the CloudFormation JSON representation.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => json!(b),
            Self::Number(n) => json!(n),
            Self::String(s) => json!(s),
            Self::List(items) => items.iter().map(Self::to_json).collect(),
            Self::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Self::Ref(id) => json!({ "Ref": id.as_str() }),
            Self::Pseudo(p) => json!({ "Ref": p.name() }),
            Self::GetAtt(id, attr) => json!({ "Fn::GetAtt": [id.as_str(), attr] }),
            Self::Join(sep, parts) => {
                let parts: Vec<serde_json::Value> = parts.iter().map(Self::to_json).collect();
                json!({ "Fn::Join": [sep, parts] })
            }
            Self::Sub(template) => json!({ "Fn::Sub": template }),
            Self::Select(index, list) => json!({ "Fn::Select": [index, list.to_json()] }),
            Self::GetAzs => json!({ "Fn::GetAZs": "" }),
            Self::ImportValue(name) => json!({ "Fn::ImportValue": name }),
            Self::Base64(inner) => json!({ "Fn::Base64": inner.to_json() }),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<u16> for Value {
    fn from(value: u16) -> Self {
        Self::Number(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Number(i64::from(value))
    }
}

impl From<Vec<Self>> for Value {
    fn from(value: Vec<Self>) -> Self {
        Self::List(value)
    }
}

impl From<Pseudo> for Value {
    fn from(value: Pseudo) -> Self {
        Self::Pseudo(value)
    }
}

/// Yields the `${...}` placeholder names in an `Fn::Sub` template,
/// skipping `${!Literal}` escapes.
fn sub_placeholders(template: &str) -> impl Iterator<Item = &str> {
    template
        .split("${")
        .skip(1)
        .filter_map(|rest| rest.split_once('}').map(|(name, _)| name))
        .filter(|name| !name.starts_with('!'))
}

fn resolve_sub(template: &str, env: &Environment) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let (name, tail) = after.split_once('}')?;
        if let Some(literal) = name.strip_prefix('!') {
            out.push_str("${");
            out.push_str(literal);
            out.push('}');
        } else {
            out.push_str(&Pseudo::from_name(name)?.resolve(env)?);
        }
        rest = tail;
    }
    out.push_str(rest);
    Some(out)
}
