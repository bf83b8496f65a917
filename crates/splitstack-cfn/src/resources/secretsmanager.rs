//! Generated secrets and references into them.
//!
//! The secret value is generated by the engine at deploy time; templates only
//! carry the generation recipe and references to individual JSON fields.

use serde_json::json;
use splitstack_common::error::Result;
use splitstack_common::types::LogicalId;

use crate::template::{DeletionPolicy, Resource};
use crate::value::Value;

/// `AWS::SecretsManager::Secret`
pub const SECRET_TYPE: &str = "AWS::SecretsManager::Secret";
/// `AWS::SecretsManager::SecretTargetAttachment`
pub const TARGET_ATTACHMENT_TYPE: &str = "AWS::SecretsManager::SecretTargetAttachment";

/// A JSON secret with fixed fields and one generated field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSecret {
    /// Fixed fields of the secret, e.g. `username`.
    pub template_fields: Vec<(String, String)>,
    /// Field whose value the engine generates.
    pub generate_key: String,
    /// Characters the generated value must not contain.
    pub exclude_characters: String,
}

impl GeneratedSecret {
    /// A `{username, password}` credential with a generated password.
    #[must_use]
    pub fn credentials(username: &str, exclude_characters: &str) -> Self {
        Self {
            template_fields: vec![("username".into(), username.into())],
            generate_key: "password".into(),
            exclude_characters: exclude_characters.into(),
        }
    }

    /// JSON text of the fixed fields, as passed to the generator.
    ///
    /// # Errors
    ///
    /// Returns an error if the fields cannot be serialized.
    pub fn secret_string_template(&self) -> Result<String> {
        let object: serde_json::Map<String, serde_json::Value> = self
            .template_fields
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();
        Ok(serde_json::to_string(&object)?)
    }

    /// Renders the secret resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the template fields cannot be serialized.
    pub fn to_resource(&self) -> Result<Resource> {
        let generate = Value::object([
            ("ExcludeCharacters", Value::from(self.exclude_characters.as_str())),
            ("GenerateStringKey", Value::from(self.generate_key.as_str())),
            ("SecretStringTemplate", Value::from(self.secret_string_template()?)),
        ]);
        Ok(Resource::new(SECRET_TYPE)
            .with("GenerateSecretString", generate)
            .with_deletion_policy(DeletionPolicy::Delete))
    }
}

/// Dynamic reference resolved by the engine into one field of the secret,
/// for properties that accept `{{resolve:...}}` strings.
#[must_use]
pub fn dynamic_reference(secret: &LogicalId, field: &str) -> Value {
    Value::concat(vec![
        "{{resolve:secretsmanager:".into(),
        Value::reference(secret),
        format!(":SecretString:{field}::}}}}").into(),
    ])
}

/// `valueFrom` reference to one JSON field of the secret, as consumed by
/// container secret injection.
#[must_use]
pub fn field_reference(secret: &LogicalId, field: &str) -> Value {
    Value::concat(vec![Value::reference(secret), format!(":{field}::").into()])
}

/// Attaches a secret to the database it holds credentials for, so the
/// engine adds connection details to the secret.
#[must_use]
pub fn target_attachment(secret: &LogicalId, target: &LogicalId, target_type: &str) -> Resource {
    Resource::new(TARGET_ATTACHMENT_TYPE)
        .with("SecretId", Value::reference(secret))
        .with("TargetId", Value::reference(target))
        .with("TargetType", target_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_template_holds_fixed_username() {
        let secret = GeneratedSecret::credentials("admin", "/@\"'\\");
        assert_eq!(
            secret.secret_string_template().expect("json"),
            r#"{"username":"admin"}"#
        );
        let resource = secret.to_resource().expect("resource");
        let r = serde_json::to_value(&resource.properties).expect("json");
        assert_eq!(r["GenerateSecretString"]["GenerateStringKey"], "password");
        assert_eq!(r["GenerateSecretString"]["ExcludeCharacters"], "/@\"'\\");
    }

    #[test]
    fn dynamic_reference_closes_braces() {
        let id = LogicalId::new("RdsSecret").expect("id");
        let v = dynamic_reference(&id, "password").to_json();
        assert_eq!(v["Fn::Join"][1][2], ":SecretString:password::}}");
    }

    #[test]
    fn field_reference_targets_json_key() {
        let id = LogicalId::new("RdsSecret").expect("id");
        let v = field_reference(&id, "username").to_json();
        assert_eq!(v["Fn::Join"][1][0]["Ref"], "RdsSecret");
        assert_eq!(v["Fn::Join"][1][1], ":username::");
    }
}
