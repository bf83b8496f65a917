//! IAM roles, inline policies, and instance profiles.

use splitstack_common::error::Result;
use splitstack_common::types::LogicalId;

use super::Declared;
use crate::template::Resource;
use crate::value::Value;

/// `AWS::IAM::Role`
pub const ROLE_TYPE: &str = "AWS::IAM::Role";
/// `AWS::IAM::Policy`
pub const POLICY_TYPE: &str = "AWS::IAM::Policy";
/// `AWS::IAM::InstanceProfile`
pub const INSTANCE_PROFILE_TYPE: &str = "AWS::IAM::InstanceProfile";

const POLICY_VERSION: &str = "2012-10-17";

/// One `Allow` statement of a policy document.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyStatement {
    /// Permitted actions, e.g. `ecr:BatchGetImage`.
    pub actions: Vec<String>,
    /// Resources the actions apply to; `*` is a literal wildcard.
    pub resources: Vec<Value>,
}

impl PolicyStatement {
    /// Creates a statement granting `actions` on `resources`.
    #[must_use]
    pub fn allow<A: Into<String>>(actions: impl IntoIterator<Item = A>, resources: Vec<Value>) -> Self {
        Self {
            actions: actions.into_iter().map(Into::into).collect(),
            resources,
        }
    }

    fn to_value(&self) -> Value {
        let action = match self.actions.as_slice() {
            [single] => Value::from(single.as_str()),
            many => Value::list(many.iter().map(String::as_str)),
        };
        let resource = match self.resources.as_slice() {
            [single] => single.clone(),
            many => Value::List(many.to_vec()),
        };
        Value::object([
            ("Action", action),
            ("Effect", Value::from("Allow")),
            ("Resource", resource),
        ])
    }
}

/// Renders a policy document from statements.
#[must_use]
pub fn policy_document(statements: &[PolicyStatement]) -> Value {
    Value::object([
        (
            "Statement",
            Value::List(statements.iter().map(PolicyStatement::to_value).collect()),
        ),
        ("Version", Value::from(POLICY_VERSION)),
    ])
}

/// A role assumable by an AWS service, with an optional inline policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    /// Service principal allowed to assume the role.
    pub assumed_by: String,
    /// Statements attached through a `<Role>DefaultPolicy` resource.
    pub statements: Vec<PolicyStatement>,
    /// Managed policy ARNs attached to the role.
    pub managed_policy_arns: Vec<Value>,
}

impl Role {
    /// Creates a role trusted by the given service principal.
    #[must_use]
    pub fn for_service(principal: impl Into<String>) -> Self {
        Self {
            assumed_by: principal.into(),
            statements: Vec::new(),
            managed_policy_arns: Vec::new(),
        }
    }

    /// Appends a statement to the role's default policy.
    pub fn add_to_policy(&mut self, statement: PolicyStatement) {
        self.statements.push(statement);
    }

    /// Logical ID of the default policy declared for role `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the derived ID is invalid.
    pub fn default_policy_id(id: &LogicalId) -> Result<LogicalId> {
        id.child("DefaultPolicy")
    }

    /// Expands into the role and, when it carries statements, its default
    /// policy (`<id>DefaultPolicy`).
    ///
    /// # Errors
    ///
    /// Returns an error if a derived logical ID is invalid.
    pub fn declare(&self, id: &LogicalId) -> Result<Declared> {
        let trust = Value::object([
            (
                "Statement",
                Value::List(vec![Value::object([
                    ("Action", Value::from("sts:AssumeRole")),
                    ("Effect", Value::from("Allow")),
                    (
                        "Principal",
                        Value::object([("Service", Value::from(self.assumed_by.as_str()))]),
                    ),
                ])]),
            ),
            ("Version", Value::from(POLICY_VERSION)),
        ]);

        let mut role = Resource::new(ROLE_TYPE).with("AssumeRolePolicyDocument", trust);
        if !self.managed_policy_arns.is_empty() {
            role = role.with("ManagedPolicyArns", self.managed_policy_arns.clone());
        }
        let mut out = vec![(id.clone(), role)];

        if !self.statements.is_empty() {
            let policy_id = Self::default_policy_id(id)?;
            let policy = Resource::new(POLICY_TYPE)
                .with("PolicyDocument", policy_document(&self.statements))
                .with("PolicyName", policy_id.as_str())
                .with("Roles", vec![Value::reference(id)]);
            out.push((policy_id, policy));
        }
        Ok(out)
    }
}

/// Instance profile wrapping a single role.
#[must_use]
pub fn instance_profile(role: &LogicalId) -> Resource {
    Resource::new(INSTANCE_PROFILE_TYPE).with("Roles", vec![Value::reference(role)])
}

/// ARN of an AWS-managed policy, partition-aware.
#[must_use]
pub fn managed_policy_arn(name: &str) -> Value {
    Value::concat(vec![
        "arn:".into(),
        Value::Pseudo(crate::value::Pseudo::Partition),
        format!(":iam::aws:policy/{name}").into(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_without_statements_has_no_policy() {
        let role = Role::for_service("ec2.amazonaws.com");
        let id = LogicalId::new("NatRole").expect("id");
        let declared = role.declare(&id).expect("declare");
        assert_eq!(declared.len(), 1);
        assert_eq!(declared[0].1.resource_type, ROLE_TYPE);
    }

    #[test]
    fn statements_land_in_default_policy() {
        let mut role = Role::for_service("ecs-tasks.amazonaws.com");
        role.add_to_policy(PolicyStatement::allow(
            ["ecr:BatchGetImage", "ecr:GetAuthorizationToken"],
            vec![Value::from("*")],
        ));
        let id = LogicalId::new("TaskExecutionRole").expect("id");
        let declared = role.declare(&id).expect("declare");
        assert_eq!(declared.len(), 2);

        let (policy_id, policy) = &declared[1];
        assert_eq!(policy_id.as_str(), "TaskExecutionRoleDefaultPolicy");
        let doc = policy.property("PolicyDocument").expect("doc").to_json();
        assert_eq!(doc["Statement"][0]["Resource"], "*");
        assert_eq!(doc["Statement"][0]["Action"][1], "ecr:GetAuthorizationToken");

        let trust = declared[0].1.property("AssumeRolePolicyDocument").expect("trust").to_json();
        assert_eq!(
            trust["Statement"][0]["Principal"]["Service"],
            "ecs-tasks.amazonaws.com"
        );
    }
}
