//! Managed relational database instances.

use splitstack_common::error::{Result, StackError};
use splitstack_common::types::LogicalId;

use super::Declared;
use super::secretsmanager;
use crate::template::{DeletionPolicy, Resource};
use crate::value::Value;

/// `AWS::RDS::DBInstance`
pub const DB_INSTANCE_TYPE: &str = "AWS::RDS::DBInstance";
/// `AWS::RDS::DBSubnetGroup`
pub const DB_SUBNET_GROUP_TYPE: &str = "AWS::RDS::DBSubnetGroup";

/// A single-instance database whose master credentials live in a generated
/// secret.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseInstance {
    /// Engine name, e.g. `mysql`.
    pub engine: String,
    /// Engine version, e.g. `8.0.32`.
    pub engine_version: String,
    /// Instance class, e.g. `db.t3.micro`.
    pub instance_class: String,
    /// Initial storage in GiB.
    pub allocated_storage: u32,
    /// Storage autoscaling ceiling in GiB.
    pub max_allocated_storage: u32,
    /// Name of the database created on the instance.
    pub database_name: String,
    /// Subnets of the subnet group.
    pub subnet_ids: Vec<Value>,
    /// Security groups attached to the instance.
    pub security_group_ids: Vec<Value>,
    /// Secret holding `username` and `password`.
    pub credentials_secret: LogicalId,
}

impl DatabaseInstance {
    /// A MySQL 8.0.32 `db.t3.micro` with 20 GiB storage growing to 100 GiB.
    #[must_use]
    pub fn mysql_micro(
        database_name: impl Into<String>,
        subnet_ids: Vec<Value>,
        security_group_ids: Vec<Value>,
        credentials_secret: LogicalId,
    ) -> Self {
        Self {
            engine: "mysql".into(),
            engine_version: "8.0.32".into(),
            instance_class: "db.t3.micro".into(),
            allocated_storage: 20,
            max_allocated_storage: 100,
            database_name: database_name.into(),
            subnet_ids,
            security_group_ids,
            credentials_secret,
        }
    }

    /// Expands into the subnet group, the instance, and the secret
    /// attachment.
    ///
    /// # Errors
    ///
    /// Returns an error if no subnets are given, storage bounds are
    /// inverted, or a derived logical ID is invalid.
    pub fn declare(&self, id: &LogicalId) -> Result<Declared> {
        if self.subnet_ids.is_empty() {
            return Err(StackError::Config {
                message: format!("database {id} needs at least one subnet"),
            });
        }
        if self.max_allocated_storage < self.allocated_storage {
            return Err(StackError::Config {
                message: format!(
                    "database {id}: max storage {} GiB is below allocated {} GiB",
                    self.max_allocated_storage, self.allocated_storage
                ),
            });
        }

        let subnet_group = id.child("SubnetGroup")?;
        let attachment = id.child("SecretAttachment")?;
        let secret = &self.credentials_secret;

        let group = Resource::new(DB_SUBNET_GROUP_TYPE)
            .with("DBSubnetGroupDescription", format!("Subnet group for {id} database"))
            .with("SubnetIds", self.subnet_ids.clone());

        let instance = Resource::new(DB_INSTANCE_TYPE)
            .with("AllocatedStorage", self.allocated_storage.to_string())
            .with("CopyTagsToSnapshot", true)
            .with("DBInstanceClass", self.instance_class.as_str())
            .with("DBName", self.database_name.as_str())
            .with("DBSubnetGroupName", Value::reference(&subnet_group))
            .with("Engine", self.engine.as_str())
            .with("EngineVersion", self.engine_version.as_str())
            .with(
                "MasterUsername",
                secretsmanager::dynamic_reference(secret, "username"),
            )
            .with(
                "MasterUserPassword",
                secretsmanager::dynamic_reference(secret, "password"),
            )
            .with("MaxAllocatedStorage", self.max_allocated_storage)
            .with("PubliclyAccessible", false)
            .with("StorageType", "gp2")
            .with("VPCSecurityGroups", self.security_group_ids.clone())
            .with_deletion_policy(DeletionPolicy::Snapshot);

        Ok(vec![
            (subnet_group, group),
            (id.clone(), instance),
            (
                attachment,
                secretsmanager::target_attachment(secret, id, "AWS::RDS::DBInstance"),
            ),
        ])
    }
}

/// Hostname of the instance endpoint.
#[must_use]
pub fn endpoint_address(id: &LogicalId) -> Value {
    Value::get_att(id, "Endpoint.Address")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db(subnets: Vec<Value>) -> DatabaseInstance {
        DatabaseInstance::mysql_micro(
            "MyDatabase",
            subnets,
            vec![Value::get_att(&LogicalId::new("RdsSG").expect("id"), "GroupId")],
            LogicalId::new("RdsSecret").expect("id"),
        )
    }

    #[test]
    fn declares_group_instance_and_attachment() {
        let id = LogicalId::new("RdsInstance").expect("id");
        let declared = db(vec![Value::from("subnet-a")]).declare(&id).expect("declare");
        let types: Vec<&str> = declared.iter().map(|(_, r)| r.resource_type.as_str()).collect();
        assert_eq!(
            types,
            vec![
                DB_SUBNET_GROUP_TYPE,
                DB_INSTANCE_TYPE,
                secretsmanager::TARGET_ATTACHMENT_TYPE
            ]
        );
        let instance = &declared[1].1;
        assert_eq!(instance.property("Engine"), Some(&Value::from("mysql")));
        assert_eq!(instance.property("EngineVersion"), Some(&Value::from("8.0.32")));
        assert_eq!(instance.property("DBInstanceClass"), Some(&Value::from("db.t3.micro")));
        assert_eq!(instance.property("AllocatedStorage"), Some(&Value::from("20")));
        assert_eq!(instance.property("MaxAllocatedStorage"), Some(&Value::Number(100)));
        assert_eq!(instance.deletion_policy, Some(DeletionPolicy::Snapshot));
    }

    #[test]
    fn credentials_are_never_literal() {
        let id = LogicalId::new("RdsInstance").expect("id");
        let declared = db(vec![Value::from("subnet-a")]).declare(&id).expect("declare");
        let instance = &declared[1].1;
        let user = instance.property("MasterUsername").expect("user");
        assert!(user.as_str().is_none());
        assert!(user.references().contains("RdsSecret"));
    }

    #[test]
    fn requires_subnets() {
        let id = LogicalId::new("RdsInstance").expect("id");
        assert!(db(Vec::new()).declare(&id).is_err());
    }

    #[test]
    fn endpoint_address_is_a_get_att() {
        let id = LogicalId::new("RdsInstance").expect("id");
        assert_eq!(
            endpoint_address(&id).to_json(),
            serde_json::json!({"Fn::GetAtt": ["RdsInstance", "Endpoint.Address"]})
        );
    }
}
