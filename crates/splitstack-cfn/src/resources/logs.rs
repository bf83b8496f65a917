//! Log groups.

use crate::template::{DeletionPolicy, Resource};

/// `AWS::Logs::LogGroup`
pub const LOG_GROUP_TYPE: &str = "AWS::Logs::LogGroup";

/// A log group that is removed together with its stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogGroup {
    /// Days log events are kept.
    pub retention_days: u32,
}

impl LogGroup {
    /// One-week retention.
    #[must_use]
    pub const fn one_week() -> Self {
        Self { retention_days: 7 }
    }

    /// Renders the log group.
    #[must_use]
    pub fn to_resource(self) -> Resource {
        Resource::new(LOG_GROUP_TYPE)
            .with("RetentionInDays", self.retention_days)
            .with_deletion_policy(DeletionPolicy::Delete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn one_week_group_is_destroyed_on_teardown() {
        let r = LogGroup::one_week().to_resource();
        assert_eq!(r.property("RetentionInDays"), Some(&Value::Number(7)));
        assert_eq!(r.deletion_policy, Some(DeletionPolicy::Delete));
    }
}
