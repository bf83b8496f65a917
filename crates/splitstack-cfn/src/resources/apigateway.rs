//! REST API acting as an HTTP reverse proxy.

use splitstack_common::error::Result;
use splitstack_common::types::LogicalId;

use super::Declared;
use crate::template::Resource;
use crate::value::{Pseudo, Value};

/// `AWS::ApiGateway::RestApi`
pub const REST_API_TYPE: &str = "AWS::ApiGateway::RestApi";
/// `AWS::ApiGateway::Resource`
pub const RESOURCE_TYPE: &str = "AWS::ApiGateway::Resource";
/// `AWS::ApiGateway::Method`
pub const METHOD_TYPE: &str = "AWS::ApiGateway::Method";
/// `AWS::ApiGateway::Deployment`
pub const DEPLOYMENT_TYPE: &str = "AWS::ApiGateway::Deployment";
/// `AWS::ApiGateway::Stage`
pub const STAGE_TYPE: &str = "AWS::ApiGateway::Stage";

/// Path part that matches every sub-path of the root.
pub const GREEDY_PATH: &str = "{proxy+}";

/// A REST API that proxies every method on every path to one HTTP
/// endpoint: an `ANY` method on the root and another on a greedy
/// `{proxy+}` resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyRestApi {
    /// API name.
    pub name: String,
    /// API description.
    pub description: String,
    /// Backend base URI. Sub-paths are appended as `/{proxy}`.
    pub integration_uri: Value,
    /// Name of the deployed stage.
    pub stage_name: String,
}

impl ProxyRestApi {
    /// Logical ID of the root method.
    ///
    /// # Errors
    ///
    /// Returns an error if the derived ID is invalid.
    pub fn method_id(api: &LogicalId) -> Result<LogicalId> {
        api.child("ANY")
    }

    /// Logical ID of the greedy path resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the derived ID is invalid.
    pub fn proxy_resource_id(api: &LogicalId) -> Result<LogicalId> {
        api.child("proxy")
    }

    /// Logical ID of the method on the greedy path resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the derived ID is invalid.
    pub fn proxy_method_id(api: &LogicalId) -> Result<LogicalId> {
        Self::proxy_resource_id(api)?.child("ANY")
    }

    /// Logical ID of the deployed stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the derived ID is invalid.
    pub fn stage_id(&self, api: &LogicalId) -> Result<LogicalId> {
        api.child(&format!("DeploymentStage{}", self.stage_name))
    }

    /// Expands into the API, the root and greedy-path methods, a deployment,
    /// and the stage.
    ///
    /// # Errors
    ///
    /// Returns an error if a derived logical ID is invalid.
    pub fn declare(&self, id: &LogicalId) -> Result<Declared> {
        let method_id = Self::method_id(id)?;
        let proxy_id = Self::proxy_resource_id(id)?;
        let proxy_method_id = Self::proxy_method_id(id)?;
        let deployment_id = id.child("Deployment")?;
        let stage_id = self.stage_id(id)?;

        let api = Resource::new(REST_API_TYPE)
            .with("Description", self.description.as_str())
            .with("Name", self.name.as_str());

        let method = any_method(id, Value::get_att(id, "RootResourceId"))
            .with("Integration", http_proxy(self.integration_uri.clone(), None));

        let proxy = Resource::new(RESOURCE_TYPE)
            .with("ParentId", Value::get_att(id, "RootResourceId"))
            .with("PathPart", GREEDY_PATH)
            .with("RestApiId", Value::reference(id));

        let proxy_uri = Value::concat(vec![self.integration_uri.clone(), "/{proxy}".into()]);
        let proxy_method = any_method(id, Value::reference(&proxy_id))
            .with(
                "RequestParameters",
                Value::object([("method.request.path.proxy", Value::from(true))]),
            )
            .with(
                "Integration",
                http_proxy(
                    proxy_uri,
                    Some(("integration.request.path.proxy", "method.request.path.proxy")),
                ),
            );

        let deployment = Resource::new(DEPLOYMENT_TYPE)
            .with("Description", "Automatically created by the RestApi construct")
            .with("RestApiId", Value::reference(id))
            .depends_on(&method_id)
            .depends_on(&proxy_id)
            .depends_on(&proxy_method_id);

        let stage = Resource::new(STAGE_TYPE)
            .with("DeploymentId", Value::reference(&deployment_id))
            .with("RestApiId", Value::reference(id))
            .with("StageName", self.stage_name.as_str());

        Ok(vec![
            (id.clone(), api),
            (method_id, method),
            (proxy_id, proxy),
            (proxy_method_id, proxy_method),
            (deployment_id, deployment),
            (stage_id, stage),
        ])
    }

    /// Invoke URL of the deployed stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage ID is invalid.
    pub fn url(&self, id: &LogicalId) -> Result<Value> {
        Ok(Value::concat(vec![
            "https://".into(),
            Value::reference(id),
            ".execute-api.".into(),
            Value::Pseudo(Pseudo::Region),
            ".".into(),
            Value::Pseudo(Pseudo::UrlSuffix),
            "/".into(),
            Value::reference(&self.stage_id(id)?),
            "/".into(),
        ]))
    }
}

fn any_method(api: &LogicalId, resource: Value) -> Resource {
    Resource::new(METHOD_TYPE)
        .with("AuthorizationType", "NONE")
        .with("HttpMethod", "ANY")
        .with("ResourceId", resource)
        .with("RestApiId", Value::reference(api))
}

fn http_proxy(uri: Value, path_mapping: Option<(&str, &str)>) -> Value {
    let mut integration = vec![
        ("IntegrationHttpMethod", Value::from("ANY")),
        ("Type", Value::from("HTTP_PROXY")),
        ("Uri", uri),
    ];
    if let Some((target, source)) = path_mapping {
        integration.push((
            "RequestParameters",
            Value::object([(target, Value::from(source))]),
        ));
    }
    Value::object(integration)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> ProxyRestApi {
        ProxyRestApi {
            name: "Service API".into(),
            description: "API Gateway on top of ALB".into(),
            integration_uri: Value::from("http://example.com"),
            stage_name: "prod".into(),
        }
    }

    fn declared() -> Declared {
        let id = LogicalId::new("ApiGateway").expect("id");
        api().declare(&id).expect("declare")
    }

    fn find<'a>(declared: &'a Declared, id: &str) -> &'a Resource {
        declared
            .iter()
            .find(|(i, _)| i.as_str() == id)
            .map(|(_, r)| r)
            .unwrap_or_else(|| panic!("{id} not declared"))
    }

    #[test]
    fn root_any_method_is_http_proxy() {
        let declared = declared();
        assert_eq!(declared.len(), 6);
        let method = find(&declared, "ApiGatewayANY");
        let integration = method.property("Integration").expect("integration");
        assert_eq!(integration.field("Type"), Some(&Value::from("HTTP_PROXY")));
        assert_eq!(
            integration.field("IntegrationHttpMethod"),
            Some(&Value::from("ANY"))
        );
        assert_eq!(method.property("HttpMethod"), Some(&Value::from("ANY")));
    }

    #[test]
    fn sub_paths_are_forwarded_through_greedy_resource() {
        let declared = declared();
        let proxy = find(&declared, "ApiGatewayproxy");
        assert_eq!(proxy.resource_type, RESOURCE_TYPE);
        assert_eq!(proxy.property("PathPart"), Some(&Value::from("{proxy+}")));

        let method = find(&declared, "ApiGatewayproxyANY");
        assert_eq!(method.property("HttpMethod"), Some(&Value::from("ANY")));
        assert_eq!(
            method.property("ResourceId"),
            Some(&Value::reference(&LogicalId::new("ApiGatewayproxy").expect("id")))
        );
        assert_eq!(
            method
                .property("RequestParameters")
                .and_then(|p| p.field("method.request.path.proxy")),
            Some(&Value::from(true))
        );

        let integration = method.property("Integration").expect("integration");
        assert_eq!(integration.field("Type"), Some(&Value::from("HTTP_PROXY")));
        let uri = integration.field("Uri").expect("uri").to_json();
        assert_eq!(uri["Fn::Join"][1][0], "http://example.com");
        assert_eq!(uri["Fn::Join"][1][1], "/{proxy}");
        assert_eq!(
            integration
                .field("RequestParameters")
                .and_then(|p| p.field("integration.request.path.proxy")),
            Some(&Value::from("method.request.path.proxy"))
        );
    }

    #[test]
    fn deployment_waits_for_both_methods() {
        let declared = declared();
        let deployment = find(&declared, "ApiGatewayDeployment");
        let waits: Vec<&str> = deployment.depends_on.iter().map(LogicalId::as_str).collect();
        assert!(waits.contains(&"ApiGatewayANY"), "got: {waits:?}");
        assert!(waits.contains(&"ApiGatewayproxyANY"), "got: {waits:?}");
    }

    #[test]
    fn url_points_at_stage() {
        let id = LogicalId::new("ApiGateway").expect("id");
        let url = api().url(&id).expect("url").to_json();
        assert_eq!(url["Fn::Join"][1][7]["Ref"], "ApiGatewayDeploymentStageprod");
    }
}
