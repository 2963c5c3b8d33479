use serde_json::{json, Map, Value};

use crate::contract::ValidationError;
use crate::descriptor::{DeploymentDescriptor, PolicyRecord};
use crate::validation::ensure_valid;

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";
pub const SAM_TRANSFORM: &str = "AWS::Serverless-2016-10-31";

pub const ROLE_RESOURCE_TYPE: &str = "AWS::IAM::Role";
pub const POLICY_RESOURCE_TYPE: &str = "AWS::IAM::Policy";
pub const FUNCTION_RESOURCE_TYPE: &str = "AWS::Serverless::Function";
pub const PERMISSION_RESOURCE_TYPE: &str = "AWS::Lambda::Permission";

pub fn render_template(descriptor: &DeploymentDescriptor) -> Value {
    let mut resources = Map::new();

    resources.insert(descriptor.role.logical_id.clone(), role_resource(descriptor));
    for policy in &descriptor.role.policies {
        resources.insert(
            descriptor.policy_logical_id(policy),
            policy_resource(descriptor, policy),
        );
    }
    resources.insert(
        descriptor.function.logical_id.clone(),
        function_resource(descriptor),
    );
    resources.insert(
        descriptor.permission.logical_id.clone(),
        permission_resource(descriptor),
    );

    let mut outputs = Map::new();
    outputs.insert(
        descriptor.output.logical_id.clone(),
        json!({
            "Description": descriptor.output.description,
            "Value": get_att(&descriptor.function.logical_id, "Arn"),
        }),
    );

    json!({
        "AWSTemplateFormatVersion": TEMPLATE_FORMAT_VERSION,
        "Transform": SAM_TRANSFORM,
        "Description": descriptor.description,
        "Resources": resources,
        "Outputs": outputs,
    })
}

pub fn render_template_json(descriptor: &DeploymentDescriptor) -> Result<String, ValidationError> {
    ensure_valid(descriptor)?;
    serde_json::to_string_pretty(&render_template(descriptor))
        .map_err(|error| ValidationError::new(format!("Failed to serialize template: {error}")))
}

fn role_resource(descriptor: &DeploymentDescriptor) -> Value {
    let trust = &descriptor.role.trust;
    json!({
        "Type": ROLE_RESOURCE_TYPE,
        "Properties": {
            "AssumeRolePolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": trust.effect.as_str(),
                    "Principal": { "Service": trust.service_principals },
                    "Action": trust.action,
                }],
            },
        },
    })
}

fn policy_resource(descriptor: &DeploymentDescriptor, policy: &PolicyRecord) -> Value {
    let statements: Vec<Value> = policy
        .statements
        .iter()
        .map(|statement| {
            json!({
                "Effect": statement.effect.as_str(),
                "Action": statement.actions,
                "Resource": statement
                    .resources
                    .iter()
                    .map(|resource| substituted(resource))
                    .collect::<Vec<_>>(),
            })
        })
        .collect();

    json!({
        "Type": POLICY_RESOURCE_TYPE,
        "Properties": {
            "PolicyName": policy.name,
            "Roles": [reference(&descriptor.role.logical_id)],
            "PolicyDocument": {
                "Version": "2012-10-17",
                "Statement": statements,
            },
        },
    })
}

fn function_resource(descriptor: &DeploymentDescriptor) -> Value {
    let function = &descriptor.function;
    let mut properties = Map::new();
    if let Some(name) = &function.function_name {
        properties.insert("FunctionName".to_string(), substituted(name));
    }
    properties.insert("CodeUri".to_string(), json!(function.code_uri));
    properties.insert("Handler".to_string(), json!(function.handler));
    properties.insert("Runtime".to_string(), json!(function.runtime));
    properties.insert("Architectures".to_string(), json!(function.architectures));
    properties.insert(
        "Timeout".to_string(),
        json!(function.limits.timeout_seconds),
    );
    properties.insert("MemorySize".to_string(), json!(function.limits.memory_mb));
    properties.insert(
        "EphemeralStorage".to_string(),
        json!({ "Size": function.limits.ephemeral_storage_mb }),
    );
    properties.insert(
        "Role".to_string(),
        get_att(&descriptor.role.logical_id, "Arn"),
    );
    if !function.environment.is_empty() {
        properties.insert(
            "Environment".to_string(),
            json!({ "Variables": function.environment }),
        );
    }

    json!({
        "Type": FUNCTION_RESOURCE_TYPE,
        "DependsOn": descriptor.policy_logical_ids(),
        "Properties": properties,
    })
}

fn permission_resource(descriptor: &DeploymentDescriptor) -> Value {
    let permission = &descriptor.permission;
    let mut properties = Map::new();
    properties.insert(
        "FunctionName".to_string(),
        get_att(&descriptor.function.logical_id, "Arn"),
    );
    properties.insert("Action".to_string(), json!(permission.action));
    properties.insert("Principal".to_string(), json!(permission.principal));
    properties.insert("SourceArn".to_string(), substituted(&permission.source_arn));
    if let Some(account) = &permission.source_account {
        properties.insert("SourceAccount".to_string(), substituted(account));
    }

    json!({
        "Type": PERMISSION_RESOURCE_TYPE,
        "Properties": properties,
    })
}

fn reference(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

/// Strings carrying `${...}` placeholders become `Fn::Sub` so pseudo
/// parameters resolve at deploy time.
fn substituted(text: &str) -> Value {
    if text.contains("${") {
        json!({ "Fn::Sub": text })
    } else {
        json!(text)
    }
}
