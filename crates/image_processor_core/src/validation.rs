//! Static checks over a [`DeploymentDescriptor`].
//!
//! Nothing here talks to a provider. Each check encodes a property the
//! provisioning engine would otherwise only reveal at apply time (or never,
//! for over-broad grants), so the template can be rejected before it ships.

use std::collections::BTreeSet;

use crate::contract::ValidationError;
use crate::descriptor::{
    DeploymentDescriptor, DeploymentNamespace, Effect, ASSUME_ROLE_ACTION,
    LAMBDA_SERVICE_PRINCIPAL, MAX_EPHEMERAL_STORAGE_MB, MAX_MEMORY_MB, MAX_TIMEOUT_SECONDS,
    MIN_EPHEMERAL_STORAGE_MB, MIN_MEMORY_MB,
};

/// Fields of an ARN after the `arn` prefix. The resource part keeps any
/// further colons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArnParts<'a> {
    pub partition: &'a str,
    pub service: &'a str,
    pub region: &'a str,
    pub account: &'a str,
    pub resource: &'a str,
}

pub fn parse_arn(arn: &str) -> Option<ArnParts<'_>> {
    let mut parts = arn.splitn(6, ':');
    if parts.next()? != "arn" {
        return None;
    }
    let partition = parts.next()?;
    let service = parts.next()?;
    let region = parts.next()?;
    let account = parts.next()?;
    let resource = parts.next()?;
    if partition.is_empty() || service.is_empty() || resource.is_empty() {
        return None;
    }
    Some(ArnParts {
        partition,
        service,
        region,
        account,
        resource,
    })
}

pub fn validate_descriptor(descriptor: &DeploymentDescriptor) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    check_trust(descriptor, &mut errors);
    check_policies(descriptor, &mut errors);
    check_permission(descriptor, &mut errors);
    check_limits(descriptor, &mut errors);
    check_environment(descriptor, &mut errors);
    check_identifiers(descriptor, &mut errors);
    errors
}

pub fn ensure_valid(descriptor: &DeploymentDescriptor) -> Result<(), ValidationError> {
    match validate_descriptor(descriptor).into_iter().next() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

fn check_trust(descriptor: &DeploymentDescriptor, errors: &mut Vec<ValidationError>) {
    let trust = &descriptor.role.trust;
    if trust.effect != Effect::Allow {
        errors.push(ValidationError::new(
            "Role trust statement must use effect Allow",
        ));
    }
    if trust.action != ASSUME_ROLE_ACTION {
        errors.push(ValidationError::new(format!(
            "Role trust statement must grant {ASSUME_ROLE_ACTION}, found '{}'",
            trust.action
        )));
    }
    if trust.service_principals != [LAMBDA_SERVICE_PRINCIPAL] {
        errors.push(ValidationError::new(format!(
            "Role may only be assumed by {LAMBDA_SERVICE_PRINCIPAL}, found {:?}",
            trust.service_principals
        )));
    }
}

fn check_policies(descriptor: &DeploymentDescriptor, errors: &mut Vec<ValidationError>) {
    let namespace = &descriptor.namespace;
    let mut seen_names = BTreeSet::new();

    if descriptor.role.policies.is_empty() {
        errors.push(ValidationError::new(
            "Execution role must carry at least one policy",
        ));
    }

    for policy in &descriptor.role.policies {
        if policy.name.trim().is_empty() {
            errors.push(ValidationError::new("Policy names must be non-empty"));
            continue;
        }
        if !seen_names.insert(policy.name.as_str()) {
            errors.push(ValidationError::new(format!(
                "Policy '{}' is declared more than once",
                policy.name
            )));
        }
        if policy.statements.is_empty() {
            errors.push(ValidationError::new(format!(
                "Policy '{}' must contain at least one statement",
                policy.name
            )));
        }

        for (index, statement) in policy.statements.iter().enumerate() {
            if statement.actions.is_empty() {
                errors.push(ValidationError::new(format!(
                    "Policy '{}' statement {index} must list at least one action",
                    policy.name
                )));
            }
            if statement.resources.is_empty() {
                errors.push(ValidationError::new(format!(
                    "Policy '{}' statement {index} must list at least one resource",
                    policy.name
                )));
            }
            for action in &statement.actions {
                if !is_action_shaped(action) {
                    errors.push(ValidationError::new(format!(
                        "Policy '{}' action '{action}' must look like service:Action",
                        policy.name
                    )));
                }
            }
            for resource in &statement.resources {
                if let Err(message) = resource_in_namespace(resource, namespace) {
                    errors.push(ValidationError::new(format!(
                        "Policy '{}' resource '{resource}' {message}",
                        policy.name
                    )));
                }
            }
        }
    }
}

fn check_permission(descriptor: &DeploymentDescriptor, errors: &mut Vec<ValidationError>) {
    let permission = &descriptor.permission;
    if permission.principal.trim().is_empty()
        || permission.principal.contains('*')
        || !permission.principal.ends_with(".amazonaws.com")
    {
        errors.push(ValidationError::new(format!(
            "Invoke permission principal must be a single AWS service, found '{}'",
            permission.principal
        )));
    }

    let Some(bucket) = source_bucket(&permission.source_arn) else {
        errors.push(ValidationError::new(format!(
            "Invoke permission source must name exactly one S3 bucket, found '{}'",
            permission.source_arn
        )));
        return;
    };

    if !descriptor.namespace.buckets.iter().any(|name| name == bucket) {
        errors.push(ValidationError::new(format!(
            "Invoke permission source bucket '{bucket}' is not a declared bucket"
        )));
    }

    if !storage_policy_covers(descriptor, bucket) {
        errors.push(ValidationError::new(format!(
            "Invoke permission source bucket '{bucket}' is not granted by any storage policy"
        )));
    }
}

fn check_limits(descriptor: &DeploymentDescriptor, errors: &mut Vec<ValidationError>) {
    let limits = descriptor.function.limits;
    if limits.timeout_seconds == 0 || limits.timeout_seconds > MAX_TIMEOUT_SECONDS {
        errors.push(ValidationError::new(format!(
            "Function timeout {}s must be within 1..={MAX_TIMEOUT_SECONDS}",
            limits.timeout_seconds
        )));
    }
    if !(MIN_MEMORY_MB..=MAX_MEMORY_MB).contains(&limits.memory_mb) {
        errors.push(ValidationError::new(format!(
            "Function memory {}MB must be within {MIN_MEMORY_MB}..={MAX_MEMORY_MB}",
            limits.memory_mb
        )));
    }
    if !(MIN_EPHEMERAL_STORAGE_MB..=MAX_EPHEMERAL_STORAGE_MB)
        .contains(&limits.ephemeral_storage_mb)
    {
        errors.push(ValidationError::new(format!(
            "Function ephemeral storage {}MB must be within {MIN_EPHEMERAL_STORAGE_MB}..={MAX_EPHEMERAL_STORAGE_MB}",
            limits.ephemeral_storage_mb
        )));
    }
}

fn check_environment(descriptor: &DeploymentDescriptor, errors: &mut Vec<ValidationError>) {
    for name in descriptor.function.environment.keys() {
        let mut chars = name.chars();
        let valid = chars.next().is_some_and(|ch| ch.is_ascii_alphabetic())
            && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
        if !valid {
            errors.push(ValidationError::new(format!(
                "Environment variable name '{name}' is not valid"
            )));
        }
    }
}

fn check_identifiers(descriptor: &DeploymentDescriptor, errors: &mut Vec<ValidationError>) {
    let mut ids = vec![
        descriptor.function.logical_id.clone(),
        descriptor.permission.logical_id.clone(),
        descriptor.role.logical_id.clone(),
        descriptor.output.logical_id.clone(),
    ];
    ids.extend(descriptor.policy_logical_ids());

    let mut seen = BTreeSet::new();
    for id in &ids {
        if id.is_empty() || !id.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            errors.push(ValidationError::new(format!(
                "Logical id '{id}' must be non-empty and alphanumeric"
            )));
        }
        if !seen.insert(id.as_str()) {
            errors.push(ValidationError::new(format!(
                "Logical id '{id}' is used more than once"
            )));
        }
    }
}

fn is_action_shaped(action: &str) -> bool {
    match action.split_once(':') {
        Some((service, name)) => {
            !service.is_empty()
                && service
                    .chars()
                    .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-')
                && !name.is_empty()
                && !name.contains(':')
        }
        None => false,
    }
}

fn resource_in_namespace(resource: &str, namespace: &DeploymentNamespace) -> Result<(), String> {
    if resource.trim() == "*" {
        return Err("must not be a bare wildcard".to_string());
    }
    let Some(arn) = parse_arn(resource) else {
        return Err("is not a well-formed ARN".to_string());
    };
    if arn.partition != namespace.partition {
        return Err(format!(
            "uses partition '{}' instead of '{}'",
            arn.partition, namespace.partition
        ));
    }

    if arn.service == "s3" {
        if !arn.region.is_empty() || !arn.account.is_empty() {
            return Err("must not carry a region or account".to_string());
        }
        let bucket = arn.resource.split('/').next().unwrap_or_default();
        if !namespace.buckets.iter().any(|name| name == bucket) {
            return Err(format!("references undeclared bucket '{bucket}'"));
        }
        return Ok(());
    }

    if arn.account != namespace.account {
        return Err(format!(
            "is outside account '{}' (found '{}')",
            namespace.account, arn.account
        ));
    }
    if !arn.region.is_empty() && arn.region != namespace.region {
        return Err(format!(
            "is outside region '{}' (found '{}')",
            namespace.region, arn.region
        ));
    }
    Ok(())
}

fn source_bucket(source_arn: &str) -> Option<&str> {
    let arn = parse_arn(source_arn)?;
    if arn.service != "s3" || !arn.region.is_empty() || !arn.account.is_empty() {
        return None;
    }
    if arn.resource.contains('/') || arn.resource.contains('*') || arn.resource.contains(',') {
        return None;
    }
    Some(arn.resource)
}

fn storage_policy_covers(descriptor: &DeploymentDescriptor, bucket: &str) -> bool {
    descriptor
        .role
        .policies
        .iter()
        .flat_map(|policy| policy.statements.iter())
        .filter(|statement| statement.effect == Effect::Allow)
        .filter(|statement| statement.actions.iter().any(|action| action.starts_with("s3:")))
        .flat_map(|statement| statement.resources.iter())
        .filter_map(|resource| parse_arn(resource))
        .any(|arn| arn.service == "s3" && arn.resource.split('/').next() == Some(bucket))
}

#[cfg(test)]
mod tests {
    use crate::descriptor::{image_processor_descriptor, PolicyRecord, PolicyStatement};

    use super::*;

    fn messages(descriptor: &DeploymentDescriptor) -> Vec<String> {
        validate_descriptor(descriptor)
            .into_iter()
            .map(|error| error.message().to_string())
            .collect()
    }

    #[test]
    fn canonical_descriptor_is_valid() {
        let descriptor = image_processor_descriptor();
        assert!(messages(&descriptor).is_empty(), "{:?}", messages(&descriptor));
        ensure_valid(&descriptor).expect("canonical descriptor should pass");
    }

    #[test]
    fn rejects_trust_for_non_lambda_principal() {
        let mut descriptor = image_processor_descriptor();
        descriptor
            .role
            .trust
            .service_principals
            .push("ec2.amazonaws.com".to_string());

        let errors = messages(&descriptor);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Role may only be assumed by lambda.amazonaws.com"));
    }

    #[test]
    fn rejects_wildcard_permission_principal() {
        let mut descriptor = image_processor_descriptor();
        descriptor.permission.principal = "*".to_string();

        let error = ensure_valid(&descriptor).expect_err("wildcard principal should fail");
        assert!(error.message().contains("single AWS service"));
    }

    #[test]
    fn rejects_statement_without_actions_or_resources() {
        let mut descriptor = image_processor_descriptor();
        descriptor.role.policies.push(PolicyRecord {
            name: "Empty".to_string(),
            statements: vec![PolicyStatement {
                effect: Effect::Allow,
                actions: Vec::new(),
                resources: Vec::new(),
            }],
        });

        let errors = messages(&descriptor);
        assert!(errors.iter().any(|error| error.contains("at least one action")));
        assert!(errors.iter().any(|error| error.contains("at least one resource")));
    }

    #[test]
    fn rejects_resources_outside_namespace() {
        let mut descriptor = image_processor_descriptor();
        descriptor.role.policies[1].statements[0]
            .resources
            .push("arn:aws:s3:::someone-elses-bucket/*".to_string());
        descriptor.role.policies[2].statements[0]
            .resources
            .push("arn:aws:dynamodb:us-west-2:123456789012:table/*".to_string());
        descriptor.role.policies[3].statements[0]
            .resources
            .push("*".to_string());

        let errors = messages(&descriptor);
        assert_eq!(errors.len(), 3, "{errors:?}");
        assert!(errors[0].contains("undeclared bucket 'someone-elses-bucket'"));
        assert!(errors[1].contains("outside account"));
        assert!(errors[2].contains("bare wildcard"));
    }

    #[test]
    fn permission_source_must_match_storage_policy_bucket() {
        let mut descriptor = image_processor_descriptor();
        descriptor.namespace.buckets.push("uploads-bucket".to_string());
        descriptor.permission.source_arn = "arn:aws:s3:::uploads-bucket".to_string();

        let errors = messages(&descriptor);
        assert_eq!(
            errors,
            vec!["Invoke permission source bucket 'uploads-bucket' is not granted by any storage policy".to_string()]
        );
    }

    #[test]
    fn permission_source_must_name_exactly_one_bucket() {
        let mut descriptor = image_processor_descriptor();
        descriptor.permission.source_arn = "arn:aws:s3:::masrikdahir-image/*".to_string();

        let error = ensure_valid(&descriptor).expect_err("object pattern should fail");
        assert!(error.message().contains("exactly one S3 bucket"));
    }

    #[test]
    fn rejects_limits_outside_provider_ranges() {
        let mut descriptor = image_processor_descriptor();
        descriptor.function.limits.timeout_seconds = 901;
        descriptor.function.limits.memory_mb = 64;
        descriptor.function.limits.ephemeral_storage_mb = 20_480;

        let errors = messages(&descriptor);
        assert_eq!(errors.len(), 3);
        assert!(errors[0].starts_with("Function timeout 901s"));
        assert!(errors[1].starts_with("Function memory 64MB"));
        assert!(errors[2].starts_with("Function ephemeral storage 20480MB"));
    }

    #[test]
    fn rejects_malformed_actions_and_environment_names() {
        let mut descriptor = image_processor_descriptor();
        descriptor.role.policies[0].statements[0]
            .actions
            .push("GetSecretValue".to_string());
        descriptor
            .function
            .environment
            .insert("1BAD".to_string(), "x".to_string());

        let errors = messages(&descriptor);
        assert!(errors
            .iter()
            .any(|error| error.contains("'GetSecretValue' must look like service:Action")));
        assert!(errors
            .iter()
            .any(|error| error.contains("Environment variable name '1BAD'")));
    }

    #[test]
    fn rejects_duplicate_policy_names() {
        let mut descriptor = image_processor_descriptor();
        let duplicate = descriptor.role.policies[0].clone();
        descriptor.role.policies.push(duplicate);

        let errors = messages(&descriptor);
        assert!(errors
            .iter()
            .any(|error| error.contains("declared more than once")));
        assert!(errors
            .iter()
            .any(|error| error.contains("used more than once")));
    }

    #[test]
    fn parses_arn_with_colons_in_resource() {
        let arn = parse_arn("arn:aws:logs:us-east-1:123:log-group:/aws/lambda/x:*")
            .expect("arn should parse");
        assert_eq!(arn.service, "logs");
        assert_eq!(arn.resource, "log-group:/aws/lambda/x:*");
        assert!(parse_arn("not-an-arn").is_none());
    }
}
