use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const LAMBDA_SERVICE_PRINCIPAL: &str = "lambda.amazonaws.com";
pub const S3_SERVICE_PRINCIPAL: &str = "s3.amazonaws.com";
pub const ASSUME_ROLE_ACTION: &str = "sts:AssumeRole";
pub const INVOKE_FUNCTION_ACTION: &str = "lambda:InvokeFunction";

pub const SOURCE_BUCKET: &str = "masrikdahir-image";
pub const DEST_BUCKET: &str = "masrikdahir";
pub const CLOUDFRONT_DISTRIBUTION_ID: &str = "E2SSEF4XZUSQ74";
pub const SECRET_NAME: &str = "google_drive_api";
pub const REGION_NAME: &str = "us-east-1";

pub const MAX_TIMEOUT_SECONDS: u32 = 900;
pub const MIN_MEMORY_MB: u32 = 128;
pub const MAX_MEMORY_MB: u32 = 10_240;
pub const MIN_EPHEMERAL_STORAGE_MB: u32 = 512;
pub const MAX_EPHEMERAL_STORAGE_MB: u32 = 10_240;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "Allow",
            Self::Deny => "Deny",
        }
    }
}

/// Account, region and bucket names every policy resource must stay inside.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentNamespace {
    pub partition: String,
    pub region: String,
    pub account: String,
    pub buckets: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceLimits {
    pub timeout_seconds: u32,
    pub memory_mb: u32,
    pub ephemeral_storage_mb: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionDescriptor {
    pub logical_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    pub code_uri: String,
    pub handler: String,
    pub runtime: String,
    pub architectures: Vec<String>,
    pub limits: ResourceLimits,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionGrant {
    pub logical_id: String,
    pub action: String,
    pub principal: String,
    pub source_arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_account: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrustStatement {
    pub effect: Effect,
    pub service_principals: Vec<String>,
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyStatement {
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyRecord {
    pub name: String,
    pub statements: Vec<PolicyStatement>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionRole {
    pub logical_id: String,
    pub trust: TrustStatement,
    pub policies: Vec<PolicyRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputDescriptor {
    pub logical_id: String,
    pub description: String,
}

/// Everything the provisioning engine needs to stand up the image processor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentDescriptor {
    pub description: String,
    pub namespace: DeploymentNamespace,
    pub function: FunctionDescriptor,
    pub permission: PermissionGrant,
    pub role: ExecutionRole,
    pub output: OutputDescriptor,
}

impl DeploymentDescriptor {
    pub fn policy_logical_id(&self, policy: &PolicyRecord) -> String {
        let name: String = policy
            .name
            .chars()
            .filter(|ch| ch.is_ascii_alphanumeric())
            .collect();
        format!("{}{name}", self.role.logical_id)
    }

    pub fn policy_logical_ids(&self) -> Vec<String> {
        self.role
            .policies
            .iter()
            .map(|policy| self.policy_logical_id(policy))
            .collect()
    }
}

pub fn image_processor_descriptor() -> DeploymentDescriptor {
    let region = "${AWS::Region}";
    let account = "${AWS::AccountId}";

    DeploymentDescriptor {
        description: "Daily image processor: copies uploaded media between buckets, converts images to JPEG and refreshes the gallery catalog".to_string(),
        namespace: DeploymentNamespace {
            partition: "aws".to_string(),
            region: region.to_string(),
            account: account.to_string(),
            buckets: vec![SOURCE_BUCKET.to_string(), DEST_BUCKET.to_string()],
        },
        function: FunctionDescriptor {
            logical_id: "ImageProcessorFunction".to_string(),
            function_name: None,
            code_uri: "infra/image_processor/dist/image_processor.zip".to_string(),
            handler: "bootstrap".to_string(),
            runtime: "provided.al2023".to_string(),
            architectures: vec!["x86_64".to_string()],
            limits: ResourceLimits {
                timeout_seconds: 900,
                memory_mb: 3008,
                ephemeral_storage_mb: 10_240,
            },
            environment: BTreeMap::from([
                ("REGION_NAME".to_string(), REGION_NAME.to_string()),
                ("SECRET_NAME".to_string(), SECRET_NAME.to_string()),
            ]),
        },
        permission: PermissionGrant {
            logical_id: "ImageProcessorInvokePermission".to_string(),
            action: INVOKE_FUNCTION_ACTION.to_string(),
            principal: S3_SERVICE_PRINCIPAL.to_string(),
            source_arn: format!("arn:aws:s3:::{SOURCE_BUCKET}"),
            source_account: Some(account.to_string()),
        },
        role: ExecutionRole {
            logical_id: "ImageProcessorRole".to_string(),
            trust: TrustStatement {
                effect: Effect::Allow,
                service_principals: vec![LAMBDA_SERVICE_PRINCIPAL.to_string()],
                action: ASSUME_ROLE_ACTION.to_string(),
            },
            policies: vec![
                allow_policy(
                    "SecretsManagerAccess",
                    &[
                        "secretsmanager:GetSecretValue",
                        "secretsmanager:DescribeSecret",
                        "secretsmanager:PutSecretValue",
                        "secretsmanager:UpdateSecret",
                    ],
                    vec![format!(
                        "arn:aws:secretsmanager:{region}:{account}:secret:{SECRET_NAME}*"
                    )],
                ),
                allow_policy(
                    "S3BucketAccess",
                    &["s3:*"],
                    vec![
                        format!("arn:aws:s3:::{SOURCE_BUCKET}"),
                        format!("arn:aws:s3:::{SOURCE_BUCKET}/*"),
                        format!("arn:aws:s3:::{DEST_BUCKET}"),
                        format!("arn:aws:s3:::{DEST_BUCKET}/*"),
                    ],
                ),
                allow_policy(
                    "DynamoDbItemAccess",
                    &[
                        "dynamodb:GetItem",
                        "dynamodb:PutItem",
                        "dynamodb:DeleteItem",
                        "dynamodb:UpdateItem",
                        "dynamodb:Query",
                        "dynamodb:Scan",
                    ],
                    vec![format!("arn:aws:dynamodb:{region}:{account}:table/*")],
                ),
                allow_policy(
                    "CloudWatchLogsAccess",
                    &[
                        "logs:CreateLogGroup",
                        "logs:CreateLogStream",
                        "logs:PutLogEvents",
                        "logs:DescribeLogGroups",
                        "logs:DescribeLogStreams",
                        "logs:GetLogEvents",
                        "logs:FilterLogEvents",
                        "logs:StartQuery",
                        "logs:GetQueryResults",
                    ],
                    vec![format!("arn:aws:logs:{region}:{account}:*")],
                ),
                allow_policy(
                    "CloudFrontInvalidation",
                    &["cloudfront:CreateInvalidation"],
                    vec![format!(
                        "arn:aws:cloudfront::{account}:distribution/{CLOUDFRONT_DISTRIBUTION_ID}"
                    )],
                ),
            ],
        },
        output: OutputDescriptor {
            logical_id: "ImageProcessorFunctionArn".to_string(),
            description: "Image processor Lambda function ARN".to_string(),
        },
    }
}

fn allow_policy(name: &str, actions: &[&str], resources: Vec<String>) -> PolicyRecord {
    PolicyRecord {
        name: name.to_string(),
        statements: vec![PolicyStatement {
            effect: Effect::Allow,
            actions: actions.iter().map(|action| action.to_string()).collect(),
            resources,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_descriptor_carries_deployment_limits() {
        let descriptor = image_processor_descriptor();
        assert_eq!(descriptor.function.limits.timeout_seconds, 900);
        assert_eq!(descriptor.function.limits.memory_mb, 3008);
        assert_eq!(descriptor.function.limits.ephemeral_storage_mb, 10_240);
        assert_eq!(
            descriptor.function.environment.get("SECRET_NAME").map(String::as_str),
            Some("google_drive_api")
        );
        assert_eq!(
            descriptor.function.environment.get("REGION_NAME").map(String::as_str),
            Some("us-east-1")
        );
    }

    #[test]
    fn policy_logical_ids_are_prefixed_by_role() {
        let descriptor = image_processor_descriptor();
        let ids = descriptor.policy_logical_ids();
        assert_eq!(ids.len(), 5);
        assert!(ids.contains(&"ImageProcessorRoleS3BucketAccess".to_string()));
    }

    #[test]
    fn descriptor_survives_json_round_trip() {
        let descriptor = image_processor_descriptor();
        let text = serde_json::to_string(&descriptor).expect("descriptor should serialize");
        let parsed: DeploymentDescriptor =
            serde_json::from_str(&text).expect("descriptor should parse");
        assert_eq!(parsed, descriptor);
    }
}
