//! Local model of how the provisioning engine walks a template.
//!
//! [`StackPlan`] derives the dependency order from the references a template
//! makes (`Ref`, `Fn::GetAtt`, `Fn::Sub`, `DependsOn`). [`StackState`] keeps
//! what a previous apply produced and turns the next plan into a
//! [`ChangeSet`]. Resources are compared by fingerprint, so applying the same
//! template twice yields a change set with nothing but `Unchanged` entries.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::contract::{contract_fingerprint, ValidationError};

const PSEUDO_PARAMETER_PREFIX: &str = "AWS::";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackEnvironment {
    pub stack_name: String,
    pub partition: String,
    pub region: String,
    pub account_id: String,
}

impl StackEnvironment {
    fn pseudo_parameter(&self, name: &str) -> Option<&str> {
        match name {
            "AWS::Region" => Some(&self.region),
            "AWS::AccountId" => Some(&self.account_id),
            "AWS::Partition" => Some(&self.partition),
            "AWS::StackName" => Some(&self.stack_name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedResource {
    pub logical_id: String,
    pub resource_type: String,
    pub properties: Value,
    pub depends_on: BTreeSet<String>,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedOutput {
    pub logical_id: String,
    pub value: Value,
    pub depends_on: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StackPlan {
    resources: BTreeMap<String, PlannedResource>,
    order: Vec<String>,
    outputs: BTreeMap<String, PlannedOutput>,
}

impl StackPlan {
    pub fn from_template(template: &Value) -> Result<Self, ValidationError> {
        let Some(resource_map) = template.get("Resources").and_then(Value::as_object) else {
            return Err(ValidationError::new(
                "Template must contain a Resources object",
            ));
        };
        if resource_map.is_empty() {
            return Err(ValidationError::new("Template declares no resources"));
        }

        let mut resources = BTreeMap::new();
        for (logical_id, definition) in resource_map {
            let resource_type = definition
                .get("Type")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ValidationError::new(format!("Resource '{logical_id}' is missing a Type"))
                })?
                .to_string();
            let properties = definition.get("Properties").cloned().unwrap_or(Value::Null);

            let mut depends_on = BTreeSet::new();
            collect_references(&properties, &mut depends_on);
            collect_depends_on(definition.get("DependsOn"), logical_id, &mut depends_on)?;
            if depends_on.contains(logical_id) {
                return Err(ValidationError::new(format!(
                    "Resource '{logical_id}' references itself"
                )));
            }

            let fingerprint = contract_fingerprint(json!({
                "Type": resource_type,
                "Properties": properties,
                "DependsOn": depends_on,
            }));

            resources.insert(
                logical_id.clone(),
                PlannedResource {
                    logical_id: logical_id.clone(),
                    resource_type,
                    properties,
                    depends_on,
                    fingerprint,
                },
            );
        }

        for resource in resources.values() {
            for dependency in &resource.depends_on {
                if !resources.contains_key(dependency) {
                    return Err(ValidationError::new(format!(
                        "Resource '{}' references unknown resource '{dependency}'",
                        resource.logical_id
                    )));
                }
            }
        }

        let mut outputs = BTreeMap::new();
        if let Some(output_map) = template.get("Outputs").and_then(Value::as_object) {
            for (logical_id, definition) in output_map {
                let value = definition.get("Value").cloned().ok_or_else(|| {
                    ValidationError::new(format!("Output '{logical_id}' is missing a Value"))
                })?;
                let mut depends_on = BTreeSet::new();
                collect_references(&value, &mut depends_on);
                if let Some(missing) = depends_on
                    .iter()
                    .find(|dependency| !resources.contains_key(*dependency))
                {
                    return Err(ValidationError::new(format!(
                        "Output '{logical_id}' references unknown resource '{missing}'"
                    )));
                }
                outputs.insert(
                    logical_id.clone(),
                    PlannedOutput {
                        logical_id: logical_id.clone(),
                        value,
                        depends_on,
                    },
                );
            }
        }

        let order = topological_order(&resources)?;
        Ok(Self {
            resources,
            order,
            outputs,
        })
    }

    /// Logical ids in the order the engine may create them.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn resource(&self, logical_id: &str) -> Option<&PlannedResource> {
        self.resources.get(logical_id)
    }

    pub fn ordered_resources(&self) -> impl Iterator<Item = &PlannedResource> {
        self.order
            .iter()
            .filter_map(|logical_id| self.resources.get(logical_id))
    }

    pub fn outputs(&self) -> impl Iterator<Item = &PlannedOutput> {
        self.outputs.values()
    }

    pub fn count_of_type(&self, resource_type: &str) -> usize {
        self.resources
            .values()
            .filter(|resource| resource.resource_type == resource_type)
            .count()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
    Unchanged,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceChange {
    pub logical_id: String,
    pub resource_type: String,
    pub action: ChangeAction,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeSet {
    pub changes: Vec<ResourceChange>,
}

impl ChangeSet {
    pub fn count(&self, action: ChangeAction) -> usize {
        self.changes
            .iter()
            .filter(|change| change.action == action)
            .count()
    }

    /// True when applying the set would leave every resource untouched.
    pub fn is_noop(&self) -> bool {
        self.changes
            .iter()
            .all(|change| change.action == ChangeAction::Unchanged)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeployedResource {
    pub logical_id: String,
    pub resource_type: String,
    pub physical_id: String,
    pub arn: Option<String>,
    pub fingerprint: String,
    pub position: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplyReport {
    pub change_set: ChangeSet,
    pub outputs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackState {
    pub environment: StackEnvironment,
    pub resources: BTreeMap<String, DeployedResource>,
    pub outputs: BTreeMap<String, String>,
}

impl StackState {
    pub fn new(environment: StackEnvironment) -> Self {
        Self {
            environment,
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn change_set(&self, plan: &StackPlan) -> ChangeSet {
        let mut changes = Vec::new();
        for resource in plan.ordered_resources() {
            let action = match self.resources.get(&resource.logical_id) {
                None => ChangeAction::Create,
                Some(deployed) if deployed.resource_type != resource.resource_type => {
                    ChangeAction::Create
                }
                Some(deployed) if deployed.fingerprint != resource.fingerprint => {
                    ChangeAction::Update
                }
                Some(_) => ChangeAction::Unchanged,
            };
            changes.push(ResourceChange {
                logical_id: resource.logical_id.clone(),
                resource_type: resource.resource_type.clone(),
                action,
            });
        }

        let mut removed: Vec<&DeployedResource> = self
            .resources
            .values()
            .filter(|deployed| {
                plan.resource(&deployed.logical_id)
                    .map(|planned| planned.resource_type != deployed.resource_type)
                    .unwrap_or(true)
            })
            .collect();
        removed.sort_by(|a, b| b.position.cmp(&a.position));
        for deployed in removed {
            changes.push(ResourceChange {
                logical_id: deployed.logical_id.clone(),
                resource_type: deployed.resource_type.clone(),
                action: ChangeAction::Delete,
            });
        }

        ChangeSet { changes }
    }

    /// Applies the plan as a unit: if any output fails to resolve, the state
    /// is left exactly as it was.
    pub fn apply(&mut self, plan: &StackPlan) -> Result<ApplyReport, ValidationError> {
        let change_set = self.change_set(plan);

        let mut next = self.clone();
        for change in &change_set.changes {
            if change.action == ChangeAction::Delete {
                next.resources.remove(&change.logical_id);
            }
        }

        for (position, resource) in plan.ordered_resources().enumerate() {
            let existing = next
                .resources
                .get(&resource.logical_id)
                .filter(|deployed| deployed.resource_type == resource.resource_type);

            let (physical_id, arn) = match existing {
                Some(deployed) => (deployed.physical_id.clone(), deployed.arn.clone()),
                None => next.physical_identity(resource),
            };

            next.resources.insert(
                resource.logical_id.clone(),
                DeployedResource {
                    logical_id: resource.logical_id.clone(),
                    resource_type: resource.resource_type.clone(),
                    physical_id,
                    arn,
                    fingerprint: resource.fingerprint.clone(),
                    position,
                },
            );
        }

        let mut outputs = BTreeMap::new();
        for output in plan.outputs() {
            outputs.insert(output.logical_id.clone(), next.resolve(&output.value)?);
        }
        next.outputs = outputs.clone();
        *self = next;

        Ok(ApplyReport {
            change_set,
            outputs,
        })
    }

    fn physical_identity(&self, resource: &PlannedResource) -> (String, Option<String>) {
        let env = &self.environment;
        let generated = generated_name(&env.stack_name, &resource.logical_id);

        match resource.resource_type.as_str() {
            "AWS::Serverless::Function" | "AWS::Lambda::Function" => {
                let name = resource
                    .properties
                    .get("FunctionName")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or(generated);
                let arn = format!(
                    "arn:{}:lambda:{}:{}:function:{name}",
                    env.partition, env.region, env.account_id
                );
                (name, Some(arn))
            }
            "AWS::IAM::Role" => {
                let arn = format!(
                    "arn:{}:iam::{}:role/{generated}",
                    env.partition, env.account_id
                );
                (generated, Some(arn))
            }
            _ => (generated, None),
        }
    }

    fn resolve(&self, value: &Value) -> Result<String, ValidationError> {
        match value {
            Value::String(text) => Ok(text.clone()),
            Value::Object(map) if map.len() == 1 => {
                if let Some(target) = map.get("Ref").and_then(Value::as_str) {
                    return self.resolve_ref(target);
                }
                if let Some(target) = map.get("Fn::GetAtt") {
                    let (logical_id, attribute) = get_att_target(target).ok_or_else(|| {
                        ValidationError::new(format!("Malformed Fn::GetAtt: {target}"))
                    })?;
                    return self.resolve_attribute(&logical_id, &attribute);
                }
                if let Some(Value::String(text)) = map.get("Fn::Sub") {
                    return self.resolve_sub(text);
                }
                Err(ValidationError::new(format!(
                    "Unsupported output expression: {value}"
                )))
            }
            other => Err(ValidationError::new(format!(
                "Unsupported output expression: {other}"
            ))),
        }
    }

    fn resolve_ref(&self, target: &str) -> Result<String, ValidationError> {
        if let Some(value) = self.environment.pseudo_parameter(target) {
            return Ok(value.to_string());
        }
        self.resources
            .get(target)
            .map(|deployed| deployed.physical_id.clone())
            .ok_or_else(|| ValidationError::new(format!("Unknown reference '{target}'")))
    }

    fn resolve_attribute(&self, logical_id: &str, attribute: &str) -> Result<String, ValidationError> {
        let deployed = self
            .resources
            .get(logical_id)
            .ok_or_else(|| ValidationError::new(format!("Unknown reference '{logical_id}'")))?;
        match attribute {
            "Arn" => deployed.arn.clone().ok_or_else(|| {
                ValidationError::new(format!(
                    "Resource '{logical_id}' of type {} has no Arn attribute",
                    deployed.resource_type
                ))
            }),
            other => Err(ValidationError::new(format!(
                "Unsupported attribute '{other}' on '{logical_id}'"
            ))),
        }
    }

    fn resolve_sub(&self, text: &str) -> Result<String, ValidationError> {
        let mut resolved = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("${") {
            resolved.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find('}').ok_or_else(|| {
                ValidationError::new(format!("Unterminated placeholder in '{text}'"))
            })?;
            let name = &after[..end];
            let value = match name.split_once('.') {
                Some((logical_id, attribute)) => self.resolve_attribute(logical_id, attribute)?,
                None => self.resolve_ref(name)?,
            };
            resolved.push_str(&value);
            rest = &after[end + 1..];
        }
        resolved.push_str(rest);
        Ok(resolved)
    }
}

fn generated_name(stack_name: &str, logical_id: &str) -> String {
    let digest = contract_fingerprint(format!("{stack_name}/{logical_id}"));
    format!("{stack_name}-{logical_id}-{}", digest[..12].to_uppercase())
}

fn topological_order(
    resources: &BTreeMap<String, PlannedResource>,
) -> Result<Vec<String>, ValidationError> {
    let mut remaining: BTreeMap<&str, usize> = resources
        .values()
        .map(|resource| (resource.logical_id.as_str(), resource.depends_on.len()))
        .collect();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for resource in resources.values() {
        for dependency in &resource.depends_on {
            dependents
                .entry(dependency.as_str())
                .or_default()
                .push(resource.logical_id.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = remaining
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(logical_id, _)| *logical_id)
        .collect();
    let mut order = Vec::with_capacity(resources.len());

    while let Some(next) = ready.pop_first() {
        remaining.remove(next);
        order.push(next.to_string());
        for dependent in dependents.get(next).into_iter().flatten() {
            if let Some(count) = remaining.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if !remaining.is_empty() {
        let cycle: Vec<&str> = remaining.keys().copied().collect();
        return Err(ValidationError::new(format!(
            "Resource dependency cycle involving: {}",
            cycle.join(", ")
        )));
    }

    Ok(order)
}

fn collect_depends_on(
    value: Option<&Value>,
    logical_id: &str,
    out: &mut BTreeSet<String>,
) -> Result<(), ValidationError> {
    match value {
        None => Ok(()),
        Some(Value::String(name)) => {
            out.insert(name.clone());
            Ok(())
        }
        Some(Value::Array(names)) => {
            for name in names {
                let name = name.as_str().ok_or_else(|| {
                    ValidationError::new(format!(
                        "Resource '{logical_id}' DependsOn entries must be strings"
                    ))
                })?;
                out.insert(name.to_string());
            }
            Ok(())
        }
        Some(_) => Err(ValidationError::new(format!(
            "Resource '{logical_id}' DependsOn must be a string or list"
        ))),
    }
}

fn collect_references(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::String(target)) = map.get("Ref") {
                    if !target.starts_with(PSEUDO_PARAMETER_PREFIX) {
                        out.insert(target.clone());
                    }
                    return;
                }
                if let Some(target) = map.get("Fn::GetAtt") {
                    if let Some((logical_id, _)) = get_att_target(target) {
                        out.insert(logical_id);
                    }
                    return;
                }
                if let Some(sub) = map.get("Fn::Sub") {
                    collect_sub_references(sub, out);
                    return;
                }
            }
            for nested in map.values() {
                collect_references(nested, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_references(item, out);
            }
        }
        _ => {}
    }
}

fn collect_sub_references(sub: &Value, out: &mut BTreeSet<String>) {
    let (text, variables) = match sub {
        Value::String(text) => (text.as_str(), None),
        Value::Array(parts) => match (parts.first(), parts.get(1)) {
            (Some(Value::String(text)), variables) => (text.as_str(), variables),
            _ => return,
        },
        _ => return,
    };

    let local_names: BTreeSet<&str> = variables
        .and_then(Value::as_object)
        .map(|map| map.keys().map(String::as_str).collect())
        .unwrap_or_default();
    if let Some(variables) = variables {
        collect_references(variables, out);
    }

    let mut rest = text;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = &after[..end];
        rest = &after[end + 1..];

        if name.starts_with('!') || name.starts_with(PSEUDO_PARAMETER_PREFIX) {
            continue;
        }
        let logical_id = name.split('.').next().unwrap_or(name);
        if !local_names.contains(logical_id) {
            out.insert(logical_id.to_string());
        }
    }
}

fn get_att_target(target: &Value) -> Option<(String, String)> {
    match target {
        Value::Array(parts) => match (parts.first(), parts.get(1)) {
            (Some(Value::String(id)), Some(Value::String(attribute))) => {
                Some((id.clone(), attribute.clone()))
            }
            _ => None,
        },
        Value::String(text) => text
            .split_once('.')
            .map(|(id, attribute)| (id.to_string(), attribute.to_string())),
        _ => None,
    }
}
