//! Version 0 of the provider protocol.
//!
//! Field names are camelCase on the wire; the resource type is `type`.

use std::{collections::BTreeMap, ops::Deref};

use graphops_dynamic::Value;
use serde::{Deserialize, Serialize};

/// An identifier recognized by the resource provider, e.g. `object`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceType(pub String);

impl Deref for ResourceType {
    type Target = String;
    fn deref(&self) -> &String {
        &self.0
    }
}

impl From<&str> for ResourceType {
    fn from(s: &str) -> Self {
        ResourceType(s.to_string())
    }
}

/// Properties the user declared for a resource.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputProperties(pub BTreeMap<String, Value>);

/// Properties the provider reports back, persisted by the host as the
/// resource's state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputProperties(pub BTreeMap<String, Value>);

impl Deref for InputProperties {
    type Target = BTreeMap<String, Value>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Deref for OutputProperties {
    type Target = BTreeMap<String, Value>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A resource the host already holds state for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtantResource {
    #[serde(rename = "type")]
    pub type_: ResourceType,
    pub input_properties: InputProperties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_properties: Option<OutputProperties>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResourceRequest {
    #[serde(rename = "type")]
    pub type_: ResourceType,
    pub input_properties: InputProperties,
    #[serde(default)]
    pub is_stateful: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResourceResponse {
    pub output_properties: OutputProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResourceRequest {
    pub resource: ExtantResource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResourceResponse {
    pub output_properties: OutputProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResourceRequest {
    pub resource: ExtantResource,
    pub input_properties: InputProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResourceResponse {
    pub output_properties: OutputProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroyResourceRequest {
    pub resource: ExtantResource,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DestroyResourceResponse {}

/// Adopt an existing remote object, addressed by a provider-specific id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResourceRequest {
    #[serde(rename = "type")]
    pub type_: ResourceType,
    pub id: String,
    /// Provider configuration only; the resource's own inputs are what the
    /// import produces.
    #[serde(default)]
    pub input_properties: InputProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResourceResponse {
    pub input_properties: InputProperties,
    pub output_properties: OutputProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResourceRequest {
    /// Absent when the resource does not exist yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ExtantResource>,
    pub input_properties: InputProperties,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlanAction {
    Create,
    Update,
    Replace,
    NoOp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResourceResponse {
    pub action: PlanAction,
    pub planned_properties: InputProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadDataSourceRequest {
    #[serde(rename = "type")]
    pub type_: ResourceType,
    pub input_properties: InputProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadDataSourceResponse {
    pub output_properties: OutputProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    CreateResourceRequest(CreateResourceRequest),
    ReadResourceRequest(ReadResourceRequest),
    UpdateResourceRequest(UpdateResourceRequest),
    DestroyResourceRequest(DestroyResourceRequest),
    ImportResourceRequest(ImportResourceRequest),
    PlanResourceRequest(PlanResourceRequest),
    ReadDataSourceRequest(ReadDataSourceRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    CreateResourceResponse(CreateResourceResponse),
    ReadResourceResponse(ReadResourceResponse),
    UpdateResourceResponse(UpdateResourceResponse),
    DestroyResourceResponse(DestroyResourceResponse),
    ImportResourceResponse(ImportResourceResponse),
    PlanResourceResponse(PlanResourceResponse),
    ReadDataSourceResponse(ReadDataSourceResponse),
    ErrorResponse(ErrorResponse),
}
