//! The `object` resource: any Graph object addressed by a collection path.
//!
//! The state of an object keeps two values apart:
//!
//! - `properties`: what the user declared, reconciled against the server so
//!   that it only holds structure the server confirmed.
//! - `output`: the last response body, verbatim.
//!
//! Every operation is at most two sequential requests; the second one is a
//! GET that refreshes `output`.

use std::collections::BTreeMap;

use graphops_dynamic::{merge, planned_value, Value};
use graphops_resource::schema::v0::{OutputProperties, PlanAction};
use tracing::{info, info_span, Instrument};

use crate::{
    api_version::ApiVersion,
    error::{Error, Result},
    id::ResourceId,
    rest::RestClient,
};

/// The inputs of an `object` resource, without provider settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInputs {
    /// E.g. `groups` or `applications/<id>/owners`.
    pub collection: String,
    pub properties: Value,
    pub api_version: Option<ApiVersion>,
}

impl ObjectInputs {
    pub fn from_inputs(inputs: &BTreeMap<String, Value>) -> Result<ObjectInputs> {
        let collection = match inputs.get("collection") {
            Some(Value::String(s)) if !s.trim_matches('/').is_empty() => {
                s.trim_matches('/').to_string()
            }
            Some(Value::String(_)) => return Err(Error::Input("collection is empty".into())),
            Some(other) => {
                return Err(Error::Input(format!(
                    "collection must be a string, got {}",
                    other.kind()
                )))
            }
            None => return Err(Error::Input("collection is required".into())),
        };
        let properties = inputs
            .get("properties")
            .cloned()
            .ok_or_else(|| Error::Input("properties is required".into()))?;
        Ok(ObjectInputs {
            collection,
            properties,
            api_version: optional_api_version(inputs)?,
        })
    }
}

pub(crate) fn optional_api_version(
    inputs: &BTreeMap<String, Value>,
) -> Result<Option<ApiVersion>> {
    match inputs.get("api_version") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => s
            .parse()
            .map(Some)
            .map_err(|e| Error::Input(format!("api_version: {}", e))),
        Some(other) => Err(Error::Input(format!(
            "api_version must be a string, got {}",
            other.kind()
        ))),
    }
}

/// The persisted state of an `object` resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectState {
    /// Carries `api_version` as its version token.
    pub id: ResourceId,
    pub collection: String,
    /// The object's own API version; `None` follows the provider default.
    pub api_version: Option<ApiVersion>,
    pub properties: Value,
    pub output: Value,
}

impl ObjectState {
    fn new(
        id: &ResourceId,
        api_version: Option<ApiVersion>,
        properties: Value,
        output: Value,
    ) -> Self {
        ObjectState {
            id: id.with_api_version(api_version),
            collection: id.collection().to_string(),
            api_version,
            properties,
            output,
        }
    }

    pub fn to_output_properties(&self) -> OutputProperties {
        let mut out = BTreeMap::new();
        out.insert("id".to_string(), Value::String(self.id.to_string()));
        out.insert(
            "collection".to_string(),
            Value::String(self.collection.clone()),
        );
        if let Some(version) = self.api_version {
            out.insert("api_version".to_string(), Value::from(version.as_str()));
        }
        out.insert("properties".to_string(), self.properties.clone());
        out.insert("output".to_string(), self.output.clone());
        OutputProperties(out)
    }

    pub fn from_output_properties(outputs: &OutputProperties) -> Result<ObjectState> {
        let id = match outputs.get("id") {
            Some(Value::String(s)) => ResourceId::parse(s)?,
            _ => return Err(Error::Input("prior state has no id".into())),
        };
        let api_version = optional_api_version(outputs)
            .map_err(|_| Error::Input("prior state has an invalid api_version".into()))?;
        Ok(ObjectState::new(
            &id,
            api_version.or(id.api_version()),
            outputs.get("properties").cloned().unwrap_or_default(),
            outputs.get("output").cloned().unwrap_or_default(),
        ))
    }
}

/// The result of planning a change to an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub action: PlanAction,
    /// The properties to apply; the prior ones when the declaration only
    /// differs in formatting.
    pub properties: Value,
}

/// Decide what applying `inputs` to an object in state `prior` will do.
pub fn plan(prior: Option<&ObjectState>, inputs: &ObjectInputs) -> Plan {
    let Some(prior) = prior else {
        return Plan {
            action: PlanAction::Create,
            properties: inputs.properties.clone(),
        };
    };
    if prior.collection != inputs.collection {
        return Plan {
            action: PlanAction::Replace,
            properties: inputs.properties.clone(),
        };
    }
    let properties = planned_value(&inputs.properties, &prior.properties);
    let action = if properties == prior.properties && inputs.api_version == prior.api_version {
        PlanAction::NoOp
    } else {
        PlanAction::Update
    };
    Plan { action, properties }
}

/// Create, read, update, delete and import objects through one client.
#[derive(Clone)]
pub struct Objects {
    client: RestClient,
}

impl Objects {
    pub fn new(client: RestClient) -> Objects {
        Objects { client }
    }

    /// POST the declared properties to the collection, then GET the new
    /// object.
    pub async fn create(&self, inputs: &ObjectInputs) -> Result<ObjectState> {
        let span = info_span!("create", collection = %inputs.collection);
        async {
            let response = self
                .client
                .post(&inputs.collection, inputs.api_version, &inputs.properties)
                .await?;
            let body = response.json()?;
            let key = match body.get("id") {
                Some(Value::String(key)) if !key.is_empty() => key,
                _ => return Err(response.unexpected("the response has no string \"id\"")),
            };
            let id = ResourceId::new(&inputs.collection, key);
            info!(%id, "created");

            let output = self.fetch(&id, inputs.api_version).await?;
            Ok(ObjectState::new(
                &id,
                inputs.api_version,
                inputs.properties.clone(),
                output,
            ))
        }
        .instrument(span)
        .await
    }

    /// GET the object and reconcile the declared properties against it.
    pub async fn read(&self, state: &ObjectState) -> Result<ObjectState> {
        let span = info_span!("read", id = %state.id);
        async {
            let output = self.fetch(&state.id, state.api_version).await?;
            let properties = merge(&output, &state.properties);
            Ok(ObjectState::new(
                &state.id,
                state.api_version,
                properties,
                output,
            ))
        }
        .instrument(span)
        .await
    }

    /// PATCH the object with the declared properties, then GET it.
    ///
    /// The declared properties are stored as given.
    pub async fn update(&self, state: &ObjectState, inputs: &ObjectInputs) -> Result<ObjectState> {
        let span = info_span!("update", id = %state.id);
        async {
            self.client
                .patch(&state.id.path(), inputs.api_version, &inputs.properties)
                .await?;
            let output = self.fetch(&state.id, inputs.api_version).await?;
            Ok(ObjectState::new(
                &state.id,
                inputs.api_version,
                inputs.properties.clone(),
                output,
            ))
        }
        .instrument(span)
        .await
    }

    /// DELETE the object. An object that is already gone is not an error.
    pub async fn delete(&self, state: &ObjectState) -> Result<()> {
        let span = info_span!("delete", id = %state.id);
        async {
            let response = self
                .client
                .delete(&state.id.path(), state.api_version)
                .await?;
            if response.status == 404 {
                info!("already deleted");
            }
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Adopt an existing object. A version token in `id` becomes the
    /// object's API version.
    pub async fn import(&self, id: &str) -> Result<ObjectState> {
        let span = info_span!("import", id);
        async {
            let id = ResourceId::parse(id)?;
            let output = self.fetch(&id, id.api_version()).await?;
            Ok(ObjectState::new(
                &id,
                id.api_version(),
                output.clone(),
                output,
            ))
        }
        .instrument(span)
        .await
    }

    async fn fetch(&self, id: &ResourceId, api_version: Option<ApiVersion>) -> Result<Value> {
        self.client.get(&id.path(), api_version).await?.json()
    }
}
