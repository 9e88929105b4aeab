use std::{collections::BTreeMap, sync::Arc};

use anyhow::{bail, Context, Result};
use graphops_dynamic::Value;
use graphops_resource::{framework::ResourceProvider, schema::v0};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    config::{split_inputs, ProviderConfig},
    credentials::{credential_from_config, TokenCredential},
    data,
    object::{self, ObjectInputs, ObjectState, Objects},
    rest::{HttpTransport, RestClient, RetryTransport},
    Error,
};

pub const OBJECT: &str = "object";
pub const PROVIDER_CONFIG: &str = "provider_config";

/// What a provider configuration resolves to.
pub struct Connection {
    pub client: RestClient,
    pub credential: Arc<dyn TokenCredential>,
}

/// Connect to the Graph service over HTTPS.
pub fn connect(config: &ProviderConfig) -> crate::Result<Connection> {
    let http = reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(|e| Error::Config(format!("could not set up the HTTP client: {}", e)))?;
    let credential: Arc<dyn TokenCredential> =
        Arc::new(credential_from_config(config, http.clone())?);
    let transport = RetryTransport::new(
        HttpTransport::new(
            http,
            &config.base_url,
            credential.clone(),
            config.scopes.clone(),
        ),
        config.retry.clone(),
    );
    Ok(Connection {
        client: RestClient::new(Arc::new(transport), config.api_version),
        credential,
    })
}

type Env = dyn Fn(&str) -> Option<String> + Send + Sync;
type Connector = dyn Fn(&ProviderConfig) -> crate::Result<Connection> + Send + Sync;

/// The Microsoft Graph resource provider.
///
/// Every request carries its own provider settings, so each operation
/// resolves its configuration and connects anew.
pub struct GraphProvider {
    env: Box<Env>,
    connector: Box<Connector>,
    cancel: CancellationToken,
}

/// One operation's configuration and connection.
struct Session {
    config: ProviderConfig,
    inputs: BTreeMap<String, Value>,
    connection: Connection,
}

impl GraphProvider {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            env: Box::new(|name: &str| std::env::var(name).ok()),
            connector: Box::new(connect),
            cancel,
        }
    }

    /// Look up environment variables with `env` instead.
    pub fn with_env(self, env: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            env: Box::new(env),
            ..self
        }
    }

    /// Connect with `connector` instead of [`connect`].
    pub fn with_connector(
        self,
        connector: impl Fn(&ProviderConfig) -> crate::Result<Connection> + Send + Sync + 'static,
    ) -> Self {
        Self {
            connector: Box::new(connector),
            ..self
        }
    }

    fn session(&self, inputs: &v0::InputProperties) -> Result<Session> {
        let (settings, inputs) = split_inputs(inputs);
        let config = ProviderConfig::from_settings(&settings, |name| (self.env)(name))?;
        debug!(?config, "provider configuration");
        let mut connection = (self.connector)(&config)?;
        connection.client = connection.client.with_cancellation(self.cancel.clone());
        Ok(Session {
            config,
            inputs,
            connection,
        })
    }

    fn objects(&self, inputs: &v0::InputProperties) -> Result<(Objects, BTreeMap<String, Value>)> {
        let session = self.session(inputs)?;
        Ok((Objects::new(session.connection.client), session.inputs))
    }
}

fn check_type(type_: &v0::ResourceType) -> Result<()> {
    if type_.as_str() != OBJECT {
        bail!("unknown resource type {:?}, expected {:?}", type_.as_str(), OBJECT);
    }
    Ok(())
}

fn prior_state(resource: &v0::ExtantResource) -> Result<ObjectState> {
    let outputs = resource
        .output_properties
        .as_ref()
        .context("the resource has no recorded state")?;
    Ok(ObjectState::from_output_properties(outputs)?)
}

#[async_trait::async_trait]
impl ResourceProvider for GraphProvider {
    async fn create(
        &self,
        request: v0::CreateResourceRequest,
    ) -> Result<v0::CreateResourceResponse> {
        check_type(&request.type_)?;
        let (objects, inputs) = self.objects(&request.input_properties)?;
        let inputs = ObjectInputs::from_inputs(&inputs)?;
        let state = objects.create(&inputs).await?;
        Ok(v0::CreateResourceResponse {
            output_properties: state.to_output_properties(),
        })
    }

    async fn read(&self, request: v0::ReadResourceRequest) -> Result<v0::ReadResourceResponse> {
        check_type(&request.resource.type_)?;
        let (objects, _) = self.objects(&request.resource.input_properties)?;
        let prior = prior_state(&request.resource)?;
        let state = objects.read(&prior).await?;
        Ok(v0::ReadResourceResponse {
            output_properties: state.to_output_properties(),
        })
    }

    async fn update(
        &self,
        request: v0::UpdateResourceRequest,
    ) -> Result<v0::UpdateResourceResponse> {
        check_type(&request.resource.type_)?;
        let (objects, inputs) = self.objects(&request.input_properties)?;
        let inputs = ObjectInputs::from_inputs(&inputs)?;
        let prior = prior_state(&request.resource)?;
        if prior.collection != inputs.collection {
            bail!(
                "the collection changed from {:?} to {:?}; the object must be replaced",
                prior.collection,
                inputs.collection
            );
        }
        let state = objects.update(&prior, &inputs).await?;
        Ok(v0::UpdateResourceResponse {
            output_properties: state.to_output_properties(),
        })
    }

    async fn destroy(
        &self,
        request: v0::DestroyResourceRequest,
    ) -> Result<v0::DestroyResourceResponse> {
        check_type(&request.resource.type_)?;
        let (objects, _) = self.objects(&request.resource.input_properties)?;
        let prior = prior_state(&request.resource)?;
        objects.delete(&prior).await?;
        Ok(v0::DestroyResourceResponse {})
    }

    async fn import(
        &self,
        request: v0::ImportResourceRequest,
    ) -> Result<v0::ImportResourceResponse> {
        check_type(&request.type_)?;
        let (objects, _) = self.objects(&request.input_properties)?;
        let state = objects.import(&request.id).await?;

        let mut input_properties = request.input_properties.clone();
        input_properties.0.insert(
            "collection".to_string(),
            Value::String(state.collection.clone()),
        );
        input_properties
            .0
            .insert("properties".to_string(), state.properties.clone());
        if let Some(version) = state.api_version {
            input_properties
                .0
                .insert("api_version".to_string(), Value::from(version.as_str()));
        }
        Ok(v0::ImportResourceResponse {
            input_properties,
            output_properties: state.to_output_properties(),
        })
    }

    async fn plan(&self, request: v0::PlanResourceRequest) -> Result<v0::PlanResourceResponse> {
        let (_, inputs) = split_inputs(&request.input_properties);
        let inputs = ObjectInputs::from_inputs(&inputs)?;
        let prior = match &request.resource {
            Some(resource) => {
                check_type(&resource.type_)?;
                Some(prior_state(resource)?)
            }
            None => None,
        };
        let plan = object::plan(prior.as_ref(), &inputs);

        let mut planned_properties = request.input_properties.clone();
        planned_properties
            .0
            .insert("properties".to_string(), plan.properties);
        Ok(v0::PlanResourceResponse {
            action: plan.action,
            planned_properties,
        })
    }

    async fn read_data_source(
        &self,
        request: v0::ReadDataSourceRequest,
    ) -> Result<v0::ReadDataSourceResponse> {
        let session = self.session(&request.input_properties)?;
        let output_properties = match request.type_.as_str() {
            OBJECT => data::read_object(&session.connection.client, &session.inputs).await?,
            PROVIDER_CONFIG => {
                data::read_provider_config(
                    session.connection.credential.as_ref(),
                    &session.config.scopes,
                )
                .await?
            }
            other => bail!(
                "unknown data source {:?}, expected {:?} or {:?}",
                other,
                OBJECT,
                PROVIDER_CONFIG
            ),
        };
        Ok(v0::ReadDataSourceResponse { output_properties })
    }
}
