//! Data sources: read-only lookups.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use graphops_dynamic::Value;
use graphops_resource::schema::v0::OutputProperties;
use tracing::{info_span, Instrument};

use crate::{
    credentials::{AccessToken, TokenCredential},
    error::{Error, Result},
    id::ResourceId,
    object::optional_api_version,
    rest::RestClient,
};

/// Read an existing object by its identifier.
///
/// An `api_version` input beats the identifier's version token, which beats
/// the provider default.
pub async fn read_object(
    client: &RestClient,
    inputs: &BTreeMap<String, Value>,
) -> Result<OutputProperties> {
    let text = match inputs.get("id") {
        Some(Value::String(s)) => s.as_str(),
        _ => return Err(Error::Input("id must be a string".into())),
    };
    let id = ResourceId::parse(text)?;
    let api_version = optional_api_version(inputs)?.or(id.api_version());

    let output = client
        .get(&id.path(), api_version)
        .instrument(info_span!("read_object", %id))
        .await?
        .json()?;

    let mut out = BTreeMap::new();
    out.insert("id".to_string(), Value::String(id.to_string()));
    out.insert(
        "collection".to_string(),
        Value::String(id.collection().to_string()),
    );
    if let Some(version) = api_version {
        out.insert("api_version".to_string(), Value::from(version.as_str()));
    }
    out.insert("output".to_string(), output);
    Ok(OutputProperties(out))
}

/// Who the provider is authenticated as, from the claims of its token.
pub async fn read_provider_config(
    credential: &dyn TokenCredential,
    scopes: &[String],
) -> Result<OutputProperties> {
    let token = credential.get_token(scopes).await?;
    let claims = token_claims(&token)?;

    let mut out = BTreeMap::new();
    for (output, claim) in [("tenant_id", "tid"), ("object_id", "oid"), ("client_id", "appid")] {
        let value = claims
            .get(claim)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Token(format!("the token has no {:?} claim", claim)))?;
        out.insert(output.to_string(), Value::from(value));
    }
    Ok(OutputProperties(out))
}

/// The payload of a JWT. The signature is not verified.
fn token_claims(token: &AccessToken) -> Result<Value> {
    let payload = token
        .secret()
        .split('.')
        .nth(1)
        .ok_or_else(|| Error::Token("not a JWT".into()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| Error::Token(format!("payload is not base64url: {}", e)))?;
    let claims = graphops_dynamic::decode(&bytes)
        .map_err(|e| Error::Token(format!("payload is not JSON: {}", e)))?;
    if claims.as_map().is_none() {
        return Err(Error::Token("payload is not a JSON object".into()));
    }
    Ok(claims)
}
