//! Provider configuration.
//!
//! Configuration arrives as resource inputs prefixed with
//! [`CONFIG_PREFIX`]. Settings that are absent fall back to environment
//! variables, then to defaults.

use std::{collections::BTreeMap, fmt, time::Duration};

use graphops_dynamic::Value;

use crate::{
    api_version::ApiVersion,
    error::{Error, Result},
    rest::RetryPolicy,
};

pub const CONFIG_PREFIX: &str = "graph-provider-";

pub const DEFAULT_BASE_URL: &str = "https://graph.microsoft.com";
pub const DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Used by resources that do not name their own version.
    pub api_version: ApiVersion,
    pub base_url: String,
    pub scopes: Vec<String>,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// A bearer token to use as-is.
    pub access_token: Option<String>,
    pub use_cli: bool,
    pub use_oidc: bool,
    pub oidc_token: Option<String>,
    pub oidc_token_file_path: Option<String>,
    /// Where to request an OIDC token when none is given directly.
    pub oidc_request_url: Option<String>,
    pub oidc_request_token: Option<String>,
    /// Per HTTP call.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_version: ApiVersion::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            scopes: vec![DEFAULT_SCOPE.to_string()],
            tenant_id: None,
            client_id: None,
            client_secret: None,
            access_token: None,
            use_cli: true,
            use_oidc: false,
            oidc_token: None,
            oidc_token_file_path: None,
            oidc_request_url: None,
            oidc_request_token: None,
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(secret: &Option<String>) -> Option<&'static str> {
            secret.as_ref().map(|_| "<redacted>")
        }
        f.debug_struct("ProviderConfig")
            .field("api_version", &self.api_version)
            .field("base_url", &self.base_url)
            .field("scopes", &self.scopes)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("access_token", &redact(&self.access_token))
            .field("use_cli", &self.use_cli)
            .field("use_oidc", &self.use_oidc)
            .field("oidc_token", &redact(&self.oidc_token))
            .field("oidc_token_file_path", &self.oidc_token_file_path)
            .field("oidc_request_url", &self.oidc_request_url)
            .field("oidc_request_token", &redact(&self.oidc_request_token))
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ProviderConfig {
    /// Assemble the configuration from unprefixed settings, consulting `env`
    /// for each setting that is absent.
    pub fn from_settings(
        settings: &BTreeMap<String, Value>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<ProviderConfig> {
        let settings = Settings { settings, env: &env };
        let defaults = ProviderConfig::default();

        let api_version = match settings.string("api_version", &["MSGRAPH_API_VERSION"])? {
            Some(s) => s
                .parse()
                .map_err(|e| Error::Config(format!("api_version: {}", e)))?,
            None => defaults.api_version,
        };

        let scopes = match settings.get("scopes") {
            None => defaults.scopes,
            Some(Value::List(items)) if items.is_empty() => defaults.scopes,
            Some(Value::List(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| Error::Config("scopes must be a list of strings".into()))
                })
                .collect::<Result<_>>()?,
            Some(other) => {
                return Err(Error::Config(format!(
                    "scopes must be a list of strings, got {}",
                    other.kind()
                )))
            }
        };

        let timeout = match settings.number("timeout_seconds")? {
            Some(seconds) => Duration::from_secs(seconds),
            None => defaults.timeout,
        };

        let retry = RetryPolicy {
            max_retries: match settings.number("max_retries")? {
                Some(n) => u32::try_from(n)
                    .map_err(|_| Error::Config(format!("max_retries is too large: {}", n)))?,
                None => defaults.retry.max_retries,
            },
            ..defaults.retry
        };

        Ok(ProviderConfig {
            api_version,
            base_url: settings
                .string("base_url", &["MSGRAPH_BASE_URL"])?
                .unwrap_or(defaults.base_url),
            scopes,
            tenant_id: settings.string("tenant_id", &["ARM_TENANT_ID"])?,
            client_id: settings.string("client_id", &["ARM_CLIENT_ID"])?,
            client_secret: settings.string("client_secret", &["ARM_CLIENT_SECRET"])?,
            access_token: settings.string("access_token", &["MSGRAPH_ACCESS_TOKEN"])?,
            use_cli: settings
                .bool("use_cli", "ARM_USE_CLI")?
                .unwrap_or(defaults.use_cli),
            use_oidc: settings
                .bool("use_oidc", "ARM_USE_OIDC")?
                .unwrap_or(defaults.use_oidc),
            oidc_token: settings.string("oidc_token", &["ARM_OIDC_TOKEN"])?,
            oidc_token_file_path: settings
                .string("oidc_token_file_path", &["ARM_OIDC_TOKEN_FILE_PATH"])?,
            oidc_request_url: settings.string(
                "oidc_request_url",
                &["ARM_OIDC_REQUEST_URL", "ACTIONS_ID_TOKEN_REQUEST_URL"],
            )?,
            oidc_request_token: settings.string(
                "oidc_request_token",
                &["ARM_OIDC_REQUEST_TOKEN", "ACTIONS_ID_TOKEN_REQUEST_TOKEN"],
            )?,
            timeout,
            retry,
        })
    }
}

struct Settings<'a, E> {
    settings: &'a BTreeMap<String, Value>,
    env: &'a E,
}

impl<E: Fn(&str) -> Option<String>> Settings<'_, E> {
    fn get(&self, key: &str) -> Option<&Value> {
        self.settings.get(key).filter(|v| !v.is_null())
    }

    fn env(&self, names: &[&str]) -> Option<String> {
        names
            .iter()
            .find_map(|name| (self.env)(name).filter(|v| !v.is_empty()))
    }

    fn string(&self, key: &str, env: &[&str]) -> Result<Option<String>> {
        match self.get(key) {
            None => Ok(self.env(env)),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(Error::Config(format!(
                "{} must be a string, got {}",
                key,
                other.kind()
            ))),
        }
    }

    fn bool(&self, key: &str, env: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(self.env(&[env]).map(|v| v == "true")),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(Error::Config(format!(
                "{} must be a bool, got {}",
                key,
                other.kind()
            ))),
        }
    }

    fn number(&self, key: &str) -> Result<Option<u64>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(|| {
                Error::Config(format!("{} must be a non-negative integer, got {}", key, n))
            }),
            Some(other) => Err(Error::Config(format!(
                "{} must be a number, got {}",
                key,
                other.kind()
            ))),
        }
    }
}

/// Separate prefixed provider settings from the resource's own inputs.
///
/// The returned settings have the prefix stripped.
pub fn split_inputs(
    inputs: &BTreeMap<String, Value>,
) -> (BTreeMap<String, Value>, BTreeMap<String, Value>) {
    let mut settings = BTreeMap::new();
    let mut resource = BTreeMap::new();
    for (key, value) in inputs {
        match key.strip_prefix(CONFIG_PREFIX) {
            Some(setting) => {
                settings.insert(setting.to_string(), value.clone());
            }
            None => {
                resource.insert(key.clone(), value.clone());
            }
        }
    }
    (settings, resource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    fn settings(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn defaults() {
        let config = ProviderConfig::from_settings(&BTreeMap::new(), env(&[])).unwrap();
        assert_eq!(config, ProviderConfig::default());
        assert_eq!(config.api_version, ApiVersion::V1_0);
        assert_eq!(config.scopes, [DEFAULT_SCOPE]);
        assert!(config.use_cli);
        assert!(!config.use_oidc);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.retry.max_retries, 30);
    }

    #[test]
    fn environment_fills_absent_settings() {
        let config = ProviderConfig::from_settings(
            &settings(&[("tenant_id", Value::from("from-input"))]),
            env(&[
                ("ARM_TENANT_ID", "from-env"),
                ("ARM_CLIENT_ID", "client-from-env"),
                ("MSGRAPH_API_VERSION", "beta"),
                ("ARM_USE_CLI", "false"),
                ("ARM_USE_OIDC", "true"),
                ("ARM_OIDC_TOKEN_FILE_PATH", "/run/token"),
            ]),
        )
        .unwrap();
        assert_eq!(config.tenant_id.as_deref(), Some("from-input"));
        assert_eq!(config.client_id.as_deref(), Some("client-from-env"));
        assert_eq!(config.api_version, ApiVersion::Beta);
        assert!(!config.use_cli);
        assert!(config.use_oidc);
        assert_eq!(config.oidc_token_file_path.as_deref(), Some("/run/token"));
    }

    #[test]
    fn oidc_request_from_github_actions() {
        let config = ProviderConfig::from_settings(
            &BTreeMap::new(),
            env(&[
                ("ACTIONS_ID_TOKEN_REQUEST_URL", "https://token.actions.example/idtoken"),
                ("ACTIONS_ID_TOKEN_REQUEST_TOKEN", "gh-token"),
            ]),
        )
        .unwrap();
        assert_eq!(
            config.oidc_request_url.as_deref(),
            Some("https://token.actions.example/idtoken")
        );
        assert_eq!(config.oidc_request_token.as_deref(), Some("gh-token"));
        assert!(!format!("{:?}", config).contains("gh-token"));

        let config = ProviderConfig::from_settings(
            &BTreeMap::new(),
            env(&[
                ("ARM_OIDC_REQUEST_TOKEN", "arm-token"),
                ("ACTIONS_ID_TOKEN_REQUEST_TOKEN", "gh-token"),
            ]),
        )
        .unwrap();
        assert_eq!(config.oidc_request_token.as_deref(), Some("arm-token"));
    }

    #[test]
    fn boolean_environment_values() {
        for (value, expected) in [("true", true), ("TRUE", false), ("1", false), ("yes", false)] {
            let config =
                ProviderConfig::from_settings(&BTreeMap::new(), env(&[("ARM_USE_OIDC", value)]))
                    .unwrap();
            assert_eq!(config.use_oidc, expected, "ARM_USE_OIDC={}", value);
        }
        let config =
            ProviderConfig::from_settings(&BTreeMap::new(), env(&[("ARM_USE_CLI", "")])).unwrap();
        assert!(config.use_cli);
    }

    #[test]
    fn explicit_settings() {
        let config = ProviderConfig::from_settings(
            &settings(&[
                ("api_version", Value::from("beta")),
                ("use_cli", Value::from(false)),
                ("scopes", Value::List(vec![Value::from("a"), Value::from("b")])),
                ("timeout_seconds", Value::from(5i64)),
                ("max_retries", Value::from(0i64)),
                ("access_token", Value::from("tok")),
            ]),
            env(&[("MSGRAPH_API_VERSION", "v1.0"), ("ARM_USE_CLI", "true")]),
        )
        .unwrap();
        assert_eq!(config.api_version, ApiVersion::Beta);
        assert!(!config.use_cli);
        assert_eq!(config.scopes, ["a", "b"]);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.retry.max_wait, Duration::from_secs(30));
        assert!(!format!("{:?}", config).contains("tok\""));
    }

    #[test]
    fn rejects_invalid_settings() {
        let err = ProviderConfig::from_settings(
            &settings(&[("api_version", Value::from("v2"))]),
            env(&[]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("v2"), "{}", err);

        assert!(
            ProviderConfig::from_settings(&BTreeMap::new(), env(&[("MSGRAPH_API_VERSION", "v2")]))
                .is_err()
        );
        assert!(ProviderConfig::from_settings(
            &settings(&[("use_cli", Value::from("true"))]),
            env(&[])
        )
        .is_err());
        assert!(ProviderConfig::from_settings(
            &settings(&[("timeout_seconds", Value::from(-1i64))]),
            env(&[])
        )
        .is_err());
    }

    #[test]
    fn splits_prefixed_inputs() {
        let inputs = settings(&[
            ("graph-provider-api_version", Value::from("beta")),
            ("collection", Value::from("groups")),
            ("properties", Value::Map(BTreeMap::new())),
        ]);
        let (config, resource) = split_inputs(&inputs);
        assert_eq!(config.keys().collect::<Vec<_>>(), ["api_version"]);
        assert_eq!(
            resource.keys().collect::<Vec<_>>(),
            ["collection", "properties"]
        );
    }
}
