//! The graphops-resource-runner executable
//!
//! Sends one request to a resource provider and prints the response, so that
//! providers can be exercised without a host orchestrator.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, CommandFactory, Parser, Subcommand};
use graphops_dynamic::Value;
use graphops_resource::schema::v0;
use graphops_resource_runner::{ResourceProviderClient, ResourceProviderConfig};

fn main() -> Result<()> {
    let args = Args::parse();

    let (provider, request) = match &args.command {
        Commands::Create { provider, inputs } => (
            provider,
            v0::Request::CreateResourceRequest(v0::CreateResourceRequest {
                type_: provider.resource_type(),
                input_properties: inputs.gather()?,
                is_stateful: true,
            }),
        ),
        Commands::Read {
            provider,
            inputs,
            outputs,
        } => (
            provider,
            v0::Request::ReadResourceRequest(v0::ReadResourceRequest {
                resource: provider.extant(inputs.gather()?, Some(outputs))?,
            }),
        ),
        Commands::Update {
            provider,
            inputs,
            outputs,
        } => {
            let inputs = inputs.gather()?;
            (
                provider,
                v0::Request::UpdateResourceRequest(v0::UpdateResourceRequest {
                    resource: provider.extant(inputs.clone(), Some(outputs))?,
                    input_properties: inputs,
                }),
            )
        }
        Commands::Destroy {
            provider,
            inputs,
            outputs,
        } => (
            provider,
            v0::Request::DestroyResourceRequest(v0::DestroyResourceRequest {
                resource: provider.extant(inputs.gather()?, Some(outputs))?,
            }),
        ),
        Commands::Import {
            provider,
            inputs,
            id,
        } => (
            provider,
            v0::Request::ImportResourceRequest(v0::ImportResourceRequest {
                type_: provider.resource_type(),
                id: id.clone(),
                input_properties: inputs.gather()?,
            }),
        ),
        Commands::Plan {
            provider,
            inputs,
            outputs,
        } => {
            let inputs = inputs.gather()?;
            let resource = match outputs {
                Some(outputs) => Some(provider.extant(inputs.clone(), Some(outputs))?),
                None => None,
            };
            (
                provider,
                v0::Request::PlanResourceRequest(v0::PlanResourceRequest {
                    resource,
                    input_properties: inputs,
                }),
            )
        }
        Commands::ReadData { provider, inputs } => (
            provider,
            v0::Request::ReadDataSourceRequest(v0::ReadDataSourceRequest {
                type_: provider.resource_type(),
                input_properties: inputs.gather()?,
            }),
        ),
        Commands::GenerateMan => {
            let cmd = Args::command();
            let man = clap_mangen::Man::new(cmd);
            let mut buffer: Vec<u8> = Default::default();
            man.render(&mut buffer)?;
            println!("{}", String::from_utf8(buffer)?);
            return Ok(());
        }
        Commands::GenerateMarkdown => {
            let opts = clap_markdown::MarkdownOptions::new().show_footer(false);
            let markdown: String = clap_markdown::help_markdown_custom::<Args>(&opts);
            println!("{}", markdown);
            return Ok(());
        }
        Commands::GenerateCompletion { shell } => {
            let mut cmd = Args::command();
            clap_complete::generate(
                *shell,
                &mut cmd,
                "graphops-resource-runner",
                &mut std::io::stdout(),
            );
            return Ok(());
        }
    };

    let client = ResourceProviderClient::new(ResourceProviderConfig {
        provider_executable: provider.provider_exe.clone(),
        provider_args: vec!["run".to_string()],
    });
    let response = client.request(&request)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Run graphops resource providers by hand
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(ClapArgs, Debug)]
struct ProviderArgs {
    /// The executable that implements the resource operations
    #[arg(long)]
    provider_exe: String,

    /// The type of resource: an identifier recognized by the resource provider
    #[arg(long("type"))]
    resource_type: String,
}

impl ProviderArgs {
    fn resource_type(&self) -> v0::ResourceType {
        v0::ResourceType(self.resource_type.clone())
    }

    fn extant(
        &self,
        inputs: v0::InputProperties,
        outputs_json: Option<&String>,
    ) -> Result<v0::ExtantResource> {
        let output_properties = match outputs_json {
            Some(json) => Some(v0::OutputProperties(
                serde_json::from_str(json).context("failed to parse value of --outputs-json")?,
            )),
            None => None,
        };
        Ok(v0::ExtantResource {
            type_: self.resource_type(),
            input_properties: inputs,
            output_properties,
        })
    }
}

#[derive(ClapArgs, Debug)]
struct InputArgs {
    /// The (whole) JSON input properties for the resource
    ///
    /// This is a JSON object with the values needed to create the resource.
    /// The structure of this object is defined by the resource provider behavior.
    #[arg(long("inputs-json"))]
    input_properties_json: Option<String>,

    /// An individual input property for the resource, in JSON format
    #[arg(long("input-json"),short('j'),number_of_values = 2, value_names = &["NAME", "JSON"])]
    input_property_json: Vec<String>,

    /// An individual input property for the resource, as a raw string.
    ///
    /// This is equivalent to `--input-json NAME JSON` if JSON is the JSON string formatting of STR.
    #[arg(long("input-str"),short('s'),number_of_values = 2, value_names = &["NAME", "STR"])]
    input_property_str: Vec<String>,
}

impl InputArgs {
    /// Gather all input properties.
    ///
    /// NOTE (loss of ordering):
    ///
    /// clap_derive appears incapable of preserving the order of flags, as it
    /// rejects a Vec of enums that would allow for this. This means that we
    /// can't tell which input property was specified last, and so we can't
    /// make later inputs override earlier ones. We carve out this possibility
    /// by rejecting duplicate inputs.
    fn gather(&self) -> Result<v0::InputProperties> {
        let mut inputs: BTreeMap<String, Value> = match &self.input_properties_json {
            Some(json_string) => serde_json::from_str(json_string)
                .context("failed to parse value of --inputs-json")?,
            None => BTreeMap::new(),
        };

        let json_pairs = self
            .input_property_json
            .chunks(2)
            .map(|pair| -> Result<(String, Value)> {
                let value = serde_json::from_str(&pair[1]).with_context(|| {
                    format!("failed to parse JSON value for input: {}", pair[0])
                })?;
                Ok((pair[0].clone(), value))
            });
        let str_pairs = self
            .input_property_str
            .chunks(2)
            .map(|pair| -> Result<(String, Value)> {
                Ok((pair[0].clone(), Value::String(pair[1].clone())))
            });

        for pair in json_pairs.chain(str_pairs) {
            let (name, value) = pair?;
            if inputs.contains_key(&name) {
                // No overriding; see note "loss of ordering"
                bail!("duplicate input: {}", name);
            }
            inputs.insert(name, value);
        }
        Ok(v0::InputProperties(inputs))
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a resource
    Create {
        #[command(flatten)]
        provider: ProviderArgs,
        #[command(flatten)]
        inputs: InputArgs,
    },

    /// Refresh a resource's state
    Read {
        #[command(flatten)]
        provider: ProviderArgs,
        #[command(flatten)]
        inputs: InputArgs,
        /// The resource's current output properties, as a JSON object
        #[arg(long("outputs-json"))]
        outputs: String,
    },

    /// Update a resource to new input properties
    Update {
        #[command(flatten)]
        provider: ProviderArgs,
        #[command(flatten)]
        inputs: InputArgs,
        /// The resource's current output properties, as a JSON object
        #[arg(long("outputs-json"))]
        outputs: String,
    },

    /// Destroy a resource
    Destroy {
        #[command(flatten)]
        provider: ProviderArgs,
        #[command(flatten)]
        inputs: InputArgs,
        /// The resource's current output properties, as a JSON object
        #[arg(long("outputs-json"))]
        outputs: String,
    },

    /// Adopt an existing remote object
    Import {
        #[command(flatten)]
        provider: ProviderArgs,
        #[command(flatten)]
        inputs: InputArgs,
        /// The provider-specific identifier of the object
        #[arg(long)]
        id: String,
    },

    /// Show what applying the inputs would do
    Plan {
        #[command(flatten)]
        provider: ProviderArgs,
        #[command(flatten)]
        inputs: InputArgs,
        /// The resource's current output properties; omit for a new resource
        #[arg(long("outputs-json"))]
        outputs: Option<String>,
    },

    /// Read a data source
    ReadData {
        #[command(flatten)]
        provider: ProviderArgs,
        #[command(flatten)]
        inputs: InputArgs,
    },

    /// Generate markdown documentation for graphops-resource-runner
    #[command(hide = true)]
    GenerateMarkdown,

    /// Generate a manpage for graphops-resource-runner
    #[command(hide = true)]
    GenerateMan,

    /// Generate shell completion
    #[command(hide = true)]
    GenerateCompletion {
        /// The shell to generate completion for
        #[arg(long)]
        shell: clap_complete::Shell,
    },
}
