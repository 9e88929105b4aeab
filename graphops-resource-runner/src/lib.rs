use std::{
    io::{BufRead, BufReader, Write},
    process::{Command, Stdio},
};

use anyhow::{bail, Context, Result};
use graphops_resource::schema::v0;

pub struct ResourceProviderConfig {
    pub provider_executable: String,
    pub provider_args: Vec<String>,
}

/// Runs a provider process per request.
pub struct ResourceProviderClient {
    provider_config: ResourceProviderConfig,
}

impl ResourceProviderClient {
    pub fn new(provider_config: ResourceProviderConfig) -> Self {
        ResourceProviderClient { provider_config }
    }

    /// Send `request` to a fresh provider process and return its response.
    ///
    /// An error response, or a process that exits unsuccessfully, is an
    /// error.
    pub fn request(&self, request: &v0::Request) -> Result<v0::Response> {
        let request_line = serde_json::to_string(request).context("Could not encode request")?;
        let executable = &self.provider_config.provider_executable;
        tracing::debug!(%executable, "spawning provider");

        let mut process = Command::new(executable)
            .args(&self.provider_config.provider_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("Could not spawn provider process {}", executable))?;

        let response_line = {
            let mut child_in = process.stdin.take().context("provider stdin")?;
            let child_out = process.stdout.take().context("provider stdout")?;

            child_in.write_all(request_line.as_bytes())?;
            child_in.write_all(b"\n")?;
            child_in.flush()?;
            // This closes stdin
            drop(child_in);

            let mut line = String::new();
            BufReader::new(child_out)
                .read_line(&mut line)
                .context("Could not read response from provider")?;
            line
        };

        let status = process.wait()?;

        if response_line.trim().is_empty() {
            bail!("Provider {} exited with {} without a response", executable, status);
        }
        let response: v0::Response = serde_json::from_str(&response_line)
            .with_context(|| format!("Could not parse provider response: {}", response_line))?;
        if let v0::Response::ErrorResponse(e) = response {
            bail!("Provider {} failed: {}", executable, e.message);
        }
        if !status.success() {
            bail!("Provider {} exited with {}", executable, status);
        }
        Ok(response)
    }
}
