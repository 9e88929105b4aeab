use std::{
    fs::File,
    io::{BufRead, BufReader, Write},
    os::fd::{AsRawFd, FromRawFd, OwnedFd},
};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use nix::unistd::{dup, dup2};

use crate::schema::v0;

/// The operations a provider implements.
///
/// Only `create` is mandatory; the other operations fail with an
/// "unsupported" error unless the provider overrides them.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn create(&self, request: v0::CreateResourceRequest) -> Result<v0::CreateResourceResponse>;

    async fn read(&self, request: v0::ReadResourceRequest) -> Result<v0::ReadResourceResponse> {
        bail!("read is not supported for resource type {}", request.resource.type_.as_str())
    }

    async fn update(
        &self,
        request: v0::UpdateResourceRequest,
    ) -> Result<v0::UpdateResourceResponse> {
        bail!("update is not supported for resource type {}", request.resource.type_.as_str())
    }

    async fn destroy(
        &self,
        request: v0::DestroyResourceRequest,
    ) -> Result<v0::DestroyResourceResponse> {
        bail!("destroy is not supported for resource type {}", request.resource.type_.as_str())
    }

    async fn import(
        &self,
        request: v0::ImportResourceRequest,
    ) -> Result<v0::ImportResourceResponse> {
        bail!("import is not supported for resource type {}", request.type_.as_str())
    }

    async fn plan(&self, request: v0::PlanResourceRequest) -> Result<v0::PlanResourceResponse> {
        let type_ = request
            .resource
            .as_ref()
            .map(|r| r.type_.as_str())
            .unwrap_or("<new resource>");
        bail!("plan is not supported for resource type {}", type_)
    }

    async fn read_data_source(
        &self,
        request: v0::ReadDataSourceRequest,
    ) -> Result<v0::ReadDataSourceResponse> {
        bail!("data source {} is not supported", request.type_.as_str())
    }
}

/// Route a request to the matching provider operation.
pub async fn dispatch<P: ResourceProvider + ?Sized>(
    provider: &P,
    request: v0::Request,
) -> Result<v0::Response> {
    use v0::{Request as Rq, Response as Rs};
    Ok(match request {
        Rq::CreateResourceRequest(r) => Rs::CreateResourceResponse(
            provider.create(r).await.context("Could not create resource")?,
        ),
        Rq::ReadResourceRequest(r) => Rs::ReadResourceResponse(
            provider.read(r).await.context("Could not read resource")?,
        ),
        Rq::UpdateResourceRequest(r) => Rs::UpdateResourceResponse(
            provider.update(r).await.context("Could not update resource")?,
        ),
        Rq::DestroyResourceRequest(r) => Rs::DestroyResourceResponse(
            provider.destroy(r).await.context("Could not destroy resource")?,
        ),
        Rq::ImportResourceRequest(r) => Rs::ImportResourceResponse(
            provider.import(r).await.context("Could not import resource")?,
        ),
        Rq::PlanResourceRequest(r) => Rs::PlanResourceResponse(
            provider.plan(r).await.context("Could not plan resource")?,
        ),
        Rq::ReadDataSourceRequest(r) => Rs::ReadDataSourceResponse(
            provider
                .read_data_source(r)
                .await
                .context("Could not read data source")?,
        ),
    })
}

/// Serve a single request from the process's stdio and exit on failure.
pub async fn run_main(provider: impl ResourceProvider) {
    let pipe = init_stdio().unwrap_or_exit();
    let mut out = pipe.out;

    let result = async {
        let request: v0::Request = {
            let mut line = String::new();
            BufReader::new(pipe.in_)
                .read_line(&mut line)
                .context("Could not read line for request message")?;
            serde_json::from_str(&line).context("Could not parse request message")?
        };
        dispatch(&provider, request).await
    }
    .await;

    let (response, failed) = match result {
        Ok(response) => (response, false),
        Err(e) => {
            tracing::error!("{:?}", e);
            let message = format!("{:#}", e);
            (v0::Response::ErrorResponse(v0::ErrorResponse { message }), true)
        }
    };

    write_response(&mut out, &response)
        .context("Could not write response message")
        .unwrap_or_exit();
    if failed {
        std::process::exit(1);
    }
}

fn write_response(out: &mut File, response: &v0::Response) -> Result<()> {
    serde_json::to_writer(&mut *out, response)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

/// A pair of `T` values: one for input and one for output.
struct InOut<T> {
    in_: T,
    out: T,
}

/// Configure the standard input/output streams for the process.
/// This returns the communication channels with the host, and reconfigures
/// the stdio file descriptors as follows:
///
/// ```text
/// 0: /dev/null
/// 1: stderr
/// 2: stderr
/// ```
fn init_stdio() -> Result<InOut<File>> {
    let r = InOut {
        in_: dup_file(0).context("dup(0)")?,
        out: dup_file(1).context("dup(1)")?,
    };

    // 0: dev/null
    {
        let dev_null = File::open("/dev/null").context("Could not open /dev/null")?;
        dup2(dev_null.as_raw_fd(), 0).context("Could not dup2(/dev/null, 0)")?;
    }

    // 1: stderr
    dup2(2, 1).context("Could not dup2(2, 1)")?;

    // 2: stderr is left as is

    Ok(r)
}

fn dup_file(fd: i32) -> Result<File> {
    let new_fd = dup(fd)?;
    // SAFETY: `dup` returned a fresh descriptor that nothing else owns.
    let owned = unsafe { OwnedFd::from_raw_fd(new_fd) };
    Ok(File::from(owned))
}

trait GraphopsMainError<T> {
    type V;
    fn unwrap_or_exit(self) -> Self::V;
}
impl<T> GraphopsMainError<Result<T>> for Result<T> {
    type V = T;
    fn unwrap_or_exit(self) -> T {
        match self {
            Ok(v) => v,
            Err(e) => {
                eprintln!("Error: {:?}", e);
                std::process::exit(1);
            }
        }
    }
}
