use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use graphops_resources_msgraph::{interrupt, logging, provider::GraphProvider};

fn main() -> Result<()> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> Result<()> {
    let args = Args::parse();

    match &args.command {
        Commands::Run => {
            logging::set_up()?;
            let cancel = interrupt::set_up_process_interrupt_handler()?;
            graphops_resource::framework::run_main(GraphProvider::new(cancel)).await;
            Ok(())
        }
        Commands::GenerateMan => {
            let cmd = Args::command();
            let man = clap_mangen::Man::new(cmd);
            let mut buffer: Vec<u8> = Default::default();
            man.render(&mut buffer)?;
            println!("{}", String::from_utf8(buffer)?);
            Ok(())
        }
        Commands::GenerateMarkdown => {
            let opts = clap_markdown::MarkdownOptions::new().show_footer(false);
            let markdown: String = clap_markdown::help_markdown_custom::<Args>(&opts);
            println!("{}", markdown);
            Ok(())
        }
        Commands::GenerateCompletion { shell } => {
            let mut cmd = Args::command();
            clap_complete::generate(
                *shell,
                &mut cmd,
                "graphops-resources-msgraph",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    }
}

/// Microsoft Graph resource provider for graphops
///
/// Manages any Graph object by collection path, without a per-type schema.
/// Provider settings are read from `graph-provider-*` inputs, then from
/// the environment (`MSGRAPH_API_VERSION`, `ARM_TENANT_ID`, `ARM_CLIENT_ID`,
/// `ARM_CLIENT_SECRET`, `ARM_USE_CLI`, `ARM_USE_OIDC`, ...).
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve one provider request on stdin/stdout
    Run,

    /// Generate markdown documentation
    #[command(hide = true)]
    GenerateMarkdown,

    /// Generate a manpage
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
