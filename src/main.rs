use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use mailpeek::config::ConfigArgs;

#[derive(Debug, Parser)]
#[command(
    name = "mailpeek",
    version,
    about = "Render the newest message of an Outlook mailbox"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the HTTP endpoint
    Serve(ServeArgs),
    /// Fetch and print the newest message once
    Fetch(FetchArgs),
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// Socket address to bind
    #[arg(long, env = "MAILPEEK_LISTEN", default_value = "0.0.0.0:3000")]
    listen: String,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Debug, Args)]
struct FetchArgs {
    #[arg(long, env = "MAILPEEK_REFRESH_TOKEN", hide_env_values = true)]
    refresh_token: Option<String>,

    #[arg(long, env = "MAILPEEK_CLIENT_ID")]
    client_id: Option<String>,

    /// Mailbox owner; required when the token resolves to IMAP
    #[arg(long)]
    email: Option<String>,

    #[arg(long, default_value = "INBOX")]
    mailbox: String,

    /// Print a standalone HTML document instead of JSON
    #[arg(long, default_value_t = false)]
    html: bool,

    /// Print the leading characters of the raw source
    #[arg(long, default_value_t = false)]
    raw: bool,

    /// Write the full raw source to stdout
    #[arg(long, default_value_t = false, conflicts_with = "raw")]
    download: bool,

    /// Log pipeline diagnostics at info level
    #[arg(long, default_value_t = false)]
    verbose: bool,

    #[command(flatten)]
    config: ConfigArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into())
                .add_directive(
                    "mailpeek=info".parse::<tracing_subscriber::filter::Directive>()?,
                ),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    commands::dispatch(cli).await
}

mod commands {
    use std::io::Write;

    use anyhow::{Context, Result};
    use mailpeek::config::AppConfig;
    use mailpeek::models::OutputFormat;
    use mailpeek::server;
    use mailpeek::service::{Delivery, MailRequest, MailService, ServiceOutcome};

    use super::{Cli, Commands, FetchArgs, ServeArgs};

    pub async fn dispatch(cli: Cli) -> Result<()> {
        match cli.command {
            Commands::Serve(args) => handle_serve(args).await,
            Commands::Fetch(args) => handle_fetch(args).await,
        }
    }

    async fn handle_serve(args: ServeArgs) -> Result<()> {
        let config = AppConfig::from(args.config);
        if config.static_graph.is_some() {
            tracing::info!("static graph credentials configured; refresh_token is optional");
        }
        let service = MailService::new(config).context("initialize mail service")?;
        let listener = tokio::net::TcpListener::bind(&args.listen)
            .await
            .with_context(|| format!("bind listener on {}", args.listen))?;
        server::serve(listener, service)
            .await
            .context("serve HTTP endpoint")
    }

    async fn handle_fetch(args: FetchArgs) -> Result<()> {
        let service =
            MailService::new(AppConfig::from(args.config)).context("initialize mail service")?;
        let request = MailRequest {
            refresh_token: args.refresh_token,
            client_id: args.client_id,
            email: args.email,
            mailbox: Some(args.mailbox),
            verbose: args.verbose,
        };
        let delivery = if args.download {
            Delivery::Download
        } else if args.raw {
            Delivery::RawSnippet
        } else if args.html {
            Delivery::Render(OutputFormat::Html)
        } else {
            Delivery::Render(OutputFormat::Json)
        };

        let outcome = service
            .fetch_latest(&request, delivery)
            .await
            .context("fetch newest message")?;

        match outcome {
            ServiceOutcome::Rendered(rendered) => {
                let text = rendered.into_text().context("render message")?;
                println!("{text}");
            }
            ServiceOutcome::RawSnippet(snippet) => println!("{snippet}"),
            ServiceOutcome::Download { source, .. } => {
                let mut stdout = std::io::stdout().lock();
                stdout
                    .write_all(&source)
                    .context("write raw message to stdout")?;
                stdout.flush().context("flush stdout")?;
            }
        }
        Ok(())
    }
}
