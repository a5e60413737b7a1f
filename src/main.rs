use clap::Parser;
use wpdev::cli::{Cli, Commands};
use wpdev::commands::{self, Session};
use wpdev::error::EnvError;
use wpdev::settings::Settings;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let debug = cli.global.debug;

    // Logs go to stderr; stdout carries command output only.
    let default_filter = if debug { "warn,wpdev=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            report(e, debug);
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let settings = Settings::from_env(cli.global.home);
    let session = Session::new(settings, cli.global.slug)?;

    match cli.command {
        Commands::Create { options } => commands::create::run(&session, &options).await?,
        Commands::Update { options } => commands::update::run(&session, &options).await?,
        Commands::Start {
            skip_rebuild,
            skip_wp_versions_check,
            timeout,
        } => {
            commands::start::run(&session, skip_rebuild, skip_wp_versions_check, timeout).await?
        }
        Commands::Stop => commands::stop::run(&session).await?,
        Commands::Destroy { soft } => commands::destroy::run(&session, soft).await?,
        Commands::Info { all, extended } => commands::info::run(&session, all, extended).await?,
        Commands::List => commands::info::run(&session, true, false).await?,
        Commands::Exec { command } => return commands::exec::run(&session, &command).await,
        Commands::Shell {
            root,
            service,
            command,
        } => return commands::shell::run(&session, root, service, command).await,
        Commands::Logs { follow, service } => {
            commands::logs::run(&session, follow, service).await?
        }
    }
    Ok(0)
}

/// Print an error for a human. Typed errors get their diagnostic help;
/// the full debug chain is shown only with `--debug`.
fn report(err: anyhow::Error, debug: bool) {
    match err.downcast::<EnvError>() {
        Ok(env_err) => {
            let debug_repr = debug.then(|| format!("{:?}", env_err));
            eprintln!("{:?}", miette::Report::new(env_err));
            if let Some(repr) = debug_repr {
                eprintln!("{}", repr);
            }
        }
        Err(other) => {
            eprintln!("Error: {:#}", other);
            if debug {
                eprintln!("{:?}", other);
            }
        }
    }
}
