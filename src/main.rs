//! regulator: detect drift with observations, remediate it with reactions
//!
//! See the library docs for the catalogue format.

use clap::Parser;
use tracing::{debug, error};

use regulator::cli::{execute_command, Cli};
use regulator::exec::ProcessRunner;
use regulator::input::choose_sources;
use regulator::{Config, DefaultImplements, Regulator, RunSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.global.config)?;
    cli.global.apply(&mut config);

    // Logs go to stderr, results to stdout
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("regulator={}", config.log.level).parse()?),
        )
        .init();

    debug!(?config, "Effective configuration");

    let runner = ProcessRunner::new(config.exec.timeout(), config.remote.ssh_binary.clone());
    let settings = RunSettings {
        remote: config.remote.target(),
        dry_run: cli.global.dry_run,
    };
    let mut regulator = Regulator::new(
        DefaultImplements::builtin(&config.exec.shell),
        Box::new(runner),
        settings,
    );

    let result = async {
        let sources = choose_sources(&cli.global.source_files(&config), cli.global.stdin)?;
        regulator.load(&sources)?;
        execute_command(&mut regulator, cli.command).await
    }
    .await;

    match result {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            if e.is_invalid_input() {
                eprintln!("\nRun 'regulator --help' for usage.");
            }
            std::process::exit(1);
        }
    }
}
