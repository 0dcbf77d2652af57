use s3s_gate::config::GateConfig;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(version)]
#[command(about = "Validates an s3s-gate configuration and builds its security provider")]
struct Opt {
    /// Path to the JSON configuration file.
    #[arg(long)]
    config: PathBuf,
}

fn setup_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();
}

fn check(opt: &Opt) -> anyhow::Result<()> {
    let config = GateConfig::from_path(&opt.config)?;
    let _provider = config.build_provider()?;
    info!(path = %opt.config.display(), denial_mode = ?config.denial_mode, "configuration ok");
    Ok(())
}

fn main() -> ExitCode {
    let opt = Opt::parse();
    setup_tracing();

    match check(&opt) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(path = %opt.config.display(), "{err:#}");
            ExitCode::FAILURE
        }
    }
}
