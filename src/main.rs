//! Binary entry point: load configuration, install the tracing subscriber,
//! and dispatch the parsed CLI command (spec §0.B/§0.D).

use clap::Parser;
use tracing_subscriber::EnvFilter;
use voxlogica::cli::{self, Cli};
use voxlogica::config::Config;

fn main() -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("warning: failed to load configuration, using defaults ({e})");
        Config::default()
    });
    install_tracing(&config);

    let cli = Cli::parse();
    cli::dispatch(cli, config)
}

fn install_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    let result = match &config.logging.file {
        Some(path) => {
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("voxlogica.log"));
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            // leak the guard: it must outlive the subscriber, which lives for the process.
            std::mem::forget(guard);
            if config.logging.json {
                builder.json().with_writer(writer).try_init()
            } else {
                builder.with_writer(writer).try_init()
            }
        }
        None if config.logging.json => builder.json().try_init(),
        None => builder.try_init(),
    };
    if let Err(e) = result {
        eprintln!("warning: failed to install tracing subscriber ({e})");
    }
}
