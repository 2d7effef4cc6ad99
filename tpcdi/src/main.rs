//! Entrypoint of the tpcdi binary

use dotenvy::dotenv;
use observability_deps::tracing::warn;
use tpcdi_clap_blocks::tokio::TokioIoConfig;
use trogging::{
    TroggingGuard,
    cli::LoggingConfigBuilderExt,
    tracing_subscriber::{Registry, prelude::*},
};

mod commands {
    pub(crate) mod batch;
    pub(crate) mod bronze;
    pub(crate) mod common;
    pub(crate) mod config;
    pub(crate) mod generate;
}

const VERSION_STRING: &str = env!("CARGO_PKG_VERSION");

enum ReturnCode {
    Failure = 1,
}

#[derive(Debug, clap::Parser)]
#[clap(
name = "tpcdi",
version = VERSION_STRING,
disable_help_flag = true,
arg(
clap::Arg::new("help")
.short('h')
.long("help")
.help("Print help information")
.action(clap::ArgAction::Help)
.global(true)
),
about = "TPC-DI benchmark loading tools",
long_about = r#"TPC-DI benchmark loading tools

Examples:
    # Stage batch 2 of the generated data for a job
    tpcdi batch prepare --central-path /tmp/tpcdi/sf=10 --job-name tpcdi-sf10 --batch-number 2

    # Generate raw data as instructed by the workflow builder
    tpcdi generate --context workflow_context.json --data-dir /dbfs

    # Print the template arguments of a workflow
    tpcdi config dag-args --context workflow_context.json

    # Build the bronze tables with extra verbose logging
    tpcdi bronze -v --settings pipeline.json --output-dir /tmp/tpcdi/bronze

    # Display all commands long form
    tpcdi --help
"#
)]
struct Config {
    #[clap(flatten)]
    runtime_config: TokioIoConfig,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, clap::Parser)]
enum Command {
    /// Discover, stage and clean up numbered batch directories
    Batch(commands::batch::Config),

    /// Build the bronze tables from the raw files
    Bronze(commands::bronze::Config),

    /// Print the configuration derived from a workflow context
    Config(commands::config::Config),

    /// Generate the raw files with DIGen and upload them
    Generate(commands::generate::Config),
}

fn main() -> Result<(), std::io::Error> {
    #[cfg(unix)]
    install_crash_handler(); // attempt to render a useful stacktrace to stderr

    // load all environment variables from .env before doing anything
    load_dotenv();

    let config: Config = clap::Parser::parse();

    let tokio_runtime = config.runtime_config.builder()?.build()?;

    tokio_runtime.block_on(async move {
        fn handle_init_logs(r: Result<TroggingGuard, trogging::Error>) -> TroggingGuard {
            match r {
                Ok(guard) => guard,
                Err(e) => {
                    eprintln!("Initializing logs failed: {e}");
                    std::process::exit(ReturnCode::Failure as _);
                }
            }
        }

        match config.command {
            None => println!("command required, -h/--help for help"),
            Some(Command::Batch(config)) => {
                let _tracing_guard =
                    handle_init_logs(init_logs_and_tracing(config.logging_config()));
                let status = commands::batch::command(config).await;
                println!("{status}");
                if status.is_failure() {
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
            Some(Command::Bronze(config)) => {
                let _tracing_guard =
                    handle_init_logs(init_logs_and_tracing(&config.logging_config));
                if let Err(e) = commands::bronze::command(config).await {
                    eprintln!("Bronze command failed: {e:#}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
            Some(Command::Config(config)) => {
                if let Err(e) = commands::config::command(config) {
                    eprintln!("Config command failed: {e:#}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
            Some(Command::Generate(config)) => {
                let _tracing_guard =
                    handle_init_logs(init_logs_and_tracing(&config.logging_config));
                if let Err(e) = commands::generate::command(config).await {
                    warn!(%e, "data generation failed");
                    eprintln!("Generate command failed: {e:#}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
        }
    });

    Ok(())
}

/// Source the .env file before initialising the Config struct - this sets
/// any envs in the file, which the Config struct then uses.
///
/// Precedence is given to existing env variables.
fn load_dotenv() {
    match dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            // Ignore this - a missing env file is not an error, defaults will
            // be applied when initialising the Config struct.
        }
        Err(e) => {
            eprintln!("FATAL Error loading config from: {e}");
            eprintln!("Aborting");
            std::process::exit(1);
        }
    };
}

// Based on ideas from
// https://github.com/servo/servo/blob/f03ddf6c6c6e94e799ab2a3a89660aea4a01da6f/ports/servo/main.rs#L58-L79
#[cfg(unix)]
fn install_crash_handler() {
    unsafe {
        set_signal_handler(libc::SIGSEGV, signal_handler); // handle segfaults
        set_signal_handler(libc::SIGILL, signal_handler); // handle stack overflow and unsupported CPUs
        set_signal_handler(libc::SIGBUS, signal_handler); // handle invalid memory access
    }
}

#[cfg(unix)]
unsafe extern "C" fn signal_handler(sig: i32) {
    use backtrace::Backtrace;
    use std::process::abort;
    let name = std::thread::current()
        .name()
        .map(|n| format!(" for thread \"{n}\""))
        .unwrap_or_default();
    eprintln!("Signal {sig}, Stack trace{name}\n{:?}", Backtrace::new());
    abort();
}

// based on https://github.com/adjivas/sig/blob/master/src/lib.rs#L34-L52
#[cfg(unix)]
unsafe fn set_signal_handler(signal: libc::c_int, handler: unsafe extern "C" fn(libc::c_int)) {
    use libc::{sigaction, sigfillset, sighandler_t};
    unsafe {
        let mut sigset = std::mem::zeroed();

        // Block all signals during the handler. This is the expected behavior, but
        // it's not guaranteed by `signal()`.
        if sigfillset(&mut sigset) != -1 {
            // Done because sigaction has private members.
            // This is safe because sa_restorer and sa_handlers are pointers that
            // might be null (that is, zero).
            let mut action: sigaction = std::mem::zeroed();

            action.sa_mask = sigset;
            action.sa_sigaction = handler as sighandler_t;

            sigaction(signal, &action, std::ptr::null_mut());
        }
    }
}

fn init_logs_and_tracing(
    config: &trogging::cli::LoggingConfig,
) -> Result<TroggingGuard, trogging::Error> {
    let log_layer = trogging::Builder::new()
        .with_default_log_filter("info")
        .with_logging_config(config)
        .build()?;

    let subscriber = Registry::default().with(log_layer);
    trogging::install_global(subscriber)
}
