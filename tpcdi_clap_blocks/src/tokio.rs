//! Config for the tokio runtime that drives every command.

use std::{
    num::NonZeroUsize,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

/// Tokio runtime type.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum TokioRuntimeType {
    /// Current-thread runtime.
    CurrentThread,

    /// Multi-thread runtime.
    #[default]
    MultiThread,
}

#[cfg(unix)]
fn set_current_thread_priority(prio: i32) {
    // on linux setpriority sets the current thread's priority
    // (as opposed to the current process).
    unsafe { libc::setpriority(0, 0, prio) };
}

/// CLI config for the tokio IO runtime.
#[derive(Debug, Clone, clap::Parser)]
#[allow(missing_copy_implementations)]
pub struct TokioIoConfig {
    /// Set the maximum number of IO runtime threads to use.
    ///
    /// Defaults to the number of logical cores on the system.
    #[clap(
        id = "io_runtime_num_threads",
        long = "num-io-threads",
        env = "TPCDI_NUM_IO_THREADS",
        action
    )]
    pub num_threads: Option<NonZeroUsize>,

    /// IO tokio runtime type.
    #[clap(
        id = "io_runtime_type",
        long = "io-runtime-type",
        env = "TPCDI_IO_RUNTIME_TYPE",
        default_value_t = TokioRuntimeType::default(),
        value_enum,
        action
    )]
    pub runtime_type: TokioRuntimeType,

    /// Specifies the limit for additional threads spawned by the IO runtime.
    ///
    /// Blocking filesystem work (directory copies, file reads for upload) runs on these threads.
    #[clap(
        id = "io_runtime_max_blocking_threads",
        long = "io-runtime-max-blocking-threads",
        env = "TPCDI_IO_RUNTIME_MAX_BLOCKING_THREADS",
        action
    )]
    pub max_blocking_threads: Option<NonZeroUsize>,

    /// Sets a custom timeout for a thread in the blocking pool of the IO runtime.
    #[clap(
        id = "io_runtime_thread_keep_alive",
        long = "io-runtime-thread-keep-alive",
        env = "TPCDI_IO_RUNTIME_THREAD_KEEP_ALIVE",
        value_parser = humantime::parse_duration
    )]
    pub thread_keep_alive: Option<Duration>,

    /// Set thread priority of the IO runtime workers.
    #[clap(
        id = "io_runtime_thread_priority",
        long = "io-runtime-thread-priority",
        env = "TPCDI_IO_RUNTIME_THREAD_PRIORITY",
        action
    )]
    pub thread_priority: Option<i32>,
}

impl TokioIoConfig {
    /// Creates the tokio runtime builder.
    pub fn builder(&self) -> Result<::tokio::runtime::Builder, std::io::Error> {
        self.builder_with_name("IO")
    }

    /// Creates the tokio runtime builder with a custom thread name component.
    pub fn builder_with_name(&self, name: &str) -> Result<::tokio::runtime::Builder, std::io::Error> {
        // NOTE: no log macros will work here!
        //
        // That means use eprintln!() instead of error!() and so on. The log emitter
        // is initialised after the runtime has been built.

        let mut builder = match self.runtime_type {
            TokioRuntimeType::CurrentThread => ::tokio::runtime::Builder::new_current_thread(),
            TokioRuntimeType::MultiThread => ::tokio::runtime::Builder::new_multi_thread(),
        };

        builder.enable_time();
        builder.enable_io();

        let thread_counter = Arc::new(AtomicUsize::new(1));
        let name = name.to_owned();
        builder.thread_name_fn(move || {
            format!(
                "TPC-DI Tokio {} {}",
                name,
                thread_counter.fetch_add(1, Ordering::SeqCst)
            )
        });

        let num_threads = match self.num_threads {
            None => std::thread::available_parallelism()?,
            Some(n) => n,
        };
        builder.worker_threads(num_threads.get());

        if let Some(x) = self.max_blocking_threads {
            builder.max_blocking_threads(x.get());
        }

        if let Some(x) = self.thread_keep_alive {
            builder.thread_keep_alive(x);
        }

        #[allow(unused)]
        if let Some(x) = self.thread_priority {
            #[cfg(unix)]
            {
                builder.on_thread_start(move || set_current_thread_priority(x));
            }
            #[cfg(not(unix))]
            {
                use observability_deps::tracing::warn;

                warn!("Setting worker thread priority not supported on this platform");
            }
        }

        Ok(builder)
    }
}
