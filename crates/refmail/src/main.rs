use clap::Parser;

fn main() {
    let args = refmail::Args::parse();

    // Map the LOG_LEVEL variable to an equivalent tracing EnvFilter,
    // restricted to our own crates. Diagnostics go to stderr; stdout is
    // reserved for validation-mode output.
    let log_level = std::env::var("LOG_LEVEL").unwrap_or("info".to_string());
    let env_filter =
        tracing_subscriber::EnvFilter::new(format!("refmail={log_level},subprocess={log_level}"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build();

    let runtime = match runtime {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!(%error, "couldn't build Tokio runtime");
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(refmail::run(args));

    // Shut down without waiting for background tasks: an abandoned blocking
    // read of stdin would otherwise hold the runtime open.
    runtime.shutdown_background();

    match result {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            tracing::error!(error = format!("{error:#}"), "refmail-hook failed");
            std::process::exit(1);
        }
    }
}
