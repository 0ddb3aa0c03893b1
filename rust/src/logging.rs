use tracing_subscriber::prelude::*;

const DEFAULT_FILTER: &str = "plantops_core=debug,info";

/// Stderr logging filtered by `RUST_LOG` (default `plantops_core=debug,info`).
///
/// With a `data_dir`, events are also appended to `<data_dir>/plantops.log` so
/// a field device's log can be pulled after the fact. Safe to call more than
/// once; only the first call installs a subscriber.
pub fn init_logging(data_dir: Option<&str>) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_FILTER.into());

    let file_layer = data_dir.and_then(|dir| {
        let _ = std::fs::create_dir_all(dir);
        let log_path = std::path::Path::new(dir).join("plantops.log");
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .ok()
            .map(|file| {
                tracing_subscriber::fmt::layer()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false)
                    .with_target(true)
            })
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();
}
