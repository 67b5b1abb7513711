use std::path::Path;

/// Initialise `env_logger` once for the process.
///
/// Logs go to `log_file` when it can be opened for appending (its parent is
/// created if needed), otherwise to stderr. `RUST_LOG` still overrides the
/// default `info` level.
pub fn init(log_file: Option<&Path>) {
    use env_logger::Target;
    use std::fs;
    use std::io;

    let target = log_file
        .map(|path| -> io::Result<Target> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            Ok(Target::Pipe(Box::new(file)))
        })
        .and_then(|res| res.ok())
        .unwrap_or(Target::Stderr);

    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .target(target)
        .try_init();
}
