use crate::Result;
use flexi_logger::{opt_format, Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming};
use std::path::Path;

/// Start the global logger.
///
/// The level comes from `RUST_LOG`, falling back to "info". Without a
/// directory logs go to stderr; with one they go to size-rotated files there.
/// Keep the returned handle alive for the lifetime of the program.
pub fn setup_logging(log_dir: Option<&Path>) -> Result<LoggerHandle> {
    let logger = Logger::try_with_env_or_str("info")?.format(opt_format);

    let logger = match log_dir {
        Some(dir) => logger
            .log_to_file(FileSpec::default().directory(dir))
            .rotate(
                Criterion::Size(10 * 1024 * 1024),
                Naming::Numbers,
                Cleanup::KeepLogFiles(7),
            ),
        None => logger.log_to_stderr(),
    };

    Ok(logger.start()?)
}
