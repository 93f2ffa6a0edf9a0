//! Logging setup (SPEC_FULL.md "Ambient stack additions"): a `fern`
//! dispatcher chaining a file sink and a stdout sink, timestamped via
//! `chrono`. Verbatim structure of the teacher's `setup_logging`
//! (hic-matrix/src/main.rs), generalized from a hard-coded `matrix.log`
//! to a caller-supplied log path and made optional (no file sink when
//! `log_file` is `None`) so tests and library callers don't need one.

use std::path::Path;

/// `-v`/`--verbose` occurrence count: 0 = info, 1 = debug, 2+ = trace.
pub fn setup_logging(verbosity: u64, log_file: Option<&Path>) -> Result<(), fern::InitError> {
    let level = match verbosity {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    let stdout_config = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.target(),
                record.level(),
                message
            ))
        })
        .chain(std::io::stdout());

    let mut dispatch = fern::Dispatch::new().level(level).chain(stdout_config);

    if let Some(path) = log_file {
        let file_config = fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "{}[{}][{}] {}",
                    chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                    record.target(),
                    record.level(),
                    message
                ))
            })
            .chain(fern::log_file(path)?);
        dispatch = dispatch.chain(file_config);
    }

    dispatch.apply()?;
    Ok(())
}
