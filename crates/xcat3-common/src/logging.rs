//! Logging setup shared by all three worker binaries. Generalized out of
//! a single-binary module into a shared crate; the dispatch structure
//! (color-coded stdout, daily rotating per-app file, a combined
//! full-trace file) is kept as designed.

use colored::Colorize;
use std::fs;
use std::path::Path;

fn level_filter_for(verbosity: u8) -> log::LevelFilter {
    match verbosity {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Info,
        3 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

fn colorize(level: log::Level, message: &std::fmt::Arguments) -> colored::ColoredString {
    let text = message.to_string();
    match level {
        log::Level::Error => text.red(),
        log::Level::Warn => text.yellow(),
        log::Level::Info => text.cyan(),
        log::Level::Debug => text.purple(),
        log::Level::Trace => text.normal(),
    }
}

/// Initialize global logging for `app_name` (`xcat3-api`,
/// `xcat3-conductor`, `xcat3-network-agent`) at the given verbosity.
pub fn init(app_name: &str, verbosity: u8) -> Result<(), fern::InitError> {
    let log_root = Path::new("log").join(app_name);
    fs::create_dir_all(&log_root)?;

    let stdout_dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                colorize(record.level(), message)
            ))
        })
        .level(level_filter_for(verbosity))
        .level_for(app_name.to_string(), log::LevelFilter::Trace)
        .chain(std::io::stdout());

    let today = chrono::Utc::now().format("%Y-%m-%d");
    let out_file_dispatch = fern::Dispatch::new()
        .level(log::LevelFilter::Trace)
        .filter(move |meta| meta.target().starts_with(app_name))
        .chain(fern::log_file(
            log_root.join(format!("{app_name}.{today}.log")),
        )?);

    let full_file_dispatch = fern::Dispatch::new()
        .level(log::LevelFilter::Trace)
        .chain(fern::log_file(
            log_root.join(format!("{app_name}.{today}.full.log")),
        )?);

    let files_dispatch = fern::Dispatch::new()
        .chain(out_file_dispatch)
        .chain(full_file_dispatch);

    fern::Dispatch::new()
        .chain(stdout_dispatch)
        .chain(files_dispatch)
        .apply()?;

    Ok(())
}
