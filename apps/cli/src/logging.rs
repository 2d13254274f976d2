use fern::{Dispatch, InitError};
use log::{Level, LevelFilter};
use std::io;
use yansi::Color;

pub fn setup_logging(filter: LevelFilter) -> Result<(), InitError> {
    Dispatch::new()
        // Exclude logs for crates that we use
        .level(LevelFilter::Off)
        // Include only the logs for this binary and its core library
        .level_for("fstab_writer", filter)
        .level_for("fstab_writer_core", filter)
        .format(|out, message, record| {
            let color = match record.level() {
                Level::Trace => Color::Cyan.style().bold(),
                Level::Debug => Color::Blue.style().bold(),
                Level::Error => Color::Red.style().bold(),
                Level::Warn => Color::Yellow.style().bold(),
                Level::Info => Color::Green.style().bold(),
            };

            out.finish(format_args!(" {} {}", color.paint(record.level()), message))
        })
        .chain(io::stderr())
        .apply()?;
    Ok(())
}

/// Maps the number of `-v` flags to a level filter.
pub fn level_from_verbosity(count: u8) -> LevelFilter {
    match count {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}
