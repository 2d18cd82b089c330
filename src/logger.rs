use chrono::Local;
use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

/// Info by default, Debug when `verbose`. `RUST_LOG` overrides both.
pub fn init(verbose: bool) {
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    let result = Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level)
        // Keep the DevTools transport chatter out of debug output.
        .filter(Some("headless_chrome"), LevelFilter::Warn)
        .parse_default_env()
        .try_init();

    if result.is_ok() {
        log::info!("Logger initialized.");
    }
}
