//! Log setup for the command line tools.
use clap_verbosity_flag::Level as VerboseLevel;
use tracing::Level;

/// Map the verbosity flags to a tracing level, one step above the flag's
/// own level. With the default `ErrorLevel`: no flag gives WARN, `-v` INFO,
/// `-vv` DEBUG and `-vvv` or more TRACE. `-q` keeps only errors.
pub fn verbose_level_to_trace(level: Option<VerboseLevel>) -> Level {
    match level {
        None => Level::ERROR,
        Some(VerboseLevel::Error) => Level::WARN,
        Some(VerboseLevel::Warn) => Level::INFO,
        Some(VerboseLevel::Info) => Level::DEBUG,
        Some(VerboseLevel::Debug) | Some(VerboseLevel::Trace) => Level::TRACE,
    }
}

pub fn logging_setup(level: Level) {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}
