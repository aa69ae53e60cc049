use slog::{o, Drain, Logger};
use slog_async::{Async, OverflowStrategy};
use slog_envlogger::LogBuilder;
use slog_scope::GlobalLoggerGuard;
use slog_term::{FullFormat, TermDecorator};
use std::{panic, thread};

/// Initialize detector logging: terminal output filtered with the
/// `slog-envlogger` syntax, bridged to the `log` macros used throughout the
/// crate. The returned guard keeps the global logger installed.
pub fn init(filter: impl AsRef<str>) -> (Logger, GlobalLoggerGuard) {
    let format = FullFormat::new(TermDecorator::new().stdout().build())
        .use_utc_timestamp()
        .build()
        .fuse();
    let drain = Async::new(LogBuilder::new(format).parse(filter.as_ref()).build())
        .overflow_strategy(OverflowStrategy::Block)
        .build();
    let logger = Logger::root(drain.fuse(), o!());

    let guard = slog_scope::set_global_logger(logger.clone());
    slog_stdlog::init().expect("failed to register logger");

    // Panic output goes through the log drain as well.
    panic::set_hook(Box::new(|info| {
        let current = thread::current();
        log::error!(
            "thread '{}' {}",
            current.name().unwrap_or("<unnamed>"),
            info,
        );
    }));

    (logger, guard)
}
