use log::{LevelFilter, Log, Metadata};

/// Fans log records out to several loggers.
pub struct MultiLogger {
    loggers: Vec<Box<dyn Log>>,
    max_level: LevelFilter,
    global_filters: Vec<(String, LevelFilter)>,
}

impl Default for MultiLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiLogger {
    pub fn new() -> Self {
        Self {
            loggers: Vec::new(),
            max_level: LevelFilter::Trace,
            global_filters: Vec::new(),
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn Log>) -> Self {
        self.loggers.push(logger);
        self
    }

    pub fn with_max_level(mut self, max_level: LevelFilter) -> Self {
        self.max_level = max_level;
        self
    }

    /// Caps the level of records whose target starts with `target`, for every
    /// logger.
    pub fn with_global_filter(mut self, target: impl Into<String>, level: LevelFilter) -> Self {
        self.global_filters.push((target.into(), level));
        self
    }

    pub fn add_logger(&mut self, logger: Box<dyn Log>) {
        self.loggers.push(logger);
    }

    pub fn init(self) -> Result<(), log::SetLoggerError> {
        log::set_max_level(self.max_level);
        log::set_boxed_logger(Box::new(self))
    }

    fn passes_global_filters(&self, metadata: &Metadata) -> bool {
        if metadata.level() > self.max_level {
            return false;
        }

        // The longest matching prefix wins
        self.global_filters
            .iter()
            .filter(|(target, _)| metadata.target().starts_with(target.as_str()))
            .max_by_key(|(target, _)| target.len())
            .map_or(true, |(_, level)| metadata.level() <= *level)
    }
}

impl Log for MultiLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.passes_global_filters(metadata) && self.loggers.iter().any(|l| l.enabled(metadata))
    }

    fn log(&self, record: &log::Record) {
        if !self.passes_global_filters(record.metadata()) {
            return;
        }

        self.loggers
            .iter()
            .filter(|l| l.enabled(record.metadata()))
            .for_each(|l| l.log(record));
    }

    fn flush(&self) {
        self.loggers.iter().for_each(|l| l.flush());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use log::Level;

    #[derive(Default)]
    struct TestLogger {
        enabled: bool,
        got_logs: Arc<AtomicUsize>,
    }

    impl Log for TestLogger {
        fn enabled(&self, _: &Metadata) -> bool {
            self.enabled
        }

        fn log(&self, _: &log::Record) {
            self.got_logs.fetch_add(1, Ordering::Relaxed);
        }

        fn flush(&self) {
            // No-op
        }
    }

    #[test]
    fn test_enabled() {
        let multi_logger = MultiLogger::new()
            .with_logger(Box::new(TestLogger::default()))
            .with_logger(Box::new(TestLogger::default()));

        assert!(
            !multi_logger.enabled(&Metadata::builder().level(Level::Error).build()),
            "Logger should not be enabled"
        );

        let multi_logger = MultiLogger::new()
            .with_logger(Box::new(TestLogger::default()))
            .with_logger(Box::new(TestLogger {
                enabled: true,
                ..Default::default()
            }));

        assert!(
            multi_logger.enabled(&Metadata::builder().level(Level::Error).build()),
            "Logger should be enabled"
        );
    }

    #[test]
    fn test_filter() {
        let logger1 = Box::new(TestLogger {
            enabled: true,
            ..Default::default()
        });
        let logger1_state = logger1.got_logs.clone();
        let logger2 = Box::new(TestLogger::default());
        let logger2_state = logger2.got_logs.clone();

        let multi_logger = MultiLogger::new()
            .with_logger(logger1)
            .with_logger(logger2)
            .with_max_level(LevelFilter::Info);

        multi_logger.log(&log::Record::builder().level(Level::Info).build());
        multi_logger.log(&log::Record::builder().level(Level::Debug).build());

        assert_eq!(
            logger1_state.load(Ordering::Relaxed),
            1,
            "Logger 1 should have received only the info record"
        );
        assert_eq!(
            logger2_state.load(Ordering::Relaxed),
            0,
            "Logger 2 should not have received any record"
        );
    }

    #[test]
    fn test_global_filter() {
        let logger = Box::new(TestLogger {
            enabled: true,
            ..Default::default()
        });
        let state = logger.got_logs.clone();

        let multi_logger = MultiLogger::new()
            .with_logger(logger)
            .with_global_filter("gadget_api", LevelFilter::Info)
            .with_global_filter("gadget_api::config::layout", LevelFilter::Off);

        let record = |target: &'static str, level: Level| {
            multi_logger.log(&log::Record::builder().target(target).level(level).build())
        };
        record("gadget_api::config", Level::Debug);
        record("gadget_api::config", Level::Info);
        record("gadget_api::config::layout", Level::Error);
        record("gadget::engine", Level::Trace);

        assert_eq!(state.load(Ordering::Relaxed), 2);
    }
}
