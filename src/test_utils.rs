#[cfg(test)]
pub fn init() {
    tracing_subscriber::fmt::SubscriberBuilder::default()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init()
        .unwrap_or_default();
}

#[cfg(test)]
mod test {

    use tracing::Level;

    use crate::test_utils::init;

    #[test]
    fn test_tracing() {
        init();

        let span = tracing::span!(Level::INFO, "test_span", watcher = 3);

        let _enter = span.enter();
        tracing::warn!(clauses = 33, "trace");
        tracing::info!("info");
        tracing::debug!("debug");
    }

    #[test]
    fn test_init_tracing_twice() {
        crate::init_tracing();
        crate::init_tracing();
        tracing::info!("second init is ignored");
    }
}
