use odmlite::logger;

// One test per binary: log4rs installs a process-global logger.
#[test]
fn file_logging_can_be_reconfigured() {
    let first = tempfile::tempdir().unwrap();
    logger::configure_logging(Some(first.path()), Some("debug")).unwrap();
    log::info!("first sink");
    log::logger().flush();
    let text = std::fs::read_to_string(logger::log_file(first.path())).unwrap();
    assert!(text.contains("[INFO]"));
    assert!(text.contains("first sink"));

    let second = tempfile::tempdir().unwrap();
    logger::configure_logging(Some(&second.path().join("nested")), Some("warn")).unwrap();
    log::info!("filtered out");
    log::warn!("second sink");
    log::logger().flush();
    let text = std::fs::read_to_string(logger::log_file(&second.path().join("nested"))).unwrap();
    assert!(text.contains("second sink"));
    assert!(!text.contains("filtered out"));

    let stale = std::fs::read_to_string(logger::log_file(first.path())).unwrap();
    assert!(!stale.contains("second sink"));

    logger::configure_logging(None, Some("off")).unwrap();
}
