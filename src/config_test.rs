use super::*;

// =============================================================================
// env_parse
// =============================================================================

#[test]
fn env_parse_missing_returns_default() {
    let val: usize = env_parse("__TEST_CURATOR_NONEXISTENT_KEY__", 42);
    assert_eq!(val, 42);
}

#[test]
fn env_parse_present_valid() {
    unsafe { std::env::set_var("__TEST_CURATOR_EP_VALID__", "99") };
    let val: usize = env_parse("__TEST_CURATOR_EP_VALID__", 0);
    assert_eq!(val, 99);
    unsafe { std::env::remove_var("__TEST_CURATOR_EP_VALID__") };
}

#[test]
fn env_parse_present_invalid_returns_default() {
    unsafe { std::env::set_var("__TEST_CURATOR_EP_INVALID__", "lots") };
    let val: u64 = env_parse("__TEST_CURATOR_EP_INVALID__", 7);
    assert_eq!(val, 7);
    unsafe { std::env::remove_var("__TEST_CURATOR_EP_INVALID__") };
}

// =============================================================================
// CuratorConfig
// =============================================================================

#[test]
fn default_config_matches_constants() {
    let config = CuratorConfig::default();
    assert_eq!(config.store_batch_limit, 500);
    assert_eq!(config.bulk_item_delay_ms, DEFAULT_BULK_ITEM_DELAY_MS);
    assert_eq!(config.upload.max_attempts, DEFAULT_UPLOAD_MAX_ATTEMPTS);
    assert_eq!(config.media_dir, PathBuf::from(DEFAULT_MEDIA_DIR));
}

#[test]
fn upload_backoff_escalates_per_attempt() {
    let policy = UploadPolicy { max_attempts: 3, retry_base_ms: 100, timeout_secs: 1 };
    assert_eq!(policy.backoff(1), Duration::from_millis(100));
    assert_eq!(policy.backoff(2), Duration::from_millis(200));
    assert_eq!(policy.backoff(3), Duration::from_millis(300));
    assert_eq!(policy.timeout(), Duration::from_secs(1));
}

#[test]
fn bulk_item_delay_converts_millis() {
    let config = CuratorConfig { bulk_item_delay_ms: 0, ..CuratorConfig::default() };
    assert_eq!(config.bulk_item_delay(), Duration::ZERO);
}
