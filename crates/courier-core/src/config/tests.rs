use super::*;

#[test]
fn test_poller_config_defaults() {
    let p = PollerConfig::default();
    assert_eq!(p.poll_timeout_secs, 5);
    assert_eq!(p.backoff_base_secs, 1);
    assert_eq!(p.max_backoff_secs, 32);
    assert_eq!(p.max_concurrency, None);
    assert_eq!(p.lock_path, "courier.lock");
    assert!(p.discard_old_updates);
}

#[test]
fn test_empty_config_uses_defaults() {
    let cfg = parse("").unwrap();
    assert_eq!(cfg.poller, PollerConfig::default());
    assert_eq!(cfg.telegram.api_url, "https://api.telegram.org/bot");
    assert_eq!(cfg.telegram.request_timeout_secs, 10);
    assert_eq!(cfg.telegram.connect_timeout_secs, 5);
    assert_eq!(cfg.logging.level, "info");
    assert!(cfg.logging.file.is_none());
    assert!(cfg.logging.console);
}

#[test]
fn test_full_config_from_toml() {
    let toml_str = r#"
        [telegram]
        bot_token = "123456:ABC"

        [poller]
        poll_timeout_secs = 1
        backoff_base_secs = 1
        max_backoff_secs = 16
        max_concurrency = 100
        lock_path = "/tmp/bot.lock"
        discard_old_updates = false

        [logging]
        level = "debug"
        file = "bot.log"
        console = false
    "#;
    let cfg = parse(toml_str).unwrap();
    assert_eq!(cfg.telegram.bot_token, "123456:ABC");
    assert_eq!(cfg.poller.poll_timeout_secs, 1);
    assert_eq!(cfg.poller.max_backoff_secs, 16);
    assert_eq!(cfg.poller.max_concurrency, Some(100));
    assert_eq!(cfg.poller.lock_path, "/tmp/bot.lock");
    assert!(!cfg.poller.discard_old_updates);
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.logging.file.as_deref(), Some("bot.log"));
    assert!(!cfg.logging.console);
}

#[test]
fn test_zero_concurrency_rejected() {
    let err = parse("[poller]\nmax_concurrency = 0\n").unwrap_err();
    assert!(matches!(err, CourierError::Config(_)));
    assert!(err.to_string().contains("max_concurrency"));
}

#[test]
fn test_backoff_ceiling_below_base_rejected() {
    let err = parse("[poller]\nbackoff_base_secs = 8\nmax_backoff_secs = 4\n").unwrap_err();
    assert!(err.to_string().contains("max_backoff_secs"));

    let err = parse("[poller]\nbackoff_base_secs = 0\n").unwrap_err();
    assert!(err.to_string().contains("backoff_base_secs"));
}

#[test]
fn test_empty_lock_path_rejected() {
    let err = parse("[poller]\nlock_path = \"  \"\n").unwrap_err();
    assert!(err.to_string().contains("lock_path"));
}

#[test]
fn test_malformed_toml_is_config_error() {
    let err = parse("[poller\nfoo").unwrap_err();
    assert!(matches!(err, CourierError::Config(_)));
}

#[test]
fn test_load_missing_file_falls_back_to_defaults() {
    let cfg = load("/nonexistent/__courier_test__/config.toml").unwrap();
    assert_eq!(cfg.poller, PollerConfig::default());
}

#[test]
fn test_load_reads_file() {
    let tmp = std::env::temp_dir().join("__courier_test_load_config__.toml");
    std::fs::write(&tmp, "[poller]\npoll_timeout_secs = 30\n").unwrap();
    let cfg = load(tmp.to_str().unwrap()).unwrap();
    assert_eq!(cfg.poller.poll_timeout_secs, 30);
    let _ = std::fs::remove_file(&tmp);
}

#[test]
fn test_shellexpand_home() {
    if let Some(home) = std::env::var_os("HOME") {
        let expanded = shellexpand("~/courier.lock");
        assert_eq!(expanded, format!("{}/courier.lock", home.to_string_lossy()));
    }
    assert_eq!(shellexpand("/abs/courier.lock"), "/abs/courier.lock");
}

#[test]
fn test_token_redacted_in_debug() {
    let tg = TelegramConfig {
        bot_token: "123456:SECRET".into(),
        ..Default::default()
    };
    let dbg = format!("{tg:?}");
    assert!(dbg.contains("123456:***"));
    assert!(!dbg.contains("SECRET"));
    assert_eq!(redact(""), "<unset>");
    assert_eq!(redact("nocolon"), "***");
}
