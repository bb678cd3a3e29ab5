use std::io::Write;

use serial_test::serial;

use super::*;

#[test]
fn defaults_are_valid() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert!(settings.cache.enabled);
    assert_eq!(settings.cache.backend, CacheBackend::Memory);
    assert_eq!(settings.cache.ttl, Duration::from_secs(1200));
    assert!(settings.reader.record_views_on_cache_hit);
    assert_eq!(settings.ingest.analytics_retry_attempts.get(), 3);
    assert_eq!(settings.database.max_connections.get(), 8);
}

#[test]
fn redis_backend_requires_url() {
    let mut raw = RawSettings::default();
    raw.cache.backend = Some("redis".to_string());

    let err = Settings::from_raw(raw).expect_err("missing url");
    assert!(matches!(err, LoadError::Invalid { key: "cache.redis_url", .. }));
}

#[test]
fn disabled_redis_backend_does_not_require_url() {
    let mut raw = RawSettings::default();
    raw.cache.enabled = Some(false);
    raw.cache.backend = Some("redis".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(!settings.cache.enabled);
}

#[test]
fn zero_ttl_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.ttl_seconds = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero ttl");
    assert!(matches!(err, LoadError::Invalid { key: "cache.ttl_seconds", .. }));
}

#[test]
fn unknown_backend_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.backend = Some("memcached".to_string());

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn blank_database_url_is_treated_as_missing() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
}

#[test]
#[serial]
fn explicit_file_is_loaded() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    writeln!(
        file,
        "[logging]\nlevel = \"debug\"\njson = true\n\n[cache]\nttl_seconds = 60\n\n[reader]\nrecord_views_on_cache_hit = false"
    )
    .expect("write config");

    let settings = load(Some(file.path())).expect("load settings");

    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert!(matches!(settings.logging.format, LogFormat::Json));
    assert_eq!(settings.cache.ttl, Duration::from_secs(60));
    assert!(!settings.reader.record_views_on_cache_hit);
}

#[test]
#[serial]
fn environment_overrides_file() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    writeln!(file, "[reader]\nrecord_views_on_cache_hit = true").expect("write config");

    // SAFETY: serialized with every other test that reads the environment.
    unsafe { std::env::set_var("INKPOST__READER__RECORD_VIEWS_ON_CACHE_HIT", "false") };
    let loaded = load(Some(file.path()));
    unsafe { std::env::remove_var("INKPOST__READER__RECORD_VIEWS_ON_CACHE_HIT") };

    let settings = loaded.expect("load settings");
    assert!(!settings.reader.record_views_on_cache_hit);
}
