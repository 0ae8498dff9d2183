use std::io::Write;

use riddler_core::config::{AppConfig, TaskKind};
use riddler_core::error::RiddleError;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[model]
provider = "groq"
model_id = "llama-3.1-8b-instant"
api_key = "gsk-test-key"
max_tokens = 300
temperature = 0.2

[model.retry]
max_retries = 4

[creative_model]
model_id = "llama-3.3-70b-versatile"
max_tokens = 600

[search]
api_key = "google-key"
engine_id = "cx-123"
max_results = 5

[gateway]
bind = "0.0.0.0:9999"
environment = "staging"

[sessions]
cleanup_interval_secs = 60
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.model.provider, "groq");
    assert_eq!(config.model.api_key, Some("gsk-test-key".to_string()));
    assert_eq!(config.model.retry.as_ref().map(|r| r.max_retries), Some(4));
    assert_eq!(config.model.retry.as_ref().map(|r| r.initial_backoff_ms), Some(500));

    let creative = config.model_for(TaskKind::Creative);
    assert_eq!(creative.model_id, "llama-3.3-70b-versatile");
    assert_eq!(creative.provider, "openai");
    assert_eq!(creative.max_tokens, 600);

    assert!(config.search_enabled());
    assert_eq!(config.search.as_ref().map(|s| s.provider.as_str()), Some("google"));
    assert_eq!(config.gateway.bind, "0.0.0.0:9999");
    assert_eq!(config.gateway.environment, "staging");
    assert_eq!(config.sessions.cleanup_interval_secs, 60);
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("RIDDLER_TEST_API_KEY", "expanded-key-value");

    let toml_content = r#"
[model]
model_id = "test-model"
api_key = "${RIDDLER_TEST_API_KEY}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.model.api_key, Some("expanded-key-value".to_string()));

    std::env::remove_var("RIDDLER_TEST_API_KEY");
}

#[test]
fn test_missing_file_is_config_not_found() {
    let err = AppConfig::load(std::path::Path::new("/nonexistent/riddler.toml")).unwrap_err();
    assert!(matches!(err, RiddleError::ConfigNotFound(_)));
}

#[test]
fn test_missing_model_section_is_rejected() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[gateway]\nbind = \"127.0.0.1:1\"\n").expect("write toml");

    let err = AppConfig::load(tmp.path()).unwrap_err();
    assert!(matches!(err, RiddleError::Config(_)));
}
