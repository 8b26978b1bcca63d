use std::env;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use tagwatch_cli::commands::{config, doctor, subscriptions};

const BOT_TOKEN: &str = "123456:cli-test-secret";

const STORE: &str = r#"{
  "-1001": {
    "library/nginx": {
      "last_seen_tags": ["1.27", "latest"],
      "local_repo_path": "ops/nginx",
      "service_base_url": "https://git.example.org/api/v1/repos/",
      "api_token": "do-not-print"
    }
  },
  "42": {
    "grafana/grafana": { "last_seen_tags": ["11.0"] }
  }
}"#;

#[test]
fn subscriptions_dump_redacts_tokens() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tracked_repos.json");
    std::fs::write(&path, STORE).expect("write store");

    with_env(
        &[("TAGWATCH_TELEGRAM_BOT_TOKEN", BOT_TOKEN), ("TAGWATCH_STORAGE_PATH", path_str(&path))],
        || {
            let result = subscriptions::run(None);
            assert_eq!(result.exit_code, 0);
            assert!(!result.output.contains("do-not-print"));

            let payload = parse_payload(&result.output);
            assert_eq!(payload["status"], "ok");
            assert_eq!(payload["count"], 2);
            let nginx = &payload["subscriptions"][0];
            assert_eq!(nginx["chat_id"], -1001);
            assert_eq!(nginx["repository"], "library/nginx");
            assert_eq!(nginx["api_token"], "<redacted>");
            assert_eq!(payload["subscriptions"][1]["api_token"], "<unset>");
        },
    );
}

#[test]
fn subscriptions_can_be_filtered_by_chat() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tracked_repos.json");
    std::fs::write(&path, STORE).expect("write store");

    with_env(
        &[("TAGWATCH_TELEGRAM_BOT_TOKEN", BOT_TOKEN), ("TAGWATCH_STORAGE_PATH", path_str(&path))],
        || {
            let payload = parse_payload(&subscriptions::run(Some(42)).output);
            assert_eq!(payload["count"], 1);
            assert_eq!(payload["subscriptions"][0]["repository"], "grafana/grafana");
        },
    );
}

#[test]
fn subscriptions_reports_corrupt_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tracked_repos.json");
    std::fs::write(&path, "{ truncated").expect("write store");

    with_env(
        &[("TAGWATCH_TELEGRAM_BOT_TOKEN", BOT_TOKEN), ("TAGWATCH_STORAGE_PATH", path_str(&path))],
        || {
            let result = subscriptions::run(None);
            assert_eq!(result.exit_code, 3);
            let payload = parse_payload(&result.output);
            assert_eq!(payload["error_class"], "storage_unreadable");
        },
    );
}

#[test]
fn subscriptions_requires_valid_config() {
    with_env(&[], || {
        let result = subscriptions::run(None);
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "subscriptions");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_json_reports_all_checks() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tracked_repos.json");

    with_env(
        &[("TAGWATCH_TELEGRAM_BOT_TOKEN", BOT_TOKEN), ("TAGWATCH_STORAGE_PATH", path_str(&path))],
        || {
            let result = doctor::run(true);
            assert_eq!(result.exit_code, 0);

            let payload = parse_payload(&result.output);
            assert_eq!(payload["overall_status"], "pass");
            let names: Vec<&str> = payload["checks"]
                .as_array()
                .expect("checks array")
                .iter()
                .filter_map(|check| check["name"].as_str())
                .collect();
            assert_eq!(names, vec!["config_validation", "telegram_bot_token", "storage_readability"]);
            assert!(!result.output.contains("cli-test-secret"));
        },
    );
}

#[test]
fn doctor_fails_without_bot_token() {
    with_env(&[], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 1);
        assert!(result.output.contains("- [fail] config_validation"));
        assert!(result.output.contains("- [skip] storage_readability"));
    });
}

#[test]
fn config_attributes_env_sources_and_redacts_token() {
    with_env(
        &[("TAGWATCH_TELEGRAM_BOT_TOKEN", BOT_TOKEN), ("TAGWATCH_WATCH_INTERVAL_SECS", "120")],
        || {
            let output = config::run();
            assert!(output.contains(
                "- telegram.bot_token = 123456:*** (source: env (TAGWATCH_TELEGRAM_BOT_TOKEN))"
            ));
            assert!(output.contains(
                "- watch.interval_secs = 120 (source: env (TAGWATCH_WATCH_INTERVAL_SECS))"
            ));
            assert!(output.contains("- deploy.timeout_secs = 15 (source: default)"));
        },
    );
}

fn path_str(path: &std::path::Path) -> &str {
    path.to_str().expect("utf-8 temp path")
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "TAGWATCH_TELEGRAM_BOT_TOKEN",
        "TAGWATCH_TELEGRAM_API_BASE_URL",
        "TAGWATCH_TELEGRAM_POLL_TIMEOUT_SECS",
        "TAGWATCH_REGISTRY_BASE_URL",
        "TAGWATCH_REGISTRY_PAGE_SIZE",
        "TAGWATCH_REGISTRY_TIMEOUT_SECS",
        "TAGWATCH_WATCH_INTERVAL_SECS",
        "TAGWATCH_WATCH_FIRST_RUN_DELAY_SECS",
        "TAGWATCH_DEPLOY_TIMEOUT_SECS",
        "TAGWATCH_STORAGE_PATH",
        "TAGWATCH_SERVER_BIND_ADDRESS",
        "TAGWATCH_SERVER_HEALTH_CHECK_PORT",
        "TAGWATCH_LOGGING_LEVEL",
        "TAGWATCH_LOGGING_FORMAT",
        "TAGWATCH_LOG_LEVEL",
        "TAGWATCH_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(test_fn));

    for (key, value) in previous_values {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }

    if let Err(panic) = outcome {
        std::panic::resume_unwind(panic);
    }
}
