use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use tagwatch_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

use super::redact_bot_token;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    render(&config, resolve_config_path(None))
}

fn render(config: &AppConfig, config_file_path: Option<PathBuf>) -> String {
    let sources = SourceLookup {
        file_doc: load_config_file_doc(config_file_path.as_deref()),
        file_path: config_file_path,
    };

    let entries: [(&str, String); 14] = [
        ("telegram.bot_token", redact_bot_token(config.telegram.bot_token.expose_secret())),
        ("telegram.api_base_url", config.telegram.api_base_url.clone()),
        ("telegram.poll_timeout_secs", config.telegram.poll_timeout_secs.to_string()),
        ("registry.base_url", config.registry.base_url.clone()),
        ("registry.page_size", config.registry.page_size.to_string()),
        ("registry.timeout_secs", config.registry.timeout_secs.to_string()),
        ("watch.interval_secs", config.watch.interval_secs.to_string()),
        ("watch.first_run_delay_secs", config.watch.first_run_delay_secs.to_string()),
        ("deploy.timeout_secs", config.deploy.timeout_secs.to_string()),
        ("storage.path", config.storage.path.display().to_string()),
        ("server.bind_address", config.server.bind_address.clone()),
        ("server.health_check_port", config.server.health_check_port.to_string()),
        ("logging.level", config.logging.level.clone()),
        ("logging.format", format!("{:?}", config.logging.format)),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value) in &entries {
        lines.push(render_line(key, value, sources.source_of(key)));
    }
    lines.join("\n")
}

/// `telegram.bot_token` → `TAGWATCH_TELEGRAM_BOT_TOKEN`.
fn env_key(key_path: &str) -> String {
    format!("TAGWATCH_{}", key_path.replace('.', "_").to_ascii_uppercase())
}

/// Short aliases accepted alongside the canonical env names.
fn env_aliases(key_path: &str) -> &'static [&'static str] {
    match key_path {
        "logging.level" => &["TAGWATCH_LOG_LEVEL"],
        "logging.format" => &["TAGWATCH_LOG_FORMAT"],
        _ => &[],
    }
}

struct SourceLookup {
    file_doc: Option<Value>,
    file_path: Option<PathBuf>,
}

impl SourceLookup {
    fn source_of(&self, key_path: &str) -> String {
        let canonical = env_key(key_path);
        let env_hit = std::iter::once(canonical.as_str())
            .chain(env_aliases(key_path).iter().copied())
            .find(|name| env::var_os(name).is_some());
        if let Some(name) = env_hit {
            return format!("env ({name})");
        }

        if let Some(doc) = &self.file_doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .file_path
                    .as_deref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use secrecy::SecretString;
    use tagwatch_core::config::AppConfig;

    use super::{contains_path, env_key, render};

    #[test]
    fn env_keys_follow_section_and_field() {
        assert_eq!(env_key("telegram.bot_token"), "TAGWATCH_TELEGRAM_BOT_TOKEN");
        assert_eq!(env_key("watch.first_run_delay_secs"), "TAGWATCH_WATCH_FIRST_RUN_DELAY_SECS");
    }

    #[test]
    fn nested_keys_are_found_in_toml_documents() {
        let doc: toml::Value = "[registry]\npage_size = 50\n".parse().expect("toml");
        assert!(contains_path(&doc, "registry.page_size"));
        assert!(!contains_path(&doc, "registry.base_url"));
    }

    #[test]
    fn rendered_config_never_prints_the_bot_secret() {
        let mut config = AppConfig::default();
        config.telegram.bot_token = SecretString::from("424242:very-secret".to_string());

        let rendered = render(&config, None::<PathBuf>);
        assert!(rendered.contains("telegram.bot_token = 424242:***"));
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("- watch.interval_secs = 3600"));
    }
}
