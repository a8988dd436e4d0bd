use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const MAX_PAGE_SIZE_CEILING: u16 = 1000;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlackConfig {
    #[serde(default)]
    pub workspace: String,
    #[serde(default)]
    pub api_base_url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub cookies: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchConfig {
    #[serde(default = "default_page_size_ceiling")]
    pub page_size_ceiling: u16,
    #[serde(default = "default_list_default_limit")]
    pub list_default_limit: u16,
    #[serde(default = "default_list_max_limit")]
    pub list_max_limit: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            workspace: String::new(),
            api_base_url: String::new(),
            token: String::new(),
            cookies: String::new(),
            timeout_seconds: default_timeout_seconds(),
            user_agent: default_user_agent(),
        }
    }
}

impl SlackConfig {
    /// Base URL for Web API calls. An explicit `api_base_url` wins over the
    /// workspace-derived `https://<workspace>.slack.com/api`.
    pub fn resolved_api_base_url(&self) -> Result<String> {
        let explicit = self.api_base_url.trim();
        if !explicit.is_empty() {
            return Ok(explicit.trim_end_matches('/').to_string());
        }

        let workspace = self.workspace.trim();
        if workspace.is_empty() {
            bail!("--workspace is required (e.g., --workspace myteam)");
        }
        Ok(format!("https://{workspace}.slack.com/api"))
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size_ceiling: default_page_size_ceiling(),
            list_default_limit: default_list_default_limit(),
            list_max_limit: default_list_max_limit(),
        }
    }
}

fn default_timeout_seconds() -> f64 {
    30.0
}

fn default_user_agent() -> String {
    concat!("slack-reader/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_page_size_ceiling() -> u16 {
    200
}

fn default_list_default_limit() -> u16 {
    100
}

fn default_list_max_limit() -> u16 {
    1000
}

fn home_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| {
        PathBuf::from(home)
            .join(".slack-reader")
            .join("config.toml")
    })
}

fn repo_default_config_path() -> PathBuf {
    PathBuf::from("config/slack-reader.toml")
}

const CONFIG_PATH_ENV: &str = "SLACK_READER_CONFIG";

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

// Flag or env wins even when the file is missing. Otherwise the first existing
// candidate; with nothing on disk, the home location.
fn pick_config_path(
    flag: Option<PathBuf>,
    env: Option<PathBuf>,
    home: Option<PathBuf>,
    repo_default: PathBuf,
) -> PathBuf {
    if let Some(explicit) = flag.or(env) {
        return explicit;
    }
    match home {
        Some(home) if home.exists() => home,
        _ if repo_default.exists() => repo_default,
        Some(home) => home,
        None => repo_default,
    }
}

pub fn resolve_config_path(raw_path: Option<PathBuf>) -> PathBuf {
    pick_config_path(
        raw_path,
        env_path(CONFIG_PATH_ENV),
        home_config_path(),
        repo_default_config_path(),
    )
}

fn env_override(target: &mut String, key: &str) {
    if let Ok(value) = std::env::var(key) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            *target = trimmed.to_string();
        }
    }
}

fn normalize_config(mut cfg: AppConfig) -> Result<AppConfig> {
    if !cfg.slack.timeout_seconds.is_finite() {
        bail!(
            "slack.timeout_seconds must be a finite number of seconds, got {}",
            cfg.slack.timeout_seconds
        );
    }

    env_override(&mut cfg.slack.workspace, "SLACK_WORKSPACE");
    env_override(&mut cfg.slack.token, "SLACK_TOKEN");
    env_override(&mut cfg.slack.cookies, "SLACK_COOKIES");

    cfg.slack.workspace = cfg.slack.workspace.trim().to_string();
    cfg.fetch.page_size_ceiling = cfg.fetch.page_size_ceiling.clamp(1, MAX_PAGE_SIZE_CEILING);
    cfg.fetch.list_max_limit = cfg.fetch.list_max_limit.max(1);
    cfg.fetch.list_default_limit = cfg
        .fetch
        .list_default_limit
        .clamp(1, cfg.fetch.list_max_limit);

    Ok(cfg)
}

pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read config {}", path.as_ref().display()))?;
    let cfg: AppConfig = toml::from_str(&content).context("failed to parse TOML config")?;
    normalize_config(cfg)
}

/// Like [`load_config`], but a missing file yields defaults plus env overrides.
pub fn load_config_or_default(path: impl AsRef<Path>) -> Result<AppConfig> {
    if path.as_ref().exists() {
        load_config(path)
    } else {
        normalize_config(AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static SCRATCH_SEQ: AtomicUsize = AtomicUsize::new(0);

    fn scratch_config(label: &str, contents: &str) -> PathBuf {
        let seq = SCRATCH_SEQ.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "slack-reader-{label}-{}-{seq}.toml",
            std::process::id()
        ));
        std::fs::write(&path, contents).expect("write scratch config");
        path
    }

    #[test]
    fn explicit_paths_win_even_when_missing() {
        let home = scratch_config("home-present", "");
        let repo = scratch_config("repo-present", "");

        assert_eq!(
            pick_config_path(
                Some(PathBuf::from("/nonexistent/flag.toml")),
                Some(PathBuf::from("/nonexistent/env.toml")),
                Some(home.clone()),
                repo.clone(),
            ),
            PathBuf::from("/nonexistent/flag.toml")
        );
        assert_eq!(
            pick_config_path(
                None,
                Some(PathBuf::from("/nonexistent/env.toml")),
                Some(home.clone()),
                repo.clone(),
            ),
            PathBuf::from("/nonexistent/env.toml")
        );

        std::fs::remove_file(&home).ok();
        std::fs::remove_file(&repo).ok();
    }

    #[test]
    fn existing_home_config_beats_repo_default() {
        let home = scratch_config("home-wins", "");
        let repo = scratch_config("repo-loses", "");

        let chosen = pick_config_path(None, None, Some(home.clone()), repo.clone());

        std::fs::remove_file(&home).ok();
        std::fs::remove_file(&repo).ok();
        assert_eq!(chosen, home);
    }

    #[test]
    fn repo_default_used_when_home_missing() {
        let repo = scratch_config("repo-fallback", "");
        let missing_home = std::env::temp_dir().join("slack-reader-no-such-home.toml");

        let chosen = pick_config_path(None, None, Some(missing_home), repo.clone());

        std::fs::remove_file(&repo).ok();
        assert_eq!(chosen, repo);
    }

    #[test]
    fn nothing_on_disk_points_at_home_location() {
        let missing_home = std::env::temp_dir().join("slack-reader-no-such-home.toml");
        let missing_repo = std::env::temp_dir().join("slack-reader-no-such-repo.toml");

        assert_eq!(
            pick_config_path(None, None, Some(missing_home.clone()), missing_repo.clone()),
            missing_home
        );
        assert_eq!(
            pick_config_path(None, None, None, missing_repo.clone()),
            missing_repo
        );
    }

    #[test]
    fn non_finite_timeout_is_rejected() {
        for raw in ["inf", "nan", "-inf"] {
            let path = scratch_config(
                "timeout",
                &format!("[slack]\nworkspace = \"myteam\"\ntimeout_seconds = {raw}\n"),
            );
            let err = load_config(&path).expect_err("non-finite timeout should fail");
            std::fs::remove_file(&path).ok();
            assert!(
                err.to_string().contains("slack.timeout_seconds must be a finite number"),
                "unexpected error for {raw}: {err:#}"
            );
        }
    }

    #[test]
    fn api_base_url_derives_from_workspace() {
        let cfg = SlackConfig {
            workspace: "myteam".to_string(),
            ..SlackConfig::default()
        };
        assert_eq!(
            cfg.resolved_api_base_url().expect("derived url"),
            "https://myteam.slack.com/api"
        );

        let explicit = SlackConfig {
            api_base_url: "http://127.0.0.1:9999/api/".to_string(),
            ..SlackConfig::default()
        };
        assert_eq!(
            explicit.resolved_api_base_url().expect("explicit url"),
            "http://127.0.0.1:9999/api"
        );
    }

    #[test]
    fn api_base_url_requires_workspace() {
        let err = SlackConfig::default()
            .resolved_api_base_url()
            .expect_err("missing workspace should fail");
        assert!(err.to_string().contains("--workspace is required"));
    }

    #[test]
    fn load_config_clamps_fetch_limits() {
        let path = scratch_config(
            "clamp",
            r#"
[fetch]
page_size_ceiling = 5000
list_default_limit = 0
list_max_limit = 500
"#,
        );
        let cfg = load_config(&path).expect("load config");
        std::fs::remove_file(&path).ok();

        assert_eq!(cfg.fetch.page_size_ceiling, MAX_PAGE_SIZE_CEILING);
        assert_eq!(cfg.fetch.list_default_limit, 1);
        assert_eq!(cfg.fetch.list_max_limit, 500);
    }

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("slack-reader-missing-config-does-not-exist.toml");
        let cfg = load_config_or_default(&path).expect("defaults");
        assert_eq!(cfg.fetch.page_size_ceiling, 200);
        assert_eq!(cfg.fetch.list_default_limit, 100);
        assert_eq!(cfg.slack.timeout_seconds, 30.0);
    }

    #[test]
    fn load_config_errors_when_path_missing() {
        let path = std::env::temp_dir().join("slack-reader-missing-config-does-not-exist.toml");
        let err = load_config(&path).expect_err("missing config path should fail");
        assert!(
            err.to_string().contains("failed to read config"),
            "unexpected error: {err:#}"
        );
    }

    #[test]
    fn load_config_errors_on_unknown_slack_key() {
        let path = scratch_config(
            "unknown-slack-key",
            r#"
[slack]
workspace = "myteam"
extra = "not-allowed"
"#,
        );
        let err = load_config(&path).expect_err("unknown slack key should fail");
        std::fs::remove_file(&path).ok();
        assert!(
            format!("{err:#}").contains("unknown field `extra`"),
            "unexpected error: {err:#}"
        );
    }
}
