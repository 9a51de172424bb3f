use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub manifests: ManifestsConfig,
    #[serde(default)]
    pub flathub: FlathubConfig,
    #[serde(default)]
    pub homebrew: HomebrewConfig,
    #[serde(default)]
    pub os: OsConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub gitlab: GitlabConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub overrides: OverridesConfig,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: PathBuf,
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            schema_version: default_schema_version(),
        }
    }
}

fn default_output_path() -> PathBuf {
    PathBuf::from("src/data/apps.json")
}
fn default_schema_version() -> String {
    "1.0.0".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}
fn default_user_agent() -> String {
    format!("release-harness/{}", env!("CARGO_PKG_VERSION"))
}

/// Where the curated Brewfiles live.
#[derive(Debug, Deserialize, Clone)]
pub struct ManifestsConfig {
    #[serde(default = "default_manifest_owner")]
    pub owner: String,
    #[serde(default = "default_manifest_repo")]
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_raw_base")]
    pub raw_base: String,
    #[serde(default = "default_flatpak_manifests")]
    pub flatpak: Vec<FlatpakManifest>,
    #[serde(default = "default_homebrew_manifests")]
    pub homebrew: Vec<String>,
}

impl Default for ManifestsConfig {
    fn default() -> Self {
        Self {
            owner: default_manifest_owner(),
            repo: default_manifest_repo(),
            branch: default_branch(),
            raw_base: default_raw_base(),
            flatpak: default_flatpak_manifests(),
            homebrew: default_homebrew_manifests(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct FlatpakManifest {
    pub path: String,
    pub app_set: String,
}

fn default_manifest_owner() -> String {
    "projectbluefin".to_string()
}
fn default_manifest_repo() -> String {
    "common".to_string()
}
fn default_branch() -> String {
    "main".to_string()
}
fn default_raw_base() -> String {
    "https://raw.githubusercontent.com".to_string()
}

const HOMEBREW_MANIFEST_DIR: &str = "system_files/shared/usr/share/ublue-os/homebrew";
const FLATPAK_MANIFEST_DIR: &str = "system_files/bluefin/usr/share/ublue-os/homebrew";

fn default_flatpak_manifests() -> Vec<FlatpakManifest> {
    vec![
        FlatpakManifest {
            path: format!("{}/system-flatpaks.Brewfile", FLATPAK_MANIFEST_DIR),
            app_set: "core".to_string(),
        },
        FlatpakManifest {
            path: format!("{}/system-dx-flatpaks.Brewfile", FLATPAK_MANIFEST_DIR),
            app_set: "dx".to_string(),
        },
    ]
}

fn default_homebrew_manifests() -> Vec<String> {
    [
        "cli",
        "fonts",
        "ai-tools",
        "k8s-tools",
        "cncf",
        "artwork",
        "ide",
        "experimental-ide",
        "swift",
    ]
    .iter()
    .map(|name| format!("{}/{}.Brewfile", HOMEBREW_MANIFEST_DIR, name))
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct FlathubConfig {
    #[serde(default = "default_flathub_api")]
    pub api_base: String,
    #[serde(default = "default_flathub_web")]
    pub web_base: String,
    /// Upper bound on items taken from the recently-updated listing.
    #[serde(default = "default_recent_cap")]
    pub recent_cap: usize,
}

impl Default for FlathubConfig {
    fn default() -> Self {
        Self {
            api_base: default_flathub_api(),
            web_base: default_flathub_web(),
            recent_cap: default_recent_cap(),
        }
    }
}

fn default_flathub_api() -> String {
    "https://flathub.org/api/v2".to_string()
}
fn default_flathub_web() -> String {
    "https://flathub.org/apps".to_string()
}
fn default_recent_cap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct HomebrewConfig {
    #[serde(default = "default_homebrew_api")]
    pub api_base: String,
    #[serde(default = "default_homebrew_web")]
    pub web_base: String,
    #[serde(default)]
    pub taps: Vec<TapConfig>,
}

impl Default for HomebrewConfig {
    fn default() -> Self {
        Self {
            api_base: default_homebrew_api(),
            web_base: default_homebrew_web(),
            taps: Vec::new(),
        }
    }
}

fn default_homebrew_api() -> String {
    "https://formulae.brew.sh/api".to_string()
}
fn default_homebrew_web() -> String {
    "https://formulae.brew.sh".to_string()
}

/// A third-party Homebrew tap hosted on GitHub.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TapConfig {
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub experimental: bool,
}

impl TapConfig {
    /// Tap name as Homebrew spells it (`owner/repo` without `homebrew-`).
    pub fn tap_name(&self) -> String {
        let short = self.repo.strip_prefix("homebrew-").unwrap_or(&self.repo);
        format!("{}/{}", self.owner, short)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OsConfig {
    #[serde(default = "default_os_owner")]
    pub owner: String,
    #[serde(default = "default_os_repo")]
    pub repo: String,
    #[serde(default = "default_os_display_name")]
    pub display_name: String,
    #[serde(default = "default_os_per_page")]
    pub per_page: usize,
    /// Embedded release notes are cut to this many characters.
    #[serde(default = "default_notes_limit")]
    pub notes_limit: usize,
    #[serde(default = "default_os_icon")]
    pub icon: String,
}

impl Default for OsConfig {
    fn default() -> Self {
        Self {
            owner: default_os_owner(),
            repo: default_os_repo(),
            display_name: default_os_display_name(),
            per_page: default_os_per_page(),
            notes_limit: default_notes_limit(),
            icon: default_os_icon(),
        }
    }
}

fn default_os_owner() -> String {
    "ublue-os".to_string()
}
fn default_os_repo() -> String {
    "bluefin".to_string()
}
fn default_os_display_name() -> String {
    "Bluefin OS".to_string()
}
fn default_os_per_page() -> usize {
    10
}
fn default_notes_limit() -> usize {
    1000
}
fn default_os_icon() -> String {
    "https://avatars.githubusercontent.com/u/120078124?s=200&v=4".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default = "default_github_api")]
    pub api_base: String,
    #[serde(default = "default_github_token_env")]
    pub token_env: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: default_github_api(),
            token_env: default_github_token_env(),
        }
    }
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}
fn default_github_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitlabConfig {
    /// Replaces `https://<host>` of the repository URL when set.
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_gitlab_token_env")]
    pub token_env: String,
}

impl Default for GitlabConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            token_env: default_gitlab_token_env(),
        }
    }
}

fn default_gitlab_token_env() -> String {
    "GITLAB_TOKEN".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnrichmentConfig {
    #[serde(default = "default_per_page")]
    pub per_page: usize,
    /// Courtesy delay after each successful release fetch.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// Courtesy delay after each successful catalog detail fetch.
    #[serde(default = "default_detail_delay_ms")]
    pub detail_delay_ms: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            per_page: default_per_page(),
            delay_ms: default_delay_ms(),
            detail_delay_ms: default_detail_delay_ms(),
        }
    }
}

fn default_per_page() -> usize {
    5
}
fn default_delay_ms() -> u64 {
    500
}
fn default_detail_delay_ms() -> u64 {
    100
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OverridesConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// API tokens read from the environment once per run.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub github: Option<String>,
    pub gitlab: Option<String>,
}

impl Credentials {
    pub fn from_env(config: &Config) -> Self {
        Self {
            github: read_token(&config.github.token_env),
            gitlab: read_token(&config.gitlab.token_env),
        }
    }
}

fn read_token(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    /// Built-in defaults, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Load `path` if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::minimal())
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.enrichment.per_page == 0 || config.enrichment.per_page > 100 {
        anyhow::bail!("enrichment.per_page must be in 1..=100");
    }

    if config.flathub.recent_cap == 0 {
        anyhow::bail!("flathub.recent_cap must be >= 1");
    }

    if config.http.timeout_secs == 0 {
        anyhow::bail!("http.timeout_secs must be >= 1");
    }

    if config.os.per_page == 0 {
        anyhow::bail!("os.per_page must be >= 1");
    }

    Ok(config)
}
