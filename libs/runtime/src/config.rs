use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::paths::resolve_home_dir;

const DEFAULT_HOME_SUBDIR: &str = ".blog-demo";
const ENV_PREFIX: &str = "BLOG__";

/// Application configuration: typed global sections plus a per-module bag.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub app: AppSection,
    /// Logging configuration (optional, defaults apply when absent).
    pub logging: Option<LoggingConfig>,
    /// Directory of per-module YAML files merged into `modules` (optional).
    #[serde(default)]
    pub modules_dir: Option<String>,
    /// Per-module configuration bag: module name → arbitrary value.
    #[serde(default)]
    pub modules: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppSection {
    /// Normalised to an absolute path on load; empty means the platform default.
    #[serde(default)]
    pub home_dir: String,
    #[serde(default = "default_app_name")]
    pub name: String,
}

fn default_app_name() -> String {
    "blog-demo".to_string()
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            home_dir: String::new(),
            name: default_app_name(),
        }
    }
}

/// Subsystem name → logging settings. Key `default` is the catch-all for
/// targets no other key matches.
pub type LoggingConfig = HashMap<String, Section>;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Section {
    pub console_level: String, // "trace" | "debug" | "info" | "warn" | "error" | "off"
    #[serde(default)]
    pub file: String, // relative paths resolve against app.home_dir; empty disables
    #[serde(default)]
    pub file_level: String,
    #[serde(default)]
    pub max_backups: Option<usize>,
    #[serde(default)]
    pub max_size_mb: Option<u64>,
}

pub fn default_logging_config() -> LoggingConfig {
    let mut logging = HashMap::new();
    logging.insert(
        "default".to_string(),
        Section {
            console_level: "info".to_string(),
            file: "logs/blog-demo.log".to_string(),
            file_level: "debug".to_string(),
            max_backups: Some(3),
            max_size_mb: Some(100),
        },
    );
    logging
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            logging: Some(default_logging_config()),
            modules_dir: None,
            modules: HashMap::new(),
        }
    }
}

/// Read access to raw module sections.
pub trait ConfigProvider: Send + Sync {
    fn get_module_config(&self, module_name: &str) -> Option<&serde_json::Value>;
}

impl ConfigProvider for AppConfig {
    fn get_module_config(&self, module_name: &str) -> Option<&serde_json::Value> {
        self.modules.get(module_name)
    }
}

impl AppConfig {
    /// Layered load: defaults → YAML file → `BLOG__*` environment variables.
    /// `app.home_dir` is normalised and created.
    pub fn load_layered<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        use figment::{
            providers::{Env, Format, Serialized, Yaml},
            Figment,
        };

        // Optional sections stay None unless YAML/ENV provide them.
        let base = AppConfig {
            logging: None,
            ..AppConfig::default()
        };

        let figment = Figment::new()
            .merge(Serialized::defaults(base))
            .merge(Yaml::file(config_path.as_ref()))
            // BLOG__APP__NAME=x maps to app.name
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let mut config: AppConfig = figment
            .extract()
            .with_context(|| format!("Failed to load config from {}", config_path.as_ref().display()))?;

        normalize_home_dir_inplace(&mut config.app).context("Failed to resolve app.home_dir")?;

        if let Some(dir) = config.modules_dir.clone() {
            merge_module_files(&mut config.modules, &dir)
                .with_context(|| format!("Failed to merge module files from {dir}"))?;
        }

        Ok(config)
    }

    pub fn load_or_default<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_layered(path),
            None => {
                let mut c = Self::default();
                normalize_home_dir_inplace(&mut c.app)
                    .context("Failed to resolve app.home_dir (defaults)")?;
                Ok(c)
            }
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    pub fn home_dir(&self) -> PathBuf {
        PathBuf::from(&self.app.home_dir)
    }

    /// Typed module section; a missing section yields `T::default()`, an
    /// invalid one is an error naming the module.
    pub fn module_config<T: DeserializeOwned + Default>(&self, module_name: &str) -> Result<T> {
        match self.get_module_config(module_name) {
            None => Ok(T::default()),
            Some(raw) => serde_json::from_value(raw.clone())
                .with_context(|| format!("invalid {module_name} config")),
        }
    }

    /// Mutable access to a module section, created as an empty object.
    pub fn module_section_mut(&mut self, module_name: &str) -> &mut serde_json::Value {
        let section = self
            .modules
            .entry(module_name.to_string())
            .or_insert_with(|| serde_json::Value::Object(Default::default()));
        if !section.is_object() {
            *section = serde_json::Value::Object(Default::default());
        }
        section
    }

    /// `-v` raises the default console level to debug, `-vv` to trace.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        let logging = self.logging.get_or_insert_with(default_logging_config);
        if let Some(default_section) = logging.get_mut("default") {
            match args.verbose {
                0 => {}
                1 => default_section.console_level = "debug".to_string(),
                _ => default_section.console_level = "trace".to_string(),
            }
        }
    }
}

/// Command-line settings that override loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    /// `-v` count: 1 raises console logging to debug, 2 or more to trace.
    pub verbose: u8,
}

fn normalize_home_dir_inplace(app: &mut AppSection) -> Result<()> {
    let configured = Some(app.home_dir.clone()).filter(|s| !s.trim().is_empty());
    let resolved = resolve_home_dir(configured, DEFAULT_HOME_SUBDIR, true)?;
    app.home_dir = resolved.to_string_lossy().to_string();
    Ok(())
}

fn merge_module_files(bag: &mut HashMap<String, serde_json::Value>, dir: &str) -> Result<()> {
    use std::fs;
    let dir = Path::new(dir);
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if ext != "yml" && ext != "yaml" {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            continue;
        };
        let raw = fs::read_to_string(&path)?;
        let val: serde_yaml::Value = serde_yaml::from_str(&raw)
            .with_context(|| format!("invalid YAML in {}", path.display()))?;
        bag.insert(name, serde_json::to_value(val)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("cfg.yaml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn default_config_structure() {
        let config = AppConfig::default();
        assert_eq!(config.app.name, "blog-demo");
        assert_eq!(config.app.home_dir, "");

        let logging = config.logging.as_ref().unwrap();
        let default_section = &logging["default"];
        assert_eq!(default_section.console_level, "info");
        assert_eq!(default_section.file, "logs/blog-demo.log");
        assert!(config.modules.is_empty());
    }

    #[test]
    fn layered_load_reads_sections_and_normalises_home() {
        let tmp = tempdir().unwrap();
        let home = tmp.path().join("home");
        let yaml = format!(
            r#"
app:
  home_dir: "{}"
  name: "blog-test"

logging:
  default:
    console_level: debug
    file: "logs/default.log"
  live_sync:
    console_level: trace
    file: ""

modules:
  blog_posts:
    push_delay_ms: 5
"#,
            home.to_string_lossy().replace('\\', "/")
        );
        let config = AppConfig::load_layered(write_config(tmp.path(), &yaml)).unwrap();

        assert_eq!(config.home_dir(), home);
        assert!(home.is_dir());
        assert_eq!(config.app.name, "blog-test");

        let logging = config.logging.as_ref().unwrap();
        assert_eq!(logging["default"].console_level, "debug");
        assert_eq!(logging["live_sync"].console_level, "trace");
        assert_eq!(config.modules["blog_posts"]["push_delay_ms"], 5);
    }

    #[test]
    fn tilde_home_is_expanded() {
        let tmp = tempdir().unwrap();
        let config = AppConfig::load_layered(write_config(
            tmp.path(),
            "app:\n  home_dir: \"~/.blog_demo_tilde_test\"\n",
        ))
        .unwrap();
        assert!(Path::new(&config.app.home_dir).is_absolute());
        assert!(!config.app.home_dir.starts_with('~'));
        assert!(config.app.home_dir.ends_with(".blog_demo_tilde_test"));
        assert!(config.logging.is_none());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let tmp = tempdir().unwrap();
        let err = AppConfig::load_layered(write_config(
            tmp.path(),
            "app:\n  home_dir: \"/tmp/x\"\n  port: 8080\n",
        ))
        .unwrap_err();
        assert!(format!("{err:#}").contains("port"));
    }

    #[test]
    fn modules_dir_files_are_merged() {
        let tmp = tempdir().unwrap();
        let modules_dir = tmp.path().join("modules");
        fs::create_dir_all(&modules_dir).unwrap();
        fs::write(modules_dir.join("blog_posts.yaml"), "max_title_length: 80\n").unwrap();
        fs::write(modules_dir.join("notes.txt"), "ignored").unwrap();

        let yaml = format!(
            "app:\n  home_dir: \"{}\"\nmodules_dir: \"{}\"\nmodules:\n  other:\n    key: value\n",
            tmp.path().join("home").to_string_lossy().replace('\\', "/"),
            modules_dir.to_string_lossy().replace('\\', "/")
        );
        let config = AppConfig::load_layered(write_config(tmp.path(), &yaml)).unwrap();

        assert!(config.modules.contains_key("other"));
        assert_eq!(config.modules["blog_posts"]["max_title_length"], 80);
        assert!(!config.modules.contains_key("notes"));
    }

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct Widget {
        #[serde(default)]
        flag: bool,
    }

    #[test]
    fn typed_module_config() {
        let mut config = AppConfig::default();
        assert_eq!(config.module_config::<Widget>("widget").unwrap(), Widget::default());

        config.module_section_mut("widget")["flag"] = serde_json::Value::Bool(true);
        assert_eq!(config.module_config::<Widget>("widget").unwrap(), Widget { flag: true });

        config.modules.insert("widget".into(), serde_json::json!({"nope": 1}));
        let err = config.module_config::<Widget>("widget").unwrap_err();
        assert!(err.to_string().contains("invalid widget config"));
    }

    #[test]
    fn verbose_levels() {
        for (verbose, expected) in [(0, "info"), (1, "debug"), (2, "trace"), (3, "trace")] {
            let mut config = AppConfig::default();
            config.apply_cli_overrides(&CliArgs { verbose });
            assert_eq!(config.logging.as_ref().unwrap()["default"].console_level, expected);
        }
    }

    #[test]
    fn yaml_output_reloads() {
        let config = AppConfig::default();
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("app:"));
        assert!(yaml.contains("logging:"));
        let reloaded: AppConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(reloaded.app.name, config.app.name);
    }
}
