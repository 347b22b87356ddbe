use crate::constants::CONFIG_FILE_NAME;
use crate::explorer::runner::RunSettings;
use crate::server::ExplorerError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct TestExplorerConfig {
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct UiConfig {
    #[serde(default)]
    pub test_user_interface: TestUserInterface,
}

/// Which editor surface presents tests. The explorer is only active for
/// `TestExplorer`.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TestUserInterface {
    #[default]
    TestExplorer,
    CodeLenses,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct RunConfig {
    #[serde(default)]
    pub jvm_options: Vec<String>,
    #[serde(default)]
    pub environment_variables: BTreeMap<String, String>,
}

impl RunConfig {
    /// Settings sent with every suite selection; environment entries are
    /// rendered as `KEY=VALUE`.
    pub fn to_run_settings(&self) -> RunSettings {
        RunSettings {
            jvm_options: self.jvm_options.clone(),
            environment_variables: self
                .environment_variables
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DiscoveryConfig {
    #[serde(default = "true_bool")]
    pub discover_on_enable: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            discover_on_enable: true,
        }
    }
}

impl TestExplorerConfig {
    #[inline]
    pub fn explorer_enabled(&self) -> bool {
        self.ui.test_user_interface == TestUserInterface::TestExplorer
    }
}

pub struct ConfigManager {
    config: Arc<RwLock<TestExplorerConfig>>,

    init_settings: Arc<RwLock<Option<serde_json::Value>>>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(TestExplorerConfig::default())),
            init_settings: Arc::new(RwLock::new(None)),
        }
    }

    pub fn get_config(&self) -> Arc<RwLock<TestExplorerConfig>> {
        self.config.clone()
    }

    pub async fn snapshot(&self) -> TestExplorerConfig {
        self.config.read().await.clone()
    }

    pub async fn set_init_settings(&self, settings: Option<serde_json::Value>) {
        let mut lock = self.init_settings.write().await;
        *lock = settings;
    }

    /// Merge defaults, editor init settings and the workspace config file,
    /// in that order, and store the result.
    pub async fn load_from_workspace(&self, root: &Path) -> Result<TestExplorerConfig, ExplorerError> {
        let mut config_json = serde_json::to_value(TestExplorerConfig::default())
            .map_err(|e| ExplorerError::Config(format!("Failed to serialize defaults: {}", e)))?;

        {
            let init_settings = self.init_settings.read().await;
            if let Some(settings) = init_settings.as_ref() {
                merge_json(&mut config_json, settings);
            }
        }

        let config_path = root.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            let toml_content = fs::read_to_string(&config_path)
                .map_err(|e| ExplorerError::Config(format!("Failed to read config: {}", e)))?;

            let toml_value: toml::Value = toml::from_str(&toml_content)
                .map_err(|e| ExplorerError::Config(format!("Failed to parse config: {}", e)))?;
            let toml_json = toml_to_json(&toml_value);

            merge_json(&mut config_json, &toml_json);
        }

        let config: TestExplorerConfig = serde_json::from_value(config_json).map_err(|e| {
            ExplorerError::Config(format!("Failed to deserialize merged config: {}", e))
        })?;

        let mut lock = self.config.write().await;
        *lock = config.clone();

        Ok(config)
    }

    pub async fn update(&self, new_config: TestExplorerConfig) {
        let mut lock = self.config.write().await;
        *lock = new_config;
    }

    pub async fn get_run_settings(&self) -> RunSettings {
        let lock = self.config.read().await;
        lock.run.to_run_settings()
    }
}

fn toml_to_json(toml: &toml::Value) -> serde_json::Value {
    match toml {
        toml::Value::String(s) => serde_json::Value::String(s.clone()),
        toml::Value::Integer(i) => serde_json::Value::Number((*i).into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        toml::Value::Boolean(b) => serde_json::Value::Bool(*b),
        toml::Value::Array(arr) => serde_json::Value::Array(arr.iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => {
            let map: serde_json::Map<String, serde_json::Value> = table
                .iter()
                .map(|(k, v)| (k.clone(), toml_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
    }
}

fn merge_json(base: &mut serde_json::Value, overlay: &serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                if overlay_val.is_null() {
                    continue;
                }
                match base_map.get_mut(key) {
                    Some(base_val) => merge_json(base_val, overlay_val),
                    None => {
                        base_map.insert(key.clone(), overlay_val.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            if !overlay.is_null() {
                *base = overlay.clone();
            }
        }
    }
}

fn true_bool() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) {
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        let mut file = std::fs::File::create(&config_path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_config_default() {
        let config = TestExplorerConfig::default();
        assert!(config.explorer_enabled());
        assert!(config.discovery.discover_on_enable);
        assert!(config.run.jvm_options.is_empty());
    }

    #[test]
    fn test_run_settings_render_environment() {
        let run = RunConfig {
            jvm_options: vec!["-Xmx1g".into()],
            environment_variables: BTreeMap::from([
                ("B".to_string(), "2".to_string()),
                ("A".to_string(), "1".to_string()),
            ]),
        };

        let settings = run.to_run_settings();
        assert_eq!(settings.jvm_options, vec!["-Xmx1g"]);
        assert_eq!(settings.environment_variables, vec!["A=1", "B=2"]);
    }

    #[tokio::test]
    async fn test_config_manager_load_missing_file() {
        let manager = ConfigManager::new();
        let temp_dir = TempDir::new().unwrap();

        let config = manager.load_from_workspace(temp_dir.path()).await.unwrap();
        assert_eq!(config, TestExplorerConfig::default());
    }

    #[tokio::test]
    async fn test_config_manager_load_valid_file() {
        let manager = ConfigManager::new();
        let temp_dir = TempDir::new().unwrap();
        write_config(
            &temp_dir,
            r#"
[ui]
test_user_interface = "code-lenses"

[run]
jvm_options = ["-Dfoo=bar"]

[run.environment_variables]
CI = "true"

[discovery]
discover_on_enable = false
"#,
        );

        let config = manager.load_from_workspace(temp_dir.path()).await.unwrap();

        assert!(!config.explorer_enabled());
        assert_eq!(config.run.jvm_options, vec!["-Dfoo=bar"]);
        assert_eq!(config.run.environment_variables.get("CI").map(String::as_str), Some("true"));
        assert!(!config.discovery.discover_on_enable);
        assert_eq!(manager.snapshot().await, config);
    }

    #[tokio::test]
    async fn test_config_manager_load_invalid_file() {
        let manager = ConfigManager::new();
        let temp_dir = TempDir::new().unwrap();
        write_config(&temp_dir, "invalid toml content {{{");

        let err = manager.load_from_workspace(temp_dir.path()).await.unwrap_err();
        assert!(matches!(err, ExplorerError::Config(_)));
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[tokio::test]
    async fn test_config_manager_unknown_interface() {
        let manager = ConfigManager::new();
        let temp_dir = TempDir::new().unwrap();
        write_config(&temp_dir, "[ui]\ntest_user_interface = \"tree\"\n");

        let err = manager.load_from_workspace(temp_dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to deserialize merged config"));
    }

    #[tokio::test]
    async fn test_config_manager_toml_overrides_init_settings() {
        let manager = ConfigManager::new();
        let temp_dir = TempDir::new().unwrap();

        manager
            .set_init_settings(Some(serde_json::json!({
                "ui": { "test_user_interface": "code-lenses" },
                "run": { "jvm_options": ["-Xss4m"] }
            })))
            .await;
        write_config(&temp_dir, "[ui]\ntest_user_interface = \"test-explorer\"\n");

        let config = manager.load_from_workspace(temp_dir.path()).await.unwrap();

        assert!(config.explorer_enabled());
        assert_eq!(config.run.jvm_options, vec!["-Xss4m"]);
        assert!(config.discovery.discover_on_enable);
    }

    #[tokio::test]
    async fn test_config_manager_update() {
        let manager = ConfigManager::new();

        manager
            .update(TestExplorerConfig {
                run: RunConfig {
                    jvm_options: vec!["-ea".into()],
                    ..RunConfig::default()
                },
                ..TestExplorerConfig::default()
            })
            .await;

        let settings = manager.get_run_settings().await;
        assert_eq!(settings.jvm_options, vec!["-ea"]);
    }
}
