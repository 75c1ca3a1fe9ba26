use crate::core::engine::EngineSettings;
use crate::core::scoring::{PriorityWeights, ScoringPolicy};
use crate::domain::model::{PriorityTier, Service};
use crate::utils::error::{QueueError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueueConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_next_up_alerts")]
    pub next_up_alerts: usize,
    #[serde(default = "default_walk_in_prefix")]
    pub walk_in_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            next_up_alerts: default_next_up_alerts(),
            walk_in_prefix: default_walk_in_prefix(),
        }
    }
}

fn default_next_up_alerts() -> usize {
    2
}

fn default_walk_in_prefix() -> String {
    "walkin".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_high")]
    pub high: f64,
    #[serde(default = "default_medium")]
    pub medium: f64,
    #[serde(default)]
    pub low: f64,
    #[serde(default = "default_aging_rate")]
    pub aging_rate_per_minute: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            high: default_high(),
            medium: default_medium(),
            low: 0.0,
            aging_rate_per_minute: default_aging_rate(),
        }
    }
}

fn default_high() -> f64 {
    30.0
}

fn default_medium() -> f64 {
    15.0
}

fn default_aging_rate() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "./queue-data".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub expected_duration_minutes: u32,
    #[serde(default)]
    pub default_priority: Option<String>,
    #[serde(default = "default_open")]
    pub open: bool,
}

fn default_open() -> bool {
    true
}

impl ServiceConfig {
    pub fn to_service(&self) -> Result<Service> {
        let default_priority = match &self.default_priority {
            Some(value) => value.parse()?,
            None => PriorityTier::Low,
        };
        Ok(Service {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            expected_duration_minutes: self.expected_duration_minutes,
            default_priority,
            open: self.open,
        })
    }
}

impl QueueConfig {
    /// Built-in catalog used when no configuration file exists.
    pub fn with_demo_services() -> Self {
        Self {
            services: vec![
                ServiceConfig {
                    id: "s1".to_string(),
                    name: "Dine-in".to_string(),
                    description: "Table service".to_string(),
                    expected_duration_minutes: 30,
                    default_priority: Some("medium".to_string()),
                    open: true,
                },
                ServiceConfig {
                    id: "s2".to_string(),
                    name: "Takeaway".to_string(),
                    description: "Quick pickup".to_string(),
                    expected_duration_minutes: 10,
                    default_priority: Some("low".to_string()),
                    open: true,
                },
            ],
            ..Default::default()
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(QueueError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| QueueError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value; unknown variables are left as-is.
    fn substitute_env_vars(content: &str) -> String {
        use regex::Regex;
        use std::sync::OnceLock;

        static ENV_VAR: OnceLock<Regex> = OnceLock::new();
        let re = ENV_VAR.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("env var regex is valid"));

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .to_string()
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_path("storage.data_dir", &self.storage.data_dir)?;
        validation::validate_identifier("engine.walk_in_prefix", &self.engine.walk_in_prefix)?;

        let s = &self.scoring;
        for (field, value) in [
            ("scoring.high", s.high),
            ("scoring.medium", s.medium),
            ("scoring.low", s.low),
        ] {
            validation::validate_range(field, value, 0.0, 1_000_000.0)?;
        }
        if !(s.high >= s.medium && s.medium >= s.low) {
            return Err(QueueError::ConfigValidationError {
                field: "scoring".to_string(),
                message: "Weights must satisfy high >= medium >= low".to_string(),
            });
        }
        if !(s.aging_rate_per_minute.is_finite() && s.aging_rate_per_minute > 0.0) {
            return Err(QueueError::InvalidConfigValueError {
                field: "scoring.aging_rate_per_minute".to_string(),
                value: s.aging_rate_per_minute.to_string(),
                reason: "Aging rate must be a positive number".to_string(),
            });
        }

        validation::validate_unique("services.id", self.services.iter().map(|s| s.id.as_str()))?;
        for service in &self.services {
            service.to_service()?.validate()?;
        }

        Ok(())
    }

    /// Full validation plus the CLI's need for a non-empty service catalog.
    pub fn validate_for_cli(&self) -> Result<()> {
        self.validate_config()?;
        if self.services.is_empty() {
            return Err(QueueError::MissingConfigError {
                field: "services".to_string(),
            });
        }
        Ok(())
    }

    pub fn scoring_policy(&self) -> ScoringPolicy {
        ScoringPolicy {
            weights: PriorityWeights {
                high: self.scoring.high,
                medium: self.scoring.medium,
                low: self.scoring.low,
            },
            aging_rate: self.scoring.aging_rate_per_minute,
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            next_up_alerts: self.engine.next_up_alerts,
            walk_in_prefix: self.engine.walk_in_prefix.clone(),
        }
    }

    pub fn services(&self) -> Result<Vec<Service>> {
        self.services.iter().map(ServiceConfig::to_service).collect()
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.data_dir)
    }
}

impl Validate for QueueConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
