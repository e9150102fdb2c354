use minijinja::Environment;
use serde::Deserialize;
use std::{collections::HashMap, net::SocketAddr, path::Path, time::Duration};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Templating error: {0:?}")]
    Template(#[from] minijinja::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FleetConfig {
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogsConfig {
    #[serde(default = "default_logs_bind")]
    pub bind: SocketAddr,
    /// `memory://` keeps events in process. Anything starting with
    /// `postgres://` or `postgresql://` is handed to the Postgres store.
    #[serde(default = "default_store_url")]
    pub store_url: String,
    #[serde(default = "default_store_timeout")]
    pub store_timeout_secs: u64,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            bind: default_logs_bind(),
            store_url: default_store_url(),
            store_timeout_secs: default_store_timeout(),
        }
    }
}

impl LogsConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_orchestrator_bind")]
    pub bind: SocketAddr,
    /// Docker endpoint, e.g. `unix:///var/run/docker.sock` or `tcp://10.0.0.2:2375`.
    /// Local defaults are used when absent.
    #[serde(default)]
    pub runtime_endpoint: Option<String>,
    #[serde(default = "default_runtime_timeout")]
    pub runtime_timeout_secs: u64,
    /// Grace period handed to the runtime before it kills a stopping workload.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: i32,
    #[serde(default = "default_managed_services", rename = "service")]
    pub services: Vec<ManagedService>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            bind: default_orchestrator_bind(),
            runtime_endpoint: None,
            runtime_timeout_secs: default_runtime_timeout(),
            stop_timeout_secs: default_stop_timeout(),
            services: default_managed_services(),
        }
    }
}

impl OrchestratorConfig {
    pub fn runtime_timeout(&self) -> Duration {
        Duration::from_secs(self.runtime_timeout_secs)
    }
}

/// A downstream workload the controller is allowed to start and stop.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ManagedService {
    /// Path segment under `/orchestration/`.
    pub route: String,
    /// Name reported back to clients.
    pub name: String,
    /// Workload name as the container runtime knows it.
    pub container: String,
}

fn default_logs_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3005))
}

fn default_orchestrator_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3006))
}

fn default_store_url() -> String {
    "memory://".to_string()
}

fn default_store_timeout() -> u64 {
    5
}

fn default_runtime_timeout() -> u64 {
    10
}

fn default_stop_timeout() -> i32 {
    10
}

fn default_managed_services() -> Vec<ManagedService> {
    vec![ManagedService {
        route: "query".to_string(),
        name: "query-service".to_string(),
        container: "ms-consulta".to_string(),
    }]
}

pub fn render_template(
    template_str: &str,
    vars: &HashMap<String, String>,
) -> Result<String, minijinja::Error> {
    let mut env = Environment::new();

    let syntax = minijinja::syntax::SyntaxConfig::builder()
        .variable_delimiters("${", "}")
        .build()?;

    env.set_syntax(syntax);
    env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);

    let template = env.template_from_str(template_str)?;
    template.render(vars)
}

impl FleetConfig {
    fn try_init_from_string(
        config: &str,
        vars: &HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let rendered = render_template(config, vars)?;
        let config: Self = toml::from_str(&rendered)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut routes = std::collections::HashSet::new();
        for service in &self.orchestrator.services {
            if service.route.is_empty() || service.route.contains('/') {
                return Err(ConfigError::Invalid(format!(
                    "route {:?} must be a single non-empty path segment",
                    service.route
                )));
            }
            if !routes.insert(service.route.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "route {:?} is declared more than once",
                    service.route
                )));
            }
        }
        Ok(())
    }

    /// Load the config file rendered against the process environment.
    /// A missing file yields the defaults.
    pub fn try_init(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(config) => {
                let vars: HashMap<String, String> = std::env::vars().collect();
                Self::try_init_from_string(&config, &vars)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("Config file {path:?} not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}
