//! Configuração do coordenador carregada a partir de `coordinator.toml`.
//!
//! A struct [`CoordinatorConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `JOB_COORDINATOR_MAX_RETRIES` tem precedência sobre o arquivo.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoordinatorError, Result};
use crate::handler::RetryPolicy;
use crate::job::Component;

pub const CONFIG_FILE: &str = "coordinator.toml";
pub const MAX_RETRIES_ENV: &str = "JOB_COORDINATOR_MAX_RETRIES";

/// Configuração de nível superior carregada de `coordinator.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Máximo de retentativas de uma mensagem antes de marcá-la como falha.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Atraso base em milissegundos para backoff exponencial.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Atraso antes de reenviar uma mensagem cujos pré-requisitos não estão prontos.
    #[serde(default = "default_not_ready_delay_ms")]
    pub not_ready_delay_ms: u64,

    /// Filtro de log usado quando `RUST_LOG` não está definido.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Intervalos de polling por componente.
    #[serde(default)]
    pub poll: PollConfig,
}

/// Intervalos de polling em milissegundos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub results_job: u64,
    pub serialized_suite: u64,
    pub machine: u64,
    pub worker_job: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            results_job: 30_000,
            serialized_suite: 3_000,
            machine: 10_000,
            worker_job: 3_000,
        }
    }
}

impl PollConfig {
    /// O mesmo intervalo para todos os componentes.
    pub fn uniform(delay_ms: u64) -> Self {
        Self {
            results_job: delay_ms,
            serialized_suite: delay_ms,
            machine: delay_ms,
            worker_job: delay_ms,
        }
    }

    pub fn delay_for(&self, component: Component) -> Duration {
        let ms = match component {
            Component::ResultsJob => self.results_job,
            Component::SerializedSuite => self.serialized_suite,
            Component::Machine => self.machine,
            Component::WorkerJob => self.worker_job,
        };
        Duration::from_millis(ms)
    }
}

// Valor padrão para retentativas máximas: 3.
fn default_max_retries() -> u32 {
    3
}

// Valor padrão para o atraso base: 1000ms.
fn default_base_delay_ms() -> u64 {
    1000
}

fn default_not_ready_delay_ms() -> u64 {
    1000
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            not_ready_delay_ms: default_not_ready_delay_ms(),
            log_filter: default_log_filter(),
            poll: PollConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Carrega a configuração de `coordinator.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        let config = Self::load_from(Path::new(CONFIG_FILE))?;
        config.with_max_retries_override(std::env::var(MAX_RETRIES_ENV).ok().as_deref())
    }

    /// Carrega a configuração de `path`, sem consultar o ambiente.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str::<CoordinatorConfig>(&contents)?)
    }

    /// Aplica o valor da variável de ambiente, se presente e não vazio.
    pub fn with_max_retries_override(mut self, value: Option<&str>) -> Result<Self> {
        let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) else {
            return Ok(self);
        };
        self.max_retries = value.parse().map_err(|_| {
            CoordinatorError::Config(format!("{MAX_RETRIES_ENV} must be a number, got {value:?}"))
        })?;
        Ok(self)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            not_ready_delay: Duration::from_millis(self.not_ready_delay_ms),
        }
    }

    /// Renderiza a configuração efetiva como TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|err| CoordinatorError::Config(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_values() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay_ms, 1000);
        assert_eq!(config.not_ready_delay_ms, 1000);
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.poll.delay_for(Component::ResultsJob), Duration::from_secs(30));
        assert_eq!(config.poll.delay_for(Component::Machine), Duration::from_secs(10));
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            max_retries = 5

            [poll]
            machine = 500
        "#;
        let config: CoordinatorConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.base_delay_ms, 1000);
        assert_eq!(config.poll.machine, 500);
        assert_eq!(config.poll.worker_job, 3_000);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "base_delay_ms = 250\nlog_filter = \"debug\"").unwrap();

        let config = CoordinatorConfig::load_from(file.path()).unwrap();
        assert_eq!(config.base_delay_ms, 250);
        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn load_from_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoordinatorConfig::load_from(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, CoordinatorConfig::default());
    }

    #[test]
    fn load_from_invalid_toml_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_retries = \"many\"").unwrap();

        let err = CoordinatorConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, CoordinatorError::Toml(_)));
    }

    #[test]
    fn env_override_takes_precedence() {
        let config = CoordinatorConfig::default()
            .with_max_retries_override(Some("7"))
            .unwrap();
        assert_eq!(config.max_retries, 7);

        let config = CoordinatorConfig::default()
            .with_max_retries_override(Some(""))
            .unwrap();
        assert_eq!(config.max_retries, 3);

        let err = CoordinatorConfig::default()
            .with_max_retries_override(Some("lots"))
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::Config(_)));
    }

    #[test]
    fn retry_policy_from_config() {
        let policy = CoordinatorConfig::default().retry_policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(1000));
    }

    #[test]
    fn renders_as_toml() {
        let rendered = CoordinatorConfig::default().to_toml().unwrap();
        assert!(rendered.contains("max_retries = 3"));
        assert!(rendered.contains("[poll]"));
    }
}
