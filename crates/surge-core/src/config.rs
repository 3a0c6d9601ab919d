//! Environment-sourced configuration resolution.
//!
//! A thin layer outside the control core: reads the well-known
//! environment variables, applies defaults, and hands the controller a
//! typed `RampConfig`. Objectives are either the built-in default set
//! or loaded from a TOML file.

use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::{Comparison, Objective};

/// The built-in response-time objective: p90 request duration through
/// the mesh, falling back between the seconds and milliseconds
/// histogram flavors.
pub const DEFAULT_RESPONSE_TIME_QUERY: &str = concat!(
    "(histogram_quantile(0.90, sum(irate(istio_request_duration_milliseconds_bucket{",
    "reporter=\"source\",destination_service=~\"frontend.default.svc.cluster.local\"",
    "}[1m])) by (le)) / 1000) or histogram_quantile(0.90, ",
    "sum(irate(istio_request_duration_seconds_bucket{",
    "reporter=\"source\",destination_service=~\"frontend.default.svc.cluster.local\"",
    "}[1m])) by (le))",
);

/// Resolved configuration for one ramp run.
#[derive(Debug, Clone)]
pub struct RampConfig {
    /// Load generator control authority ("host:port").
    pub swarm_address: String,
    /// Metrics backend authority ("host:port").
    pub prometheus_address: String,
    /// Users added per passing tick.
    pub step: u32,
    /// User count that ends the run.
    pub ceiling: u32,
    /// Seconds each ramp step is spread over.
    pub spawn_secs: u64,
    /// Spawn rate used for the final ramp-down to zero.
    pub stop_spawn_rate: u32,
    /// Interval between ramp decisions.
    pub tick_interval: Duration,
    /// Per-query timeout against the metrics backend.
    pub query_timeout: Duration,
    /// The objectives checked on every tick.
    pub objectives: Vec<Objective>,
}

impl RampConfig {
    /// Resolve configuration from the environment, with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let locust_host = get_env("LOCUST_HOST", "localhost");
        let locust_port = get_env("LOCUST_PORT", "8089");
        let prometheus_host = get_env("PROMETHEUS_HOST", "localhost");
        let prometheus_port = get_env("PROMETHEUS_PORT", "9090");

        Ok(Self {
            swarm_address: format!("{locust_host}:{locust_port}"),
            prometheus_address: format!("{prometheus_host}:{prometheus_port}"),
            step: parse_env("SURGE_STEP", 10)?,
            ceiling: parse_env("SURGE_CEILING", 100)?,
            spawn_secs: parse_env("SURGE_SPAWN_SECS", 5)?,
            stop_spawn_rate: parse_env("SURGE_STOP_SPAWN_RATE", 1)?,
            tick_interval: Duration::from_secs(parse_env("SURGE_TICK_SECS", 20)?),
            query_timeout: Duration::from_secs(parse_env("SURGE_QUERY_TIMEOUT_SECS", 10)?),
            objectives: default_objectives(),
        })
    }

    /// Users per second during a step transition, derived from the
    /// step size and the spawn window. Never below 1.
    pub fn spawn_rate(&self) -> u32 {
        ((u64::from(self.step)) / self.spawn_secs.max(1)).max(1) as u32
    }

    /// Validate the resolved configuration before the run starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.step == 0 {
            return Err(ConfigError::Invalid("step must be positive".to_string()));
        }
        if self.ceiling == 0 {
            return Err(ConfigError::Invalid("ceiling must be positive".to_string()));
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "tick interval must be positive".to_string(),
            ));
        }
        if self.objectives.is_empty() {
            return Err(ConfigError::NoObjectives);
        }
        for obj in &self.objectives {
            if obj.name.is_empty() {
                return Err(ConfigError::InvalidObjective {
                    name: obj.name.clone(),
                    reason: "name must not be empty".to_string(),
                });
            }
            if obj.query.trim().is_empty() {
                return Err(ConfigError::InvalidObjective {
                    name: obj.name.clone(),
                    reason: "query must not be empty".to_string(),
                });
            }
            if !obj.threshold.is_finite() {
                return Err(ConfigError::InvalidObjective {
                    name: obj.name.clone(),
                    reason: format!("threshold {} is not finite", obj.threshold),
                });
            }
        }
        Ok(())
    }
}

/// The default objective set: the response-time ceiling the tool has
/// always shipped with.
pub fn default_objectives() -> Vec<Objective> {
    vec![Objective {
        name: "response_time_p90".to_string(),
        query: DEFAULT_RESPONSE_TIME_QUERY.to_string(),
        comparison: Comparison::Below,
        threshold: 2.0,
        unit: "s".to_string(),
    }]
}

/// Load objectives from a TOML file with `[[objective]]` entries.
pub fn load_objectives(path: &Path) -> Result<Vec<Objective>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ObjectivesFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_objectives(&content).map_err(|reason| ConfigError::ObjectivesFile {
        path: path.display().to_string(),
        reason,
    })
}

#[derive(Debug, Deserialize)]
struct ObjectivesFile {
    #[serde(default)]
    objective: Vec<Objective>,
}

fn parse_objectives(content: &str) -> Result<Vec<Objective>, String> {
    let file: ObjectivesFile = toml::from_str(content).map_err(|e| e.to_string())?;
    if file.objective.is_empty() {
        return Err("no [[objective]] entries".to_string());
    }
    Ok(file.objective)
}

fn get_env(key: &str, fallback: &str) -> String {
    env::var(key).unwrap_or_else(|_| fallback.to_string())
}

fn parse_env<T: FromStr>(key: &str, fallback: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            var: key.to_string(),
            value: raw,
        }),
        Err(_) => Ok(fallback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> RampConfig {
        RampConfig {
            swarm_address: "localhost:8089".to_string(),
            prometheus_address: "localhost:9090".to_string(),
            step: 10,
            ceiling: 100,
            spawn_secs: 5,
            stop_spawn_rate: 1,
            tick_interval: Duration::from_secs(20),
            query_timeout: Duration::from_secs(10),
            objectives: default_objectives(),
        }
    }

    #[test]
    fn default_objectives_are_valid() {
        let config = base_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.objectives.len(), 1);
        assert_eq!(config.objectives[0].name, "response_time_p90");
        assert_eq!(config.objectives[0].comparison, Comparison::Below);
        assert_eq!(config.objectives[0].threshold, 2.0);
    }

    #[test]
    fn spawn_rate_derives_from_step_and_window() {
        let mut config = base_config();
        // 10 users over 5 seconds.
        assert_eq!(config.spawn_rate(), 2);
        config.step = 30;
        assert_eq!(config.spawn_rate(), 6);
        // Small steps never round the rate down to zero.
        config.step = 1;
        assert_eq!(config.spawn_rate(), 1);
        config.spawn_secs = 0;
        assert_eq!(config.spawn_rate(), 1);
    }

    #[test]
    fn validate_rejects_zero_step_and_ceiling() {
        let mut config = base_config();
        config.step = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = base_config();
        config.ceiling = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_empty_objective_set() {
        let mut config = base_config();
        config.objectives.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoObjectives)));
    }

    #[test]
    fn validate_rejects_non_finite_threshold() {
        let mut config = base_config();
        config.objectives[0].threshold = f64::NAN;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidObjective { .. })
        ));
    }

    #[test]
    fn validate_rejects_empty_query() {
        let mut config = base_config();
        config.objectives[0].query = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidObjective { .. })
        ));
    }

    #[test]
    fn parse_objectives_from_toml() {
        let content = r#"
            [[objective]]
            name = "response_time_p90"
            query = "histogram_quantile(0.90, rate(request_duration_bucket[1m]))"
            comparison = "below"
            threshold = 2.0
            unit = "s"

            [[objective]]
            name = "success_rate"
            query = "100 * rate(requests_ok[1m]) / rate(requests_total[1m])"
            comparison = "above"
            threshold = 99.9
            unit = "%"
        "#;

        let objectives = parse_objectives(content).unwrap();
        assert_eq!(objectives.len(), 2);
        assert_eq!(objectives[0].comparison, Comparison::Below);
        assert_eq!(objectives[1].comparison, Comparison::Above);
        assert_eq!(objectives[1].threshold, 99.9);
    }

    #[test]
    fn parse_objectives_unit_is_optional() {
        let content = r#"
            [[objective]]
            name = "success_rate"
            query = "up"
            comparison = "above"
            threshold = 1.0
        "#;

        let objectives = parse_objectives(content).unwrap();
        assert_eq!(objectives[0].unit, "");
    }

    #[test]
    fn parse_objectives_rejects_empty_file() {
        assert!(parse_objectives("").is_err());
    }

    #[test]
    fn parse_objectives_rejects_bad_comparison() {
        let content = r#"
            [[objective]]
            name = "x"
            query = "up"
            comparison = "sideways"
            threshold = 1.0
        "#;
        assert!(parse_objectives(content).is_err());
    }

    #[test]
    fn load_objectives_missing_file_is_an_error() {
        let err = load_objectives(Path::new("/nonexistent/objectives.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ObjectivesFile { .. }));
    }
}
