//! Configuration file support.
//!
//! Loads retry budgets, the dynamic defaults table and the LAG under test
//! from TOML. Every field has a default, so an empty file is a valid
//! configuration matching the standard LAG conversion scenario.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{VerifyError, VerifyResult};
use crate::mode::{LacpRate, ModeDefaults, ModeTable};
use crate::retry::{RetryPolicy, RetryPoller};

/// Attempts and time allowed for one kind of verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Maximum check invocations.
    pub max_attempts: u32,
    /// Total time budget in seconds.
    pub timeout_secs: u64,
}

impl BudgetConfig {
    /// Creates a budget.
    pub const fn new(max_attempts: u32, timeout_secs: u64) -> Self {
        Self {
            max_attempts,
            timeout_secs,
        }
    }

    /// Total time budget.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Builds a retry policy from this budget.
    pub fn policy(&self, description: &str, failure_message: &str) -> RetryPolicy {
        RetryPolicy::new(
            description,
            failure_message,
            self.max_attempts,
            self.timeout(),
        )
    }

    fn validate(&self, name: &str) -> VerifyResult<()> {
        if self.max_attempts == 0 {
            return Err(VerifyError::invalid_config(
                format!("budgets.{}.max_attempts", name),
                "must be > 0",
            ));
        }
        if self.timeout_secs == 0 {
            return Err(VerifyError::invalid_config(
                format!("budgets.{}.timeout_secs", name),
                "must be > 0",
            ));
        }
        Ok(())
    }
}

/// Retry budgets per verification step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetsConfig {
    /// Static LAG settles after creation.
    #[serde(default = "default_static_budget")]
    pub static_convergence: BudgetConfig,

    /// LACP negotiation after switching to active/passive.
    #[serde(default = "default_dynamic_budget")]
    pub dynamic_convergence: BudgetConfig,

    /// Interfaces reach the requested link state.
    #[serde(default = "default_interfaces_budget")]
    pub interfaces: BudgetConfig,

    /// Negotiation re-established after links come back.
    #[serde(default = "default_relink_budget")]
    pub relink: BudgetConfig,
}

/// Retry timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Floor for the backoff between attempts, in milliseconds.
    #[serde(default = "default_min_backoff")]
    pub min_backoff_ms: u64,
}

/// The LAG under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LagConfig {
    /// LAG identifier, identical on both switches.
    #[serde(default = "default_lag_id")]
    pub id: String,

    /// LACPDU heartbeat rate.
    #[serde(default = "default_rate")]
    pub rate: LacpRate,

    /// Member port labels, identical on both switches.
    #[serde(default = "default_ports")]
    pub ports: Vec<String>,
}

/// Complete convergence verification configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvergenceConfig {
    /// Expected actor values on dynamic LAGs.
    #[serde(default)]
    pub defaults: ModeDefaults,

    /// Retry budgets.
    #[serde(default)]
    pub budgets: BudgetsConfig,

    /// Retry timing.
    #[serde(default)]
    pub retry: RetryConfig,

    /// LAG under test.
    #[serde(default)]
    pub lag: LagConfig,
}

// Default functions
fn default_static_budget() -> BudgetConfig {
    BudgetConfig::new(2, 4)
}

fn default_dynamic_budget() -> BudgetConfig {
    BudgetConfig::new(5, 15)
}

fn default_interfaces_budget() -> BudgetConfig {
    BudgetConfig::new(5, 60)
}

fn default_relink_budget() -> BudgetConfig {
    BudgetConfig::new(2, 4)
}

fn default_min_backoff() -> u64 {
    100
}

fn default_lag_id() -> String {
    "1".to_string()
}

fn default_rate() -> LacpRate {
    LacpRate::Fast
}

fn default_ports() -> Vec<String> {
    vec!["2".to_string(), "3".to_string(), "4".to_string()]
}

// Default implementations
impl Default for BudgetsConfig {
    fn default() -> Self {
        Self {
            static_convergence: default_static_budget(),
            dynamic_convergence: default_dynamic_budget(),
            interfaces: default_interfaces_budget(),
            relink: default_relink_budget(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_backoff_ms: default_min_backoff(),
        }
    }
}

impl Default for LagConfig {
    fn default() -> Self {
        Self {
            id: default_lag_id(),
            rate: default_rate(),
            ports: default_ports(),
        }
    }
}

impl ConvergenceConfig {
    /// Parses configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> VerifyResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| VerifyError::invalid_config("toml", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates configuration from a file.
    pub fn load(path: impl AsRef<Path>) -> VerifyResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            VerifyError::invalid_config(path.display().to_string(), e.to_string())
        })?;
        Self::from_toml_str(&content)
    }

    /// Serializes the configuration as TOML.
    pub fn to_toml_string(&self) -> VerifyResult<String> {
        toml::to_string_pretty(self).map_err(|e| VerifyError::invalid_config("toml", e.to_string()))
    }

    /// Validates configuration.
    pub fn validate(&self) -> VerifyResult<()> {
        let budgets = [
            ("static_convergence", &self.budgets.static_convergence),
            ("dynamic_convergence", &self.budgets.dynamic_convergence),
            ("interfaces", &self.budgets.interfaces),
            ("relink", &self.budgets.relink),
        ];
        for (name, budget) in budgets {
            budget.validate(name)?;
        }

        let numeric = [
            ("defaults.key", &self.defaults.key),
            ("defaults.port_priority", &self.defaults.port_priority),
            ("defaults.system_priority", &self.defaults.system_priority),
        ];
        for (field, value) in numeric {
            match value.parse::<u16>() {
                Ok(v) if v > 0 => {}
                _ => {
                    return Err(VerifyError::invalid_config(
                        field,
                        format!("'{}' is not a positive 16-bit value", value),
                    ))
                }
            }
        }

        if self.lag.id.is_empty() {
            return Err(VerifyError::invalid_config("lag.id", "must not be empty"));
        }
        if self.lag.ports.is_empty() {
            return Err(VerifyError::invalid_config("lag.ports", "must not be empty"));
        }
        Ok(())
    }

    /// Backoff floor.
    pub fn min_backoff(&self) -> Duration {
        Duration::from_millis(self.retry.min_backoff_ms)
    }

    /// Poller honouring the configured backoff floor.
    pub fn poller(&self) -> RetryPoller {
        RetryPoller::new(self.min_backoff())
    }

    /// Defaults table for the validator.
    pub fn mode_table(&self) -> ModeTable {
        ModeTable::new(self.defaults.clone())
    }
}
