use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::evaluator::EfficiencyAveraging;
use crate::solver::PackingConfig;

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub optimizer: OptimizerConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            optimizer: OptimizerConfig::from_env(),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    const DEFAULT_PORT: u16 = 8080;
    const HOST_VAR: &'static str = "CARTON_PACK_API_HOST";
    const PORT_VAR: &'static str = "CARTON_PACK_API_PORT";

    fn from_env() -> Self {
        Self::from_values(env_string(Self::HOST_VAR), env_string(Self::PORT_VAR))
    }

    fn from_values(host: Option<String>, port: Option<String>) -> Self {
        let host_value = host.unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, display_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                log::warn!(
                    "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                    Self::HOST_VAR,
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (Self::DEFAULT_BIND_IP, Self::DEFAULT_HOST.to_string())
            }
        };

        let port = match port {
            Some(raw) => match raw.parse::<u16>() {
                Ok(value) if value != 0 => value,
                Ok(_) => {
                    log::warn!(
                        "⚠️ {} must not be 0. Using {}.",
                        Self::PORT_VAR,
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
                Err(err) => {
                    log::warn!(
                        "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                        Self::PORT_VAR,
                        raw,
                        err,
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
            },
            None => Self::DEFAULT_PORT,
        };

        Self {
            bind_ip,
            display_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }

    /// Checks whether the hostname matches the default value.
    pub fn uses_default_host(&self) -> bool {
        self.display_host == Self::DEFAULT_HOST
    }
}

/// Configuration for the packing engine.
#[derive(Clone, Debug, Default)]
pub struct OptimizerConfig {
    packing: PackingConfig,
}

impl OptimizerConfig {
    const SUPPORT_RATIO_VAR: &'static str = "CARTON_PACK_SUPPORT_RATIO";
    const HEIGHT_EPSILON_VAR: &'static str = "CARTON_PACK_HEIGHT_EPSILON";
    const GENERAL_EPSILON_VAR: &'static str = "CARTON_PACK_GENERAL_EPSILON";
    const MAX_POSITION_CHECKS_VAR: &'static str = "CARTON_PACK_MAX_POSITION_CHECKS";
    const ALLOW_ROTATION_VAR: &'static str = "CARTON_PACK_ALLOW_ROTATIONS";
    const EFFICIENCY_AVERAGING_VAR: &'static str = "CARTON_PACK_EFFICIENCY_AVERAGING";
    const PARALLEL_TRIALS_VAR: &'static str = "CARTON_PACK_PARALLEL_TRIALS";

    fn from_env() -> Self {
        let support_ratio = load_f64_with_warning(
            Self::SUPPORT_RATIO_VAR,
            PackingConfig::DEFAULT_SUPPORT_RATIO,
            |value| (0.0..=1.0).contains(&value),
            "must be between 0 and 1",
            "Adjusted minimum support may reject stacked placements",
        );

        let height_epsilon = load_f64_with_warning(
            Self::HEIGHT_EPSILON_VAR,
            PackingConfig::DEFAULT_HEIGHT_EPSILON,
            |value| value > 0.0,
            "must be greater than 0",
            "Adjusted height tolerance may cause unexpected placements",
        );

        let general_epsilon = load_f64_with_warning(
            Self::GENERAL_EPSILON_VAR,
            PackingConfig::DEFAULT_GENERAL_EPSILON,
            |value| value > 0.0,
            "must be greater than 0",
            "Adjusted tolerances may cause numerical instabilities",
        );

        let max_position_checks = match env_string(Self::MAX_POSITION_CHECKS_VAR) {
            Some(raw) => parse_check_budget(&raw, Self::MAX_POSITION_CHECKS_VAR)
                .unwrap_or(PackingConfig::DEFAULT_MAX_POSITION_CHECKS),
            None => PackingConfig::DEFAULT_MAX_POSITION_CHECKS,
        };

        let allow_item_rotation = env_string(Self::ALLOW_ROTATION_VAR)
            .and_then(|raw| parse_bool(&raw, Self::ALLOW_ROTATION_VAR))
            .unwrap_or(PackingConfig::DEFAULT_ALLOW_ITEM_ROTATION);

        let efficiency_averaging = env_string(Self::EFFICIENCY_AVERAGING_VAR)
            .and_then(|raw| {
                let parsed = EfficiencyAveraging::parse(&raw);
                if parsed.is_none() {
                    log::warn!(
                        "⚠️ {} ('{}') must be 'instance' or 'pattern'. Using default value.",
                        Self::EFFICIENCY_AVERAGING_VAR,
                        raw
                    );
                }
                parsed
            })
            .unwrap_or_default();

        let parallel_trials = env_string(Self::PARALLEL_TRIALS_VAR)
            .and_then(|raw| parse_bool(&raw, Self::PARALLEL_TRIALS_VAR))
            .unwrap_or(PackingConfig::DEFAULT_PARALLEL_TRIALS);

        let packing = PackingConfig::builder()
            .support_ratio(support_ratio)
            .height_epsilon(height_epsilon)
            .general_epsilon(general_epsilon)
            .max_position_checks(max_position_checks)
            .allow_item_rotation(allow_item_rotation)
            .efficiency_averaging(efficiency_averaging)
            .parallel_trials(parallel_trials)
            .build();

        Self { packing }
    }

    /// Returns the configured PackingConfig.
    pub fn packing_config(&self) -> PackingConfig {
        self.packing
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            log::warn!("⚠️ Access to {} failed: {}. Using default value.", name, err);
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            log::warn!(
                "⚠️ Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name,
                other
            );
            None
        }
    }
}

/// Accepts `_` separators (`2_000_000`). Zero is rejected.
fn parse_check_budget(raw: &str, var_name: &str) -> Option<u64> {
    let digits: String = raw.trim().chars().filter(|c| *c != '_').collect();
    match digits.parse::<u64>() {
        Ok(value) if value > 0 => Some(value),
        Ok(_) => {
            log::warn!("⚠️ {} must be greater than 0. Using default value.", var_name);
            None
        }
        Err(err) => {
            log::warn!(
                "⚠️ Could not parse {} ('{}') as number: {}. Using default value.",
                var_name,
                raw,
                err
            );
            None
        }
    }
}

fn load_f64_with_warning(
    var_name: &str,
    default: f64,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
    warning: &str,
) -> f64 {
    match env_string(var_name) {
        Some(raw) => parse_f64_with_warning(&raw, var_name, default, validator, invalid_hint, warning),
        None => default,
    }
}

fn parse_f64_with_warning(
    raw: &str,
    var_name: &str,
    default: f64,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
    warning: &str,
) -> f64 {
    match raw.parse::<f64>() {
        Ok(value) => {
            if !validator(value) {
                log::warn!(
                    "⚠️ {} contains invalid value '{}': {}. Using {}.",
                    var_name,
                    raw,
                    invalid_hint,
                    default
                );
                default
            } else {
                let tolerance = (default.abs().max(1.0)) * 1e-9;
                if (value - default).abs() > tolerance {
                    log::warn!("⚠️ {} ({} = {}).", warning, var_name, value);
                }
                value
            }
        }
        Err(err) => {
            log::warn!(
                "⚠️ Could not parse {} ('{}') as number: {}. Using {}.",
                var_name,
                raw,
                err,
                default
            );
            default
        }
    }
}
