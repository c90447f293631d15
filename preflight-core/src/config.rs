use std::env;

/// Runtime configuration, loaded from environment variables.
#[derive(Clone, Debug)]
pub struct Config {
    /// Where the aggregated results document is written.
    pub results_path: String,

    /// Target GCP project. Required.
    pub project_id: String,
    /// Optional region, reserved for regional checks.
    pub gcp_region: String,

    /// Validators excluded from the run.
    pub disabled_validators: Vec<String>,
    pub stop_on_first_failure: bool,

    /// APIs the api-enabled validator verifies.
    pub required_apis: Vec<String>,

    /// Quota validator knobs. Zero means "no requirement".
    pub required_vcpus: i64,
    pub required_disk_gb: i64,
    pub required_ip_addresses: i64,

    /// Network validator knobs.
    pub vpc_name: String,
    pub subnet_name: String,

    pub log_level: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("PROJECT_ID is required")]
    MissingProjectId,
}

fn default_required_apis() -> Vec<String> {
    vec![
        "compute.googleapis.com".to_string(),
        "iam.googleapis.com".to_string(),
        "cloudresourcemanager.googleapis.com".to_string(),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            results_path: "/results/adapter-result.json".to_string(),
            project_id: String::new(),
            gcp_region: String::new(),
            disabled_validators: Vec::new(),
            stop_on_first_failure: false,
            required_apis: default_required_apis(),
            required_vcpus: 0,
            required_disk_gb: 0,
            required_ip_addresses: 0,
            vpc_name: String::new(),
            subnet_name: String::new(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment. Malformed
    /// boolean/integer values fall back to their defaults; the only
    /// fatal condition is a missing `PROJECT_ID`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let cfg = Self {
            results_path: env_or("RESULTS_PATH", "/results/adapter-result.json"),
            project_id: env::var("PROJECT_ID").unwrap_or_default(),
            gcp_region: env_or("GCP_REGION", ""),
            disabled_validators: env_list("DISABLED_VALIDATORS"),
            stop_on_first_failure: env_bool("STOP_ON_FIRST_FAILURE", false),
            required_apis: match env_list("REQUIRED_APIS") {
                apis if apis.is_empty() => default_required_apis(),
                apis => apis,
            },
            required_vcpus: env_int("REQUIRED_VCPUS", 0),
            required_disk_gb: env_int("REQUIRED_DISK_GB", 0),
            required_ip_addresses: env_int("REQUIRED_IP_ADDRESSES", 0),
            vpc_name: env_or("VPC_NAME", ""),
            subnet_name: env_or("SUBNET_NAME", ""),
            log_level: env_or("LOG_LEVEL", "info"),
        };

        if cfg.project_id.is_empty() {
            return Err(ConfigError::MissingProjectId);
        }

        Ok(cfg)
    }

    /// All validators are enabled unless explicitly disabled.
    pub fn is_validator_enabled(&self, name: &str) -> bool {
        !self.disabled_validators.iter().any(|d| d == name)
    }
}

fn env_or(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) if !value.is_empty() => value.trim().parse().unwrap_or(default),
        _ => default,
    }
}

fn env_int(key: &str, default: i64) -> i64 {
    match env::var(key) {
        Ok(value) if !value.is_empty() => value.trim().parse().unwrap_or(default),
        _ => default,
    }
}

fn env_list(key: &str) -> Vec<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => value
            .split(',')
            .map(|entry| entry.trim().to_string())
            .filter(|entry| !entry.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}
