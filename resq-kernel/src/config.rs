use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use tokio::fs;

pub const CONFIG_ENV: &str = "RESQ_KERNEL_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "resq.yaml";

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    pub http: HttpConf,
    pub storage: StorageConf,
    pub expiry: ExpiryConf,
    pub alerts: AlertConf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct HttpConf {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StorageConf {
    pub data_file: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ExpiryConf {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AlertConf {
    pub tracking_base_url: String, // ex: "https://resq.example.org"
    pub subject: String,
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { host: "0.0.0.0".into(), port: 3000 }
    }
}

impl Default for StorageConf {
    fn default() -> Self {
        Self { data_file: "emergencyData.json".into() }
    }
}

impl Default for ExpiryConf {
    fn default() -> Self {
        Self { ttl_secs: 300, sweep_interval_secs: 60 }
    }
}

impl Default for AlertConf {
    fn default() -> Self {
        Self {
            tracking_base_url: "http://127.0.0.1:3000".into(),
            subject: "Emergency Alert".into(),
        }
    }
}

impl HttpConf {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port).parse()?;
        Ok(addr)
    }
}

impl ExpiryConf {
    pub fn ttl(&self) -> time::Duration {
        time::Duration::seconds(self.ttl_secs.min(i64::MAX as u64) as i64)
    }

    /// Never zero: `tokio::time::interval` panics on a zero period.
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

pub fn parse_config(txt: &str) -> KernelConfig {
    if txt.trim().is_empty() {
        return KernelConfig::default();
    }
    serde_yaml::from_str(txt).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "invalid config, using defaults");
        KernelConfig::default()
    })
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        tracing::info!(path = %path, "config loaded");
        parse_config(&txt)
    } else {
        tracing::info!(path = %path, "no config file, using defaults");
        KernelConfig::default()
    }
}
