use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, time::Duration};
use tokio::fs;
use tracing::{info, warn};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 45;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct KernelConfig {
    pub bind: SocketAddr,
    pub poll_interval_secs: u64,
    pub upstream: UpstreamConf,
    pub rooms: Vec<RoomConf>,
    pub live: LiveConf,
    pub health: HealthConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct UpstreamConf {
    pub url_template: String, // ex: "https://laundrytrackerconnect.com/hamp{id}.aspx"
    pub timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RoomConf {
    pub slug: String,
    pub name: String,
    /// Identifiant côté upstream quand il diffère du slug (dakin -> dakink)
    pub upstream_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LiveConf {
    pub channel_capacity: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HealthConf {
    pub report_interval_secs: u64,
}

impl RoomConf {
    pub fn new(slug: &str, name: &str, upstream_id: Option<&str>) -> Self {
        Self {
            slug: slug.to_string(),
            name: name.to_string(),
            upstream_id: upstream_id.map(str::to_string),
        }
    }

    pub fn upstream_id(&self) -> &str {
        self.upstream_id.as_deref().unwrap_or(&self.slug)
    }
}

impl UpstreamConf {
    pub fn url_for(&self, room: &RoomConf) -> String {
        self.url_template.replace("{id}", room.upstream_id())
    }
}

impl KernelConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 1323)),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            upstream: UpstreamConf::default(),
            rooms: vec![
                RoomConf::new("dakin", "Dakin", Some("dakink")),
                RoomConf::new("merrill", "Merrill", None),
                RoomConf::new("enfield", "Enfield", None),
                RoomConf::new("prescott", "Prescott", None),
            ],
            live: LiveConf::default(),
            health: HealthConf::default(),
        }
    }
}

impl Default for UpstreamConf {
    fn default() -> Self {
        Self {
            url_template: "https://laundrytrackerconnect.com/hamp{id}.aspx".into(),
            timeout_secs: 15,
            user_agent: concat!("hamp-kernel/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl Default for LiveConf {
    fn default() -> Self {
        Self { channel_capacity: 16 }
    }
}

impl Default for HealthConf {
    fn default() -> Self {
        Self { report_interval_secs: 300 }
    }
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("HAMP_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    if !Path::new(&path).exists() {
        info!("no {path} found, using default config");
        return KernelConfig::default();
    }
    read_config(&path).await
}

async fn read_config(path: &str) -> KernelConfig {
    match fs::read_to_string(path).await {
        Ok(txt) => parse_config(&txt),
        Err(e) => {
            warn!("cannot read config {path}: {e}");
            KernelConfig::default()
        }
    }
}

fn parse_config(txt: &str) -> KernelConfig {
    if txt.trim().is_empty() {
        return KernelConfig::default();
    }
    serde_yaml::from_str(txt).unwrap_or_else(|e| {
        warn!("invalid config: {e}");
        KernelConfig::default()
    })
}
