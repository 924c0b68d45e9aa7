use serde::Deserialize;

use voltmesh_core::error::{CsmsError, Result};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CsmsConfig {
    pub version: u32,

    #[serde(default)]
    pub csms: CsmsSection,

    #[serde(default)]
    pub node: NodeSection,

    #[serde(default)]
    pub forwarding: ForwardingSection,
}

impl CsmsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(CsmsError::UnsupportedVersion);
        }
        self.csms.validate()?;
        self.forwarding.validate()?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CsmsSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for CsmsSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ping_interval_ms: default_ping_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl CsmsSection {
    pub fn validate(&self) -> Result<()> {
        if !(5000..=120000).contains(&self.ping_interval_ms) {
            return Err(CsmsError::BadRequest(
                "csms.ping_interval_ms must be between 5000 and 120000".into(),
            ));
        }
        if !(10000..=600000).contains(&self.idle_timeout_ms) {
            return Err(CsmsError::BadRequest(
                "csms.idle_timeout_ms must be between 10000 and 600000".into(),
            ));
        }
        if self.idle_timeout_ms <= self.ping_interval_ms {
            return Err(CsmsError::BadRequest(
                "csms.idle_timeout_ms must be greater than ping_interval_ms".into(),
            ));
        }
        if !(1024..=1_048_576).contains(&self.max_frame_bytes) {
            return Err(CsmsError::BadRequest(
                "csms.max_frame_bytes must be between 1024 and 1048576".into(),
            ));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:9310".into()
}
fn default_ping_interval_ms() -> u64 {
    20000
}
fn default_idle_timeout_ms() -> u64 {
    120000
}
fn default_max_frame_bytes() -> usize {
    65536
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct NodeSection {
    /// Local node identity. Absent means no node record resolves, which the
    /// admission policy treats as fail-open.
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub features: FeatureSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureSection {
    /// Node-level kill switch for all charge-point sessions.
    #[serde(default = "default_true")]
    pub charge_points: bool,

    /// Gate for chargers not seen before; absent falls back to
    /// `charge_points`.
    #[serde(default)]
    pub charger_creation: Option<bool>,
}

impl Default for FeatureSection {
    fn default() -> Self {
        Self {
            charge_points: default_true(),
            charger_creation: None,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ForwardingSection {
    /// When true this node relays charge-point traffic to `upstream_url`.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub upstream_url: Option<String>,
}

impl ForwardingSection {
    pub fn validate(&self) -> Result<()> {
        if self.enabled {
            match &self.upstream_url {
                Some(url) if url.starts_with("ws://") || url.starts_with("wss://") => {}
                Some(_) => {
                    return Err(CsmsError::BadRequest(
                        "forwarding.upstream_url must be a ws:// or wss:// url".into(),
                    ))
                }
                None => {
                    return Err(CsmsError::BadRequest(
                        "forwarding.enabled requires forwarding.upstream_url".into(),
                    ))
                }
            }
        }
        Ok(())
    }
}
