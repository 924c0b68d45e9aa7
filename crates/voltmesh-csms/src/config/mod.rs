//! Node config loader (strict parsing).

pub mod schema;

use std::fs;

use voltmesh_core::error::{CsmsError, Result};

pub use schema::{CsmsConfig, CsmsSection, FeatureSection, ForwardingSection, NodeSection};

pub fn load_from_file(path: &str) -> Result<CsmsConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| CsmsError::Internal(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<CsmsConfig> {
    let cfg: CsmsConfig =
        serde_yaml::from_str(s).map_err(|e| CsmsError::BadRequest(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
