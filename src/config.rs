use serde::Deserialize;
use std::{fs, net::SocketAddr, path::PathBuf};

use anyhow::{Context, Result};

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub model_path: PathBuf,
    pub encoders_path: PathBuf,
    /// Name of the encoder in the encoder artifact that decodes predictions.
    pub target_encoder: String,
    pub max_upload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            model_path: PathBuf::from("model/full_diabetes_pipeline.json"),
            encoders_path: PathBuf::from("model/target_encoders.json"),
            target_encoder: "diabetes_stage".to_string(),
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

impl AppConfig {
    /// Read a JSON config file; missing keys fall back to defaults.
    pub fn load(path: &str) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path))?;
        serde_json::from_str(&data).with_context(|| format!("invalid config JSON in {}", path))
    }

    /// Defaults, then the file named by `CONFIG_PATH`, then env overrides.
    pub fn from_env() -> Result<Self> {
        let mut cfg = match std::env::var("CONFIG_PATH") {
            Ok(path) => Self::load(&path)?,
            Err(_) => Self::default(),
        };
        cfg.apply_overrides(|k| std::env::var(k).ok());
        Ok(cfg)
    }

    pub fn apply_overrides<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = get("BIND_ADDR").and_then(|s| s.parse().ok()) {
            self.bind_addr = addr;
        }
        if let Some(port) = get("PORT").and_then(|s| s.parse::<u16>().ok()) {
            self.bind_addr.set_port(port);
        }
        if let Some(p) = get("MODEL_PATH") {
            self.model_path = PathBuf::from(p);
        }
        if let Some(p) = get("ENCODERS_PATH") {
            self.encoders_path = PathBuf::from(p);
        }
        if let Some(t) = get("TARGET_ENCODER") {
            self.target_encoder = t;
        }
        if let Some(n) = get("MAX_UPLOAD_BYTES").and_then(|s| s.parse().ok()) {
            self.max_upload_bytes = n;
        }
    }
}
