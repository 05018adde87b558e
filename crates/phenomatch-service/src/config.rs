//! Environment configuration.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{ServiceError, ServiceResult};

const DEFAULT_DATA_PATH: &str = "./data";
const DEFAULT_PORT: u16 = 50051;
const DEFAULT_MIN_SCORE: f64 = 0.1;
const DEFAULT_EXOME_WORKERS: usize = 4;

/// Server settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Directory with the ontology, annotations, `patients.json` and `exomes/`.
    pub data_path: PathBuf,
    /// Port to listen on.
    pub port: u16,
    /// Minimum overall score for stored and listed matches.
    pub min_score: f64,
    /// Blocking threads available to exome annotation.
    pub exome_workers: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            port: DEFAULT_PORT,
            min_score: DEFAULT_MIN_SCORE,
            exome_workers: DEFAULT_EXOME_WORKERS,
        }
    }
}

impl ServiceConfig {
    /// Reads `PHENOMATCH_*` variables, keeping defaults for unset ones.
    pub fn from_env() -> ServiceResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> ServiceResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            data_path: lookup("PHENOMATCH_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_path),
            port: parse_var(&lookup, "PHENOMATCH_PORT")?.unwrap_or(defaults.port),
            min_score: parse_var(&lookup, "PHENOMATCH_MIN_SCORE")?.unwrap_or(defaults.min_score),
            exome_workers: parse_var(&lookup, "PHENOMATCH_EXOME_WORKERS")?
                .unwrap_or(defaults.exome_workers),
        };

        if !(0.0..=1.0).contains(&config.min_score) {
            return Err(ServiceError::Config {
                name: "PHENOMATCH_MIN_SCORE".to_string(),
                value: config.min_score.to_string(),
            });
        }
        if config.exome_workers == 0 {
            return Err(ServiceError::Config {
                name: "PHENOMATCH_EXOME_WORKERS".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> ServiceResult<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ServiceError::Config {
                name: name.to_string(),
                value,
            }),
    }
}
