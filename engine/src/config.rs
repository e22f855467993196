//! Run options.
//!
//! Options are layered: defaults, then `TRACKFLOW_*` environment variables
//! (a `.env` file is honoured), then command line flags.
//!
//! | Variable               | Option       |
//! |------------------------|--------------|
//! | `TRACKFLOW_OUTPUT_DIR` | `output_dir` |
//! | `TRACKFLOW_SEED`       | `seed`       |
//! | `TRACKFLOW_CATALOG`    | `catalog`    |
//! | `TRACKFLOW_PORT`       | `port`       |

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::error::OptionsError;

pub const OUTPUT_DIR_VAR: &str = "TRACKFLOW_OUTPUT_DIR";
pub const SEED_VAR: &str = "TRACKFLOW_SEED";
pub const CATALOG_VAR: &str = "TRACKFLOW_CATALOG";
pub const PORT_VAR: &str = "TRACKFLOW_PORT";

/// Options for running pipelines and the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    /// Root directory of the file sink.
    pub output_dir: PathBuf,

    /// Seed for shuffling; random when absent.
    pub seed: Option<u64>,

    /// Serve tracks from this catalog file instead of Spotify.
    pub catalog: Option<PathBuf>,

    /// Write the run report here.
    pub report: Option<PathBuf>,

    /// HTTP server port.
    pub port: u16,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            seed: None,
            catalog: None,
            report: None,
            port: 3000,
        }
    }
}

impl RunOptions {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, OptionsError> {
        let _ = dotenvy::dotenv();
        Self::default().overlay(|name| env::var(name).ok())
    }

    /// Overlay values found through `lookup`; blank values are ignored.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self, OptionsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get(OUTPUT_DIR_VAR) {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(seed) = get(SEED_VAR) {
            self.seed = Some(parse_number(SEED_VAR, &seed)?);
        }
        if let Some(catalog) = get(CATALOG_VAR) {
            self.catalog = Some(PathBuf::from(catalog));
        }
        if let Some(port) = get(PORT_VAR) {
            self.port = parse_number(PORT_VAR, &port)?;
        }
        Ok(self)
    }

    pub fn with_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.output_dir = dir;
        }
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        if seed.is_some() {
            self.seed = seed;
        }
        self
    }

    pub fn with_catalog(mut self, catalog: Option<PathBuf>) -> Self {
        if catalog.is_some() {
            self.catalog = catalog;
        }
        self
    }

    pub fn with_report(mut self, report: Option<PathBuf>) -> Self {
        if report.is_some() {
            self.report = report;
        }
        self
    }

    pub fn with_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.port = port;
        }
        self
    }
}

fn parse_number<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, OptionsError> {
    value.trim().parse().map_err(|_| OptionsError::InvalidNumber {
        var: var.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let options = RunOptions::default();
        assert_eq!(options.output_dir, PathBuf::from("output"));
        assert_eq!(options.seed, None);
        assert_eq!(options.port, 3000);
    }

    #[test]
    fn test_overlay_environment() {
        let options = RunOptions::default()
            .overlay(vars(&[
                (OUTPUT_DIR_VAR, "/tmp/exports"),
                (SEED_VAR, " 42 "),
                (CATALOG_VAR, "catalog.json"),
                (PORT_VAR, ""),
            ]))
            .unwrap();
        assert_eq!(options.output_dir, PathBuf::from("/tmp/exports"));
        assert_eq!(options.seed, Some(42));
        assert_eq!(options.catalog, Some(PathBuf::from("catalog.json")));
        assert_eq!(options.port, 3000);
    }

    #[test]
    fn test_invalid_seed() {
        let err = RunOptions::default().overlay(vars(&[(SEED_VAR, "lucky")])).unwrap_err();
        assert_eq!(
            err,
            OptionsError::InvalidNumber {
                var: SEED_VAR.into(),
                value: "lucky".into()
            }
        );
    }

    #[test]
    fn test_flags_win_over_environment() {
        let options = RunOptions::default()
            .overlay(vars(&[(SEED_VAR, "1")]))
            .unwrap()
            .with_seed(Some(2))
            .with_output_dir(None)
            .with_report(Some(PathBuf::from("report.json")));
        assert_eq!(options.seed, Some(2));
        assert_eq!(options.output_dir, PathBuf::from("output"));
        assert_eq!(options.report, Some(PathBuf::from("report.json")));
    }
}
