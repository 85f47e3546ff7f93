// file: src/config/loader.rs
// version: 2.0.0
// guid: d4e5f6a7-b8c9-4123-8567-890123defabc

//! Configuration file loading and environment variable substitution

use super::RegistrarConfig;
use crate::{RegistrarError, Result};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
    env_vars: HashMap<String, String>,
}

impl ConfigLoader {
    /// Create a loader over the process environment
    pub fn new() -> Self {
        Self {
            env_vars: std::env::vars().collect(),
        }
    }

    /// Load and validate a YAML configuration file
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<RegistrarConfig> {
        let config = self.load_unvalidated(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML configuration file that command line overrides will complete
    pub fn load_unvalidated<P: AsRef<Path>>(&self, path: P) -> Result<RegistrarConfig> {
        let content = fs::read_to_string(&path).map_err(|e| {
            RegistrarError::config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let expanded = self.expand_env_vars(&content)?;
        Ok(serde_yaml::from_str(&expanded)?)
    }

    /// Parse and validate YAML configuration text
    pub fn parse(&self, content: &str) -> Result<RegistrarConfig> {
        let expanded = self.expand_env_vars(content)?;
        let config: RegistrarConfig = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace every `${NAME}` with its value
    fn expand_env_vars(&self, content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| RegistrarError::config(format!("Invalid regex pattern: {}", e)))?;

        let mut missing_vars = Vec::new();
        let result = re.replace_all(content, |cap: &regex::Captures| {
            match self.env_vars.get(&cap[1]) {
                Some(value) => value.clone(),
                None => {
                    missing_vars.push(cap[1].to_string());
                    String::new()
                }
            }
        });

        if !missing_vars.is_empty() {
            return Err(RegistrarError::config(format!(
                "Missing environment variables: {}",
                missing_vars.join(", ")
            )));
        }

        Ok(result.into_owned())
    }

    /// Set environment variable for substitution
    pub fn set_env_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env_vars.insert(key.into(), value.into());
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_env_var_expansion() {
        let mut loader = ConfigLoader::new();
        loader.set_env_var("REGISTRAR_TEST_ETCD", "10.0.0.5:2379");

        let result = loader
            .expand_env_vars("endpoints: [\"${REGISTRAR_TEST_ETCD}\"]")
            .unwrap();
        assert_eq!(result, "endpoints: [\"10.0.0.5:2379\"]");
    }

    #[test]
    fn test_missing_env_var() {
        let loader = ConfigLoader::new();
        let result = loader.expand_env_vars("install_id: ${REGISTRAR_TEST_MISSING_VAR}");
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("REGISTRAR_TEST_MISSING_VAR"));
    }

    #[test]
    fn test_load_config() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
install_id: ${{REGISTRAR_TEST_INSTALL}}
listen_addr: 127.0.0.1:9000
etcd:
  endpoints:
    - etcd-0:2379
    - etcd-1:2379
  request_timeout_secs: 2
storage:
  min_osd_size_bytes: 1000
shadow:
  file: /host/etc/shadow
"#
        )
        .unwrap();

        let mut loader = ConfigLoader::new();
        loader.set_env_var("REGISTRAR_TEST_INSTALL", "prod-7");
        let config = loader.load(file.path())?;

        assert_eq!(config.install_id, "prod-7");
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.etcd.endpoints.len(), 2);
        assert_eq!(config.etcd.request_timeout_secs, 2);
        assert_eq!(config.etcd.dial_timeout_secs, 5);
        assert_eq!(config.storage.min_osd_size_bytes, 1000);
        assert_eq!(config.storage.ceph_binary.to_str(), Some("/usr/bin/ceph"));
        assert_eq!(config.shadow.file.to_str(), Some("/host/etc/shadow"));
        assert_eq!(config.shadow.root_account, "root");

        Ok(())
    }

    #[test]
    fn test_unvalidated_load_allows_overrides() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "listen_addr: 127.0.0.1:9000").unwrap();

        let loader = ConfigLoader::new();
        assert!(loader.load(file.path()).is_err());

        let mut config = loader.load_unvalidated(file.path()).unwrap();
        config.install_id = "from-cli".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let loader = ConfigLoader::new();
        assert!(matches!(
            loader.parse("listen_addr: 0.0.0.0:1\n").unwrap_err(),
            RegistrarError::Config(_)
        ));
        assert!(matches!(
            loader.parse("install_id: [unterminated\n").unwrap_err(),
            RegistrarError::Yaml(_)
        ));
    }
}
