// file: src/storage/ceph.rs
// version: 1.0.0
// guid: e5a1d7c3-0b8f-4e29-9d64-3f7c2a1b8e90

//! Ceph control plane driven through the `ceph` command line

use super::StorageControl;
use crate::{RegistrarError, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, error};

/// Runs `ceph` subcommands
#[derive(Debug, Clone)]
pub struct CephCli {
    binary: PathBuf,
}

impl CephCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Run `ceph <args>` and return stdout
    async fn run(&self, args: &[&str]) -> Result<String> {
        let command = format!("{} {}", self.binary.display(), args.join(" "));
        debug!("Executing: {}", command);

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| RegistrarError::Process {
                command: command.clone(),
                exit_code: None,
                stderr: format!("Failed to execute command: {}", e),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            let exit_code = output.status.code();
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            error!("Command '{}' failed with exit code {:?}", command, exit_code);
            if !stderr.trim().is_empty() {
                error!("STDERR: {}", stderr.trim());
            }

            return Err(RegistrarError::Process {
                command,
                exit_code,
                stderr: if stderr.trim().is_empty() { stdout } else { stderr },
            });
        }

        Ok(stdout)
    }
}

#[async_trait::async_trait]
impl StorageControl for CephCli {
    async fn create_osd(&self, disk_id: &str) -> Result<String> {
        let id = self.run(&["osd", "create", disk_id]).await?;
        Ok(id.trim().to_string())
    }

    async fn add_osd_key(&self, osd_name: &str) -> Result<()> {
        self.run(&["auth", "add", osd_name, "osd", "allow *", "mon", "allow rwx"])
            .await
            .map(|_| ())
    }

    async fn get_osd_key(&self, osd_name: &str) -> Result<String> {
        let key = self.run(&["auth", "get-key", osd_name]).await?;
        Ok(key.trim().to_string())
    }

    async fn crush_add_osd(&self, osd_name: &str, weight: &str, host: &str) -> Result<()> {
        let host = format!("host={}", host);
        self.run(&["osd", "crush", "add", osd_name, weight, &host])
            .await
            .map(|_| ())
    }

    async fn add_host_bucket(&self, host: &str) -> Result<()> {
        self.run(&["osd", "crush", "add-bucket", host, "host"])
            .await
            .map(|_| ())
    }

    async fn move_host_to_default_root(&self, host: &str) -> Result<()> {
        self.run(&["osd", "crush", "move", host, "root=default"])
            .await
            .map(|_| ())
    }

    async fn purge_osd(&self, osd_name: &str) -> Result<()> {
        self.run(&["osd", "purge", osd_name, "--yes-i-really-mean-it"])
            .await
            .map(|_| ())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// A stand-in `ceph` that logs its argv and answers like the real one
    fn fake_ceph(dir: &TempDir) -> (CephCli, PathBuf) {
        let log = dir.path().join("calls.log");
        let script = dir.path().join("ceph");
        let body = format!(
            r#"#!/bin/sh
echo "$@" >> "{log}"
case "$1 $2" in
  "osd create") echo " 7 " ;;
  "auth get-key") echo "AQBkey==" ;;
  "osd purge") echo "osd $3 does not exist" >&2; exit 2 ;;
esac
exit 0
"#,
            log = log.display()
        );
        std::fs::write(&script, body).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        (CephCli::new(script), log)
    }

    #[tokio::test]
    async fn test_commands_and_output_trimming() {
        let dir = TempDir::new().unwrap();
        let (ceph, log) = fake_ceph(&dir);

        assert_eq!(ceph.create_osd("disk-1").await.unwrap(), "7");
        ceph.add_osd_key("osd.7").await.unwrap();
        assert_eq!(ceph.get_osd_key("osd.7").await.unwrap(), "AQBkey==");
        ceph.crush_add_osd("osd.7", "0.480104", "node-a").await.unwrap();
        ceph.add_host_bucket("node-a").await.unwrap();
        ceph.move_host_to_default_root("node-a").await.unwrap();

        let calls = std::fs::read_to_string(log).unwrap();
        let calls: Vec<&str> = calls.lines().collect();
        assert_eq!(
            calls,
            vec![
                "osd create disk-1",
                "auth add osd.7 osd allow * mon allow rwx",
                "auth get-key osd.7",
                "osd crush add osd.7 0.480104 host=node-a",
                "osd crush add-bucket node-a host",
                "osd crush move node-a root=default",
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_carries_exit_code_and_stderr() {
        let dir = TempDir::new().unwrap();
        let (ceph, _) = fake_ceph(&dir);

        let err = ceph.purge_osd("osd.9").await.unwrap_err();
        match err {
            RegistrarError::Process {
                command,
                exit_code,
                stderr,
            } => {
                assert!(command.ends_with("osd purge osd.9 --yes-i-really-mean-it"));
                assert_eq!(exit_code, Some(2));
                assert!(stderr.contains("does not exist"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_is_process_error() {
        let ceph = CephCli::new("/nonexistent/ceph");
        let err = ceph.create_osd("disk").await.unwrap_err();
        assert!(matches!(err, RegistrarError::Process { exit_code: None, .. }));
    }
}
