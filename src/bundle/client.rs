// file: src/bundle/client.rs
// version: 1.0.0
// guid: 9b4d2e8a-7f16-4c3b-b5e0-a2c9d8f1e647

//! Archive handed to an operator with their client certificate

use super::{build_archive, ManifestFile};
use crate::identity::IssuedIdentity;
use crate::Result;

pub const CLIENT_ARCHIVE_NAME: &str = "cluster-credentials.tar.gz";

const KUBECONFIG_TEMPLATE: &str = "apiVersion: v1
kind: Config
clusters:
  - name: {CLUSTER}
    cluster: {API_SERVER}
      certificate-authority: ca.pem
contexts:
  - name: {CLUSTER}
    context:
      cluster: {CLUSTER}
      user: {USER}
users:
  - name: {USER}
    user:
      client-certificate: cert.pem
      client-key: key.pem
current-context: {CLUSTER}
";

const README: &str = "Kubernetes credentials
----------------------

This directory holds the credentials and configuration needed to reach the
cluster's Kubernetes API. To use them:

1. Install kubectl (https://kubernetes.io/docs/tasks/tools/install-kubectl/)
2. Run:

\tkubectl --kubeconfig=kubeconfig <command>
";

/// Everything a client archive is rendered from
pub struct ClientContext<'a> {
    pub identity: &'a IssuedIdentity,
    pub ca_bundle: &'a [u8],
    /// Cluster name in the kubeconfig, the install id
    pub cluster_name: &'a str,
    pub user: &'a str,
    /// `https://host:port` of the API server, when it could be determined
    pub server_url: Option<String>,
}

fn client_manifest<'a>() -> [ManifestFile<ClientContext<'a>>; 5] {
    [
        ManifestFile {
            path: "cluster-credentials/cert.pem",
            mode: 0o600,
            contents: |ctx| Ok(ctx.identity.certificate.clone()),
        },
        ManifestFile {
            path: "cluster-credentials/key.pem",
            mode: 0o600,
            contents: |ctx| Ok(ctx.identity.private_key.clone()),
        },
        ManifestFile {
            path: "cluster-credentials/ca.pem",
            mode: 0o600,
            contents: |ctx| Ok(ctx.ca_bundle.to_vec()),
        },
        ManifestFile {
            path: "cluster-credentials/kubeconfig",
            mode: 0o644,
            contents: |ctx| Ok(render_kubeconfig(ctx).into_bytes()),
        },
        ManifestFile {
            path: "cluster-credentials/README.txt",
            mode: 0o644,
            contents: |_| Ok(README.as_bytes().to_vec()),
        },
    ]
}

/// Build the client archive for an operator
pub fn client_archive(ctx: &ClientContext<'_>) -> Result<Vec<u8>> {
    build_archive(&client_manifest(), ctx)
}

/// Fill the kubeconfig template
pub fn render_kubeconfig(ctx: &ClientContext<'_>) -> String {
    let server = match &ctx.server_url {
        Some(url) => format!("\n      server: {}", url),
        None => String::new(),
    };
    KUBECONFIG_TEMPLATE
        .replace("{CLUSTER}", ctx.cluster_name)
        .replace("{USER}", ctx.user)
        .replace("{API_SERVER}", &server)
}
