// file: src/store/etcd.rs
// version: 1.1.0
// guid: a7c2e9f1-4b3d-4e6a-9c8b-12f0d7e5a3b4

//! etcd backend

use super::backend::{check_commit_size, KvBackend, KvOp};
use crate::{RegistrarError, Result};
use etcd_client::{Client, ConnectOptions, DeleteOptions, GetOptions, KvClient, Txn, TxnOp};
use std::time::Duration;
use tracing::{debug, info};

/// Backend talking to an etcd cluster over gRPC
#[derive(Clone)]
pub struct EtcdBackend {
    kv: KvClient,
}

impl EtcdBackend {
    /// Connect to the given endpoints
    pub async fn connect(
        endpoints: &[String],
        dial_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        info!("Connecting to etcd at {}", endpoints.join(","));
        let options = ConnectOptions::new()
            .with_connect_timeout(dial_timeout)
            .with_timeout(request_timeout);
        let client = Client::connect(endpoints, Some(options)).await?;

        Ok(Self {
            kv: client.kv_client(),
        })
    }
}

#[async_trait::async_trait]
impl KvBackend for EtcdBackend {
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let mut kv = self.kv.clone();
        let response = kv
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await?;

        let mut found = Vec::with_capacity(response.kvs().len());
        for pair in response.kvs() {
            found.push((pair.key_str()?.to_string(), pair.value().to_vec()));
        }
        debug!("etcd get {} returned {} keys", prefix, found.len());
        Ok(found)
    }

    async fn commit(&self, ops: Vec<KvOp>) -> Result<()> {
        check_commit_size(&ops)?;
        let txn_ops: Vec<TxnOp> = ops
            .into_iter()
            .map(|op| match op {
                KvOp::Put { key, value } => TxnOp::put(key, value, None),
                KvOp::DeletePrefix { prefix } => {
                    TxnOp::delete(prefix, Some(DeleteOptions::new().with_prefix()))
                }
            })
            .collect();
        let count = txn_ops.len();

        let mut kv = self.kv.clone();
        let response = kv.txn(Txn::new().and_then(txn_ops)).await?;
        if !response.succeeded() {
            return Err(RegistrarError::store("etcd transaction was not applied"));
        }
        debug!("etcd txn applied {} operations", count);
        Ok(())
    }
}
