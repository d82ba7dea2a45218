//! Template polling.
//!
//! One long-poll fetcher per chain: a single beacon loop plus one loop
//! per enabled shard, reconciled against `listshards` on the outer tick.
//! Every shard fetcher hangs off its own cancellation token so a shard
//! the upstream disables stops fetching at its next await point.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use jaxmine_rpc::{RpcApi, TemplateRequest};

use crate::job::Job;
use crate::ShardId;

/// Drives the beacon and shard template fetchers.
pub struct Poller {
    job: Arc<Job>,
    rpc: Arc<dyn RpcApi>,
    shards: HashMap<ShardId, CancellationToken>,
    shutdown: CancellationToken,
}

impl Poller {
    pub fn new(job: Arc<Job>, rpc: Arc<dyn RpcApi>) -> Self {
        Poller {
            job,
            rpc,
            shards: HashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the poller and every fetcher it spawned.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until shutdown: spawn the beacon loop, then reconcile the
    /// shard fetcher set on every tick.
    pub async fn run(mut self) {
        let retry = self.job.config().retry_interval;
        tokio::spawn(fetch_beacon_loop(
            self.job.clone(),
            self.rpc.clone(),
            self.shutdown.child_token(),
            retry,
        ));

        let poll_interval = self.job.config().poll_interval;
        loop {
            self.reconcile_shards().await;
            tokio::select! {
                _ = sleep(poll_interval) => {}
                _ = self.shutdown.cancelled() => {
                    info!("poller shutting down");
                    for (id, token) in self.shards.drain() {
                        debug!("cancelling shard {id} fetcher");
                        token.cancel();
                    }
                    return;
                }
            }
        }
    }

    /// Bring the fetcher set in line with the upstream shard list: start
    /// a fetcher per newly enabled shard, cancel and drop every shard
    /// that disappeared or was disabled.
    pub(crate) async fn reconcile_shards(&mut self) {
        let listed = match self.rpc.list_shards().await {
            Ok(reply) => reply.shards,
            Err(error) => {
                error!("can't list shards: {error}");
                return;
            }
        };

        for (id, info) in &listed {
            if !info.enabled || self.shards.contains_key(id) {
                continue;
            }
            info!("starting fetcher for shard {id}");
            let token = self.shutdown.child_token();
            self.shards.insert(*id, token.clone());
            tokio::spawn(fetch_shard_loop(
                self.job.clone(),
                self.rpc.clone(),
                *id,
                token,
                self.job.config().retry_interval,
            ));
        }

        let stale: Vec<ShardId> = self
            .shards
            .keys()
            .filter(|id| !listed.get(*id).map(|s| s.enabled).unwrap_or(false))
            .copied()
            .collect();
        for id in stale {
            info!("stopping fetcher for shard {id}");
            if let Some(token) = self.shards.remove(&id) {
                token.cancel();
            }
            self.job.remove_shard(id);
        }
    }
}

async fn fetch_beacon_loop(
    job: Arc<Job>,
    rpc: Arc<dyn RpcApi>,
    token: CancellationToken,
    retry: Duration,
) {
    let mut request = TemplateRequest::coinbase_txn();
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("stop fetching beacon template");
                return;
            }
            result = rpc.get_beacon_block_template(&request) => match result {
                Ok(template) => {
                    request.long_poll_id = template.long_poll_id.clone();
                    info!("beacon template at height {}", template.height);
                    if let Err(error) = job.process_beacon_template(&template) {
                        warn!("can't process beacon template: {error}");
                    }
                }
                Err(error) => {
                    warn!("beacon template fetch failed: {error}");
                    tokio::select! {
                        _ = token.cancelled() => return,
                        _ = sleep(retry) => {}
                    }
                }
            }
        }
    }
}

async fn fetch_shard_loop(
    job: Arc<Job>,
    rpc: Arc<dyn RpcApi>,
    shard_id: ShardId,
    token: CancellationToken,
    retry: Duration,
) {
    let mut request = TemplateRequest::coinbase_txn();
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("stop fetching template for shard {shard_id}");
                return;
            }
            result = rpc.get_shard_block_template(shard_id, &request) => match result {
                Ok(template) => {
                    request.long_poll_id = template.long_poll_id.clone();
                    info!("shard {} template at height {}", shard_id, template.height);
                    if let Err(error) = job.process_shard_template(&template, shard_id) {
                        warn!("can't process shard {shard_id} template: {error}");
                    }
                }
                Err(error) => {
                    warn!("shard {shard_id} template fetch failed: {error}");
                    tokio::select! {
                        _ = token.cancelled() => return,
                        _ = sleep(retry) => {}
                    }
                }
            }
        }
    }
}
