//! Redis-backed redirect store.
//!
//! Connects lazily: building the store never touches the network, so a
//! degraded Redis cannot keep the proxy from starting. The first lookup (or
//! health probe) establishes the connection; failures leave the slot empty
//! and the next operation tries again.

use ::redis::aio::ConnectionManager;
use ::redis::cluster::ClusterClient;
use ::redis::cluster_async::ClusterConnection;
use ::redis::AsyncCommands;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, trace};
use url::Url;

use super::{RedirectStore, StoreError};
use crate::config::RedisConfig;

enum Client {
    Single(::redis::Client),
    Cluster(ClusterClient),
}

#[derive(Clone)]
enum Connection {
    Single(ConnectionManager),
    Cluster(ClusterConnection),
}

/// Redirect store reading from a Redis node or cluster.
pub struct RedisStore {
    client: Client,
    connection: Mutex<Option<Connection>>,
    address: String,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("address", &self.address)
            .field("cluster", &matches!(self.client, Client::Cluster(_)))
            .finish()
    }
}

impl RedisStore {
    /// Build a store from connection settings without connecting.
    pub fn new(config: &RedisConfig) -> Result<Self, StoreError> {
        let url = connection_url(config)?;

        let client = if config.is_cluster() {
            info!(
                address = %config.address,
                cluster = config.cluster_name.as_deref().unwrap_or_default(),
                region = config.region.as_deref().unwrap_or_default(),
                service = config.service.as_deref().unwrap_or_default(),
                tls = config.is_tls(),
                "Using Redis cluster client"
            );
            Client::Cluster(ClusterClient::new(vec![url])?)
        } else {
            info!(address = %config.address, tls = config.is_tls(), "Using Redis client");
            Client::Single(::redis::Client::open(url)?)
        };

        Ok(Self {
            client,
            connection: Mutex::new(None),
            address: config.address.clone(),
        })
    }

    async fn connection(&self) -> Result<Connection, StoreError> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let conn = match &self.client {
            Client::Single(client) => Connection::Single(ConnectionManager::new(client.clone()).await?),
            Client::Cluster(client) => Connection::Cluster(client.get_async_connection().await?),
        };
        debug!(address = %self.address, "Redis connection established");

        *slot = Some(conn.clone());
        Ok(conn)
    }
}

#[async_trait]
impl RedirectStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        trace!(key, "Redis GET");

        let value: Option<String> = match self.connection().await? {
            Connection::Single(mut conn) => conn.get(key).await?,
            Connection::Cluster(mut conn) => conn.get(key).await?,
        };
        Ok(value)
    }

    async fn check(&self) -> Result<(), StoreError> {
        let pong: String = match self.connection().await? {
            Connection::Single(mut conn) => ::redis::cmd("PING").query_async(&mut conn).await?,
            Connection::Cluster(mut conn) => ::redis::cmd("PING").query_async(&mut conn).await?,
        };
        if pong == "PONG" {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!("unexpected PING reply {pong:?}")))
        }
    }
}

/// Build the connection URL: `redis://` or `rediss://` with the optional
/// username carried in the userinfo part.
fn connection_url(config: &RedisConfig) -> Result<String, StoreError> {
    if config.address.trim().is_empty() {
        return Err(StoreError::InvalidConfig("redis address is empty".into()));
    }

    let scheme = if config.is_tls() { "rediss" } else { "redis" };
    let mut url = Url::parse(&format!("{scheme}://{}", config.address))
        .map_err(|e| StoreError::InvalidConfig(format!("{}: {e}", config.address)))?;

    if let Some(username) = config.username.as_deref().filter(|u| !u.is_empty()) {
        url.set_username(username)
            .map_err(|_| StoreError::InvalidConfig("cannot set redis username".into()))?;
    }

    Ok(url.to_string())
}
