use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use roomcast_config::AppConfig;
use roomcast_database::{initialize_database, CommentRepository, SqliteQueue};
use roomcast_relay::{
    BroadcastBridge, ConnectionHub, DurableQueue, EventRouter, FlushWorker, LocalBridge,
    RedisBridge, RedisQueue, RoomRegistry, RouterConfig,
};
use sqlx::SqlitePool;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub mod telemetry {
    use anyhow::Result;
    use tracing::Level;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_max_level(Level::DEBUG)
            .with_env_filter(env_filter)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// Which store backs the durable queue and the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayBackend {
    /// Redis lists and pub/sub, shared by every instance
    Redis,
    /// SQLite queue and an in-process bridge, for a single instance
    Local,
}

#[derive(Clone)]
pub struct RelayServices {
    pub db_pool: SqlitePool,
    pub comments: Arc<CommentRepository>,
    pub queue: Arc<dyn DurableQueue>,
    pub router: EventRouter,
    pub backend: RelayBackend,
    flush_interval: Duration,
}

impl RelayServices {
    /// Open storage, pick the queue and bridge backends, and build the router.
    ///
    /// Must run inside a Tokio runtime. An unreachable Redis is tolerated: the
    /// relay falls back to the local backends and logs a warning.
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let db_pool = initialize_database(&config.database)
            .await
            .context("failed to initialise database")?;
        let comments = Arc::new(CommentRepository::new(db_pool.clone()));

        let relay = &config.relay;
        let redis = match config.redis.url.as_deref() {
            Some(url) => connect_redis(url).await,
            None => {
                info!("no redis url configured, using the local queue and bridge");
                None
            }
        };

        let (queue, bridge, backend) = match redis {
            Some((client, conn)) => {
                let queue: Arc<dyn DurableQueue> = Arc::new(RedisQueue::with_keys(
                    conn.clone(),
                    &relay.queue_key,
                    &relay.quarantine_key,
                ));
                let bridge: Arc<dyn BroadcastBridge> = Arc::new(RedisBridge::new(client, conn));
                (queue, bridge, RelayBackend::Redis)
            }
            None => {
                let queue: Arc<dyn DurableQueue> = Arc::new(SqliteQueue::with_keys(
                    db_pool.clone(),
                    &relay.queue_key,
                    &relay.quarantine_key,
                ));
                let bridge: Arc<dyn BroadcastBridge> = Arc::new(LocalBridge::default());
                (queue, bridge, RelayBackend::Local)
            }
        };

        let router_config = RouterConfig {
            channel: relay.channel.clone(),
            instance_id: relay
                .instance_id
                .clone()
                .unwrap_or_else(|| RouterConfig::default().instance_id),
        };
        let router = EventRouter::new(
            RoomRegistry::new(),
            ConnectionHub::new(relay.outbound_buffer),
            queue.clone(),
            bridge,
            router_config,
        );

        info!(
            backend = ?backend,
            instance_id = router.instance_id(),
            channel = %relay.channel,
            "relay services ready"
        );

        Ok(Self {
            db_pool,
            comments,
            queue,
            router,
            backend,
            flush_interval: relay.flush_interval(),
        })
    }

    pub fn flush_worker(&self) -> FlushWorker {
        FlushWorker::new(self.queue.clone(), self.comments.clone(), self.flush_interval)
    }

    /// Start the bridge listener and the periodic flush worker.
    pub async fn start(&self) -> Result<RelayTasks> {
        let bridge = self
            .router
            .listen_bridge()
            .await
            .context("failed to subscribe to the broadcast bridge")?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let flush = self.flush_worker().spawn(shutdown_rx);

        Ok(RelayTasks {
            router: self.router.clone(),
            shutdown,
            flush,
            bridge,
        })
    }
}

/// Background tasks of a running relay.
pub struct RelayTasks {
    router: EventRouter,
    shutdown: watch::Sender<bool>,
    flush: JoinHandle<()>,
    bridge: JoinHandle<()>,
}

impl RelayTasks {
    /// Let pending appends and publishes finish, stop the flush worker after
    /// its current cycle, and drop the bridge subscription.
    pub async fn shutdown(self) {
        self.router.settle().await;

        if self.shutdown.send(true).is_err() {
            warn!("flush worker already stopped");
        }
        if let Err(error) = self.flush.await {
            warn!(%error, "flush worker task failed");
        }

        self.bridge.abort();
        info!("relay tasks stopped");
    }
}

async fn connect_redis(url: &str) -> Option<(redis::Client, ConnectionManager)> {
    let client = match redis::Client::open(url) {
        Ok(client) => client,
        Err(error) => {
            warn!(%error, "invalid redis url, falling back to the local queue and bridge");
            return None;
        }
    };

    match ConnectionManager::new(client.clone()).await {
        Ok(conn) => {
            info!("redis connection established");
            Some((client, conn))
        }
        Err(error) => {
            warn!(%error, "failed to connect to redis, falling back to the local queue and bridge");
            None
        }
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
