use super::registry::Endpoint;
use parking_lot::Mutex;
use rpcman_core::config::model::{ChainConfig, GlobalSettings};
use rpcman_core::{ClientError, ClientFactory, Purpose, RpcTransport};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace};

/// 连接池键：(端点地址, 用途)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub endpoint_url: String,
    pub purpose: Purpose,
}

/// 条目的使用状态，与借出的 `PooledClient` 共享
#[derive(Debug)]
struct EntryUsage {
    in_use: AtomicUsize,
    last_used_at: Mutex<Instant>,
}

impl EntryUsage {
    fn new(now: Instant) -> Self {
        Self {
            in_use: AtomicUsize::new(0),
            last_used_at: Mutex::new(now),
        }
    }

    fn acquire(&self, now: Instant) {
        *self.last_used_at.lock() = now;
        self.in_use.fetch_add(1, Ordering::AcqRel);
    }

    fn release(&self) {
        *self.last_used_at.lock() = Instant::now();
        self.in_use.fetch_sub(1, Ordering::AcqRel);
    }

    fn is_idle(&self, now: Instant, idle_timeout: Duration) -> bool {
        self.in_use.load(Ordering::Acquire) == 0
            && now.saturating_duration_since(*self.last_used_at.lock()) > idle_timeout
    }
}

/// 连接池条目，只通过地址引用端点，不拥有端点
struct PoolEntry {
    endpoint_id: String,
    client: Arc<dyn RpcTransport>,
    created_at: Instant,
    usage: Arc<EntryUsage>,
}

/// 从连接池借出的客户端
///
/// 存活期间对应条目视为使用中，析构时归还并刷新最后使用时间
pub struct PooledClient {
    client: Arc<dyn RpcTransport>,
    endpoint_id: String,
    purpose: Purpose,
    usage: Arc<EntryUsage>,
}

impl PooledClient {
    /// 客户端绑定的端点标识，用于上报调用结果
    pub fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }

    pub fn purpose(&self) -> Purpose {
        self.purpose
    }

    /// 底层传输客户端（同一条目借出的是同一个实例）
    pub fn transport(&self) -> &Arc<dyn RpcTransport> {
        &self.client
    }
}

impl Deref for PooledClient {
    type Target = dyn RpcTransport;

    fn deref(&self) -> &Self::Target {
        self.client.as_ref()
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        self.usage.release();
        trace!(
            "Released {} client for endpoint {}",
            self.purpose,
            self.endpoint_id
        );
    }
}

impl fmt::Debug for PooledClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledClient")
            .field("endpoint_id", &self.endpoint_id)
            .field("url", &self.client.url())
            .field("purpose", &self.purpose)
            .finish()
    }
}

/// 每个键的构建锁，持有期间该键只有一个调用方在构建客户端
type BuildGate = Arc<Mutex<()>>;

/// 连接池
///
/// 按(端点, 用途)缓存并复用传输客户端，后台定期回收空闲条目
pub struct ConnectionPool {
    entries: Mutex<HashMap<PoolKey, PoolEntry>>,
    building: Mutex<HashMap<PoolKey, BuildGate>>,
    factory: Arc<dyn ClientFactory>,
    chain: ChainConfig,
    read_timeout: Duration,
    write_timeout: Duration,
    idle_timeout: Duration,
    // 统计信息
    created: AtomicU64,
    reused: AtomicU64,
    evicted: AtomicU64,
}

impl ConnectionPool {
    pub fn new(factory: Arc<dyn ClientFactory>, chain: ChainConfig, settings: &GlobalSettings) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            building: Mutex::new(HashMap::new()),
            factory,
            chain,
            read_timeout: Purpose::Read.timeout(settings),
            write_timeout: Purpose::Write.timeout(settings),
            idle_timeout: settings.pool_idle_timeout(),
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    fn timeout_for(&self, purpose: Purpose) -> Duration {
        match purpose {
            Purpose::Read => self.read_timeout,
            Purpose::Write => self.write_timeout,
        }
    }

    /// 获取端点的客户端，不存在时创建
    ///
    /// 同一个键的并发请求只创建一个客户端。构建时不持有连接池的锁，
    /// 其他键的请求不会被阻塞
    pub fn get_client(&self, endpoint: &Endpoint, purpose: Purpose) -> Result<PooledClient, ClientError> {
        let key = PoolKey {
            endpoint_url: endpoint.url().to_string(),
            purpose,
        };

        if let Some(client) = self.reuse(&key, endpoint, purpose) {
            return Ok(client);
        }

        let gate = self.building.lock().entry(key.clone()).or_default().clone();
        let result = {
            let _building = gate.lock();
            // 等待期间可能已由其他调用方构建完成
            match self.reuse(&key, endpoint, purpose) {
                Some(client) => Ok(client),
                None => self.create(key.clone(), endpoint, purpose),
            }
        };
        self.release_gate(&key, &gate);
        result
    }

    fn reuse(&self, key: &PoolKey, endpoint: &Endpoint, purpose: Purpose) -> Option<PooledClient> {
        let entries = self.entries.lock();
        let entry = entries.get(key)?;

        entry.usage.acquire(Instant::now());
        self.reused.fetch_add(1, Ordering::Relaxed);
        trace!("Reusing {} client for endpoint {}", purpose, endpoint.id());
        Some(PooledClient {
            client: entry.client.clone(),
            endpoint_id: entry.endpoint_id.clone(),
            purpose,
            usage: entry.usage.clone(),
        })
    }

    fn create(&self, key: PoolKey, endpoint: &Endpoint, purpose: Purpose) -> Result<PooledClient, ClientError> {
        let client = self
            .factory
            .create_client(&endpoint.config, &self.chain, self.timeout_for(purpose))?;
        let now = Instant::now();
        let usage = Arc::new(EntryUsage::new(now));
        usage.acquire(now);

        let size = {
            let mut entries = self.entries.lock();
            entries.insert(
                key,
                PoolEntry {
                    endpoint_id: endpoint.id().to_string(),
                    client: client.clone(),
                    created_at: now,
                    usage: usage.clone(),
                },
            );
            entries.len()
        };
        self.created.fetch_add(1, Ordering::Relaxed);

        debug!(
            "Created {} client for endpoint {} ({}), pool size {}",
            purpose,
            endpoint.id(),
            endpoint.url(),
            size
        );

        Ok(PooledClient {
            client,
            endpoint_id: endpoint.id().to_string(),
            purpose,
            usage,
        })
    }

    /// 构建结束后移除构建锁；只移除自己持有的那一把
    fn release_gate(&self, key: &PoolKey, gate: &BuildGate) {
        let mut building = self.building.lock();
        if building.get(key).is_some_and(|current| Arc::ptr_eq(current, gate)) {
            building.remove(key);
        }
    }

    /// 回收空闲超时且未在使用中的条目，返回回收数量
    pub fn sweep_idle(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();

        entries.retain(|key, entry| {
            if entry.usage.is_idle(now, self.idle_timeout) {
                debug!(
                    "Evicting idle {} client for endpoint {} (age {:?})",
                    key.purpose,
                    entry.endpoint_id,
                    now.saturating_duration_since(entry.created_at)
                );
                false
            } else {
                true
            }
        });

        let removed = before - entries.len();
        if removed > 0 {
            self.evicted.fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    pub fn sweep(&self) -> usize {
        self.sweep_idle(Instant::now())
    }

    /// 启动后台清理任务
    pub fn start_sweeper(self: Arc<Self>, sweep_interval: Duration) -> JoinHandle<()> {
        info!("Starting connection pool sweeper with interval: {:?}", sweep_interval);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            // 第一次tick立即返回，跳过
            interval.tick().await;

            loop {
                interval.tick().await;
                let removed = self.sweep();
                if removed > 0 {
                    info!("Connection pool sweep removed {} idle clients", removed);
                }
            }
        })
    }

    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }

    /// 检查指定键是否已缓存
    pub fn contains(&self, endpoint_url: &str, purpose: Purpose) -> bool {
        self.entries.lock().contains_key(&PoolKey {
            endpoint_url: endpoint_url.to_string(),
            purpose,
        })
    }

    /// 获取连接池统计信息
    pub fn get_stats(&self) -> PoolStats {
        let entries = self.entries.lock();
        let read_clients = entries.keys().filter(|k| k.purpose == Purpose::Read).count();
        let in_use = entries
            .values()
            .map(|e| e.usage.in_use.load(Ordering::Acquire))
            .sum();

        PoolStats {
            size: entries.len(),
            read_clients,
            write_clients: entries.len() - read_clients,
            in_use,
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

/// 连接池统计信息
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolStats {
    pub size: usize,
    pub read_clients: usize,
    pub write_clients: usize,
    pub in_use: usize,
    pub created: u64,
    pub reused: u64,
    pub evicted: u64,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pool Stats: {} clients ({} read, {} write, {} in use), {} created, {} reused, {} evicted",
            self.size,
            self.read_clients,
            self.write_clients,
            self.in_use,
            self.created,
            self.reused,
            self.evicted
        )
    }
}
