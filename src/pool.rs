use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lazy_static::lazy_static;
use mssql_client::{Client, Ready};
use mssql_driver_pool::Pool;

use crate::config::MssqlConfig;
use crate::debug::debug_log;
use crate::error::{GdaError, Result};

/// A pool shared by every SQL Server provider with the same identity.
pub struct SharedPool<P = Pool> {
    pub pool: P,
    pub ref_count: AtomicU32,
    pub dedup_key: String,
}

type Registry<P> = HashMap<String, Arc<SharedPool<P>>>;

lazy_static! {
    /// Maps dedup_key → pool.
    static ref POOLS: Mutex<Registry<Pool>> = Mutex::new(HashMap::new());
}

/// Create a connection pool from the config.
pub async fn create_pool(config: &MssqlConfig) -> Result<Pool> {
    let client_config = config.to_client_config()?;
    let pool_config = config.to_pool_config();

    debug_log!(
        "Creating pool: min={}, max={}, timeout={}ms",
        pool_config.min_connections,
        pool_config.max_connections,
        pool_config.connection_timeout.as_millis()
    );

    let pool = Pool::new(pool_config, client_config).await?;
    debug_log!("Pool created successfully");
    Ok(pool)
}

/// Create a single (non-pooled) connection.
pub async fn create_single(config: &MssqlConfig) -> Result<Client<Ready>> {
    let client_config = config.to_client_config()?;

    debug_log!("Creating bare connection to {}:{}", config.server, config.port);

    let client = Client::connect(client_config)
        .await
        .map_err(GdaError::from)?;

    debug_log!("Bare connection established");
    Ok(client)
}

/// Return the pool for `config`, creating it on first use. Each call takes
/// a reference that must be returned with `release_shared_pool`.
pub fn acquire_shared_pool(config: &MssqlConfig) -> Result<Arc<SharedPool>> {
    let key = config.dedup_key();
    if let Some(existing) = take_existing(&mut lock_pools(), &key) {
        return Ok(existing);
    }

    // connect without holding the registry lock
    let pool = crate::rt().block_on(create_pool(config))?;
    Ok(register(&mut lock_pools(), key, pool))
}

/// Drop one reference to `shared`. The pool leaves the registry when the
/// count reaches 0.
pub fn release_shared_pool(shared: &Arc<SharedPool>) {
    release(&mut lock_pools(), shared);
}

fn lock_pools() -> MutexGuard<'static, Registry<Pool>> {
    POOLS.lock().unwrap_or_else(PoisonError::into_inner)
}

fn take_existing<P>(pools: &mut Registry<P>, key: &str) -> Option<Arc<SharedPool<P>>> {
    let existing = pools.get(key)?;
    existing.ref_count.fetch_add(1, Ordering::SeqCst);
    Some(Arc::clone(existing))
}

/// Insert a freshly built pool. If another caller registered the same key
/// while `pool` was connecting, theirs wins and `pool` is dropped.
fn register<P>(pools: &mut Registry<P>, key: String, pool: P) -> Arc<SharedPool<P>> {
    if let Some(existing) = take_existing(pools, &key) {
        debug_log!("Pool {} was created concurrently; reusing it", key);
        return existing;
    }
    let shared = Arc::new(SharedPool {
        pool,
        ref_count: AtomicU32::new(1),
        dedup_key: key.clone(),
    });
    pools.insert(key, Arc::clone(&shared));
    shared
}

fn release<P>(pools: &mut Registry<P>, shared: &Arc<SharedPool<P>>) {
    let key = &shared.dedup_key;
    match pools.get(key) {
        // a pool removed by close_all, or replaced since, is no longer counted
        Some(current) if Arc::ptr_eq(current, shared) => {
            let prev = shared.ref_count.fetch_sub(1, Ordering::SeqCst);
            if prev <= 1 {
                pools.remove(key);
                debug_log!("Pool {} released", key);
            }
        }
        _ => {
            debug_log!("Pool {} is not registered", key);
        }
    }
}

/// Remove every pool from the registry.
pub fn remove_all_pools() {
    lock_pools().clear();
}

/// Status of every registered pool, for diagnostics.
pub fn pool_snapshot() -> Vec<serde_json::Value> {
    lock_pools()
        .values()
        .map(|shared| {
            let status = shared.pool.status();
            serde_json::json!({
                "total": status.total,
                "idle": status.available,
                "in_use": status.in_use,
                "max": status.max,
                "ref_count": shared.ref_count.load(Ordering::SeqCst),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_shares_one_entry() {
        let mut pools: Registry<u32> = HashMap::new();
        let a = register(&mut pools, "db|1433|x".into(), 1);
        let b = register(&mut pools, "db|1433|x".into(), 2);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.pool, 1);
        assert_eq!(a.ref_count.load(Ordering::SeqCst), 2);

        release(&mut pools, &a);
        assert_eq!(pools.len(), 1);
        release(&mut pools, &b);
        assert!(pools.is_empty());
    }

    #[test]
    fn stale_release_leaves_newer_pool_alone() {
        let mut pools: Registry<u32> = HashMap::new();
        let old = register(&mut pools, "db|1433|x".into(), 1);
        pools.clear();
        let new = register(&mut pools, "db|1433|x".into(), 2);

        release(&mut pools, &old);
        assert_eq!(new.ref_count.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&pools["db|1433|x"], &new));
    }
}
