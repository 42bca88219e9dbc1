//! Assembles the concrete adapters behind every trait the core crate
//! defines and wires them into a [`fleetcore::manager::WorkerManager`].
//! Grounded on `main.rs`'s boot order (`config::ensure_loaded()` first,
//! then open storage, then hand it all to the thing that actually runs).

use std::sync::Arc;

use fleetcore::config::Config;
use fleetcore::db;
use fleetcore::manager::WorkerManager;
use fleetcore::proxy::{ProxyRegistry, ReqwestProxyChecker};
use fleetcore::queue::RedisTaskQueueStore;
use fleetcore::repo;
use fleetcore::vault::SessionVault;
use fleetcore::worker::{GrammersConnector, WorkerDeps};

#[derive(Debug, thiserror::Error)]
pub enum BootError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("repository error: {0}")]
    Repo(#[from] fleetcore::error::RepoError),
    #[error("queue error: {0}")]
    Queue(#[from] fleetcore::error::QueueError),
    #[error("vault_key must decode to exactly 32 bytes, got {0}")]
    BadVaultKey(usize),
}

/// Decodes `FLEET_VAULT_KEY` as base64, falling back to an all-zero key
/// (development only) when unset — matching `Config`'s own "empty string
/// means use the default" convention for unset settings.
fn decode_vault_key(key: &str) -> Result<[u8; 32], BootError> {
    if key.is_empty() {
        return Ok([0u8; 32]);
    }
    let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, key).unwrap_or_default();
    bytes.try_into().map_err(|v: Vec<u8>| BootError::BadVaultKey(v.len()))
}

/// Opens the database, loads proxies into the registry, and constructs a
/// ready-to-`start()` manager. The manager owns everything after this
/// returns; `main` only needs to call `start()` then `run()`.
pub async fn boot(config: &'static Config) -> Result<Arc<WorkerManager>, BootError> {
    let conn = db::open_db(&config.data_dir)?;
    let db = Arc::new(tokio::sync::Mutex::new(conn));

    let queue: Arc<dyn fleetcore::queue::TaskQueueStore> = Arc::new(RedisTaskQueueStore::connect(&config.redis_url).await?);

    let checker = ReqwestProxyChecker {
        probe_url: config.proxy_health_check_url.clone(),
    };
    let proxies = Arc::new(ProxyRegistry::new(Box::new(checker)));
    {
        let conn = db.lock().await;
        proxies.load(repo::proxy::list_all(&conn)?);
    }

    let vault_key = decode_vault_key(&config.vault_key)?;
    let vault = Arc::new(SessionVault::new(&vault_key));

    let llm: Arc<dyn fleetcore::dialogue::llm::LlmProvider> =
        Arc::new(fleetcore::dialogue::llm::OpenAiCompatProvider::new(config.llm_api_key.clone(), config.llm_base_url.clone()));

    let deps = WorkerDeps {
        db: db.clone(),
        queue: queue.clone(),
        proxies,
        connector: Arc::new(GrammersConnector),
        llm,
        vault,
        config,
    };

    Ok(Arc::new(WorkerManager::new(db, queue, deps, config.max_fleet_size)))
}
