pub mod clip;
pub mod config;
pub mod credential;
pub mod link;
pub mod relay;

use std::sync::Arc;

use noted_core::{Config, LinkStateStore, Reconciler, RelayClient, SqliteKv};

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Everything a command needs, opened from the data directory.
pub struct App {
    pub config: Config,
    pub store: Arc<LinkStateStore>,
    pub relay: Arc<RelayClient>,
    pub reconciler: Arc<Reconciler>,
}

impl App {
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let config = Config::load()?;
        let store = Arc::new(LinkStateStore::new(Arc::new(SqliteKv::open_default()?)));
        let relay = Arc::new(RelayClient::new(&config.relay)?);
        let reconciler = Arc::new(Reconciler::new(store.clone(), relay.clone()));
        Ok(Self {
            config,
            store,
            relay,
            reconciler,
        })
    }
}
