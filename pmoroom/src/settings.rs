use std::time::Duration;

#[cfg(feature = "pmoconfig")]
use pmoconfig::Config;

pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_VOLUME: u8 = 100;

/// Runtime knobs of a room client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoomSettings {
    /// How long `request_sync` waits for the authority.
    pub sync_timeout: Duration,
    /// Move to the next track when the current one ends. Only honoured for
    /// the host.
    pub auto_advance: bool,
    pub initial_volume: u8,
    /// Salts the ids of tracks this client proposes. A random one is used
    /// when unset.
    pub client_id: Option<String>,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
            auto_advance: false,
            initial_volume: DEFAULT_VOLUME,
            client_id: None,
        }
    }
}

impl RoomSettings {
    #[cfg(feature = "pmoconfig")]
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let volume = config.get_default_volume()?.min(100) as u8;
        Ok(Self {
            sync_timeout: Duration::from_millis(config.get_sync_timeout_ms()? as u64),
            auto_advance: config.get_auto_advance()?,
            initial_volume: volume,
            client_id: Some(config.get_client_id()?),
        })
    }

    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    pub fn with_auto_advance(mut self, enabled: bool) -> Self {
        self.auto_advance = enabled;
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}
