// Player token persistence.
//
// The server issues a player token on the first menu visit and expects the
// same token back on every later one. `TokenStore` is where the menu
// controller keeps it between runs. `FileTokenStore` writes a small JSON
// document (`{"player_token": "..."}`); a missing file means "no token yet".
// `MemoryTokenStore` keeps the token in a shared cell and is what tests and
// embedders use when nothing should touch disk.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use envy_path_protocol::PlayerToken;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ClientError;

/// Somewhere to keep the player token across sessions.
pub trait TokenStore: Send {
    fn load(&self) -> Result<Option<PlayerToken>, ClientError>;
    fn save(&mut self, token: &PlayerToken) -> Result<(), ClientError>;
}

#[derive(Serialize, Deserialize)]
struct StoredToken {
    player_token: PlayerToken,
}

/// JSON file on disk.
#[derive(Clone, Debug)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<PlayerToken>, ClientError> {
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let stored: StoredToken = serde_json::from_str(&json)?;
        Ok(Some(stored.player_token))
    }

    fn save(&mut self, token: &PlayerToken) -> Result<(), ClientError> {
        let json = serde_json::to_string(&StoredToken {
            player_token: token.clone(),
        })?;
        std::fs::write(&self.path, json)?;
        debug!(path = %self.path.display(), "saved player token");
        Ok(())
    }
}

/// In-process store. Clones share the same token.
#[derive(Clone, Debug, Default)]
pub struct MemoryTokenStore {
    token: Arc<Mutex<Option<PlayerToken>>>,
}

impl MemoryTokenStore {
    pub fn with_token(token: PlayerToken) -> Self {
        Self {
            token: Arc::new(Mutex::new(Some(token))),
        }
    }

    /// Current token, for callers that hold a clone of the store.
    pub fn get(&self) -> Option<PlayerToken> {
        self.token.lock().ok().and_then(|t| t.clone())
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<PlayerToken>, ClientError> {
        Ok(self.get())
    }

    fn save(&mut self, token: &PlayerToken) -> Result<(), ClientError> {
        if let Ok(mut slot) = self.token.lock() {
            *slot = Some(token.clone());
        }
        Ok(())
    }
}
