use log::info;

use crate::prefs::Preferences;

pub const USERNAME_KEY: &str = "chat.username.v3";

/// The display name messages are sent under. Unset until the user types
/// one; once set the name field is locked until "change user".
#[derive(Debug, Clone, Default)]
pub struct Identity {
    current: Option<String>,
}

impl Identity {
    pub fn load(prefs: &Preferences) -> rusqlite::Result<Self> {
        let current = prefs
            .get(USERNAME_KEY)?
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());
        Ok(Identity { current })
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn is_locked(&self) -> bool {
        self.current.is_some()
    }

    pub fn owns(&self, sender: &str) -> bool {
        self.current.as_deref() == Some(sender)
    }

    /// Persists a new identity. Blank names are ignored and return false.
    pub fn set(&mut self, prefs: &Preferences, name: &str) -> rusqlite::Result<bool> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(false);
        }
        prefs.set(USERNAME_KEY, name)?;
        if self.current.as_deref() != Some(name) {
            info!("Identity set to {}", name);
        }
        self.current = Some(name.to_string());
        Ok(true)
    }

    pub fn clear(&mut self, prefs: &Preferences) -> rusqlite::Result<()> {
        prefs.remove(USERNAME_KEY)?;
        self.current = None;
        Ok(())
    }
}
