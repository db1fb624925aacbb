use std::fmt;

use iced::Theme;

use crate::prefs::Preferences;

pub const THEME_KEY: &str = "chat.theme.v3";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
}

impl ThemeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ThemeMode::Light => "light",
            ThemeMode::Dark => "dark",
        }
    }

    /// Unrecognised values fall back to light.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "dark" => ThemeMode::Dark,
            _ => ThemeMode::Light,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ThemeMode::Light => ThemeMode::Dark,
            ThemeMode::Dark => ThemeMode::Light,
        }
    }

    pub fn iced_theme(self) -> Theme {
        match self {
            ThemeMode::Light => Theme::Light,
            ThemeMode::Dark => Theme::Dark,
        }
    }

    /// Icon for the toggle button: the sun shows while dark, the moon while light.
    pub fn toggle_icon(self) -> &'static str {
        match self {
            ThemeMode::Light => "\u{263E}",
            ThemeMode::Dark => "\u{2600}",
        }
    }
}

impl fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ThemeStore {
    mode: ThemeMode,
}

impl ThemeStore {
    pub fn load(prefs: &Preferences) -> rusqlite::Result<Self> {
        let mode = prefs
            .get(THEME_KEY)?
            .map(|value| ThemeMode::parse(&value))
            .unwrap_or_default();
        Ok(ThemeStore { mode })
    }

    pub fn mode(&self) -> ThemeMode {
        self.mode
    }

    /// Switches to `mode` and persists it, even when already active.
    pub fn apply(&mut self, prefs: &Preferences, mode: ThemeMode) -> rusqlite::Result<()> {
        self.mode = mode;
        prefs.set(THEME_KEY, mode.as_str())
    }

    pub fn toggle(&mut self, prefs: &Preferences) -> rusqlite::Result<ThemeMode> {
        let next = self.mode.toggled();
        self.apply(prefs, next)?;
        Ok(next)
    }

    pub fn iced_theme(&self) -> Theme {
        self.mode.iced_theme()
    }
}
