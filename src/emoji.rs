use crate::theme::ThemeMode;

pub const PALETTE: &[&str] = &[
    "😀", "😂", "😊", "😍", "😎", "😢", "😡", "😮",
    "👍", "👎", "👏", "🙏", "💪", "👋", "🤝", "✌️",
    "❤️", "🔥", "🎉", "✨", "💯", "✅", "❌", "⭐",
    "☕", "🍕", "🍺", "🎂", "🌙", "☀️", "🌧️", "🐱",
];

/// Toggleable emoji palette. Picking an emoji appends it to the message
/// being typed and closes the palette.
#[derive(Debug, Default)]
pub struct EmojiPicker {
    visible: bool,
    theme: ThemeMode,
}

impl EmojiPicker {
    pub fn new(theme: ThemeMode) -> Self {
        EmojiPicker { visible: false, theme }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn toggle(&mut self) {
        self.visible = !self.visible;
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn theme(&self) -> ThemeMode {
        self.theme
    }

    pub fn set_theme(&mut self, theme: ThemeMode) {
        self.theme = theme;
    }

    pub fn pick(&mut self, emoji: &str, input: &mut String) {
        input.push_str(emoji);
        self.hide();
    }
}
