//! 24-bit RGB palette for terminal output.

use owo_colors::{OwoColorize, Rgb};

#[derive(Debug, Clone, Copy)]
pub struct Theme {
    /// Green (34, 197, 94)
    pub success: Rgb,
    /// Red (239, 68, 68)
    pub error: Rgb,
    /// Yellow (234, 179, 8)
    pub warning: Rgb,
    /// Blue (59, 130, 246)
    pub in_progress: Rgb,
    /// Gray (107, 114, 128)
    pub muted: Rgb,
    /// Cyan (34, 211, 238), for paths and names
    pub highlight: Rgb,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            success: Rgb(34, 197, 94),
            error: Rgb(239, 68, 68),
            warning: Rgb(234, 179, 8),
            in_progress: Rgb(59, 130, 246),
            muted: Rgb(107, 114, 128),
            highlight: Rgb(34, 211, 238),
        }
    }
}

/// Theme plus a switch for plain output.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub theme: Theme,
    pub enabled: bool,
}

impl Palette {
    pub fn new(enabled: bool) -> Self {
        Self {
            theme: Theme::default(),
            enabled,
        }
    }

    /// Colored when enabled, otherwise `text` unchanged.
    pub fn paint(&self, text: &str, color: Rgb) -> String {
        if self.enabled {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }

    pub fn success(&self, text: &str) -> String {
        self.paint(text, self.theme.success)
    }

    pub fn error(&self, text: &str) -> String {
        self.paint(text, self.theme.error)
    }

    pub fn warning(&self, text: &str) -> String {
        self.paint(text, self.theme.warning)
    }

    pub fn muted(&self, text: &str) -> String {
        self.paint(text, self.theme.muted)
    }

    pub fn highlight(&self, text: &str) -> String {
        self.paint(text, self.theme.highlight)
    }
}
