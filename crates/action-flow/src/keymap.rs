//! Key-name mapping per target platform

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Macos,
    Windows,
    Linux,
}

impl Platform {
    /// Platform this binary was built for
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::Macos
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }

    /// Map one key token to this platform's name for it
    pub fn map_key(&self, key: &str) -> String {
        let key = key.trim().to_ascii_lowercase();
        let mapped = match (self, key.as_str()) {
            (Platform::Macos, "cmd" | "ctrl" | "win") => "command",
            (Platform::Macos, "alt") => "option",
            (Platform::Windows, "cmd" | "command") => "win",
            (Platform::Linux, "cmd" | "command") => "ctrl",
            (Platform::Linux, "win") => "super",
            _ => return key,
        };
        mapped.to_string()
    }

    /// Map a key combination
    pub fn map_keys<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        keys.into_iter().map(|key| self.map_key(key)).collect()
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_modifiers_per_platform() {
        assert_eq!(Platform::Macos.map_keys(["ctrl", "c"]), vec!["command", "c"]);
        assert_eq!(Platform::Macos.map_key("Alt"), "option");
        assert_eq!(Platform::Windows.map_key("cmd"), "win");
        assert_eq!(Platform::Windows.map_key("ctrl"), "ctrl");
        assert_eq!(Platform::Linux.map_key("command"), "ctrl");
        assert_eq!(Platform::Linux.map_key("win"), "super");
        assert_eq!(Platform::Linux.map_key(" F4 "), "f4");
    }
}
