use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::media::RenegotiationPolicy;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:5000";
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_PENDING_CANDIDATE_TTL_MS: u64 = 10_000;
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;
pub const DEFAULT_BUFFERED_HIGH_WATER: usize = 1024 * 1024;
pub const DEFAULT_STORAGE_PATH: &str = "./downloads";

/// INI-style configuration: `[Section]` headers, `key = value` lines, `#` comments.
#[derive(Debug)]
pub struct Config {
    pub globals: HashMap<String, String>,
    pub sections: HashMap<String, HashMap<String, String>>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self, String> {
        let content =
            fs::read_to_string(path).map_err(|e| format!("Error reading file {path}: {e}"))?;
        Ok(Self::parse(&content))
    }

    pub fn parse(content: &str) -> Self {
        let mut globals = HashMap::new();
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current_section: Option<String> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                let name = &line[1..line.len() - 1];
                current_section = Some(name.trim().to_string());
                continue;
            }

            if let Some(pos) = line.find('=') {
                let key = line[..pos].trim().to_string();
                let value = line[pos + 1..].trim().trim_matches('"').to_string();

                match &current_section {
                    None => {
                        globals.insert(key, value);
                    }
                    Some(sec) => {
                        sections.entry(sec.clone()).or_default().insert(key, value);
                    }
                }
            }
        }
        Config { globals, sections }
    }

    pub fn empty() -> Self {
        Self {
            globals: HashMap::new(),
            sections: HashMap::new(),
        }
    }

    #[must_use]
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|sec| sec.get(key))
            .map(|s| s.as_str())
    }

    #[must_use]
    pub fn get_non_empty(&self, section: &str, key: &str) -> Option<&str> {
        self.get(section, key).filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn get_global(&self, key: &str) -> Option<&str> {
        self.globals.get(key).map(|s| s.as_str())
    }

    #[must_use]
    pub fn get_non_empty_or_default<'a>(
        &'a self,
        section: &str,
        key: &str,
        default: &'a str,
    ) -> &'a str {
        self.get_non_empty(section, key)
            .or_else(|| self.get_global(key).filter(|s| !s.is_empty()))
            .unwrap_or(default)
    }

    /// Parses a numeric value; missing or malformed values fall back to `default`.
    #[must_use]
    pub fn get_parsed_or<T: std::str::FromStr>(&self, section: &str, key: &str, default: T) -> T {
        self.get_non_empty(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }
}

/// Which connection origins the relay accepts in `Hello`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginPolicy {
    Any,
    AllowList(Vec<String>),
}

impl OriginPolicy {
    /// `*` (or an empty value) means any origin; otherwise a comma separated list.
    pub fn parse(raw: &str) -> Self {
        let origins: Vec<String> = raw
            .split(',')
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            OriginPolicy::Any
        } else {
            OriginPolicy::AllowList(origins)
        }
    }

    pub fn allows(&self, origin: &str) -> bool {
        match self {
            OriginPolicy::Any => true,
            OriginPolicy::AllowList(list) => {
                let origin = origin.trim_end_matches('/');
                list.iter().any(|o| o == origin)
            }
        }
    }
}

/// `[Signaling]` section.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub listen_addr: String,
    pub origins: OriginPolicy,
    pub idle_timeout: Duration,
    pub max_body_len: usize,
}

impl RelaySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            listen_addr: config
                .get_non_empty_or_default("Signaling", "listen_addr", DEFAULT_LISTEN_ADDR)
                .to_string(),
            origins: OriginPolicy::parse(config.get_non_empty_or_default(
                "Signaling",
                "allowed_origins",
                "*",
            )),
            idle_timeout: Duration::from_secs(config.get_parsed_or(
                "Signaling",
                "idle_timeout_secs",
                DEFAULT_IDLE_TIMEOUT_SECS,
            )),
            max_body_len: config.get_parsed_or(
                "Signaling",
                "max_body_len",
                crate::signaling::protocol::MAX_BODY_LEN,
            ),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self::from_config(&Config::empty())
    }
}

/// `[Mesh]` section.
#[derive(Debug, Clone)]
pub struct MeshSettings {
    pub stun_server: String,
    pub pending_candidate_ttl: Duration,
    pub renegotiation: RenegotiationPolicy,
}

impl MeshSettings {
    pub fn from_config(config: &Config) -> Self {
        let renegotiation = match config.get_non_empty("Mesh", "renegotiation") {
            Some("topology") => RenegotiationPolicy::OnTopologyChange,
            _ => RenegotiationPolicy::Always,
        };
        Self {
            stun_server: config
                .get_non_empty_or_default("Mesh", "stun_server", DEFAULT_STUN_SERVER)
                .to_string(),
            pending_candidate_ttl: Duration::from_millis(config.get_parsed_or(
                "Mesh",
                "pending_candidate_ttl_ms",
                DEFAULT_PENDING_CANDIDATE_TTL_MS,
            )),
            renegotiation,
        }
    }
}

impl Default for MeshSettings {
    fn default() -> Self {
        Self::from_config(&Config::empty())
    }
}

/// `[FileTransfer]` section.
#[derive(Debug, Clone)]
pub struct TransferSettings {
    pub chunk_size: usize,
    pub buffered_high_water: usize,
    pub storage_path: PathBuf,
}

impl TransferSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config
                .get_parsed_or("FileTransfer", "chunk_size", DEFAULT_CHUNK_SIZE)
                .max(1),
            buffered_high_water: config.get_parsed_or(
                "FileTransfer",
                "buffered_high_water",
                DEFAULT_BUFFERED_HIGH_WATER,
            ),
            storage_path: PathBuf::from(config.get_non_empty_or_default(
                "FileTransfer",
                "storage_path",
                DEFAULT_STORAGE_PATH,
            )),
        }
    }
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self::from_config(&Config::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# relay
[Signaling]
listen_addr = 127.0.0.1:7000
allowed_origins = https://a.example, https://b.example/
idle_timeout_secs = 15

[Mesh]
renegotiation = topology
pending_candidate_ttl_ms = oops

[FileTransfer]
chunk_size = 0
storage_path = "/tmp/inbox"
"#;

    #[test]
    fn typed_settings_read_sections_and_fall_back() {
        let config = Config::parse(SAMPLE);

        let relay = RelaySettings::from_config(&config);
        assert_eq!(relay.listen_addr, "127.0.0.1:7000");
        assert_eq!(relay.idle_timeout, Duration::from_secs(15));
        assert!(relay.origins.allows("https://b.example"));
        assert!(!relay.origins.allows("https://evil.example"));

        let mesh = MeshSettings::from_config(&config);
        assert_eq!(mesh.renegotiation, RenegotiationPolicy::OnTopologyChange);
        assert_eq!(mesh.stun_server, DEFAULT_STUN_SERVER);
        // malformed numbers fall back
        assert_eq!(
            mesh.pending_candidate_ttl,
            Duration::from_millis(DEFAULT_PENDING_CANDIDATE_TTL_MS)
        );

        let transfer = TransferSettings::from_config(&config);
        assert_eq!(transfer.chunk_size, 1);
        assert_eq!(transfer.storage_path, PathBuf::from("/tmp/inbox"));
    }

    #[test]
    fn wildcard_origin_allows_everything() {
        assert_eq!(OriginPolicy::parse("*"), OriginPolicy::Any);
        assert_eq!(OriginPolicy::parse(" "), OriginPolicy::Any);
        assert!(OriginPolicy::parse("https://x, *").allows("whatever"));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let relay = RelaySettings::default();
        assert_eq!(relay.listen_addr, DEFAULT_LISTEN_ADDR);
        assert_eq!(relay.origins, OriginPolicy::Any);
        let transfer = TransferSettings::default();
        assert_eq!(transfer.chunk_size, DEFAULT_CHUNK_SIZE);
    }
}
