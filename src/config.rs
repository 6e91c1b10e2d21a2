use crate::gate::GateConfig;
use crate::pool::PoolConfig;
use crate::wake::{MacAddress, WakeConfig};
use hyper::Uri;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr, SocketAddrV4};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Config file read when no path is given on the command line
pub const DEFAULT_CONFIG_PATH: &str = "wakegate.toml";

/// Dotenv file whose variables back up the process environment
pub const DEFAULT_ENV_PATH: &str = ".env";

/// Errors raised while loading configuration. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to read env file {path}: {source}")]
    EnvFile {
        path: String,
        #[source]
        source: dotenvy::Error,
    },

    #[error("Configuration errors:\n  - {}", .0.join("\n  - "))]
    Invalid(Vec<String>),
}

/// Global configuration for the proxy
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// Listener and forwarding settings
    #[serde(default)]
    pub server: ServerConfig,

    /// The backend that is proxied to and woken up
    #[serde(default)]
    pub backend: BackendConfig,

    /// Probe and wait timings
    #[serde(default)]
    pub gate: GateSettings,

    /// Wake-on-LAN transmission settings
    #[serde(default)]
    pub wol: WolConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Listen port (required, `PORT`)
    pub port: Option<u16>,

    /// Bind address (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Maximum idle connections kept to the backend (default: 10)
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,

    /// Idle connection timeout in seconds (default: 90)
    #[serde(default = "default_pool_idle_timeout")]
    pub pool_idle_timeout_secs: u64,

    /// Max time to wait for the backend's response once admitted (default: 30)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Path answered by the status endpoint instead of being proxied
    #[serde(default = "default_status_path")]
    pub status_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: None,
            bind: default_bind_address(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            pool_idle_timeout_secs: default_pool_idle_timeout(),
            request_timeout_secs: default_request_timeout(),
            status_path: default_status_path(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_idle_per_host: self.pool_max_idle_per_host,
            idle_timeout: Duration::from_secs(self.pool_idle_timeout_secs),
        }
    }

    /// Socket address to listen on, once `port` is known to be set
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let port = self
            .port
            .ok_or_else(|| ConfigError::Invalid(vec![missing("server.port", "PORT")]))?;
        let ip = IpAddr::from_str(&self.bind).map_err(|e| {
            ConfigError::Invalid(vec![format!("server.bind: invalid address '{}': {}", self.bind, e)])
        })?;
        Ok(SocketAddr::new(ip, port))
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BackendConfig {
    /// Base URL of the backend, e.g. `http://192.168.1.20:8080` (required, `PROXY_TO`)
    pub url: Option<String>,

    /// MAC address of the backend's network interface (required, `MAC_ADDRESS`)
    pub mac_address: Option<String>,

    /// Path probed for health instead of the base URL itself
    pub health_path: Option<String>,
}

impl BackendConfig {
    /// Resolve the configured strings into a [`BackendTarget`]
    pub fn target(&self) -> Result<BackendTarget, ConfigError> {
        let mut errors = Vec::new();

        let mac = match self.mac_address.as_deref() {
            Some(raw) => match raw.parse::<MacAddress>() {
                Ok(mac) => Some(mac),
                Err(e) => {
                    errors.push(format!("backend.mac_address: {}", e));
                    None
                }
            },
            None => {
                errors.push(missing("backend.mac_address", "MAC_ADDRESS"));
                None
            }
        };

        let endpoints = match self.url.as_deref() {
            Some(raw) => Endpoints::parse(raw, self.health_path.as_deref())
                .map_err(|e| errors.push(format!("backend.url: {}", e)))
                .ok(),
            None => {
                errors.push(missing("backend.url", "PROXY_TO"));
                None
            }
        };

        match (endpoints, mac) {
            (Some(endpoints), Some(mac)) if errors.is_empty() => Ok(endpoints.with_mac(mac)),
            _ => Err(ConfigError::Invalid(errors)),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GateSettings {
    /// Timeout of a single health probe in milliseconds (`CHECK_TIMEOUT`)
    #[serde(default = "default_check_timeout")]
    pub check_timeout_ms: u64,

    /// Delay between probes while waiting for the backend (`CHECK_INTERVAL`)
    #[serde(default = "default_check_interval")]
    pub check_interval_ms: u64,

    /// Maximum time a request waits for the backend to come online (`MAX_WAIT_TIME`)
    #[serde(default = "default_max_wait")]
    pub max_wait_ms: u64,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            check_timeout_ms: default_check_timeout(),
            check_interval_ms: default_check_interval(),
            max_wait_ms: default_max_wait(),
        }
    }
}

impl GateSettings {
    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            probe_timeout: Duration::from_millis(self.check_timeout_ms),
            poll_interval: Duration::from_millis(self.check_interval_ms),
            max_wait: Duration::from_millis(self.max_wait_ms),
        }
    }

    fn validate(&self, errors: &mut Vec<String>) {
        if self.check_timeout_ms == 0 {
            errors.push("gate.check_timeout_ms must be greater than 0".to_string());
        }
        if self.check_interval_ms == 0 {
            errors.push("gate.check_interval_ms must be greater than 0".to_string());
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WolConfig {
    /// Destination of the magic packet (default: 255.255.255.255)
    #[serde(default = "default_broadcast_addr")]
    pub broadcast_addr: String,

    /// Destination UDP port (default: 9, the discard port)
    #[serde(default = "default_wol_port")]
    pub port: u16,

    /// Number of packets sent per wake signal (default: 3)
    #[serde(default = "default_wol_packets")]
    pub packets: u32,

    /// Spacing between repeated packets in milliseconds (default: 100)
    #[serde(default = "default_wol_packet_interval")]
    pub packet_interval_ms: u64,
}

impl Default for WolConfig {
    fn default() -> Self {
        Self {
            broadcast_addr: default_broadcast_addr(),
            port: default_wol_port(),
            packets: default_wol_packets(),
            packet_interval_ms: default_wol_packet_interval(),
        }
    }
}

impl WolConfig {
    pub fn wake_config(&self) -> Result<WakeConfig, ConfigError> {
        let mut errors = Vec::new();

        // Magic packets are broadcast, which only IPv4 has
        let ip = match IpAddr::from_str(&self.broadcast_addr) {
            Ok(IpAddr::V4(ip)) => Some(ip),
            Ok(IpAddr::V6(_)) => {
                errors.push(format!(
                    "wol.broadcast_addr: '{}' is not an IPv4 address",
                    self.broadcast_addr
                ));
                None
            }
            Err(e) => {
                errors.push(format!(
                    "wol.broadcast_addr: invalid address '{}': {}",
                    self.broadcast_addr, e
                ));
                None
            }
        };
        if self.packets == 0 {
            errors.push("wol.packets must be greater than 0".to_string());
        }

        match ip {
            Some(ip) if errors.is_empty() => Ok(WakeConfig {
                target: SocketAddrV4::new(ip, self.port),
                packets: self.packets,
                packet_interval: Duration::from_millis(self.packet_interval_ms),
            }),
            _ => Err(ConfigError::Invalid(errors)),
        }
    }
}

/// Where requests are forwarded and which machine gets woken up.
///
/// Built once at startup and shared read-only for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct BackendTarget {
    authority: String,
    base_path: String,
    probe_uri: Uri,
    mac: MacAddress,
}

impl BackendTarget {
    /// Build a target from a base URL (`http://host[:port][/prefix]`)
    pub fn new(url: &str, health_path: Option<&str>, mac: MacAddress) -> Result<Self, String> {
        Ok(Endpoints::parse(url, health_path)?.with_mac(mac))
    }

    /// `host[:port]` of the backend, used as the rewritten Host header
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// URI requested by each health probe
    pub fn probe_uri(&self) -> &Uri {
        &self.probe_uri
    }

    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    /// Backend URI for an incoming request's path and query
    pub fn forward_uri(&self, path_and_query: &str) -> Result<Uri, hyper::http::uri::InvalidUri> {
        format!("http://{}{}{}", self.authority, self.base_path, path_and_query).parse()
    }
}

/// Backend URL pieces, resolved before the MAC is known
struct Endpoints {
    authority: String,
    base_path: String,
    probe_uri: Uri,
}

impl Endpoints {
    fn parse(url: &str, health_path: Option<&str>) -> Result<Self, String> {
        let uri: Uri = url
            .trim()
            .parse()
            .map_err(|e| format!("invalid URL '{}': {}", url, e))?;

        match uri.scheme_str() {
            Some("http") => {}
            Some(other) => return Err(format!("unsupported scheme '{}' (only http)", other)),
            None => return Err(format!("URL '{}' has no scheme", url)),
        }

        let authority = uri
            .authority()
            .map(|a| a.as_str().to_string())
            .ok_or_else(|| format!("URL '{}' has no host", url))?;

        let base_path = uri.path().trim_end_matches('/').to_string();

        let probe_uri = match health_path {
            Some(path) => {
                let path = if path.starts_with('/') {
                    path.to_string()
                } else {
                    format!("/{}", path)
                };
                format!("http://{}{}{}", authority, base_path, path)
                    .parse()
                    .map_err(|e| format!("invalid health path '{}': {}", path, e))?
            }
            None => uri,
        };

        Ok(Self {
            authority,
            base_path,
            probe_uri,
        })
    }

    fn with_mac(self, mac: MacAddress) -> BackendTarget {
        BackendTarget {
            authority: self.authority,
            base_path: self.base_path,
            probe_uri: self.probe_uri,
            mac,
        }
    }
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_pool_max_idle_per_host() -> usize {
    10
}

fn default_pool_idle_timeout() -> u64 {
    90
}

fn default_request_timeout() -> u64 {
    30
}

fn default_status_path() -> String {
    "/wolstatus".to_string()
}

fn default_check_timeout() -> u64 {
    5000
}

fn default_check_interval() -> u64 {
    5000
}

fn default_max_wait() -> u64 {
    60000
}

fn default_broadcast_addr() -> String {
    "255.255.255.255".to_string()
}

fn default_wol_port() -> u16 {
    9
}

fn default_wol_packets() -> u32 {
    3
}

fn default_wol_packet_interval() -> u64 {
    100
}

fn missing(field: &str, env: &str) -> String {
    format!("{} is required (set it in the config file or via {})", field, env)
}

/// Parse an override value, recording a readable error if it is malformed
fn parse_override<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    errors: &mut Vec<String>,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            errors.push(format!("{}: invalid value '{}'", key, raw));
            None
        }
    }
}

/// Variables from a dotenv file, or none if the file does not exist
fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let env_file_error = |source| ConfigError::EnvFile {
        path: path.display().to_string(),
        source,
    };
    dotenvy::from_path_iter(path)
        .map_err(env_file_error)?
        .collect::<Result<HashMap<_, _>, _>>()
        .map_err(env_file_error)
}

impl Config {
    /// Load the config file (if any), apply environment overrides and validate.
    ///
    /// An explicitly given path must exist. Without one, [`DEFAULT_CONFIG_PATH`]
    /// is read when present and the environment alone is used otherwise.
    /// Variables from [`DEFAULT_ENV_PATH`] apply where the process environment
    /// leaves them unset.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, Path::new(DEFAULT_ENV_PATH), |key| std::env::var(key).ok())
    }

    fn load_with_env<F>(path: Option<&Path>, env_file: &Path, process_env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(DEFAULT_CONFIG_PATH)?
            }
            None => Self::default(),
        };
        let dotenv = read_env_file(env_file)?;
        config.apply_overrides(|key| {
            process_env(key)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| dotenv.get(key).cloned())
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Override values with the given variables. Empty values count as unset.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut errors = Vec::new();

        if let Some(url) = lookup("PROXY_TO") {
            self.backend.url = Some(url);
        }
        if let Some(mac) = lookup("MAC_ADDRESS") {
            self.backend.mac_address = Some(mac);
        }
        if let Some(path) = lookup("HEALTH_PATH") {
            self.backend.health_path = Some(path);
        }
        if let Some(bind) = lookup("BIND") {
            self.server.bind = bind;
        }
        if let Some(addr) = lookup("WOL_BROADCAST_ADDR") {
            self.wol.broadcast_addr = addr;
        }
        if let Some(port) = parse_override(&lookup, "PORT", &mut errors) {
            self.server.port = Some(port);
        }
        if let Some(port) = parse_override(&lookup, "WOL_PORT", &mut errors) {
            self.wol.port = port;
        }
        if let Some(ms) = parse_override(&lookup, "CHECK_TIMEOUT", &mut errors) {
            self.gate.check_timeout_ms = ms;
        }
        if let Some(ms) = parse_override(&lookup, "CHECK_INTERVAL", &mut errors) {
            self.gate.check_interval_ms = ms;
        }
        if let Some(ms) = parse_override(&lookup, "MAX_WAIT_TIME", &mut errors) {
            self.gate.max_wait_ms = ms;
        }

        if !errors.is_empty() {
            return Err(ConfigError::Invalid(errors));
        }
        Ok(())
    }

    /// Validate all configuration, reporting every problem at once
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if let Err(ConfigError::Invalid(e)) = self.server.listen_addr() {
            errors.extend(e);
        }
        if let Err(ConfigError::Invalid(e)) = self.backend.target() {
            errors.extend(e);
        }
        self.gate.validate(&mut errors);
        if let Err(ConfigError::Invalid(e)) = self.wol.wake_config() {
            errors.extend(e);
        }

        if !errors.is_empty() {
            return Err(ConfigError::Invalid(errors));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
port = 8080
bind = "127.0.0.1"
request_timeout_secs = 10

[backend]
url = "http://192.168.1.20:3000"
mac_address = "00:11:22:33:44:55"
health_path = "/health"

[gate]
check_timeout_ms = 1000
check_interval_ms = 2000
max_wait_ms = 30000

[wol]
broadcast_addr = "192.168.1.255"
port = 7
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, Some(8080));
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.server.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.backend.url.as_deref(), Some("http://192.168.1.20:3000"));
        assert_eq!(config.gate.check_interval_ms, 2000);
        assert_eq!(config.wol.port, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.server.port, None);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.server.pool_max_idle_per_host, 10);
        assert_eq!(config.server.pool_idle_timeout_secs, 90);
        assert_eq!(config.server.status_path, "/wolstatus");
        assert_eq!(config.gate.check_timeout_ms, 5000);
        assert_eq!(config.gate.check_interval_ms, 5000);
        assert_eq!(config.gate.max_wait_ms, 60000);
        assert_eq!(config.wol.broadcast_addr, "255.255.255.255");
        assert_eq!(config.wol.port, 9);
        assert_eq!(config.wol.packets, 3);
        assert_eq!(config.wol.packet_interval_ms, 100);
    }

    #[test]
    fn test_gate_config_durations() {
        let gate = GateSettings::default().gate_config();
        assert_eq!(gate.probe_timeout, Duration::from_millis(5000));
        assert_eq!(gate.poll_interval, Duration::from_millis(5000));
        assert_eq!(gate.max_wait, Duration::from_millis(60000));
    }

    #[test]
    fn test_missing_required_values_are_all_reported() {
        let config = Config::default();
        let err = config.validate().unwrap_err().to_string();

        assert!(err.contains("server.port"));
        assert!(err.contains("backend.url"));
        assert!(err.contains("backend.mac_address"));
        assert!(err.contains("PROXY_TO"));
    }

    #[test]
    fn test_env_overrides_fill_required_values() {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[
                ("PROXY_TO", "http://10.0.0.5:8080"),
                ("PORT", "3000"),
                ("MAC_ADDRESS", "AA-BB-CC-DD-EE-FF"),
                ("CHECK_TIMEOUT", "250"),
                ("CHECK_INTERVAL", "500"),
                ("MAX_WAIT_TIME", "10000"),
            ]))
            .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, Some(3000));
        let gate = config.gate.gate_config();
        assert_eq!(gate.probe_timeout, Duration::from_millis(250));
        assert_eq!(gate.poll_interval, Duration::from_millis(500));
        assert_eq!(gate.max_wait, Duration::from_millis(10000));
        assert_eq!(
            config.backend.target().unwrap().authority(),
            "10.0.0.5:8080"
        );
    }

    #[test]
    fn test_env_overrides_take_precedence_over_file() {
        let mut config: Config = toml::from_str(
            r#"
[server]
port = 8080

[backend]
url = "http://file-host:80"
mac_address = "00:11:22:33:44:55"
"#,
        )
        .unwrap();
        config
            .apply_overrides(env(&[("PROXY_TO", "http://env-host:81"), ("PORT", "")]))
            .unwrap();

        assert_eq!(config.backend.url.as_deref(), Some("http://env-host:81"));
        // Empty values are treated as unset
        assert_eq!(config.server.port, Some(8080));
    }

    #[test]
    fn test_invalid_env_number_is_an_error() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(env(&[("CHECK_INTERVAL", "soon"), ("PORT", "99999")]))
            .unwrap_err()
            .to_string();
        assert!(err.contains("CHECK_INTERVAL: invalid value 'soon'"));
        assert!(err.contains("PORT: invalid value '99999'"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config: Config = toml::from_str(
            r#"
[server]
port = 8080

[backend]
url = "https://secure.example.com"
mac_address = "not-a-mac"

[gate]
check_interval_ms = 0

[wol]
broadcast_addr = "everyone"
"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err().to_string();

        assert!(err.contains("backend.mac_address"));
        assert!(err.contains("check_interval_ms must be greater than 0"));
        assert!(err.contains("wol.broadcast_addr"));
    }

    #[test]
    fn test_https_backend_is_rejected() {
        let mac: MacAddress = "00:11:22:33:44:55".parse().unwrap();
        let err = BackendTarget::new("https://secure.example.com", None, mac).unwrap_err();
        assert!(err.contains("unsupported scheme 'https'"));
    }

    #[test]
    fn test_backend_target_probe_uri() {
        let mac: MacAddress = "00:11:22:33:44:55".parse().unwrap();

        let target = BackendTarget::new("http://10.0.0.5:8080", None, mac).unwrap();
        assert_eq!(target.probe_uri().to_string(), "http://10.0.0.5:8080/");

        let target = BackendTarget::new("http://10.0.0.5:8080/app/", Some("healthz"), mac).unwrap();
        assert_eq!(target.probe_uri().to_string(), "http://10.0.0.5:8080/app/healthz");
    }

    #[test]
    fn test_backend_target_forward_uri_keeps_base_path() {
        let mac: MacAddress = "00:11:22:33:44:55".parse().unwrap();

        let target = BackendTarget::new("http://nas.lan:5000", None, mac).unwrap();
        assert_eq!(
            target.forward_uri("/api/items?page=2").unwrap().to_string(),
            "http://nas.lan:5000/api/items?page=2"
        );

        let target = BackendTarget::new("http://nas.lan:5000/prefix/", None, mac).unwrap();
        assert_eq!(
            target.forward_uri("/api").unwrap().to_string(),
            "http://nas.lan:5000/prefix/api"
        );
    }

    #[test]
    fn test_load_from_file_with_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(
            file,
            r#"
[server]
port = 9090

[backend]
url = "http://127.0.0.1:3000"
mac_address = "001122334455"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, Some(9090));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let err = Config::load(Some(Path::new("/nonexistent/wakegate.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_listen_addr() {
        let mut server = ServerConfig::default();
        server.port = Some(8080);
        assert_eq!(server.listen_addr().unwrap(), "0.0.0.0:8080".parse().unwrap());

        server.bind = "localhost".to_string();
        assert!(server.listen_addr().is_err());
    }

    #[test]
    fn test_wake_config() {
        let wake = WolConfig::default().wake_config().unwrap();
        assert_eq!(wake.target, "255.255.255.255:9".parse::<SocketAddrV4>().unwrap());
        assert_eq!(wake.packets, 3);
        assert_eq!(wake.packet_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_ipv6_broadcast_addr_is_rejected() {
        let wol = WolConfig {
            broadcast_addr: "ff02::1".to_string(),
            packets: 0,
            ..WolConfig::default()
        };
        let err = wol.wake_config().unwrap_err().to_string();
        assert!(err.contains("'ff02::1' is not an IPv4 address"));
        assert!(err.contains("wol.packets must be greater than 0"));
    }

    #[test]
    fn test_bad_url_reported_alongside_bad_mac() {
        let backend = BackendConfig {
            url: Some("ftp://nas.lan".to_string()),
            mac_address: None,
            health_path: None,
        };
        let err = backend.target().unwrap_err().to_string();
        assert!(err.contains("backend.mac_address is required"));
        assert!(err.contains("backend.url: unsupported scheme 'ftp'"));
    }

    #[test]
    fn test_env_file_fills_values_left_unset() {
        let dir = tempfile::tempdir().unwrap();
        let env_file = dir.path().join(".env");
        std::fs::write(
            &env_file,
            "PROXY_TO=http://10.0.0.9:32400\nPORT=8080\nMAC_ADDRESS=00:11:22:33:44:55\nMAX_WAIT_TIME=120000\n",
        )
        .unwrap();

        // The process environment wins; empty process values fall back to the file
        let config = Config::load_with_env(
            None,
            &env_file,
            env(&[("PORT", "9000"), ("MAX_WAIT_TIME", "")]),
        )
        .unwrap();

        assert_eq!(config.server.port, Some(9000));
        assert_eq!(config.backend.url.as_deref(), Some("http://10.0.0.9:32400"));
        assert_eq!(config.gate.max_wait_ms, 120000);
    }

    #[test]
    fn test_missing_env_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_with_env(
            None,
            &dir.path().join(".env"),
            env(&[
                ("PROXY_TO", "http://10.0.0.9"),
                ("PORT", "8080"),
                ("MAC_ADDRESS", "001122334455"),
            ]),
        )
        .unwrap();
        assert_eq!(config.backend.url.as_deref(), Some("http://10.0.0.9"));
    }

    #[test]
    fn test_malformed_env_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let env_file = dir.path().join(".env");
        std::fs::write(&env_file, "PORT=8080\n=no-key\n").unwrap();

        let err = Config::load_with_env(None, &env_file, env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::EnvFile { .. }));
    }
}
