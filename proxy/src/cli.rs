//! CLI引数

use chatmesh_common::config::ProxyConfig;
use clap::Parser;
use std::path::PathBuf;

/// chatmesh proxy - per-instance message router
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "chatmesh-proxy")]
#[command(version, about, long_about = None)]
#[command(after_help = r#"ENVIRONMENT VARIABLES:
    INSTANCE_NAME                      Instance name (required)
    PROXY_PORT                         Proxy listen port (default: 8080)
    CLIENT_PORT                        Local peer port (default: 5000)
    CONTROLLER_URL                     Coordinator base URL (default: http://127.0.0.1:8000)
    CHATMESH_ADVERTISE_HOST            Host announced to the coordinator (default: 127.0.0.1)
    CHATMESH_HEARTBEAT_INTERVAL_SECS   Heartbeat interval (default: 30)
    CHATMESH_SYNC_INTERVAL_SECS        Endpoint sync interval (default: 60)
    CHATMESH_MAX_IN_FLIGHT             Maximum concurrent deliveries (default: 64)
    CHATMESH_LOG_LEVEL                 Log level (default: info)
    CHATMESH_LOG_DIR                   Write daily-rotated JSON logs to this directory
"#)]
pub struct Cli {
    /// Configuration file (TOML/JSON/YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Instance name served by this proxy
    #[arg(short, long, env = "INSTANCE_NAME")]
    pub instance_name: Option<String>,

    /// Proxy listen port
    #[arg(short, long, env = "PROXY_PORT")]
    pub proxy_port: Option<u16>,

    /// Local peer port
    #[arg(long, env = "CLIENT_PORT")]
    pub client_port: Option<u16>,

    /// Coordinator base URL
    #[arg(long, env = "CONTROLLER_URL")]
    pub controller_url: Option<String>,

    /// Host announced to the coordinator
    #[arg(long)]
    pub advertise_host: Option<String>,

    /// Heartbeat interval in seconds
    #[arg(long)]
    pub heartbeat_interval_secs: Option<u64>,

    /// Endpoint sync interval in seconds
    #[arg(long)]
    pub sync_interval_secs: Option<u64>,

    /// Maximum concurrent deliveries
    #[arg(long)]
    pub max_in_flight: Option<usize>,
}

impl Cli {
    /// 指定された引数で設定を上書き
    pub fn apply(&self, config: &mut ProxyConfig) {
        if let Some(name) = &self.instance_name {
            config.instance_name = name.clone();
        }
        if let Some(port) = self.proxy_port {
            config.proxy_port = port;
        }
        if let Some(port) = self.client_port {
            config.client_port = port;
        }
        if let Some(url) = &self.controller_url {
            config.controller_url = url.clone();
        }
        if let Some(host) = &self.advertise_host {
            config.advertise_host = host.clone();
        }
        if let Some(secs) = self.heartbeat_interval_secs {
            config.heartbeat_interval_secs = secs;
        }
        if let Some(secs) = self.sync_interval_secs {
            config.sync_interval_secs = secs;
        }
        if let Some(limit) = self.max_in_flight {
            config.max_in_flight = limit;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in ["INSTANCE_NAME", "PROXY_PORT", "CLIENT_PORT", "CONTROLLER_URL"] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_flags_override_config() {
        clear_env();
        let cli = Cli::try_parse_from([
            "chatmesh-proxy",
            "--instance-name",
            "alice",
            "--proxy-port",
            "8081",
            "--client-port",
            "5001",
            "--max-in-flight",
            "8",
        ])
        .unwrap();
        let mut config = ProxyConfig::default();
        cli.apply(&mut config);

        assert_eq!(config.instance_name, "alice");
        assert_eq!(config.proxy_port, 8081);
        assert_eq!(config.client_port, 5001);
        assert_eq!(config.max_in_flight, 8);
        assert_eq!(config.controller_url, "http://127.0.0.1:8000");
    }

    #[test]
    #[serial]
    fn test_legacy_env_vars_are_accepted() {
        clear_env();
        std::env::set_var("INSTANCE_NAME", "bob");
        std::env::set_var("PROXY_PORT", "8082");
        std::env::set_var("CONTROLLER_URL", "http://coordinator:8000");

        let cli = Cli::try_parse_from(["chatmesh-proxy"]).unwrap();
        clear_env();

        let mut config = ProxyConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.instance_name, "bob");
        assert_eq!(config.proxy_port, 8082);
        assert_eq!(config.client_port, 5000);
        assert_eq!(config.controller_url, "http://coordinator:8000");
    }
}
