use clap::Parser;
use std::path::PathBuf;

use crate::config;

#[derive(Parser, Debug)]
#[command(name = "janus-proxy")]
#[command(version)]
#[command(about = "Intercepting WebSocket proxy for the Janus gateway", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/janus-proxy.toml")]
    pub config: PathBuf,

    /// Client WebSocket port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Gateway WebSocket URL
    #[arg(short, long)]
    pub gateway_address: Option<String>,

    /// HTTP port for health/status
    #[arg(long)]
    pub http_port: Option<u16>,

    /// Verbose logging
    #[arg(short, long, action)]
    pub verbose: bool,
}

impl Args {
    pub fn load_config(&self) -> Result<config::Config, Box<dyn std::error::Error>> {
        config::Config::load(&self.config)
    }

    /// Command line values win over file and environment
    pub fn apply_overrides(&self, config: &mut config::Config) {
        if let Some(port) = self.port {
            config.proxy.port = port;
        }
        if let Some(ref address) = self.gateway_address {
            config.proxy.gateway_address = address.clone();
        }
        if let Some(port) = self.http_port {
            config.http.port = port;
        }
        if self.verbose {
            config.logging.level = "debug".to_string();
        }
    }
}
