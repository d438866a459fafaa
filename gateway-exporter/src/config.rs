//! Command-line and environment configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use enphase_client::{IdentityEndpoints, LOGIN_URL, TOKEN_URL};

use crate::credentials::{Account, CredentialManagerConfig, DEFAULT_REFRESH_TIMEOUT};
use crate::error::{Error, Result};
use crate::scheduler::PollSchedulerConfig;

/// Default log directive.
pub const DEFAULT_LOG_FILTER: &str = "gateway_exporter=info,enphase_client=info";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// IP address or hostname of the Envoy gateway
    #[arg(long, env = "GATEWAY_IP")]
    pub gateway_ip: Option<String>,

    /// Enlighten account e-mail
    #[arg(long, env = "ENPHASE_USERNAME")]
    pub username: Option<String>,

    /// Enlighten account password
    #[arg(long, env = "ENPHASE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Serial number of the gateway
    #[arg(long, env = "GATEWAY_SERIAL")]
    pub serial: Option<String>,

    /// Time between gateway polls
    #[arg(long, env = "SCRAPE_INTERVAL", default_value = "30s", value_parser = humantime::parse_duration)]
    pub scrape_interval: Duration,

    /// Upper bound on a single gateway poll
    #[arg(long, env = "SCRAPE_TIMEOUT", default_value = "20s", value_parser = humantime::parse_duration)]
    pub scrape_timeout: Duration,

    /// Listen address for the metrics endpoint, e.g. `:9365` or `127.0.0.1:9365`
    #[arg(long, env = "PROMETHEUS_ADDR", default_value = ":9365")]
    pub prometheus_addr: String,

    /// Time between scheduled token refreshes
    #[arg(long, env = "TOKEN_REFRESH_PERIOD", default_value = "7d", value_parser = humantime::parse_duration)]
    pub token_refresh_period: Duration,

    /// How long to wait for the first token at startup
    #[arg(long, env = "TOKEN_WAIT_TIMEOUT", default_value = "1m", value_parser = humantime::parse_duration)]
    pub token_wait_timeout: Duration,

    /// How long to wait for tasks to stop on shutdown
    #[arg(long, env = "SHUTDOWN_GRACE", default_value = "15s", value_parser = humantime::parse_duration)]
    pub shutdown_grace: Duration,

    /// Enlighten login endpoint
    #[arg(long, env = "ENPHASE_LOGIN_URL", default_value = LOGIN_URL)]
    pub login_url: String,

    /// Gateway token endpoint
    #[arg(long, env = "ENPHASE_TOKEN_URL", default_value = TOKEN_URL)]
    pub token_url: String,

    /// rrdcached address; enables the rrdupdate sink when set
    #[arg(long, env = "RRD_DAEMON")]
    pub rrd_daemon: Option<String>,

    /// Directory holding the round-robin databases
    #[arg(long, env = "RRD_DIR", default_value = ".")]
    pub rrd_dir: PathBuf,

    /// Log filter directive
    #[arg(long, env = "RUST_LOG", default_value = DEFAULT_LOG_FILTER)]
    pub log_filter: String,

    /// Also write daily-rotated log files to this directory
    #[arg(long, env = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

/// rrdupdate sink settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RrdConfig {
    pub daemon: String,
    pub dir: PathBuf,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gateway_host: String,
    pub account: Account,
    pub identity: IdentityEndpoints,
    pub credentials: CredentialManagerConfig,
    pub poll: PollSchedulerConfig,
    pub token_wait_timeout: Duration,
    pub listen_addr: SocketAddr,
    pub shutdown_grace: Duration,
    pub rrd: Option<RrdConfig>,
}

impl Args {
    /// Validate the raw arguments.
    pub fn into_config(self) -> Result<AppConfig> {
        let gateway_host = required(self.gateway_ip, "--gateway-ip / GATEWAY_IP")?;
        let account = Account {
            username: required(self.username, "--username / ENPHASE_USERNAME")?,
            password: required(self.password, "--password / ENPHASE_PASSWORD")?,
            serial: required(self.serial, "--serial / GATEWAY_SERIAL")?,
        };

        non_zero(self.scrape_interval, "--scrape-interval")?;
        non_zero(self.scrape_timeout, "--scrape-timeout")?;
        non_zero(self.token_refresh_period, "--token-refresh-period")?;

        let identity = IdentityEndpoints::new(&self.login_url, &self.token_url)
            .map_err(|e| Error::config(e.to_string()))?;

        let rrd = self
            .rrd_daemon
            .filter(|daemon| !daemon.trim().is_empty())
            .map(|daemon| RrdConfig {
                daemon,
                dir: self.rrd_dir,
            });

        Ok(AppConfig {
            gateway_host,
            account,
            identity,
            credentials: CredentialManagerConfig {
                refresh_period: self.token_refresh_period,
                refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            },
            poll: PollSchedulerConfig {
                interval: self.scrape_interval,
                timeout: self.scrape_timeout,
            },
            token_wait_timeout: self.token_wait_timeout,
            listen_addr: parse_listen_addr(&self.prometheus_addr)?,
            shutdown_grace: self.shutdown_grace,
            rrd,
        })
    }
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::config(format!("{} is required", name))),
    }
}

fn non_zero(value: Duration, name: &str) -> Result<()> {
    if value.is_zero() {
        return Err(Error::config(format!("{} must be greater than zero", name)));
    }
    Ok(())
}

/// Parse a listen address. A bare `:port` binds all IPv4 interfaces.
pub fn parse_listen_addr(raw: &str) -> Result<SocketAddr> {
    let raw = raw.trim();
    if let Some(port) = raw.strip_prefix(':') {
        let port: u16 = port
            .parse()
            .map_err(|e| Error::config(format!("Invalid listen port {:?}: {}", raw, e)))?;
        return Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)));
    }
    raw.parse()
        .map_err(|e| Error::config(format!("Invalid listen address {:?}: {}", raw, e)))
}
