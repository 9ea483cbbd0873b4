// Process configuration: listen address, artifact directory, pinned
// tool path. Flags win over environment variables, which win over the
// built-in defaults.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Manually updated yt-dlp copy that takes priority over any system
/// install when present.
const DEFAULT_PINNED_TOOL: &str = "/tmp/yt-dlp";

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub listen: SocketAddr,
    pub work_dir: PathBuf,
    pub pinned_tool: PathBuf,
}

impl RelayConfig {
    pub fn parse() -> Result<Self> {
        Self::from_iter(std::env::args().skip(1))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut host_override: Option<IpAddr> = None;
        let mut port_override: Option<u16> = None;
        let mut work_dir_override: Option<PathBuf> = None;
        let mut tool_override: Option<PathBuf> = None;
        let mut args = iter.into_iter();
        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--host=") {
                host_override = Some(parse_host_arg(value)?);
                continue;
            }
            if let Some(value) = arg.strip_prefix("--port=") {
                port_override = Some(parse_port_arg(value)?);
                continue;
            }
            if let Some(value) = arg.strip_prefix("--work-dir=") {
                work_dir_override = Some(PathBuf::from(value));
                continue;
            }
            if let Some(value) = arg.strip_prefix("--yt-dlp=") {
                tool_override = Some(PathBuf::from(value));
                continue;
            }

            match arg.as_str() {
                "--host" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--host requires a value"))?;
                    host_override = Some(parse_host_arg(&value)?);
                }
                "--port" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--port requires a value"))?;
                    port_override = Some(parse_port_arg(&value)?);
                }
                "--work-dir" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--work-dir requires a value"))?;
                    work_dir_override = Some(PathBuf::from(value));
                }
                "--yt-dlp" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--yt-dlp requires a value"))?;
                    tool_override = Some(PathBuf::from(value));
                }
                _ => return Err(anyhow!("unknown argument: {arg}")),
            }
        }

        let host = match host_override {
            Some(host) => host,
            None => match std::env::var("YT_RELAY_HOST") {
                Ok(raw) => parse_host_arg(&raw)?,
                Err(_) => DEFAULT_HOST,
            },
        };
        let port = match port_override {
            Some(port) => port,
            None => match std::env::var("YT_RELAY_PORT") {
                Ok(raw) => parse_port_arg(&raw)?,
                Err(_) => DEFAULT_PORT,
            },
        };
        let work_dir = work_dir_override
            .or_else(|| std::env::var_os("YT_RELAY_WORK_DIR").map(PathBuf::from))
            .unwrap_or_else(|| std::env::temp_dir().join("yt-relay"));
        let pinned_tool = tool_override
            .or_else(|| std::env::var_os("YT_RELAY_YT_DLP").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PINNED_TOOL));

        Ok(Self {
            listen: SocketAddr::new(host, port),
            work_dir,
            pinned_tool,
        })
    }
}

fn parse_port_arg(value: &str) -> Result<u16> {
    value
        .parse::<u16>()
        .context("expected a numeric port between 0 and 65535")
}

fn parse_host_arg(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/YT_RELAY_HOST")
}
