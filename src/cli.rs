use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tailserve::cron::{parse_job, Schedule};
use tailserve::handler::HEAD_BYTES;
use tailserve::registry::ProcessConfig;

/// Immutable configuration used by the application runtime
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub poll_interval: Duration,
    pub head_bytes: u64,
    pub processes: Vec<ProcessConfig>,
    pub cron: Vec<(Schedule, String)>,
    pub log_level: String,
}

/// User-facing CLI arguments (kept private to the CLI layer)
#[derive(Parser, Debug)]
#[command(name = "tailserve", version, about = "Serve live process logs over HTTP")]
struct Args {
    /// Address the HTTP interface listens on
    #[arg(short = 'l', long = "listen", default_value = "127.0.0.1:9001")]
    listen: SocketAddr,

    /// Milliseconds to wait before polling an idle log again
    #[arg(long = "poll-ms", default_value_t = 100)]
    poll_ms: u64,

    /// Bytes of existing log sent before following new output
    #[arg(long = "head-bytes", default_value_t = HEAD_BYTES)]
    head_bytes: u64,

    /// Supervised process as NAME or NAME=LOGFILE (repeatable)
    #[arg(short = 'p', long = "process", value_name = "NAME[=LOGFILE]")]
    processes: Vec<String>,

    /// Scheduled command as "<min> <hour> <dom> <month> <dow> <command>" (repeatable)
    #[arg(long = "cron", value_name = "SPEC")]
    cron: Vec<String>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,
}

/// Parse CLI options into an application Config
pub fn parse() -> Result<Config> {
    Args::parse().try_into()
}

impl TryFrom<Args> for Config {
    type Error = anyhow::Error;

    fn try_from(args: Args) -> Result<Self> {
        let processes = args
            .processes
            .iter()
            .map(|spec| ProcessConfig::parse(spec))
            .collect::<Result<Vec<_>>>()?;
        let cron = args
            .cron
            .iter()
            .map(|spec| parse_job(spec).with_context(|| format!("bad --cron {spec:?}")))
            .collect::<Result<Vec<_>>>()?;
        Ok(Config {
            listen: args.listen,
            poll_interval: Duration::from_millis(args.poll_ms.max(1)),
            head_bytes: args.head_bytes,
            processes,
            cron,
            log_level: args.log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(argv: &[&str]) -> Result<Config> {
        Args::try_parse_from(std::iter::once("tailserve").chain(argv.iter().copied()))?.try_into()
    }

    #[test]
    fn defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.listen, "127.0.0.1:9001".parse().unwrap());
        assert_eq!(c.poll_interval, Duration::from_millis(100));
        assert_eq!(c.head_bytes, 1024);
        assert!(c.processes.is_empty());
        assert_eq!(c.log_level, "info");
    }

    #[test]
    fn processes_and_cron_jobs() {
        let c = config(&[
            "-p",
            "web=/tmp/web.log",
            "--process",
            "worker",
            "--cron",
            "0 * * * * restart web",
        ])
        .unwrap();
        assert_eq!(c.processes.len(), 2);
        assert_eq!(c.processes[1].stdout_logfile, None);
        assert_eq!(c.cron[0].1, "restart web");
    }

    #[test]
    fn head_bytes_can_be_set() {
        let c = config(&["--head-bytes", "0"]).unwrap();
        assert_eq!(c.head_bytes, 0);
        assert!(config(&["--head-bytes", "-1"]).is_err());
    }

    #[test]
    fn bad_cron_is_rejected() {
        assert!(config(&["--cron", "99 * * * * x"]).is_err());
    }
}
