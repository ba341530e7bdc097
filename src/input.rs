//! Provides a means to read, parse and hold configuration options for sweeps.
use crate::address::Prefix;
use crate::scanner::{ConfigError, ScanConfig};
use anyhow::Context;
use clap::{Parser, ValueEnum};
use serde_derive::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = ".rustsweep.toml";

/// Represents the strategy in which the sweep will walk the host range.
///   - Serial will run from the first host to the last, 1 to 254.
///   - Random will randomize the order in which hosts are probed.
#[derive(Deserialize, Debug, ValueEnum, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrder {
    Serial,
    Random,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rustsweep",
    version = env!("CARGO_PKG_VERSION"),
    max_term_width = 120,
    help_template = "{bin} {version}\n{about}\n\nUSAGE:\n    {usage}\n\nOPTIONS:\n{options}",
)]
#[allow(clippy::struct_excessive_bools)]
/// Fast ping sweeper built in Rust.
/// Probes every host from PREFIX.1 to PREFIX.254 and sorts them into
/// reachable and unreachable sets.
pub struct Opts {
    /// The first three octets of the network to sweep. Example: 192.168.1
    #[arg(value_name = "PREFIX")]
    pub prefix: Option<Prefix>,

    /// Maximum number of probes in flight at once.
    #[arg(short, long, default_value = "64")]
    pub concurrency: usize,

    /// Number of echo requests sent to each host.
    #[arg(short = 'n', long, default_value = "1")]
    pub count: u32,

    /// The timeout in milliseconds for each echo request.
    #[arg(short, long, default_value = "1000")]
    pub timeout: u64,

    /// Milliseconds in-flight probes are given to finish after an interrupt.
    #[arg(long, default_value = "2000")]
    pub grace: u64,

    /// The order of the sweep. The "serial" option walks hosts in ascending
    /// order while the "random" option walks them in a permuted order.
    #[arg(long, value_enum, ignore_case = true, default_value = "serial")]
    pub scan_order: ScanOrder,

    /// Greppable mode. Only output the reachable hosts.
    #[arg(short, long)]
    pub greppable: bool,

    /// Accessible mode. Turns off features which negatively affect screen readers.
    #[arg(long)]
    pub accessible: bool,

    /// Whether to ignore the configuration file or not.
    #[arg(long)]
    pub no_config: bool,

    /// Custom path to config file
    #[arg(long, value_parser)]
    pub config_path: Option<PathBuf>,

    /// Automatically ups the ULIMIT with the value you provided.
    #[arg(short, long)]
    pub ulimit: Option<u64>,

    /// File the reachable hosts are written to, one per line.
    #[arg(long, default_value = "reachable.txt")]
    pub reachable_out: PathBuf,

    /// File the unreachable hosts are written to, one per line.
    #[arg(long, default_value = "unreachable.txt")]
    pub unreachable_out: PathBuf,
}

#[cfg(not(tarpaulin_include))]
impl Opts {
    pub fn read() -> Self {
        Opts::parse()
    }

    /// Merge values found within the user configuration file into the
    /// command line options.
    pub fn merge(&mut self, config: &Config) {
        if !self.no_config {
            self.merge_required(config);
            self.merge_optional(config);
        }
    }

    fn merge_required(&mut self, config: &Config) {
        macro_rules! merge_required {
            ($($field: ident),+) => {
                $(
                    if let Some(e) = &config.$field {
                        self.$field = e.clone();
                    }
                )+
            }
        }

        merge_required!(
            greppable,
            accessible,
            concurrency,
            count,
            timeout,
            grace,
            scan_order,
            reachable_out,
            unreachable_out
        );
    }

    fn merge_optional(&mut self, config: &Config) {
        macro_rules! merge_optional {
            ($($field: ident),+) => {
                $(
                    if config.$field.is_some() {
                        self.$field = config.$field.clone();
                    }
                )+
            }
        }

        merge_optional!(prefix, ulimit);
    }

    /// Builds the immutable configuration of one sweep.
    ///
    /// Only the presence of a prefix is checked here; the numeric bounds are
    /// enforced by [`ScanConfig::validate`] when the scanner is built.
    pub fn scan_config(&self) -> Result<ScanConfig, ConfigError> {
        let prefix = self.prefix.ok_or(ConfigError::MissingPrefix)?;

        Ok(ScanConfig {
            prefix,
            concurrency_limit: self.concurrency,
            probe_count: self.count,
            probe_timeout: Duration::from_millis(self.timeout),
            grace_period: Duration::from_millis(self.grace),
            order: self.scan_order,
        })
    }
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            prefix: None,
            concurrency: 64,
            count: 1,
            timeout: 1_000,
            grace: 2_000,
            scan_order: ScanOrder::Serial,
            greppable: true,
            accessible: false,
            no_config: true,
            config_path: None,
            ulimit: None,
            reachable_out: PathBuf::from("reachable.txt"),
            unreachable_out: PathBuf::from("unreachable.txt"),
        }
    }
}

/// Struct used to deserialize the options specified within our config file.
/// These will be further merged with our command line arguments in order to
/// generate the final Opts struct.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    prefix: Option<Prefix>,
    concurrency: Option<usize>,
    count: Option<u32>,
    timeout: Option<u64>,
    grace: Option<u64>,
    scan_order: Option<ScanOrder>,
    greppable: Option<bool>,
    accessible: Option<bool>,
    ulimit: Option<u64>,
    reachable_out: Option<PathBuf>,
    unreachable_out: Option<PathBuf>,
}

impl Config {
    /// Reads the configuration file with TOML format and parses it into a
    /// Config struct. A missing file yields the empty config.
    ///
    /// # Format
    ///
    /// prefix = "192.168.1"
    /// concurrency = 128
    /// count = 2
    /// timeout = 500
    /// scan_order = "Random"
    /// reachable_out = "up.txt"
    ///
    pub fn read(custom_config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let Some(config_path) = custom_config_path.or_else(default_config_path) else {
            return Ok(Config::default());
        };
        if !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("could not read {}", config_path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("found errors in configuration file {}", config_path.display()))
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Constructs default path to config toml
pub fn default_config_path() -> Option<PathBuf> {
    let mut config_path = dirs::home_dir()?;
    config_path.push(DEFAULT_CONFIG_FILE);
    Some(config_path)
}
