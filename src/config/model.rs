// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::EndpointKind;
use crate::units::YearMonth;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [batch]
/// bucket = "currnt-data"
/// basins = ["74"]
/// start_year = 1980
/// end_year = 1980
/// experiments = ["GLDAS"]
/// arch = "x86_64"
///
/// [retry]
/// interval_secs = 10
/// max_attempts = 25
///
/// [chain]
/// origin = "1979-12"
///
/// [experiment.GLDAS]
/// models = ["VIC"]
/// steps = ["3H"]
///
/// [endpoints.x86_64]
/// kind = "sqs"
/// target = "https://sqs.us-west-2.amazonaws.com/123456789012/rapid.fifo"
/// ```
///
/// This is the unvalidated form; convert it with `BatchConfig::try_from`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBatchConfig {
    pub batch: BatchSection,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub chain: ChainSection,

    #[serde(default)]
    pub aws: AwsSection,

    /// `[experiment.<NAME>]` tables. Empty means "use the built-in mapping".
    #[serde(default)]
    pub experiment: BTreeMap<String, ExperimentConfig>,

    /// `[endpoints.<arch>]` tables.
    #[serde(default)]
    pub endpoints: BTreeMap<String, EndpointConfig>,

    #[serde(default)]
    pub worker: WorkerSection,
}

/// `[batch]` section: what to simulate and where results live.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchSection {
    pub bucket: String,

    pub basins: Vec<String>,

    pub start_year: i32,

    pub end_year: i32,

    /// Two-digit month labels, `"01"`..`"12"`.
    #[serde(default = "default_months")]
    pub months: Vec<String>,

    #[serde(default = "default_experiments")]
    pub experiments: Vec<String>,

    /// Architecture selector; picks an entry from `[endpoints]`.
    #[serde(default = "default_arch")]
    pub arch: String,
}

fn default_months() -> Vec<String> {
    (1..=12).map(|m| format!("{m:02}")).collect()
}

fn default_experiments() -> Vec<String> {
    vec!["GLDAS".to_string()]
}

fn default_arch() -> String {
    "x86_64".to_string()
}

/// `[retry]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    /// Short sleep between readiness checks of one artifact.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Readiness checks per artifact before giving up on its chain.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Long sleep between dispatch queue passes.
    #[serde(default = "default_rescan_interval_secs")]
    pub rescan_interval_secs: u64,

    /// Dispatch queue pass limit; `None` re-scans until the queue is empty.
    #[serde(default)]
    pub max_passes: Option<u32>,

    /// Whole-unit attempts (stage + compute + publish) before a chain is
    /// aborted.
    #[serde(default = "default_unit_attempts")]
    pub unit_attempts: u32,
}

fn default_interval_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    25
}

fn default_rescan_interval_secs() -> u64 {
    20 * 60
}

fn default_unit_attempts() -> u32 {
    1
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_attempts: default_max_attempts(),
            rescan_interval_secs: default_rescan_interval_secs(),
            max_passes: None,
            unit_attempts: default_unit_attempts(),
        }
    }
}

/// `[chain]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainSection {
    /// The month that starts every chain from a synthetic zero state.
    #[serde(default)]
    pub origin: Option<String>,
}

/// `[aws]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct AwsSection {
    #[serde(default = "default_region")]
    pub region: String,

    /// Named profile from the shared credentials file.
    #[serde(default)]
    pub profile: Option<String>,
}

fn default_region() -> String {
    "us-west-2".to_string()
}

impl Default for AwsSection {
    fn default() -> Self {
        Self {
            region: default_region(),
            profile: None,
        }
    }
}

/// `[experiment.<NAME>]`: the land-surface models and time steps available
/// for one experiment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExperimentConfig {
    pub models: Vec<String>,
    pub steps: Vec<String>,
}

/// Mapping used when the file has no `[experiment]` tables.
pub fn builtin_experiments() -> BTreeMap<String, ExperimentConfig> {
    let mut map = BTreeMap::new();
    map.insert(
        "GLDAS".to_string(),
        ExperimentConfig {
            models: vec!["VIC".to_string()],
            steps: vec!["3H".to_string()],
        },
    );
    map.insert(
        "NLDAS".to_string(),
        ExperimentConfig {
            models: vec!["VIC".to_string(), "NOAH".to_string(), "MOS".to_string()],
            steps: vec!["H".to_string(), "M".to_string()],
        },
    );
    map
}

/// `[endpoints.<arch>]`: where compute for one architecture is sent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointConfig {
    pub kind: EndpointKind,

    /// Queue URL (`sqs`) or function name / ARN (`lambda`).
    pub target: String,

    /// FIFO message group used for `sqs` endpoints.
    #[serde(default = "default_message_group_id")]
    pub message_group_id: String,
}

fn default_message_group_id() -> String {
    "default-group".to_string()
}

/// `[worker]` section: local commands used when this process performs the
/// compute itself.
///
/// Commands are run through `sh -c` after placeholder substitution; see
/// `exec::process::render_command`. Substituted values are shell-quoted,
/// so placeholders must not be wrapped in quotes of their own.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSection {
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Routing command, e.g. `rapid --namelist {scratch}/namelist_{year_month}`.
    #[serde(default)]
    pub routing_cmd: Option<String>,

    /// Writes a zero-valued copy of `{src}` to `{dest}`.
    #[serde(default = "default_zero_state_cmd")]
    pub zero_state_cmd: String,

    /// Data-download command; prints one downloaded file path per line.
    #[serde(default)]
    pub fetch_cmd: Option<String>,

    /// Runoff volume command; writes `{forcing_volume}` from `{granules}`.
    #[serde(default)]
    pub volume_cmd: Option<String>,

    #[serde(default)]
    pub dataset: DatasetSection,
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_zero_state_cmd() -> String {
    "ncap2 -O -s 'Qout=Qout*0' {src} {dest}".to_string()
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            routing_cmd: None,
            zero_state_cmd: default_zero_state_cmd(),
            fetch_cmd: None,
            volume_cmd: None,
            dataset: DatasetSection::default(),
        }
    }
}

/// `[worker.dataset]`: what the data-download collaborator searches for.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatasetSection {
    /// Product short name; `{model}` and `{step}` are substituted.
    #[serde(default = "default_short_name")]
    pub short_name: String,

    /// `[west, south, east, north]` in degrees.
    #[serde(default = "default_bounding_box")]
    pub bounding_box: [f64; 4],

    /// Maximum number of granules requested.
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_short_name() -> String {
    "GLDAS_{model}10_{step}".to_string()
}

fn default_bounding_box() -> [f64; 4] {
    [-180.0, -60.0, 180.0, 90.0]
}

fn default_count() -> u32 {
    10
}

impl Default for DatasetSection {
    fn default() -> Self {
        Self {
            short_name: default_short_name(),
            bounding_box: default_bounding_box(),
            count: default_count(),
        }
    }
}

/// Validated configuration. Construct via `BatchConfig::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub batch: BatchSection,
    pub retry: RetrySection,
    pub aws: AwsSection,
    pub experiments: BTreeMap<String, ExperimentConfig>,
    pub endpoints: BTreeMap<String, EndpointConfig>,
    pub worker: WorkerSection,
    months: Vec<u8>,
    chain_origin: Option<YearMonth>,
}

impl BatchConfig {
    /// Assemble from already-validated parts (see `validate.rs`).
    pub(crate) fn new_unchecked(
        raw: RawBatchConfig,
        experiments: BTreeMap<String, ExperimentConfig>,
        months: Vec<u8>,
        chain_origin: Option<YearMonth>,
    ) -> Self {
        Self {
            batch: raw.batch,
            retry: raw.retry,
            aws: raw.aws,
            experiments,
            endpoints: raw.endpoints,
            worker: raw.worker,
            months,
            chain_origin,
        }
    }

    /// Parsed months in configured order.
    pub fn months(&self) -> &[u8] {
        &self.months
    }

    pub fn chain_origin(&self) -> Option<YearMonth> {
        self.chain_origin
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry.interval_secs)
    }

    pub fn rescan_interval(&self) -> Duration {
        Duration::from_secs(self.retry.rescan_interval_secs)
    }

    /// Endpoint selected by `[batch].arch`, if any endpoints are configured.
    pub fn endpoint(&self) -> Option<&EndpointConfig> {
        self.endpoints.get(&self.batch.arch)
    }
}
