use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "thunderscan",
    version,
    about = "web reconnaissance and SQL injection probing tool",
    long_about = "Thunderscan crawls a target site, probes it for hidden content with a wordlist and tests its query parameters and forms for SQL injection.\n\nExamples:\n  thunderscan -u https://target.tld/\n  thunderscan -u 'https://target.tld/item.php?id=1' -d 3 --delay 0.5\n  thunderscan -u https://target.tld/ --skip-inject -K ./wordlists/big.txt -e ,php,bak\n\nTip: Use --config to persist scan settings and keep CLI invocations short."
)]
pub struct CliArgs {
    #[arg(
        short = 'v',
        long = "vb",
        visible_alias = "verbose",
        action = ArgAction::Count,
        help_heading = "Output",
        help = "Increase log verbosity (-v, -vv)."
    )]
    pub verbose: u8,

    #[arg(
        short = 'c',
        long = "clr",
        visible_alias = "color",
        help_heading = "Output",
        help = "Enable colored output (overrides --no-color)."
    )]
    pub color: bool,

    #[arg(
        short = 'n',
        long = "nc",
        visible_alias = "no-color",
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,

    #[arg(
        short = 'o',
        long = "out",
        visible_alias = "output",
        value_name = "FILE",
        help_heading = "Output",
        help = "Write findings to a file."
    )]
    pub output: Option<String>,

    #[arg(
        short = 'A',
        long = "of",
        visible_alias = "output-format",
        value_name = "FORMAT",
        help_heading = "Output",
        help = "Output format: text or json (inferred from the file extension when omitted)."
    )]
    pub output_format: Option<String>,

    #[arg(
        short = 'u',
        long = "u",
        visible_alias = "url",
        value_name = "URL",
        help_heading = "Input",
        help = "Target URL (query parameters are tested for injection)."
    )]
    pub url: Option<String>,

    #[arg(
        short = 'C',
        long = "cfg",
        visible_alias = "config",
        value_name = "FILE",
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.thunderscan/config.yml)."
    )]
    pub config: Option<String>,

    #[arg(
        short = 'K',
        long = "wl",
        visible_alias = "wordlist",
        value_name = "FILE",
        help_heading = "Input",
        help = "Wordlist for content probing (default: wordlists/common.txt)."
    )]
    pub wordlist: Option<String>,

    #[arg(
        short = 'Y',
        long = "pl",
        visible_alias = "payloads",
        value_name = "FILE",
        help_heading = "Input",
        help = "SQL injection payload file, '#' lines ignored (default: wordlists/sql_payloads.txt)."
    )]
    pub payloads: Option<String>,

    #[arg(
        short = 'd',
        long = "dp",
        visible_alias = "depth",
        value_name = "N",
        help_heading = "Crawl",
        help = "Maximum crawl depth (default: 2)."
    )]
    pub depth: Option<usize>,

    #[arg(
        long = "dl",
        visible_alias = "delay",
        value_name = "SECONDS",
        help_heading = "Crawl",
        help = "Delay between crawl requests per worker (default: 1.0)."
    )]
    pub delay: Option<f64>,

    #[arg(
        long = "jt",
        visible_alias = "jitter",
        value_name = "SECONDS",
        help_heading = "Crawl",
        help = "Random extra crawl delay, up to this many seconds (default: 0)."
    )]
    pub jitter: Option<f64>,

    #[arg(
        long = "ina",
        visible_alias = "inactivity",
        value_name = "SECONDS",
        help_heading = "Crawl",
        help = "Stop crawling when no page completes for this long (default: 30)."
    )]
    pub inactivity: Option<u64>,

    #[arg(
        long = "cto",
        visible_alias = "crawl-timeout",
        value_name = "SECONDS",
        help_heading = "Crawl",
        help = "Crawl request timeout (default: 10)."
    )]
    pub crawl_timeout: Option<u64>,

    #[arg(
        long = "cw",
        visible_alias = "crawl-workers",
        value_name = "N",
        help_heading = "Performance",
        help = "Concurrent crawl fetches (default: 8)."
    )]
    pub crawl_workers: Option<usize>,

    #[arg(
        long = "pw",
        visible_alias = "probe-workers",
        value_name = "N",
        help_heading = "Performance",
        help = "Concurrent content probes (default: 20)."
    )]
    pub probe_workers: Option<usize>,

    #[arg(
        long = "iw",
        visible_alias = "inject-workers",
        value_name = "N",
        help_heading = "Performance",
        help = "Concurrent injection tests (default: 10)."
    )]
    pub inject_workers: Option<usize>,

    #[arg(
        short = 'w',
        long = "wrk",
        visible_alias = "workers",
        value_name = "N",
        help_heading = "Performance",
        help = "Runtime worker threads (default: 10)."
    )]
    pub workers: Option<usize>,

    #[arg(
        short = 'r',
        long = "rt",
        visible_alias = "rate",
        value_name = "RPS",
        help_heading = "Performance",
        help = "Content probe dispatch rate (candidates per second, default: 1000)."
    )]
    pub rate: Option<u32>,

    #[arg(
        short = 'e',
        long = "extensions",
        visible_alias = "ext",
        value_name = "LIST",
        help_heading = "Probe",
        help = "Comma separated extensions, empty item probes the bare word (default: ,php,html)."
    )]
    pub extensions: Option<String>,

    #[arg(
        long = "pto",
        visible_alias = "probe-timeout",
        value_name = "SECONDS",
        help_heading = "Probe",
        help = "Content probe request timeout (default: 3)."
    )]
    pub probe_timeout: Option<u64>,

    #[arg(
        long = "ml",
        visible_alias = "min-length",
        value_name = "BYTES",
        help_heading = "Probe",
        help = "Minimum body length of an interesting response (default: 100)."
    )]
    pub min_length: Option<usize>,

    #[arg(
        short = 'S',
        long = "fst",
        visible_alias = "filter-status",
        value_name = "LIST",
        help_heading = "Probe",
        help = "Drop probe results with these status codes (e.g. 403,401)."
    )]
    pub filter_status: Option<String>,

    #[arg(
        short = 'Z',
        long = "fsi",
        visible_alias = "filter-size",
        value_name = "LIST",
        help_heading = "Probe",
        help = "Drop probe results with these body sizes."
    )]
    pub filter_size: Option<String>,

    #[arg(
        short = 'T',
        long = "to",
        visible_alias = "timeout",
        value_name = "SECONDS",
        help_heading = "Injection",
        help = "Time-based injection threshold (default: 10)."
    )]
    pub timeout: Option<u64>,

    #[arg(
        long = "sc",
        visible_alias = "similarity-cutoff",
        value_name = "RATIO",
        help_heading = "Injection",
        help = "Boolean detection fires below this similarity to the baseline (default: 0.7)."
    )]
    pub similarity_cutoff: Option<f64>,

    #[arg(
        short = 'p',
        long = "px",
        visible_alias = "proxy",
        value_name = "URL",
        help_heading = "HTTP",
        help = "Send all requests through this proxy."
    )]
    pub proxy: Option<String>,

    #[arg(
        short = 'H',
        long = "hdr",
        visible_alias = "header",
        value_name = "HEADER",
        help_heading = "HTTP",
        help = "Extra request header ('Key: Value')."
    )]
    pub header: Option<String>,

    #[arg(
        long = "rty",
        visible_alias = "retries",
        value_name = "N",
        help_heading = "HTTP",
        help = "Retries for 429/5xx responses and failed connections (default: 3)."
    )]
    pub retries: Option<u32>,

    #[arg(
        long = "skc",
        visible_alias = "skip-crawl",
        help_heading = "Scan",
        help = "Skip the crawl phase."
    )]
    pub skip_crawl: bool,

    #[arg(
        long = "skp",
        visible_alias = "skip-probe",
        help_heading = "Scan",
        help = "Skip the content probing phase."
    )]
    pub skip_probe: bool,

    #[arg(
        long = "ski",
        visible_alias = "skip-inject",
        help_heading = "Scan",
        help = "Skip the SQL injection phase."
    )]
    pub skip_inject: bool,
}
