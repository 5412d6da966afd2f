use std::time::Duration;

use clap::{error::ErrorKind, Parser};
use colored::Colorize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::bruteforcer::{ProbeConfig, ResultFilter};
use crate::cli::args::CliArgs;
use crate::cli::validation;
use crate::config::{self, ConfigFile};
use crate::crawler::CrawlConfig;
use crate::detector::InjectionConfig;
use crate::output::{self, OutputFormat};
use crate::runner::{self, Options, PayloadSource, Runner, ScanResult, WordlistSource};
use crate::stop::StopSignal;

fn print_banner() {
    const BANNER: &str = r#"
  __  __                __
 / /_/ /_  __  ______  ____/ /__  ______________ _____
/ __/ __ \/ / / / __ \/ __  / _ \/ ___/ ___/ __ `/ __ \
/ /_/ / / / /_/ / / / / /_/ /  __/ /  (__  ) /__/ /_/ / / / /
\__/_/ /_/\__,_/_/ /_/\__,_/\___/_/  /____/\___/\__,_/_/ /_/
       v0.1.0 - web recon and SQL injection probing
    "#;
    print!("{}", BANNER);
    println!();
}

fn format_kv_line(label: &str, value: &str) {
    println!(":: {:<10}: {}", label, value);
}

fn format_bool(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn seconds(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}

#[derive(Clone, Debug)]
struct RunConfig {
    options: Options,
    workers: usize,
    verbose: u8,
    output: Option<String>,
    output_format: Option<String>,
    no_color: bool,
}

fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<RunConfig, String> {
    validation::validate(&args)?;

    let no_color = if args.color {
        false
    } else {
        args.no_color || cfg.no_color.unwrap_or(false)
    };

    let target = args
        .url
        .or(cfg.url)
        .map(|u| u.trim().to_string())
        .ok_or_else(|| "a target URL must be specified (--url)".to_string())?;

    let workers = args.workers.or(cfg.workers).unwrap_or(10);

    let delay = args.delay.or(cfg.delay).unwrap_or(1.0);
    let jitter = args.jitter.or(cfg.jitter).unwrap_or(0.0);
    validation::validate_seconds("delay", delay)?;
    validation::validate_seconds("jitter", jitter)?;
    let crawl = CrawlConfig {
        max_depth: args.depth.or(cfg.depth).unwrap_or(crate::crawler::DEFAULT_MAX_DEPTH),
        request_delay: seconds(delay),
        jitter: seconds(jitter),
        workers: args
            .crawl_workers
            .or(cfg.crawl_workers)
            .unwrap_or(crate::crawler::DEFAULT_WORKERS),
        inactivity_timeout: Duration::from_secs(
            args.inactivity
                .or(cfg.inactivity)
                .unwrap_or(crate::crawler::DEFAULT_INACTIVITY_TIMEOUT.as_secs()),
        ),
    };

    let extensions_raw = args.extensions.or(cfg.extensions);
    let extensions = match extensions_raw.as_deref() {
        Some(raw) => crate::utils::parse_extensions_csv(raw)
            .map_err(|e| format!("invalid extensions '{raw}': {e}"))?,
        None => crate::utils::default_extensions(),
    };
    let filter_status = match args.filter_status.or(cfg.filter_status) {
        Some(raw) => crate::utils::parse_u16_set_csv(&raw)
            .map_err(|e| format!("invalid filter-status '{raw}': {e}"))?,
        None => Default::default(),
    };
    let filter_size = match args.filter_size.or(cfg.filter_size) {
        Some(raw) => crate::utils::parse_usize_set_csv(&raw)
            .map_err(|e| format!("invalid filter-size '{raw}': {e}"))?,
        None => Default::default(),
    };
    let rate = args.rate.or(cfg.rate).unwrap_or(1000);
    if rate == 0 {
        return Err("invalid rate, expected a positive integer".to_string());
    }
    let probe = ProbeConfig {
        extensions,
        workers: args
            .probe_workers
            .or(cfg.probe_workers)
            .unwrap_or(crate::bruteforcer::DEFAULT_WORKERS),
        rate,
        min_length: args
            .min_length
            .or(cfg.min_length)
            .unwrap_or(crate::bruteforcer::DEFAULT_MIN_LENGTH),
        filter: ResultFilter {
            status: filter_status,
            size: filter_size,
        },
        ..ProbeConfig::default()
    };

    let time_threshold = args.timeout.or(cfg.timeout).unwrap_or(10);
    if time_threshold == 0 {
        return Err("invalid timeout, expected a positive number of seconds".to_string());
    }
    let similarity_cutoff = args
        .similarity_cutoff
        .or(cfg.similarity_cutoff)
        .unwrap_or(crate::detector::DEFAULT_SIMILARITY_CUTOFF);
    validation::validate_similarity_cutoff(similarity_cutoff)?;
    let inject = InjectionConfig {
        time_threshold: Duration::from_secs(time_threshold),
        workers: args
            .inject_workers
            .or(cfg.inject_workers)
            .unwrap_or(crate::detector::DEFAULT_WORKERS),
        similarity_cutoff,
        ..InjectionConfig::default()
    };

    let header = args.header.or(cfg.header);
    if let Some(raw) = header.as_deref() {
        crate::utils::parse_header_line(raw)?;
    }

    let options = Options {
        target,
        wordlist: WordlistSource::FilePath(
            args.wordlist
                .or(cfg.wordlist)
                .unwrap_or_else(|| runner::DEFAULT_WORDLIST.to_string()),
        ),
        payloads: PayloadSource::FilePath(
            args.payloads
                .or(cfg.payloads)
                .unwrap_or_else(|| runner::DEFAULT_PAYLOADS.to_string()),
        ),
        crawl,
        probe,
        inject,
        crawl_timeout: Duration::from_secs(args.crawl_timeout.or(cfg.crawl_timeout).unwrap_or(10)),
        probe_timeout: Duration::from_secs(
            args.probe_timeout
                .or(cfg.probe_timeout)
                .unwrap_or(crate::bruteforcer::DEFAULT_TIMEOUT.as_secs()),
        ),
        max_retries: args
            .retries
            .or(cfg.retries)
            .unwrap_or(crate::http::DEFAULT_MAX_RETRIES),
        proxy: args.proxy.or(cfg.proxy).filter(|p| !p.trim().is_empty()),
        header,
        skip_crawl: args.skip_crawl || cfg.skip_crawl.unwrap_or(false),
        skip_probe: args.skip_probe || cfg.skip_probe.unwrap_or(false),
        skip_inject: args.skip_inject || cfg.skip_inject.unwrap_or(false),
        show_progress: true,
        ..Options::default()
    };

    Ok(RunConfig {
        options,
        workers,
        verbose: args.verbose,
        output: args.output.or(cfg.output),
        output_format: args.output_format.or(cfg.output_format),
        no_color,
    })
}

/// Logs go to stderr so they interleave with the progress bars, not the report.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("thunderscan={level}")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn print_summary(result: &ScanResult) {
    println!();
    format_kv_line(
        "Pages",
        &format!("{} crawled, {} ok", result.pages.len(), result.pages_ok()),
    );
    format_kv_line("Forms", &result.forms.len().to_string());
    format_kv_line("Resources", &result.resources.len().to_string());
    let vulns = result.vulnerabilities.len().to_string();
    if result.vulnerabilities.is_empty() {
        format_kv_line("SQLi", &vulns);
    } else {
        format_kv_line("SQLi", &vulns.red().bold().to_string());
    }
    for v in &result.vulnerabilities {
        println!(
            "   {} {} {} [{}] {}",
            "[sqli]".red(),
            v.http_method,
            v.url,
            v.parameter,
            v.methods_label()
        );
    }
    if result.interrupted {
        format_kv_line("Status", &"interrupted".yellow().to_string());
    }
}

async fn write_output(
    path: &str,
    format: Option<&str>,
    result: &ScanResult,
) -> Result<(), String> {
    let output_format = format
        .and_then(OutputFormat::parse)
        .or_else(|| output::infer_format_from_path(path))
        .unwrap_or(OutputFormat::Text);
    let records = output::build_records(&result.pages, &result.resources, &result.vulnerabilities);
    let rendered = match output_format {
        OutputFormat::Text => output::render_text(&records),
        OutputFormat::Json => output::render_json(&records),
    };

    let mut outfile = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(config::expand_tilde(path))
        .await
        .map_err(|e| format!("failed to open output file: {e}"))?;
    outfile
        .write_all(&rendered)
        .await
        .map_err(|_| "failed to write output file".to_string())?;
    Ok(())
}

async fn run_async(run: RunConfig) -> Result<(), String> {
    if run.no_color {
        colored::control::set_override(false);
    }
    print_banner();

    let opts = &run.options;
    format_kv_line("Target", &opts.target);
    format_kv_line("Depth", &opts.crawl.max_depth.to_string());
    format_kv_line(
        "Delay",
        &format!(
            "{:.2}s (+{:.2}s jitter)",
            opts.crawl.request_delay.as_secs_f64(),
            opts.crawl.jitter.as_secs_f64()
        ),
    );
    format_kv_line("Extensions", &opts.probe.extensions.join(","));
    format_kv_line(
        "Threshold",
        &format!("{}s", opts.inject.time_threshold.as_secs()),
    );
    format_kv_line(
        "Phases",
        &format!(
            "crawl={} probe={} inject={}",
            format_bool(!opts.skip_crawl),
            format_bool(!opts.skip_probe),
            format_bool(!opts.skip_inject)
        ),
    );
    if let Some(proxy) = opts.proxy.as_deref() {
        format_kv_line("Proxy", proxy);
    }
    println!();

    let runner = Runner::new(run.options.clone()).map_err(|e| e.to_string())?;

    let stop = StopSignal::new();
    let ctrl_c = {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing up");
                stop.stop();
            }
        })
    };

    let result = runner.run(&stop).await;
    ctrl_c.abort();
    let result = result.map_err(|e| e.to_string())?;
    debug!(elapsed = ?result.elapsed, "runner returned");

    print_summary(&result);

    if let Some(path) = run.output.as_deref() {
        write_output(path, run.output_format.as_deref(), &result).await?;
        format_kv_line("Output", path);
    }

    println!();
    println!(":: Completed :: scan took {}s ::", result.elapsed.as_secs());
    Ok(())
}

pub fn run_cli() -> Result<(), String> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.print().map_err(|e| format!("failed to print help: {e}"))?;
            return Ok(());
        }
        Err(e) => return Err(e.to_string()),
    };

    let cfg = match args.config.as_deref() {
        Some(path) => config::load_config(&config::expand_tilde(path), false)?,
        None => match config::default_config_path() {
            Some(path) => config::load_config(&path, true)?,
            None => ConfigFile::default(),
        },
    };

    let run = build_run_config(args, cfg)?;
    init_tracing(run.verbose);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(run.workers)
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    rt.block_on(run_async(run))
}
