use crate::cli::args::CliArgs;

pub fn validate(args: &CliArgs) -> Result<(), String> {
    if let Some(raw) = args.extensions.as_deref() {
        crate::utils::parse_extensions_csv(raw)
            .map_err(|e| format!("invalid --extensions '{raw}': {e}"))?;
    }
    if let Some(raw) = args.filter_status.as_deref() {
        crate::utils::parse_u16_set_csv(raw)
            .map_err(|e| format!("invalid --filter-status '{raw}': {e}"))?;
    }
    if let Some(raw) = args.filter_size.as_deref() {
        crate::utils::parse_usize_set_csv(raw)
            .map_err(|e| format!("invalid --filter-size '{raw}': {e}"))?;
    }
    if let Some(raw) = args.header.as_deref() {
        crate::utils::parse_header_line(raw)?;
    }
    if let Some(cutoff) = args.similarity_cutoff {
        validate_similarity_cutoff(cutoff)?;
    }
    if args.timeout == Some(0) {
        return Err("invalid timeout, expected a positive number of seconds".to_string());
    }
    if args.rate == Some(0) {
        return Err("invalid rate, expected a positive integer".to_string());
    }
    for (flag, value) in [
        ("workers", args.workers),
        ("crawl-workers", args.crawl_workers),
        ("probe-workers", args.probe_workers),
        ("inject-workers", args.inject_workers),
    ] {
        if value == Some(0) {
            return Err(format!("invalid {flag}, expected a positive integer"));
        }
    }
    for (flag, value) in [("delay", args.delay), ("jitter", args.jitter)] {
        if let Some(v) = value {
            validate_seconds(flag, v)?;
        }
    }
    Ok(())
}

pub fn validate_similarity_cutoff(cutoff: f64) -> Result<(), String> {
    if cutoff.is_nan() || cutoff <= 0.0 || cutoff > 1.0 {
        return Err(format!(
            "invalid similarity-cutoff {cutoff}, expected a value in (0, 1]"
        ));
    }
    Ok(())
}

pub fn validate_seconds(flag: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() || value < 0.0 {
        return Err(format!("invalid {flag} {value}, expected non-negative seconds"));
    }
    Ok(())
}
