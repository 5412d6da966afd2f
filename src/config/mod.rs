use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::Serialize;

/// Scan settings read from YAML. Every key is optional; CLI flags win.
#[derive(Debug, Default, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub url: Option<String>,
    pub wordlist: Option<String>,
    pub payloads: Option<String>,
    #[serde(alias = "max_depth")]
    pub depth: Option<usize>,
    pub delay: Option<f64>,
    pub jitter: Option<f64>,
    #[serde(alias = "time_threshold")]
    pub timeout: Option<u64>,
    pub probe_timeout: Option<u64>,
    pub crawl_timeout: Option<u64>,
    pub inactivity: Option<u64>,
    pub workers: Option<usize>,
    pub crawl_workers: Option<usize>,
    pub probe_workers: Option<usize>,
    pub inject_workers: Option<usize>,
    pub rate: Option<u32>,
    pub extensions: Option<String>,
    pub min_length: Option<usize>,
    pub similarity_cutoff: Option<f64>,
    pub retries: Option<u32>,
    pub filter_status: Option<String>,
    pub filter_size: Option<String>,
    pub proxy: Option<String>,
    pub header: Option<String>,
    pub skip_crawl: Option<bool>,
    pub skip_probe: Option<bool>,
    pub skip_inject: Option<bool>,
    pub output: Option<String>,
    pub output_format: Option<String>,
    pub no_color: Option<bool>,
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("USERPROFILE").map(PathBuf::from))
        .or_else(|| {
            let drive = env::var_os("HOMEDRIVE")?;
            let path = env::var_os("HOMEPATH")?;
            Some(PathBuf::from(drive).join(path))
        })
}

pub fn default_config_path() -> Option<PathBuf> {
    Some(home_dir()?.join(".thunderscan").join("config.yml"))
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

pub fn expand_tilde_string(path: &str) -> String {
    expand_tilde(path).to_string_lossy().to_string()
}

pub fn parse_config(contents: &str, origin: &Path) -> Result<ConfigFile, String> {
    serde_yaml::from_str::<ConfigFile>(contents)
        .map_err(|e| format!("failed to parse config '{}': {e}", origin.display()))
}

pub fn load_config(path: &Path, allow_missing: bool) -> Result<ConfigFile, String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => parse_config(&contents, path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && allow_missing => {
            Ok(ConfigFile::default())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(format!("config file not found '{}'", path.display()))
        }
        Err(e) => Err(format!("failed to read config '{}': {e}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_yaml() {
        let cfg = parse_config(
            "url: http://target.test/\ndepth: 3\ndelay: 0.25\nextensions: \",php\"\nskip_probe: true\n",
            Path::new("inline.yml"),
        )
        .unwrap();
        assert_eq!(cfg.url.as_deref(), Some("http://target.test/"));
        assert_eq!(cfg.depth, Some(3));
        assert_eq!(cfg.delay, Some(0.25));
        assert_eq!(cfg.extensions.as_deref(), Some(",php"));
        assert_eq!(cfg.skip_probe, Some(true));
        assert!(cfg.payloads.is_none());
    }

    #[test]
    fn accepts_aliases() {
        let cfg = parse_config("max_depth: 1\ntime_threshold: 4\n", Path::new("inline.yml")).unwrap();
        assert_eq!(cfg.depth, Some(1));
        assert_eq!(cfg.timeout, Some(4));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = parse_config("urls: [a]\n", Path::new("inline.yml")).unwrap_err();
        assert!(err.contains("inline.yml"));
    }

    #[test]
    fn missing_file_is_optional_when_allowed() {
        let path = std::env::temp_dir().join("thunderscan-missing-config-test.yml");
        assert!(load_config(&path, true).is_ok());
        assert!(load_config(&path, false).is_err());
    }

    #[test]
    fn expand_tilde_leaves_plain_paths() {
        assert_eq!(expand_tilde("wordlists/common.txt"), PathBuf::from("wordlists/common.txt"));
    }
}
