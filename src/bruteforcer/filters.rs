use std::collections::HashSet;

use super::ProbeResult;

/// Post-scan exclusion sets applied to prober results.
#[derive(Clone, Debug, Default)]
pub struct ResultFilter {
    pub status: HashSet<u16>,
    pub size: HashSet<usize>,
}

impl ResultFilter {
    pub fn matches(&self, result: &ProbeResult) -> bool {
        if !self.status.is_empty() && self.status.contains(&result.status) {
            return true;
        }
        !self.size.is_empty() && self.size.contains(&result.length)
    }

    /// Drops filtered results, then keeps the first result per URL.
    pub fn finalize(&self, results: Vec<ProbeResult>) -> Vec<ProbeResult> {
        let mut seen: HashSet<String> = HashSet::new();
        results
            .into_iter()
            .filter(|r| !self.matches(r))
            .filter(|r| seen.insert(r.url.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(url: &str, status: u16, length: usize) -> ProbeResult {
        ProbeResult {
            url: url.to_string(),
            status,
            length,
            headers: Default::default(),
        }
    }

    #[test]
    fn finalize_filters_then_dedupes() {
        let filter = ResultFilter {
            status: [403].into_iter().collect(),
            size: [150].into_iter().collect(),
        };
        let out = filter.finalize(vec![
            result("http://h/a", 200, 300),
            result("http://h/a", 200, 300),
            result("http://h/b", 403, 900),
            result("http://h/c", 200, 150),
            result("http://h/d", 301, 120),
        ]);
        let urls: Vec<&str> = out.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["http://h/a", "http://h/d"]);
    }

    #[test]
    fn empty_filter_keeps_everything_unique() {
        let out = ResultFilter::default().finalize(vec![
            result("http://h/a", 200, 300),
            result("http://h/b", 403, 200),
        ]);
        assert_eq!(out.len(), 2);
    }
}
