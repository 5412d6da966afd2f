use std::collections::HashSet;
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use crate::http::HttpResponse;

pub const INTERESTING_STATUSES: [u16; 6] = [200, 301, 302, 307, 401, 403];
pub const DEFAULT_MIN_LENGTH: usize = 100;

/// Phrases that mark a generic server or framework page (case-insensitive).
pub const DEFAULT_PAGE_MARKERS: [&str; 9] = [
    "404 not found",
    "page not found",
    "not found",
    "access denied",
    "forbidden",
    "index of /",
    "directory listing",
    "apache server at",
    "welcome to nginx!",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Interesting,
    UninterestingStatus,
    TooShort,
    Undecodable,
    DefaultPage,
    DuplicateContent,
}

pub type Fingerprint = [u8; 32];

pub fn fingerprint(body: &[u8]) -> Fingerprint {
    Sha256::digest(body).into()
}

pub fn looks_like_default_page(text: &str) -> bool {
    let lower = text.to_lowercase();
    DEFAULT_PAGE_MARKERS.iter().any(|m| lower.contains(m))
}

/// Decides whether a probe response is worth reporting.
///
/// Holds the set of body fingerprints already reported; the set only grows
/// and is shared by every prober worker.
#[derive(Debug)]
pub struct Classifier {
    statuses: HashSet<u16>,
    min_length: usize,
    seen: Mutex<HashSet<Fingerprint>>,
}

impl Classifier {
    pub fn new(statuses: HashSet<u16>, min_length: usize) -> Self {
        Self {
            statuses,
            min_length,
            seen: Mutex::new(HashSet::new()),
        }
    }

    pub fn status_may_be_interesting(&self, status: u16) -> bool {
        self.statuses.contains(&status)
    }

    /// Runs every check in order; the fingerprint is only recorded when all
    /// earlier checks pass, and check-and-record is atomic.
    pub fn classify(&self, resp: &HttpResponse) -> Verdict {
        if !self.status_may_be_interesting(resp.status) {
            return Verdict::UninterestingStatus;
        }
        if resp.len() < self.min_length {
            return Verdict::TooShort;
        }
        let Some(text) = resp.utf8_text() else {
            return Verdict::Undecodable;
        };
        if looks_like_default_page(text) {
            return Verdict::DefaultPage;
        }
        let fp = fingerprint(&resp.body);
        let mut seen = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if seen.insert(fp) {
            Verdict::Interesting
        } else {
            Verdict::DuplicateContent
        }
    }

    pub fn fingerprints_seen(&self) -> usize {
        match self.seen.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(INTERESTING_STATUSES.into_iter().collect(), DEFAULT_MIN_LENGTH)
    }
}
