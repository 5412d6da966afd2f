use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::OnceCell;

use super::signals::PageShape;
use crate::http::{HttpError, HttpResponse};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BaselineKey {
    /// Unmodified page for a query parameter name.
    Parameter(String),
    /// Form submitted with its default values, keyed by method and action.
    Control(String),
}

#[derive(Clone, Debug)]
pub struct Baseline {
    pub status: u16,
    pub body: String,
    pub shape: PageShape,
    pub elapsed: Duration,
}

impl Baseline {
    pub fn from_response(resp: &HttpResponse) -> Self {
        let body = resp.text().into_owned();
        Self {
            status: resp.status,
            shape: PageShape::of(&body),
            body,
            elapsed: resp.elapsed,
        }
    }
}

/// Reference responses shared by every injection worker of one scan.
///
/// Each key is fetched at most once while fetches succeed: concurrent callers
/// for the same key wait on the same cell. A failed fetch leaves the cell
/// empty so a later caller can try again.
#[derive(Debug, Default)]
pub struct BaselineCache {
    cells: Mutex<HashMap<BaselineKey, Arc<OnceCell<Arc<Baseline>>>>>,
    fetches: AtomicUsize,
}

impl BaselineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: BaselineKey,
        fetch: F,
    ) -> Result<Arc<Baseline>, HttpError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Baseline, HttpError>>,
    {
        let cell = {
            let mut cells = match self.cells.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(cells.entry(key).or_insert_with(|| Arc::new(OnceCell::new())))
        };
        let baseline = cell
            .get_or_try_init(|| async {
                self.fetches.fetch_add(1, Ordering::SeqCst);
                fetch().await.map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(baseline))
    }

    /// Number of fetches started, successful or not.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline(body: &str) -> Baseline {
        Baseline {
            status: 200,
            body: body.to_string(),
            shape: PageShape::of(body),
            elapsed: Duration::from_millis(3),
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let cache = Arc::new(BaselineCache::new());
        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch(BaselineKey::Parameter("id".to_string()), || async {
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Ok(baseline("<p>item 1</p>"))
                    })
                    .await
                    .map(|b| b.body.clone())
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "<p>item 1</p>");
        }
        assert_eq!(cache.fetch_count(), 1);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let cache = BaselineCache::new();
        let a = cache
            .get_or_fetch(BaselineKey::Parameter("a".to_string()), || async {
                Ok(baseline("a"))
            })
            .await
            .unwrap();
        let control = cache
            .get_or_fetch(BaselineKey::Control("POST http://h/login".to_string()), || async {
                Ok(baseline("control"))
            })
            .await
            .unwrap();
        assert_eq!(a.body, "a");
        assert_eq!(control.body, "control");
        assert_eq!(cache.fetch_count(), 2);
    }
}
