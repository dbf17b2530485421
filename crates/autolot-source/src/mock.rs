use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use autolot_core::Record;

use crate::client::PagedSource;
use crate::error::{FetchError, FetchResult};
use crate::page::SourcePage;

/// A scripted response for one fetch.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Page(SourcePage),
    Error(FetchError),
    /// Wait, then answer with the inner response.
    Delayed(Duration, Box<MockResponse>),
}

/// A scripted paged source for testing.
///
/// Each page has a queue of responses consumed one per fetch; the last one
/// stays in place so repeated fetches keep seeing it. Unscripted pages get
/// the fallback, which defaults to the end of data.
#[derive(Clone, Default)]
pub struct MockSource {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    scripts: HashMap<u64, VecDeque<MockResponse>>,
    fallback: Option<MockResponse>,
    /// Pages in the order they were requested.
    calls: Vec<u64>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `records` as consecutive pages of `per_page`, the last one
    /// flagged as final and every page carrying the total.
    pub fn from_records(records: Vec<Record>, per_page: usize) -> Self {
        let source = Self::new();
        let total = records.len() as u64;
        let chunks: Vec<Vec<Record>> = records
            .chunks(per_page.max(1))
            .map(<[Record]>::to_vec)
            .collect();
        let pages = chunks.len();

        for (i, chunk) in chunks.into_iter().enumerate() {
            let mut page = SourcePage::with_records(chunk).with_known_total(total);
            if i + 1 == pages {
                page = page.last();
            }
            source.push(i as u64 + 1, MockResponse::Page(page));
        }
        source
    }

    /// Append a response to the script for `page`.
    pub fn push(&self, page: u64, response: MockResponse) -> &Self {
        let mut state = self.state.lock().unwrap();
        state.scripts.entry(page).or_default().push_back(response);
        self
    }

    pub fn page(&self, page: u64, records: Vec<Record>) -> &Self {
        self.push(page, MockResponse::Page(SourcePage::with_records(records)))
    }

    /// An empty page whose metadata says more pages follow.
    pub fn empty(&self, page: u64) -> &Self {
        self.push(page, MockResponse::Page(SourcePage::empty()))
    }

    pub fn error(&self, page: u64, error: FetchError) -> &Self {
        self.push(page, MockResponse::Error(error))
    }

    pub fn set_fallback(&self, response: MockResponse) -> &Self {
        self.state.lock().unwrap().fallback = Some(response);
        self
    }

    /// Pages fetched so far, in order.
    pub fn calls(&self) -> Vec<u64> {
        self.state.lock().unwrap().calls.clone()
    }

    fn next_response(&self, page: u64) -> MockResponse {
        let mut state = self.state.lock().unwrap();
        state.calls.push(page);

        let scripted = state.scripts.get_mut(&page).and_then(|queue| {
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        });
        scripted
            .or_else(|| state.fallback.clone())
            .unwrap_or_else(|| MockResponse::Page(SourcePage::end()))
    }
}

impl PagedSource for MockSource {
    fn fetch_page(&self, page: u64) -> impl Future<Output = FetchResult<SourcePage>> + Send {
        let mut response = self.next_response(page);
        async move {
            loop {
                match response {
                    MockResponse::Page(page) => return Ok(page),
                    MockResponse::Error(e) => return Err(e),
                    MockResponse::Delayed(delay, inner) => {
                        tokio::time::sleep(delay).await;
                        response = *inner;
                    }
                }
            }
        }
    }
}
