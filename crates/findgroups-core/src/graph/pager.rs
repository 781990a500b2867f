//! Continuation-driven paging.
//!
//! A [`PagedLister`] issues the initial request, yields the items of each
//! page in server order and follows the page's continuation request until
//! there is none. One request per page; nothing is retried.

use std::collections::VecDeque;

use async_trait::async_trait;

use crate::CoreError;
use crate::graph::request::GraphRequest;

/// One page of results and the request for the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items in server order.
    pub items: Vec<T>,
    /// Continuation, absent on the last page.
    pub next: Option<GraphRequest>,
}

/// Something that can fetch a page for a request.
#[async_trait]
pub trait PageSource<T: Send>: Send + Sync {
    /// Issue `request` and decode one page.
    async fn fetch_page(&self, request: &GraphRequest) -> Result<Page<T>, CoreError>;
}

/// Lifecycle of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListState {
    /// Nothing requested yet.
    NotStarted,
    /// A page request is in flight.
    FetchingPage,
    /// The last page named a continuation that has not been fetched.
    HasNextPage,
    /// The last page had no continuation (terminal).
    Exhausted,
    /// A page request failed (terminal).
    Failed,
}

impl ListState {
    /// Whether no further requests will be issued.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Exhausted | Self::Failed)
    }
}

/// Lazy, non-restartable sequence of items across pages.
#[derive(Debug)]
pub struct PagedLister<'a, S: ?Sized, T> {
    source: &'a S,
    pending: Option<GraphRequest>,
    buffer: VecDeque<T>,
    state: ListState,
    pages: usize,
}

impl<'a, S, T> PagedLister<'a, S, T>
where
    S: PageSource<T> + ?Sized,
    T: Send,
{
    /// Prepare a listing starting at `initial`; nothing is sent yet.
    pub fn new(source: &'a S, initial: GraphRequest) -> Self {
        Self {
            source,
            pending: Some(initial),
            buffer: VecDeque::new(),
            state: ListState::NotStarted,
            pages: 0,
        }
    }

    /// Current state.
    pub const fn state(&self) -> ListState {
        self.state
    }

    /// Pages fetched so far.
    pub const fn pages_fetched(&self) -> usize {
        self.pages
    }

    /// Next item, fetching pages as needed; `None` once exhausted.
    ///
    /// # Errors
    ///
    /// Returns the page error that aborted the listing. Once failed, every
    /// further call fails without issuing requests.
    pub async fn next_item(&mut self) -> Result<Option<T>, CoreError> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }

            match self.state {
                ListState::Exhausted => return Ok(None),
                ListState::Failed => {
                    return Err(CoreError::Other(
                        "listing aborted by an earlier page failure".to_string(),
                    ));
                }
                ListState::NotStarted | ListState::FetchingPage | ListState::HasNextPage => {}
            }

            let Some(request) = self.pending.take() else {
                self.state = ListState::Exhausted;
                return Ok(None);
            };

            self.state = ListState::FetchingPage;
            match self.source.fetch_page(&request).await {
                Ok(page) => {
                    self.pages += 1;
                    log::trace!(
                        "page {} from {request}: {} item(s)",
                        self.pages,
                        page.items.len()
                    );
                    self.buffer.extend(page.items);
                    self.pending = page.next;
                    self.state = if self.pending.is_some() {
                        ListState::HasNextPage
                    } else {
                        ListState::Exhausted
                    };
                }
                Err(e) => {
                    self.state = ListState::Failed;
                    return Err(e);
                }
            }
        }
    }

    /// Drain the listing, calling `f` on every item; returns the item count.
    ///
    /// # Errors
    ///
    /// Returns the first page error or the first error from `f`.
    pub async fn for_each<F>(mut self, mut f: F) -> Result<usize, CoreError>
    where
        F: FnMut(T) -> Result<(), CoreError>,
    {
        let mut count = 0;
        while let Some(item) = self.next_item().await? {
            f(item)?;
            count += 1;
        }
        Ok(count)
    }

    /// Drain the listing into a vector.
    ///
    /// # Errors
    ///
    /// Returns the first page error.
    pub async fn collect_all(self) -> Result<Vec<T>, CoreError> {
        let mut items = Vec::new();
        self.for_each(|item| {
            items.push(item);
            Ok(())
        })
        .await?;
        Ok(items)
    }
}
