//! Immutable, page-bound collection of detected elements.
//!
//! Filtering shares the underlying records and keeps the page binding, so a
//! chain like `set.filter(a).filter(b).click(None, false)` still acts on the
//! tab the screenshot came from.

use std::sync::Arc;

use crate::errors::{VisionDomError, VisionDomResult};
use crate::executor::{ExecutorContext, Key, KeyChord, PageSession};
use crate::perception::annotator;
use crate::perception::types::{ElementRecord, Point};

pub const DEFAULT_SCROLL_DELTA: f64 = 100.0;

/// Borrowed predicate argument for lookups; `None` means "first element".
pub type Selector<'a> = Option<&'a dyn Fn(&ElementRecord) -> bool>;

#[derive(Clone)]
pub struct ElementSet {
    records: Vec<Arc<ElementRecord>>,
    page_index: usize,
    executor: Option<Arc<ExecutorContext>>,
}

impl std::fmt::Debug for ElementSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementSet")
            .field("page_index", &self.page_index)
            .field("len", &self.records.len())
            .field("bound", &self.executor.is_some())
            .finish()
    }
}

impl ElementSet {
    pub fn new(records: Vec<ElementRecord>, page_index: usize) -> Self {
        Self {
            records: records.into_iter().map(Arc::new).collect(),
            page_index,
            executor: None,
        }
    }

    pub fn bind(mut self, executor: Arc<ExecutorContext>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Same records, addressed at another page.
    pub fn on_page(&self, page_index: usize) -> Self {
        Self {
            records: self.records.clone(),
            page_index,
            executor: self.executor.clone(),
        }
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn is_bound(&self) -> bool {
        self.executor.is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ElementRecord> {
        self.records.get(index).map(|r| r.as_ref())
    }

    pub fn first(&self) -> Option<&ElementRecord> {
        self.get(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ElementRecord> + '_ {
        self.records.iter().map(|r| r.as_ref())
    }

    /// Owned copies of the records in current order.
    pub fn records(&self) -> Vec<ElementRecord> {
        self.iter().cloned().collect()
    }

    /// Matching records in current order; page and executor binding carry over.
    pub fn filter<P>(&self, predicate: P) -> ElementSet
    where
        P: Fn(&ElementRecord) -> bool,
    {
        Self {
            records: self
                .records
                .iter()
                .filter(|r| predicate(r))
                .cloned()
                .collect(),
            page_index: self.page_index,
            executor: self.executor.clone(),
        }
    }

    /// Text lines per record, in current order.
    pub fn texts(&self) -> Vec<Vec<String>> {
        self.iter().map(|r| r.text_lines().to_vec()).collect()
    }

    /// Center of the first matching record. `None` when nothing qualifies.
    pub fn resolve_center(&self, selector: Selector<'_>) -> Option<Point> {
        let found = match selector {
            Some(pred) => self.iter().find(|r| pred(r)),
            None => self.first(),
        };
        found.map(|r| r.center())
    }

    async fn session(&self) -> VisionDomResult<PageSession<'_>> {
        let ctx = self.executor.as_ref().ok_or_else(|| {
            VisionDomError::InvalidConfiguration("element set is not bound to an executor".into())
        })?;
        ctx.acquire(self.page_index).await
    }

    /// Primary click (or double click) on the resolved element. A missing
    /// element is logged and skipped; the returned point is what was clicked.
    pub async fn click(&self, selector: Selector<'_>, double: bool) -> VisionDomResult<Option<Point>> {
        let Some(at) = self.resolve_center(selector) else {
            tracing::warn!(page = self.page_index, candidates = self.len(), "click: no matching element");
            return Ok(None);
        };
        let session = self.session().await?;
        session.click(at, double).await?;
        tracing::debug!(page = self.page_index, %at, double, "clicked element");
        Ok(Some(at))
    }

    /// Focus the element, optionally select-all + delete, then insert `text`
    /// in a single step.
    pub async fn input(
        &self,
        text: &str,
        clear: bool,
        selector: Selector<'_>,
    ) -> VisionDomResult<Option<Point>> {
        let Some(at) = self.resolve_center(selector) else {
            tracing::warn!(page = self.page_index, candidates = self.len(), "input: no matching element");
            return Ok(None);
        };
        let session = self.session().await?;
        session.click(at, false).await?;
        if clear {
            session
                .press_keys(&[KeyChord::select_all(), KeyChord::key(Key::Delete)])
                .await?;
        }
        session.insert_text(text).await?;
        tracing::debug!(page = self.page_index, %at, clear, chars = text.chars().count(), "typed into element");
        Ok(Some(at))
    }

    /// Wheel-scroll over the resolved element. Without a match the wheel is
    /// applied wherever the pointer currently is.
    pub async fn scroll(
        &self,
        selector: Selector<'_>,
        delta_x: f64,
        delta_y: f64,
    ) -> VisionDomResult<Option<Point>> {
        let target = self.resolve_center(selector);
        let session = match (target, &self.executor) {
            (Some(_), _) => self.session().await?,
            (None, Some(_)) => {
                tracing::info!(page = self.page_index, "scroll: no matching element; using current pointer position");
                self.session().await?
            }
            (None, None) => {
                tracing::warn!(page = self.page_index, "scroll: no matching element and no executor bound");
                return Ok(None);
            }
        };

        if let Some(at) = target {
            session.move_pointer(at).await?;
            session.settle().await?;
        }
        session.wheel(delta_x, delta_y).await?;
        session.settle().await?;
        Ok(target)
    }

    /// [`scroll`](Self::scroll) with the default 100/100 delta.
    pub async fn scroll_by_default(&self, selector: Selector<'_>) -> VisionDomResult<Option<Point>> {
        self.scroll(selector, DEFAULT_SCROLL_DELTA, DEFAULT_SCROLL_DELTA).await
    }

    pub fn to_json(&self) -> VisionDomResult<String> {
        let records: Vec<&ElementRecord> = self.iter().collect();
        Ok(serde_json::to_string(&records)?)
    }

    pub fn from_json(json: &str, page_index: usize) -> VisionDomResult<Self> {
        let records: Vec<ElementRecord> = serde_json::from_str(json)?;
        Ok(Self::new(records, page_index))
    }

    /// Draw this set's boxes over `screenshot`; PNG bytes.
    pub fn annotate(&self, screenshot: &[u8]) -> VisionDomResult<Vec<u8>> {
        annotator::annotate_image(screenshot, self.iter())
    }
}

impl<'a> IntoIterator for &'a ElementSet {
    type Item = &'a ElementRecord;
    type IntoIter = Box<dyn Iterator<Item = &'a ElementRecord> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
