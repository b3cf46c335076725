//! Coordinate-based pointer/keyboard dispatch against an external page driver.

pub mod desktop;
pub mod recording;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;

use crate::config::InteractionConfig;
use crate::errors::{VisionDomError, VisionDomResult};
use crate::perception::types::Point;

pub const DEFAULT_SETTLE_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modifier {
    Control,
    Shift,
    Alt,
    Meta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Char(char),
    Delete,
    Backspace,
    Enter,
    Tab,
    Escape,
}

/// A key pressed while holding zero or more modifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyChord {
    pub modifiers: Vec<Modifier>,
    pub key: Key,
}

impl KeyChord {
    pub fn key(key: Key) -> Self {
        Self {
            modifiers: Vec::new(),
            key,
        }
    }

    pub fn with(modifier: Modifier, key: Key) -> Self {
        Self {
            modifiers: vec![modifier],
            key,
        }
    }

    /// `Control+A`, or `Meta+A` on macOS.
    pub fn select_all() -> Self {
        #[cfg(target_os = "macos")]
        let modifier = Modifier::Meta;
        #[cfg(not(target_os = "macos"))]
        let modifier = Modifier::Control;
        Self::with(modifier, Key::Char('a'))
    }
}

/// Playwright-style names, e.g. `Control+A`, `Delete`.
impl std::fmt::Display for KeyChord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for m in &self.modifiers {
            let name = match m {
                Modifier::Control => "Control",
                Modifier::Shift => "Shift",
                Modifier::Alt => "Alt",
                Modifier::Meta => "Meta",
            };
            write!(f, "{name}+")?;
        }
        match self.key {
            Key::Char(c) => write!(f, "{}", c.to_ascii_uppercase()),
            Key::Delete => f.write_str("Delete"),
            Key::Backspace => f.write_str("Backspace"),
            Key::Enter => f.write_str("Enter"),
            Key::Tab => f.write_str("Tab"),
            Key::Escape => f.write_str("Escape"),
        }
    }
}

/// Page/tab driver the element set acts through. Implementations may assume
/// commands for one page never arrive concurrently.
#[async_trait]
pub trait InteractionExecutor: Send + Sync {
    /// Number of currently open pages; valid indices are `0..count`.
    async fn page_count(&self) -> VisionDomResult<usize>;

    async fn click(
        &self,
        page: usize,
        at: Point,
        button: MouseButton,
        click_count: u32,
    ) -> VisionDomResult<()>;

    /// Press each chord in order.
    async fn press_keys(&self, page: usize, chords: &[KeyChord]) -> VisionDomResult<()>;

    /// Insert `text` at the current focus in one step.
    async fn insert_text(&self, page: usize, text: &str) -> VisionDomResult<()>;

    async fn move_pointer(&self, page: usize, to: Point) -> VisionDomResult<()>;

    async fn wheel(&self, page: usize, delta_x: f64, delta_y: f64) -> VisionDomResult<()>;

    async fn wait(&self, page: usize, duration: Duration) -> VisionDomResult<()>;
}

/// Owns the executor for the application and serializes work per page.
pub struct ExecutorContext {
    executor: Arc<dyn InteractionExecutor>,
    page_locks: Mutex<HashMap<usize, Arc<tokio::sync::Mutex<()>>>>,
    settle_interval: Duration,
}

impl ExecutorContext {
    pub fn new(executor: Arc<dyn InteractionExecutor>) -> Self {
        Self {
            executor,
            page_locks: Mutex::new(HashMap::new()),
            settle_interval: DEFAULT_SETTLE_INTERVAL,
        }
    }

    /// Context using the `[interaction]` settings from the config file.
    pub fn from_config(executor: Arc<dyn InteractionExecutor>, config: &InteractionConfig) -> Self {
        Self::new(executor).with_settle_interval(config.settle_interval())
    }

    pub fn with_settle_interval(mut self, interval: Duration) -> Self {
        self.settle_interval = interval;
        self
    }

    pub fn settle_interval(&self) -> Duration {
        self.settle_interval
    }

    pub fn executor(&self) -> &Arc<dyn InteractionExecutor> {
        &self.executor
    }

    pub async fn validate_page(&self, page: usize) -> VisionDomResult<()> {
        let count = self.executor.page_count().await?;
        if page >= count {
            return Err(VisionDomError::InvalidConfiguration(format!(
                "page index {page} out of range ({count} page(s) open)"
            )));
        }
        Ok(())
    }

    /// Validate `page` and hold its lock until the returned session drops.
    pub async fn acquire(&self, page: usize) -> VisionDomResult<PageSession<'_>> {
        self.validate_page(page).await?;
        let lock = {
            let mut locks = self.page_locks.lock().unwrap_or_else(|p| p.into_inner());
            locks
                .entry(page)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        let guard = lock.lock_owned().await;
        tracing::trace!(page, "page session acquired");
        Ok(PageSession {
            ctx: self,
            page,
            _guard: guard,
        })
    }
}

/// Exclusive command scope on one page.
pub struct PageSession<'a> {
    ctx: &'a ExecutorContext,
    page: usize,
    _guard: OwnedMutexGuard<()>,
}

impl PageSession<'_> {
    pub fn page(&self) -> usize {
        self.page
    }

    pub async fn click(&self, at: Point, double: bool) -> VisionDomResult<()> {
        let count = if double { 2 } else { 1 };
        self.ctx
            .executor
            .click(self.page, at, MouseButton::Left, count)
            .await
    }

    pub async fn press_keys(&self, chords: &[KeyChord]) -> VisionDomResult<()> {
        self.ctx.executor.press_keys(self.page, chords).await
    }

    pub async fn insert_text(&self, text: &str) -> VisionDomResult<()> {
        self.ctx.executor.insert_text(self.page, text).await
    }

    pub async fn move_pointer(&self, to: Point) -> VisionDomResult<()> {
        self.ctx.executor.move_pointer(self.page, to).await
    }

    pub async fn wheel(&self, delta_x: f64, delta_y: f64) -> VisionDomResult<()> {
        self.ctx.executor.wheel(self.page, delta_x, delta_y).await
    }

    pub async fn settle(&self) -> VisionDomResult<()> {
        self.ctx
            .executor
            .wait(self.page, self.ctx.settle_interval)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::recording::{Command, RecordingExecutor};
    use super::*;

    #[test]
    fn chords_render_playwright_names() {
        assert_eq!(KeyChord::with(Modifier::Control, Key::Char('a')).to_string(), "Control+A");
        assert_eq!(KeyChord::key(Key::Delete).to_string(), "Delete");
        let chord = KeyChord {
            modifiers: vec![Modifier::Control, Modifier::Shift],
            key: Key::Tab,
        };
        assert_eq!(chord.to_string(), "Control+Shift+Tab");
    }

    #[tokio::test]
    async fn out_of_range_page_is_invalid_configuration() {
        let ctx = ExecutorContext::new(Arc::new(RecordingExecutor::with_pages(2)));
        assert!(ctx.validate_page(1).await.is_ok());
        let err = ctx.acquire(2).await.err().unwrap();
        assert!(matches!(err, VisionDomError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn configured_settle_interval_drives_waits() {
        let rec = Arc::new(RecordingExecutor::default());
        let config = InteractionConfig {
            settle_interval_ms: 250,
        };
        let ctx = ExecutorContext::from_config(rec.clone(), &config);
        assert_eq!(ctx.settle_interval(), Duration::from_millis(250));

        ctx.acquire(0).await.unwrap().settle().await.unwrap();
        assert_eq!(
            rec.commands(),
            vec![Command::Wait {
                page: 0,
                duration: Duration::from_millis(250)
            }]
        );
    }

    #[tokio::test]
    async fn same_page_sessions_are_serialized() {
        let rec = Arc::new(RecordingExecutor::with_pages(2));
        let ctx = Arc::new(ExecutorContext::new(rec.clone()));

        let first = ctx.acquire(0).await.unwrap();
        // A different page is independent.
        let other = ctx.acquire(1).await.unwrap();
        other.click(Point::new(1.0, 1.0), false).await.unwrap();

        let ctx2 = ctx.clone();
        let waiter = tokio::spawn(async move {
            let s = ctx2.acquire(0).await.unwrap();
            s.insert_text("second").await.unwrap();
        });
        tokio::task::yield_now().await;
        first.insert_text("first").await.unwrap();
        drop(first);
        waiter.await.unwrap();

        let texts: Vec<String> = rec
            .commands()
            .into_iter()
            .filter_map(|c| match c {
                Command::InsertText { page: 0, text } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["first", "second"]);
    }
}
