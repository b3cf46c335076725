//! An executor that only records what it was asked to do.
//!
//! Useful for dry runs ("what would this script click?") and as the
//! collaborator in tests.
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::errors::{VisionDomError, VisionDomResult};
use crate::executor::{InteractionExecutor, KeyChord, MouseButton};
use crate::perception::types::Point;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Command {
    Click {
        page: usize,
        at: Point,
        button: MouseButton,
        click_count: u32,
    },
    PressKeys {
        page: usize,
        chords: Vec<KeyChord>,
    },
    InsertText {
        page: usize,
        text: String,
    },
    MovePointer {
        page: usize,
        to: Point,
    },
    Wheel {
        page: usize,
        delta_x: f64,
        delta_y: f64,
    },
    Wait {
        page: usize,
        duration: Duration,
    },
}

pub struct RecordingExecutor {
    pages: usize,
    log: Mutex<Vec<Command>>,
}

impl Default for RecordingExecutor {
    fn default() -> Self {
        Self::with_pages(1)
    }
}

impl RecordingExecutor {
    pub fn with_pages(pages: usize) -> Self {
        Self {
            pages,
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn commands(&self) -> Vec<Command> {
        self.log.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }

    fn record(&self, page: usize, cmd: Command) -> VisionDomResult<()> {
        if page >= self.pages {
            return Err(VisionDomError::Executor(format!("page {page} is not open")));
        }
        tracing::debug!(?cmd, "recorded command");
        self.log.lock().unwrap_or_else(|p| p.into_inner()).push(cmd);
        Ok(())
    }
}

#[async_trait]
impl InteractionExecutor for RecordingExecutor {
    async fn page_count(&self) -> VisionDomResult<usize> {
        Ok(self.pages)
    }

    async fn click(
        &self,
        page: usize,
        at: Point,
        button: MouseButton,
        click_count: u32,
    ) -> VisionDomResult<()> {
        self.record(
            page,
            Command::Click {
                page,
                at,
                button,
                click_count,
            },
        )
    }

    async fn press_keys(&self, page: usize, chords: &[KeyChord]) -> VisionDomResult<()> {
        self.record(
            page,
            Command::PressKeys {
                page,
                chords: chords.to_vec(),
            },
        )
    }

    async fn insert_text(&self, page: usize, text: &str) -> VisionDomResult<()> {
        self.record(
            page,
            Command::InsertText {
                page,
                text: text.to_string(),
            },
        )
    }

    async fn move_pointer(&self, page: usize, to: Point) -> VisionDomResult<()> {
        self.record(page, Command::MovePointer { page, to })
    }

    async fn wheel(&self, page: usize, delta_x: f64, delta_y: f64) -> VisionDomResult<()> {
        self.record(
            page,
            Command::Wheel {
                page,
                delta_x,
                delta_y,
            },
        )
    }

    async fn wait(&self, page: usize, duration: Duration) -> VisionDomResult<()> {
        self.record(page, Command::Wait { page, duration })
    }
}
