//! Physical input simulation on the local desktop through enigo.
//!
//! The desktop is exposed as a single page (index 0). Every command opens a
//! fresh enigo connection on a blocking thread.

use std::time::Duration;

use async_trait::async_trait;
use enigo::{Axis, Button, Coordinate, Direction, Enigo, Keyboard, Mouse, Settings};

use crate::errors::{VisionDomError, VisionDomResult};
use crate::executor::{InteractionExecutor, Key, KeyChord, Modifier, MouseButton};
use crate::perception::types::Point;

/// Pixels of wheel delta per scroll notch.
const WHEEL_PIXELS_PER_NOTCH: f64 = 100.0;

#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopExecutor;

impl DesktopExecutor {
    pub fn new() -> Self {
        Self
    }
}

fn input_err(e: impl std::fmt::Display) -> VisionDomError {
    VisionDomError::Executor(format!("enigo: {e}"))
}

async fn with_enigo<F>(f: F) -> VisionDomResult<()>
where
    F: FnOnce(&mut Enigo) -> VisionDomResult<()> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut enigo = Enigo::new(&Settings::default()).map_err(input_err)?;
        f(&mut enigo)
    })
    .await
    .map_err(|e| VisionDomError::Executor(format!("join: {e}")))?
}

fn check_page(page: usize) -> VisionDomResult<()> {
    if page != 0 {
        return Err(VisionDomError::Executor(format!(
            "desktop executor has a single page, got {page}"
        )));
    }
    Ok(())
}

fn to_enigo_button(b: MouseButton) -> Button {
    match b {
        MouseButton::Left => Button::Left,
        MouseButton::Right => Button::Right,
        MouseButton::Middle => Button::Middle,
    }
}

fn to_enigo_modifier(m: Modifier) -> enigo::Key {
    match m {
        Modifier::Control => enigo::Key::Control,
        Modifier::Shift => enigo::Key::Shift,
        Modifier::Alt => enigo::Key::Alt,
        Modifier::Meta => enigo::Key::Meta,
    }
}

fn to_enigo_key(k: Key) -> enigo::Key {
    match k {
        Key::Char(c) => enigo::Key::Unicode(c),
        Key::Delete => enigo::Key::Delete,
        Key::Backspace => enigo::Key::Backspace,
        Key::Enter => enigo::Key::Return,
        Key::Tab => enigo::Key::Tab,
        Key::Escape => enigo::Key::Escape,
    }
}

/// Whole notches, keeping the sign; any non-zero delta scrolls at least one.
fn wheel_notches(delta: f64) -> i32 {
    if delta == 0.0 {
        return 0;
    }
    let n = (delta / WHEEL_PIXELS_PER_NOTCH).round() as i32;
    if n == 0 {
        delta.signum() as i32
    } else {
        n
    }
}

#[async_trait]
impl InteractionExecutor for DesktopExecutor {
    async fn page_count(&self) -> VisionDomResult<usize> {
        Ok(1)
    }

    async fn click(
        &self,
        page: usize,
        at: Point,
        button: MouseButton,
        click_count: u32,
    ) -> VisionDomResult<()> {
        check_page(page)?;
        let (x, y) = (at.x.round() as i32, at.y.round() as i32);
        tracing::debug!(x, y, ?button, click_count, "desktop click");
        with_enigo(move |enigo| {
            enigo.move_mouse(x, y, Coordinate::Abs).map_err(input_err)?;
            for _ in 0..click_count {
                enigo
                    .button(to_enigo_button(button), Direction::Click)
                    .map_err(input_err)?;
            }
            Ok(())
        })
        .await
    }

    async fn press_keys(&self, page: usize, chords: &[KeyChord]) -> VisionDomResult<()> {
        check_page(page)?;
        let chords = chords.to_vec();
        with_enigo(move |enigo| {
            for chord in &chords {
                for m in &chord.modifiers {
                    enigo
                        .key(to_enigo_modifier(*m), Direction::Press)
                        .map_err(input_err)?;
                }
                let pressed = enigo.key(to_enigo_key(chord.key), Direction::Click);
                // Release modifiers even when the key itself failed.
                for m in chord.modifiers.iter().rev() {
                    enigo
                        .key(to_enigo_modifier(*m), Direction::Release)
                        .map_err(input_err)?;
                }
                pressed.map_err(input_err)?;
            }
            Ok(())
        })
        .await
    }

    async fn insert_text(&self, page: usize, text: &str) -> VisionDomResult<()> {
        check_page(page)?;
        let text = text.to_string();
        with_enigo(move |enigo| enigo.text(&text).map_err(input_err)).await
    }

    async fn move_pointer(&self, page: usize, to: Point) -> VisionDomResult<()> {
        check_page(page)?;
        let (x, y) = (to.x.round() as i32, to.y.round() as i32);
        with_enigo(move |enigo| enigo.move_mouse(x, y, Coordinate::Abs).map_err(input_err)).await
    }

    async fn wheel(&self, page: usize, delta_x: f64, delta_y: f64) -> VisionDomResult<()> {
        check_page(page)?;
        let (nx, ny) = (wheel_notches(delta_x), wheel_notches(delta_y));
        with_enigo(move |enigo| {
            if ny != 0 {
                enigo.scroll(ny, Axis::Vertical).map_err(input_err)?;
            }
            if nx != 0 {
                enigo.scroll(nx, Axis::Horizontal).map_err(input_err)?;
            }
            Ok(())
        })
        .await
    }

    async fn wait(&self, page: usize, duration: Duration) -> VisionDomResult<()> {
        check_page(page)?;
        tokio::time::sleep(duration).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wheel_delta_maps_to_notches() {
        assert_eq!(wheel_notches(0.0), 0);
        assert_eq!(wheel_notches(100.0), 1);
        assert_eq!(wheel_notches(-250.0), -3);
        assert_eq!(wheel_notches(30.0), 1);
        assert_eq!(wheel_notches(-10.0), -1);
    }

    #[tokio::test]
    async fn only_page_zero_exists() {
        let exec = DesktopExecutor::new();
        assert_eq!(exec.page_count().await.unwrap(), 1);
        let err = exec.wait(1, Duration::from_millis(1)).await.unwrap_err();
        assert!(matches!(err, VisionDomError::Executor(_)));
    }
}
