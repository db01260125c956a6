//! Top-level catch for defects while producing a view.
//!
//! I/O failures are turned into status values where they happen; whatever
//! still escapes a view (an error or a panic) lands here and replaces the
//! output with a fallback screen until the user retries or reloads.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackAction {
    /// Clear the failure and render normally again.
    Retry,
    /// Rebuild application state from storage, then render.
    Reload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackScreen {
    pub title: String,
    pub detail: String,
    pub actions: [FallbackAction; 2],
}

impl fmt::Display for FallbackScreen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        writeln!(f)?;
        for line in self.detail.lines() {
            writeln!(f, "  {line}")?;
        }
        writeln!(f)?;
        write!(f, "[r] retry   [R] reload")
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome<T> {
    Rendered(T),
    Fallback(FallbackScreen),
}

#[derive(Debug)]
pub struct ErrorBoundary {
    dev_mode: bool,
    failure: Option<FallbackScreen>,
}

impl ErrorBoundary {
    pub fn new(dev_mode: bool) -> Self {
        Self {
            dev_mode,
            failure: None,
        }
    }

    pub fn failure(&self) -> Option<&FallbackScreen> {
        self.failure.as_ref()
    }

    /// Runs `view`, or keeps showing the fallback while a failure is pending.
    pub fn render<T>(&mut self, view: impl FnOnce() -> Result<T>) -> Outcome<T> {
        if let Some(screen) = &self.failure {
            return Outcome::Fallback(screen.clone());
        }
        let detail = match panic::catch_unwind(AssertUnwindSafe(view)) {
            Ok(Ok(rendered)) => return Outcome::Rendered(rendered),
            Ok(Err(err)) => {
                tracing::error!(error = ?err, "view failed");
                if self.dev_mode {
                    format!("{err:?}")
                } else {
                    err.to_string()
                }
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(panic = %message, "view panicked");
                if self.dev_mode {
                    format!("panic: {message}")
                } else {
                    message
                }
            }
        };
        let summary = detail.lines().next().unwrap_or_default().to_string();
        let screen = FallbackScreen {
            title: "Something went wrong".to_string(),
            detail: if self.dev_mode { detail } else { summary },
            actions: [FallbackAction::Retry, FallbackAction::Reload],
        };
        self.failure = Some(screen.clone());
        Outcome::Fallback(screen)
    }

    /// Clears the failure. Returns `true` when the caller must reload state first.
    pub fn handle(&mut self, action: FallbackAction) -> bool {
        self.failure = None;
        action == FallbackAction::Reload
    }

    pub fn retry(&mut self) {
        self.handle(FallbackAction::Retry);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};
    use assert_matches::assert_matches;

    #[test]
    fn healthy_view_renders() {
        let mut boundary = ErrorBoundary::new(false);
        assert_eq!(boundary.render(|| Ok(42)), Outcome::Rendered(42));
        assert!(boundary.failure().is_none());
    }

    #[test]
    fn error_shows_summary_outside_dev_mode() {
        let mut boundary = ErrorBoundary::new(false);
        let outcome = boundary.render::<()>(|| Err::<(), _>(anyhow!("index out of range")).context("drawing tree"));
        assert_matches!(outcome, Outcome::Fallback(screen) => {
            assert_eq!(screen.detail, "drawing tree");
            assert_eq!(screen.actions, [FallbackAction::Retry, FallbackAction::Reload]);
        });
    }

    #[test]
    fn dev_mode_shows_full_chain() {
        let mut boundary = ErrorBoundary::new(true);
        let outcome = boundary.render::<()>(|| Err::<(), _>(anyhow!("index out of range")).context("drawing tree"));
        assert_matches!(outcome, Outcome::Fallback(screen) => {
            assert!(screen.detail.contains("drawing tree"));
            assert!(screen.detail.contains("index out of range"));
        });
    }

    #[test]
    fn panics_are_caught() {
        let mut boundary = ErrorBoundary::new(false);
        let outcome = boundary.render::<()>(|| panic!("broken invariant"));
        assert_matches!(outcome, Outcome::Fallback(screen) if screen.detail == "broken invariant");
    }

    #[test]
    fn failure_sticks_until_retry() {
        let mut boundary = ErrorBoundary::new(false);
        let _ = boundary.render::<()>(|| Err(anyhow!("boom")));
        assert_matches!(boundary.render(|| Ok(1)), Outcome::Fallback(_));

        boundary.retry();
        assert_eq!(boundary.render(|| Ok(1)), Outcome::Rendered(1));

        let _ = boundary.render::<()>(|| Err(anyhow!("boom")));
        assert!(boundary.handle(FallbackAction::Reload));
        assert!(boundary.failure().is_none());
    }

    #[test]
    fn fallback_screen_lists_actions() {
        let screen = FallbackScreen {
            title: "Something went wrong".into(),
            detail: "boom".into(),
            actions: [FallbackAction::Retry, FallbackAction::Reload],
        };
        insta::assert_snapshot!(screen.to_string(), @r###"
        Something went wrong

          boom

        [r] retry   [R] reload
        "###);
    }
}
