use crate::error::{Error, Result};

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::stream::{BoxStream, StreamExt};
use notify_debouncer_mini::notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Default trailing debounce applied to bursts of file events
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileEvent {
    Changed(PathBuf),
    Deleted(PathBuf),
}

/// Watches a single optional file, collapsing event bursts.
///
/// With no file configured the returned stream yields nothing and ends when
/// `cancel` fires; this is the "no config configured" mode, not an error.
/// Otherwise the containing directory is watched and only events for the
/// target file are surfaced, debounced to a single trailing event. Watch
/// registration failures error immediately; event-stream errors are logged
/// and skipped.
pub fn watch_optional(
    file: Option<&Path>,
    debounce: Duration,
    cancel: CancellationToken,
) -> Result<BoxStream<'static, FileEvent>> {
    let Some(target) = file
        .filter(|f| !f.as_os_str().is_empty())
        .map(Path::to_path_buf)
    else {
        let stream = futures::stream::unfold(cancel, |cancel| async move {
            cancel.cancelled().await;
            None::<(FileEvent, CancellationToken)>
        });
        return Ok(stream.boxed());
    };

    let directory = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let (tx, rx) = mpsc::unbounded_channel();
    let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| match result {
        Ok(events) => {
            for event in events {
                let _ = tx.send(event.path);
            }
        }
        Err(e) => warn!(error = %e, "file watch event error"),
    })
    .map_err(Error::WatchError)?;
    debouncer
        .watcher()
        .watch(&directory, RecursiveMode::NonRecursive)
        .map_err(Error::WatchError)?;

    struct State {
        rx: mpsc::UnboundedReceiver<PathBuf>,
        cancel: CancellationToken,
        target: PathBuf,
        // keeps the notify watcher alive for the lifetime of the stream
        _debouncer: notify_debouncer_mini::Debouncer<notify_debouncer_mini::notify::RecommendedWatcher>,
    }

    let state = State {
        rx,
        cancel,
        target,
        _debouncer: debouncer,
    };
    let stream = futures::stream::unfold(state, |mut state| async move {
        loop {
            tokio::select! {
                _ = state.cancel.cancelled() => return None,
                path = state.rx.recv() => {
                    let path = path?;
                    // the watch is non-recursive, matching the file name is enough
                    if path.file_name() != state.target.file_name() {
                        continue;
                    }
                    let event = if state.target.exists() {
                        FileEvent::Changed(state.target.clone())
                    } else {
                        FileEvent::Deleted(state.target.clone())
                    };
                    return Some((event, state));
                }
            }
        }
    });
    Ok(stream.boxed())
}
