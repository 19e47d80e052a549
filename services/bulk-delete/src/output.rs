//! Progress and summary rendering for the terminal

use std::io::Write;

use bulk_ops::{DeleteEvent, DeleteOutcome};
use tokio::sync::mpsc::UnboundedReceiver;

/// Lines printed for one event.
pub fn render(event: &DeleteEvent) -> Vec<String> {
    match event {
        DeleteEvent::Progress { message, .. } => vec![message.clone()],
        DeleteEvent::Finished { outcome, status } => {
            let mut lines = vec![outcome.to_string()];
            if !status.invalid.is_empty() {
                lines.push(format!(
                    "Skipped {} identifier(s) without an id",
                    status.invalid.len()
                ));
            }
            if !matches!(outcome, DeleteOutcome::Success { .. }) {
                lines.push("See the structured log for details.".to_string());
            }
            lines
        }
    }
}

/// Print events until the sender side closes. Returns the final outcome, if
/// one was reported.
pub async fn print_events<W: Write>(
    mut rx: UnboundedReceiver<DeleteEvent>,
    mut out: W,
) -> Option<DeleteOutcome> {
    let mut outcome = None;
    while let Some(event) = rx.recv().await {
        for line in render(&event) {
            let _ = writeln!(out, "{line}");
        }
        let _ = out.flush();
        if let DeleteEvent::Finished { outcome: o, .. } = event {
            outcome = Some(o);
        }
    }
    outcome
}
