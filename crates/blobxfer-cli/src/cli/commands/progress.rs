//! Progress line on stdout, fed from the transfer callback through a watch
//! channel that always holds the latest snapshot.

use blobxfer_core::progress::{ProgressFn, TransferProgress};
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

const PROGRESS_INTERVAL_MS: u64 = 500;

/// Callback to hand to the transfer, and the printer task reading it. The
/// printer draws the final snapshot and exits once every clone of the
/// callback has been dropped.
pub fn spawn_printer() -> (ProgressFn, JoinHandle<()>) {
    let (tx, mut rx) = watch::channel::<Option<TransferProgress>>(None);
    let callback: ProgressFn = Arc::new(move |p: TransferProgress| {
        tx.send_replace(Some(p));
    });

    let handle = tokio::spawn(async move {
        let interval = Duration::from_millis(PROGRESS_INTERVAL_MS);
        let mut last_print: Option<Instant> = None;
        let mut shown: Option<TransferProgress> = None;
        while rx.changed().await.is_ok() {
            let latest = rx.borrow_and_update().clone();
            let Some(p) = latest else {
                continue;
            };
            let due = last_print.map_or(true, |t| t.elapsed() >= interval);
            if due || is_finished(&p) {
                draw(&p);
                last_print = Some(Instant::now());
                shown = Some(p);
            }
        }
        // Sender gone: make sure the last snapshot is on screen.
        let last = rx.borrow().clone();
        if let Some(p) = last {
            if shown.as_ref() != Some(&p) {
                draw(&p);
            }
            println!();
        }
    });
    (callback, handle)
}

fn is_finished(p: &TransferProgress) -> bool {
    p.total_bytes.is_some_and(|t| p.loaded_bytes >= t)
}

/// Redraws the current line in place.
fn draw(p: &TransferProgress) {
    let mut out = std::io::stdout().lock();
    let _ = write!(out, "\r\x1b[2K  {}", format_line(p));
    let _ = out.flush();
}

fn format_line(p: &TransferProgress) -> String {
    let done_mib = p.loaded_bytes as f64 / 1_048_576.0;
    let rate_mib = p.bytes_per_sec() / 1_048_576.0;
    match (p.total_bytes, p.fraction()) {
        (Some(total), Some(fraction)) => {
            let eta = p
                .eta_secs()
                .map(|s| format!("{:.0}s", s))
                .unwrap_or_else(|| "?".to_string());
            format!(
                "{:.1} / {:.1} MiB ({:.1}%)  {:.2} MiB/s  ETA {}",
                done_mib,
                total as f64 / 1_048_576.0,
                fraction * 100.0,
                rate_mib,
                eta
            )
        }
        _ => format!("{:.1} MiB  {:.2} MiB/s", done_mib, rate_mib),
    }
}
