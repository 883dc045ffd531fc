use std::sync::mpsc;
use std::thread;

use revdump_logging::dump_info;

use crate::crawler::{CrawlSummary, RevisionCrawler};
use crate::CrawlError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportEvent {
    Fragment(String),
    Finished(CrawlSummary),
    Failed {
        error: CrawlError,
        summary: CrawlSummary,
    },
}

/// Runs a crawler on its own thread and hands fragments over a rendezvous
/// channel, so the crawler only moves on once the previous fragment is taken.
///
/// Dropping the handle stops the crawler at its next hand-over; a request
/// already in flight is allowed to finish.
pub struct ExportHandle {
    event_rx: mpsc::Receiver<ExportEvent>,
}

impl ExportHandle {
    pub fn spawn(crawler: RevisionCrawler) -> Self {
        let (event_tx, event_rx) = mpsc::sync_channel(0);

        thread::spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    let _ = event_tx.send(ExportEvent::Failed {
                        error: CrawlError::Incompatible(format!("could not start runtime: {err}")),
                        summary: CrawlSummary::default(),
                    });
                    return;
                }
            };
            runtime.block_on(drive(crawler, event_tx));
        });

        Self { event_rx }
    }

    /// Blocks until the next event; `None` after the final event.
    pub fn recv(&self) -> Option<ExportEvent> {
        self.event_rx.recv().ok()
    }
}

impl Iterator for ExportHandle {
    type Item = ExportEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

async fn drive(mut crawler: RevisionCrawler, event_tx: mpsc::SyncSender<ExportEvent>) {
    loop {
        let event = match crawler.next_fragment().await {
            Ok(Some(fragment)) => ExportEvent::Fragment(fragment),
            Ok(None) => {
                let _ = event_tx.send(ExportEvent::Finished(crawler.summary()));
                return;
            }
            Err(error) => {
                let _ = event_tx.send(ExportEvent::Failed {
                    error,
                    summary: crawler.summary(),
                });
                return;
            }
        };
        if event_tx.send(event).is_err() {
            dump_info!("Export consumer went away; stopping crawler");
            return;
        }
    }
}
