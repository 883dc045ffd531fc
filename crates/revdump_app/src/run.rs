use std::sync::Arc;

use anyhow::{bail, Context};
use revdump_core::ExportRequest;
use revdump_engine::{
    ApiNamespaceSource, ApiTitleSource, ClientSettings, CrawlSummary, CrawlerParts, DumpWriter,
    ExportEvent, ExportHandle, FileErrorLog, FileTitleSource, ReqwestApiClient, RevisionCrawler,
    TitleSource, XmlRecordBuilder,
};
use revdump_logging::{dump_error, dump_info, dump_warn};

use crate::config::Settings;
use crate::dump::dump_filename;

pub const ERROR_LOG_NAME: &str = "errors.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Complete,
    /// The crawl stopped on an unrecoverable error; partial output was kept.
    Failed,
}

pub fn run(settings: &Settings) -> anyhow::Result<RunOutcome> {
    let request = ExportRequest::new(&settings.api, settings.scope.clone(), settings.mode)?
        .with_http_method(settings.http_method)
        .with_resume_title(settings.start.clone())
        .with_title_batch_size(settings.batch_size)?;

    let filename = dump_filename(request.api(), chrono::Local::now().date_naive(), settings.mode);
    let mut writer = DumpWriter::create(&settings.output, &filename)
        .with_context(|| format!("could not prepare {}", settings.output.display()))?;
    let error_log = Arc::new(FileErrorLog::new(settings.output.join(ERROR_LOG_NAME)));

    let client = Arc::new(ReqwestApiClient::new(
        &settings.api,
        ClientSettings {
            request_timeout: settings.timeout,
            ..ClientSettings::default()
        },
    )?);
    let namespaces = Arc::new(
        ApiNamespaceSource::new(client.clone()).with_retry_policy(settings.policy.clone()),
    );
    let titles: Arc<dyn TitleSource> = match &settings.titles_file {
        Some(path) => Arc::new(FileTitleSource::new(path)),
        None => Arc::new(
            ApiTitleSource::new(client.clone(), namespaces.clone())
                .with_retry_policy(settings.policy.clone()),
        ),
    };
    let parts = CrawlerParts {
        client,
        namespaces,
        titles,
        builder: Arc::new(XmlRecordBuilder),
        errors: error_log.clone(),
    };

    dump_info!("Exporting {} into {}", request.api(), writer.target().display());
    let crawler = RevisionCrawler::new(request, parts, settings.policy.clone());

    for event in ExportHandle::spawn(crawler) {
        match event {
            ExportEvent::Fragment(fragment) => writer.write_fragment(&fragment)?,
            ExportEvent::Finished(summary) => {
                let path = writer.finish()?;
                report(&summary, error_log.path());
                dump_info!("Dump written to {}", path.display());
                return Ok(RunOutcome::Complete);
            }
            ExportEvent::Failed { error, summary } => {
                let path = writer.finish_incomplete()?;
                report(&summary, error_log.path());
                dump_error!("Export failed: {}", error);
                dump_error!("Partial dump kept at {}", path.display());
                return Ok(RunOutcome::Failed);
            }
        }
    }

    let path = writer.finish_incomplete()?;
    bail!(
        "export stopped without a final status; partial dump kept at {}",
        path.display()
    )
}

fn report(summary: &CrawlSummary, error_log: &std::path::Path) {
    dump_info!(
        "{} pages written, {} titles processed, {} requests ({} cooldowns, {} method downgrades)",
        summary.fragments,
        summary.titles,
        summary.calls.requests,
        summary.calls.cooldowns,
        summary.calls.downgrades
    );
    if summary.fell_back {
        dump_info!("allrevisions was not usable; pages were exported title by title");
    }
    if summary.skipped > 0 {
        dump_warn!(
            "{} items could not be exported, see {}",
            summary.skipped,
            error_log.display()
        );
    }
}
