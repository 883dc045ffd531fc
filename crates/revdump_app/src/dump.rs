use chrono::NaiveDate;
use revdump_core::ExportMode;
use url::Url;

/// Dump file name: `<host>-<YYYYMMDD>-<history|current>.xml`.
pub fn dump_filename(api: &Url, date: NaiveDate, mode: ExportMode) -> String {
    let host = api.host_str().unwrap_or("wiki");
    let kind = match mode {
        ExportMode::FullHistory => "history",
        ExportMode::CurrentOnly => "current",
    };
    format!("{}-{}-{}.xml", host, date.format("%Y%m%d"), kind)
}
