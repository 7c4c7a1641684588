//! Plain log format for service logs.
//!
//! Format: `timestamp - target - LEVEL - message | span{fields} > span{fields}`

use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, FormattedFields};
use tracing_subscriber::registry::{LookupSpan, SpanRef};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Colorless formatter in the layout the hosting scripts grep for.
///
/// ```text
/// 2026-10-16 12:00:01,234 - linkding_launcher::web::request_log - DEBUG - Incoming request path: /bookmarks | http_request{http.method=GET http.url=/bookmarks}
/// ```
pub struct ProductionLogFormat;

impl<S, N> FormatEvent<S, N> for ProductionLogFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();

        write!(
            writer,
            "{} - {} - {} - ",
            timestamp.replacen('.', ",", 1),
            metadata.target(),
            metadata.level()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;

        let spans: Vec<SpanRef<'_, S>> = ctx
            .event_scope()
            .map(|scope| scope.from_root().collect())
            .unwrap_or_default();
        for (index, span) in spans.iter().enumerate() {
            write!(writer, "{}", if index == 0 { " | " } else { " > " })?;
            write_span::<S, N>(&mut writer, span)?;
        }

        writeln!(writer)
    }
}

fn write_span<S, N>(writer: &mut Writer<'_>, span: &SpanRef<'_, S>) -> std::fmt::Result
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    write!(writer, "{}", span.name())?;

    let ext = span.extensions();
    match ext.get::<FormattedFields<N>>() {
        Some(fields) if !fields.is_empty() => write!(writer, "{{{}}}", fields),
        _ => Ok(()),
    }
}
