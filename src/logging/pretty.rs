//! Colored console format for local runs.

use nu_ansi_term::{Color, Style};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, FormattedFields};
use tracing_subscriber::registry::LookupSpan;

pub struct PrettyConsoleLogFormat;

macro_rules! styled {
    ($writer:expr, $style:expr, $($arg:tt)*) => {{
        let style = $style;
        write!($writer, "{}", style.prefix())?;
        write!($writer, $($arg)*)?;
        write!($writer, "{}", style.suffix())?;
    }};
}

fn level_style(level: &Level) -> Style {
    match *level {
        Level::TRACE => Style::new().fg(Color::Purple),
        Level::DEBUG => Style::new().fg(Color::Blue),
        Level::INFO => Style::new().fg(Color::Green),
        Level::WARN => Style::new().fg(Color::Yellow),
        Level::ERROR => Style::new().fg(Color::Red).bold(),
    }
}

impl<S, N> FormatEvent<S, N> for PrettyConsoleLogFormat
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

        styled!(
            writer,
            Style::new().dimmed(),
            "{} ",
            chrono::Local::now().format("%T%.3f")
        );
        styled!(writer, level_style(metadata.level()), "{:<5}", metadata.level());

        let spans: Vec<_> = ctx.event_scope().map(|scope| scope.collect()).unwrap_or_default();
        styled!(writer, Style::new().fg(Color::Magenta), " {}", "|".repeat(spans.len()));

        if metadata.is_span() {
            // Span creation event: show the span with its fields instead of "new".
            if let Some(span) = spans.first() {
                styled!(writer, Style::new().fg(Color::Magenta), " => ");
                styled!(writer, Style::new().dimmed(), "{}: ", metadata.target());
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>()
                    && !fields.is_empty()
                {
                    write!(writer, "{{{}}}", fields)?;
                }
            }
        } else {
            styled!(writer, Style::new().dimmed(), " {}: ", metadata.target());
            ctx.field_format().format_fields(writer.by_ref(), event)?;
        }

        writeln!(writer)
    }
}
