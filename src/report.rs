use crate::classifier::{Classifier, Unit};
use crate::extractor::{extract, HiddenParams};
use crate::logging::LogCategory;
use crate::renderer::TerminalRenderer;
use crate::{log_debug, log_warning};
use futures::{Stream, StreamExt};
use std::future::Future;
use std::io::{self, Write};
use std::time::Instant;

/// Append-only buffer holding the complete response text
#[derive(Debug, Default, Clone)]
pub struct StreamAccumulator {
    text: String,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &str) {
        self.text.push_str(fragment);
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// How a reported stream ended
#[derive(Debug)]
pub enum StreamOutcome {
    Completed,
    Failed(anyhow::Error),
    Cancelled,
}

impl StreamOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            StreamOutcome::Completed => "completed",
            StreamOutcome::Failed(_) => "failed",
            StreamOutcome::Cancelled => "cancelled",
        }
    }
}

/// Everything known about a response once its stream has ended
#[derive(Debug)]
pub struct StreamReport {
    pub full_text: String,
    pub hidden_params: HiddenParams,
    pub outcome: StreamOutcome,
    /// First write failure of the renderer, if any. Rendering stopped there.
    pub render_error: Option<io::Error>,
}

impl StreamReport {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, StreamOutcome::Completed)
    }

    /// Turn an upstream failure into an error, keeping the report otherwise
    pub fn into_result(self) -> anyhow::Result<Self> {
        match self.outcome {
            StreamOutcome::Failed(e) => Err(e),
            _ => Ok(self),
        }
    }
}

/// Drives one response through the classifier, renderer and accumulator
struct Session<'a, W: Write> {
    classifier: Classifier,
    renderer: &'a mut TerminalRenderer<W>,
    accumulator: StreamAccumulator,
    render_error: Option<io::Error>,
}

impl<'a, W: Write> Session<'a, W> {
    fn new(renderer: &'a mut TerminalRenderer<W>) -> Self {
        Self {
            classifier: Classifier::new(),
            renderer,
            accumulator: StreamAccumulator::new(),
            render_error: None,
        }
    }

    fn on_fragment(&mut self, fragment: &str) {
        self.accumulator.push(fragment);
        let units = self.classifier.feed(fragment);
        self.render(&units);
    }

    /// Release held characters and write the footer
    fn finish_rendering(&mut self) {
        let units = self.classifier.flush();
        self.render(&units);
        if self.render_error.is_none() {
            if let Err(e) = self.renderer.close() {
                self.render_error = Some(e);
            }
        }
    }

    fn render(&mut self, units: &[Unit]) {
        if self.render_error.is_some() {
            return;
        }
        for unit in units {
            if let Err(e) = self.renderer.on_unit(unit) {
                log_warning!(LogCategory::Stream, format!("Rendering disabled: {}", e));
                self.render_error = Some(e);
                return;
            }
        }
    }

    fn into_report(self, outcome: StreamOutcome) -> StreamReport {
        let full_text = self.accumulator.into_string();
        let hidden_params = extract(&full_text);
        StreamReport {
            full_text,
            hidden_params,
            outcome,
            render_error: self.render_error,
        }
    }
}

/// Render a fragment stream to completion and extract the script from it.
///
/// An upstream error ends the stream: what arrived before it is rendered,
/// the frame is closed, and the error is returned inside the report.
pub async fn report_stream<S, W>(stream: S, renderer: &mut TerminalRenderer<W>) -> StreamReport
where
    S: Stream<Item = anyhow::Result<String>> + Unpin,
    W: Write,
{
    report_stream_until(stream, renderer, std::future::pending::<()>()).await
}

/// Like [`report_stream`], but stops as soon as `cancel` resolves.
///
/// After cancellation nothing more is written to the renderer, not even the
/// footer. The text accumulated so far is still returned and extracted.
pub async fn report_stream_until<S, W, C>(
    mut stream: S,
    renderer: &mut TerminalRenderer<W>,
    cancel: C,
) -> StreamReport
where
    S: Stream<Item = anyhow::Result<String>> + Unpin,
    W: Write,
    C: Future<Output = ()>,
{
    let start = Instant::now();
    let mut session = Session::new(renderer);
    tokio::pin!(cancel);

    let outcome = loop {
        tokio::select! {
            biased;
            _ = &mut cancel => break StreamOutcome::Cancelled,
            item = stream.next() => match item {
                Some(Ok(fragment)) => session.on_fragment(&fragment),
                Some(Err(e)) => {
                    session.finish_rendering();
                    break StreamOutcome::Failed(e);
                }
                None => {
                    session.finish_rendering();
                    break StreamOutcome::Completed;
                }
            },
        }
    };

    let report = session.into_report(outcome);
    log_debug!(
        LogCategory::Stream,
        format!(
            "Stream {} after {}ms",
            report.outcome.label(),
            start.elapsed().as_millis()
        )
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::Theme;
    use crate::stream::from_fragments;
    use futures::stream;
    use std::time::Duration;

    fn fragments(pieces: &[&str]) -> crate::stream::FragmentStream {
        from_fragments(pieces.iter().map(|p| p.to_string()).collect::<Vec<_>>())
    }

    fn output(renderer: TerminalRenderer<Vec<u8>>) -> String {
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[test]
    fn test_accumulator_keeps_every_fragment() {
        let mut accumulator = StreamAccumulator::new();
        accumulator.push("``");
        accumulator.push("`code\n");
        assert_eq!(accumulator.as_str(), "```code\n");
        assert_eq!(accumulator.into_string(), "```code\n");
    }

    #[test]
    fn test_report_completed_stream() {
        let mut renderer = TerminalRenderer::new(Vec::new(), Theme::monochrome());
        let stream = fragments(&["## 待执行脚本：\n``", "`code\ncurl -o <file,string> ", "<url,url>\n```\n"]);

        let report = tokio_test::block_on(report_stream(stream, &mut renderer));

        assert!(report.is_completed());
        assert!(report.render_error.is_none());
        assert_eq!(report.hidden_params.script, "curl -o <file,string> <url,url>");
        assert_eq!(report.hidden_params.placeholders.len(), 2);

        let rendered = output(renderer);
        assert!(rendered.contains("│── 待执行脚本："));
        assert!(rendered.contains("│ ```code"));
        assert!(rendered.ends_with("╰── END\n"));
    }

    #[test]
    fn test_rendering_is_independent_of_fragmentation() {
        let text = "# T\n1. a\n```code\nls <d,string>\n```\n";
        let mut whole = TerminalRenderer::new(Vec::new(), Theme::monochrome());
        tokio_test::block_on(report_stream(fragments(&[text]), &mut whole));

        let pieces: Vec<String> = text.chars().map(|c| c.to_string()).collect();
        let mut split = TerminalRenderer::new(Vec::new(), Theme::monochrome());
        let report = tokio_test::block_on(report_stream(from_fragments(pieces), &mut split));

        assert_eq!(output(whole), output(split));
        assert_eq!(report.full_text, text);
    }

    #[tokio::test]
    async fn test_upstream_error_keeps_partial_text() {
        let mut renderer = TerminalRenderer::new(Vec::new(), Theme::monochrome());
        let items = vec![
            Ok("```code\nuptime\n```\n##".to_string()),
            Err(anyhow::anyhow!("connection reset")),
            Ok("never seen".to_string()),
        ];

        let report = report_stream(stream::iter(items), &mut renderer).await;

        assert_eq!(report.full_text, "```code\nuptime\n```\n##");
        assert_eq!(report.hidden_params.script, "uptime");
        let rendered = output(renderer);
        assert!(rendered.contains("│ ##"));
        assert!(rendered.ends_with("╰── END\n"));
        let err = report.into_result().unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_cancellation_stops_writes() {
        let mut renderer = TerminalRenderer::new(Vec::new(), Theme::monochrome());
        let items = stream::iter(vec![Ok("partial ```code\nls".to_string())]).chain(stream::pending());

        let report = report_stream_until(
            items,
            &mut renderer,
            tokio::time::sleep(Duration::from_millis(20)),
        )
        .await;

        assert!(matches!(report.outcome, StreamOutcome::Cancelled));
        assert_eq!(report.full_text, "partial ```code\nls");
        assert_eq!(report.hidden_params, HiddenParams::default());

        let rendered = output(renderer);
        assert!(rendered.contains("│ partial ```code"));
        assert!(!rendered.contains("END"));
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "terminal closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_render_failure_does_not_stop_accumulation() {
        let mut renderer = TerminalRenderer::new(FailingWriter, Theme::monochrome());
        let stream = fragments(&["text\n", "```code\nwhoami\n```"]);

        let report = report_stream(stream, &mut renderer).await;

        assert!(report.is_completed());
        assert_eq!(report.render_error.unwrap().kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(report.full_text, "text\n```code\nwhoami\n```");
        assert_eq!(report.hidden_params.script, "whoami");
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(StreamOutcome::Completed.label(), "completed");
        assert_eq!(StreamOutcome::Cancelled.label(), "cancelled");
        assert_eq!(StreamOutcome::Failed(anyhow::anyhow!("x")).label(), "failed");
    }
}
