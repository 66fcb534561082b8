//! Side channel for decode traces and recovered anomalies.
//!
//! A sink only observes: whatever it does with a line, the decoder takes the
//! same path through the file.

use crate::error::Anomaly;

pub trait DiagnosticSink {
    /// Accept one line of trace output.
    fn line(&mut self, text: &str);

    /// Accept a recovered anomaly. Defaults to rendering it as a trace line.
    fn anomaly(&mut self, anomaly: &Anomaly) {
        self.line(&format!("WARNING: {anomaly}"));
    }
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl DiagnosticSink for NoopSink {
    fn line(&mut self, _text: &str) {}

    fn anomaly(&mut self, _anomaly: &Anomaly) {}
}

/// Forwards traces to `log::debug!` and anomalies to `log::warn!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn line(&mut self, text: &str) {
        log::debug!("{text}");
    }

    fn anomaly(&mut self, anomaly: &Anomaly) {
        log::warn!("{anomaly}");
    }
}

/// Keeps every line and anomaly in memory, handy for inspecting a conversion.
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    pub lines: Vec<String>,
    pub anomalies: Vec<Anomaly>,
}

impl DiagnosticSink for CollectingSink {
    fn line(&mut self, text: &str) {
        self.lines.push(text.to_string());
    }

    fn anomaly(&mut self, anomaly: &Anomaly) {
        self.anomalies.push(anomaly.clone());
    }
}

impl<F: FnMut(&str)> DiagnosticSink for F {
    fn line(&mut self, text: &str) {
        self(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_sink_receives_anomalies_as_lines() {
        let mut lines = Vec::new();
        {
            let mut sink = |text: &str| lines.push(text.to_string());
            sink.line("hello");
            sink.anomaly(&Anomaly::UnmatchedRepeatEnd { position: 0xBA4 });
        }
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "hello");
        assert!(lines[1].starts_with("WARNING: "));
        assert!(lines[1].contains("0xBA4"));
    }

    #[test]
    fn test_collecting_sink_keeps_anomalies_apart() {
        let mut sink = CollectingSink::default();
        sink.line("trace");
        sink.anomaly(&Anomaly::TruncatedPatternRecord { index: 3 });
        assert_eq!(sink.lines, vec!["trace".to_string()]);
        assert_eq!(
            sink.anomalies,
            vec![Anomaly::TruncatedPatternRecord { index: 3 }]
        );
    }
}
