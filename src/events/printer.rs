use super::{ObserverError, ProcessListener};
use crate::metrics::{AnalyzerId, ExecutionPlan};
use colored::Colorize;
use std::io::{self, Write};
use std::path::Path;
use std::time::Instant;

const DOTS_PER_LINE: usize = 60;

/// Progress output for interactive runs: a dot per parsed file, a line per
/// executed analyzer, and the elapsed time once logging is done.
pub struct ResultPrinter<W: Write + Send> {
    out: W,
    files: usize,
    started: Option<Instant>,
}

/// Progress goes to stderr so a report written to stdout stays parsable.
impl ResultPrinter<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send> ResultPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            files: 0,
            started: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) -> Result<(), ObserverError> {
        self.out
            .write_all(text.as_bytes())
            .and_then(|_| self.out.flush())
            .map_err(|e| ObserverError::new("result-printer", e.to_string()))
    }
}

impl<W: Write + Send> ProcessListener for ResultPrinter<W> {
    fn name(&self) -> &str {
        "result-printer"
    }

    fn start_parse(&mut self) -> Result<(), ObserverError> {
        self.started = Some(Instant::now());
        self.files = 0;
        self.emit(&format!("{}\n", "Parsing source files:".cyan().bold()))
    }

    fn end_file(&mut self, _path: &Path) -> Result<(), ObserverError> {
        self.files += 1;
        if self.files % DOTS_PER_LINE == 0 {
            self.emit(&format!(". {:>6}\n", self.files))
        } else {
            self.emit(".")
        }
    }

    fn end_parse(&mut self, files: usize) -> Result<(), ObserverError> {
        let text = if self.files % DOTS_PER_LINE == 0 {
            format!("{} files parsed\n", files)
        } else {
            format!("\n{} files parsed\n", files)
        };
        self.emit(&text)
    }

    fn start_analyze(&mut self, plan: &ExecutionPlan) -> Result<(), ObserverError> {
        self.emit(&format!(
            "\n{} ({} analyzers in {} steps)\n",
            "Executing analyzers:".cyan().bold(),
            plan.len(),
            plan.steps().len()
        ))
    }

    fn start_analyzer(&mut self, analyzer: &AnalyzerId) -> Result<(), ObserverError> {
        self.emit(&format!("  {} {}\n", "→".blue(), analyzer))
    }

    fn end_log(&mut self) -> Result<(), ObserverError> {
        let elapsed = self.started.map(|s| s.elapsed()).unwrap_or_default();
        self.emit(&format!(
            "\n{}: {:.2}s\n",
            "Time taken".dimmed(),
            elapsed.as_secs_f64()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_default_printer_leaves_stdout_alone() {
        fn writes_to_stderr(_printer: &ResultPrinter<io::Stderr>) {}
        let printer = ResultPrinter::stderr();
        writes_to_stderr(&printer);
        assert_eq!(printer.files, 0);
    }

    #[test]
    fn test_dots_wrap_every_sixty_files() {
        let mut printer = ResultPrinter::new(Vec::new());
        printer.start_parse().unwrap();
        for _ in 0..61 {
            printer.end_file(Path::new("f.rs")).unwrap();
        }
        printer.end_parse(61).unwrap();

        let output = String::from_utf8(printer.into_inner()).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines[1], format!("{}     60", ".".repeat(60)));
        assert_eq!(lines[2], ".");
        assert_eq!(lines[3], "61 files parsed");
    }

    #[test]
    fn test_one_line_per_analyzer_and_elapsed_time() {
        let mut printer = ResultPrinter::new(Vec::new());
        printer.start_parse().unwrap();
        printer.start_analyzer(&AnalyzerId::new("node-loc")).unwrap();
        printer.end_analyzer(&AnalyzerId::new("node-loc")).unwrap();
        printer.end_log().unwrap();

        let output = String::from_utf8(printer.into_inner()).unwrap();
        assert!(output.contains("node-loc\n"));
        assert!(output.contains("Time taken"));
    }

    #[test]
    fn test_write_failure_is_an_observer_error() {
        let mut printer = ResultPrinter::new(BrokenPipe);
        let err = printer.start_parse().unwrap_err();
        assert_eq!(err.listener, "result-printer");
    }
}
