//! Console handle shared by every component
//!
//! Created once in `main` and passed down as `Arc<Console>`. In verbose mode
//! components print labeled log lines and subprocess output is streamed as it
//! arrives. Otherwise a single spinner line shows the current step.
//!
//! Everything the console prints goes to stderr so that stdout only ever
//! carries the report.

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

/// Destination of forwarded subprocess output
type Sink = Box<dyn Write + Send>;

pub struct Console {
    verbose: bool,
    spinner: Mutex<Option<ProgressBar>>,
    sink: Mutex<Sink>,
}

impl Console {
    pub fn new(verbose: bool) -> Self {
        Self::with_sink(verbose, Box::new(std::io::stderr()))
    }

    fn with_sink(verbose: bool, sink: Sink) -> Self {
        Self {
            verbose,
            spinner: Mutex::new(None),
            sink: Mutex::new(sink),
        }
    }

    /// Start the spinner line. No-op in verbose mode, where log lines are used instead.
    pub fn start_progress(&self, message: &str) {
        if self.verbose {
            return;
        }

        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style.tick_strings(&["◐", "◓", "◑", "◒", "●"]));
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));

        if let Ok(mut slot) = self.spinner.lock() {
            *slot = Some(pb);
        }
    }

    /// Report a pipeline step as `[step/total] message`
    pub fn step(&self, step: usize, total: usize, message: &str) {
        let line = format!("[{}/{}] {}", step, total, message);
        match self.active_spinner() {
            Some(pb) => pb.set_message(line),
            None if self.verbose => eprintln!("{}", line.bold()),
            None => {}
        }
    }

    /// Labeled log line printed only in verbose mode
    pub fn log(&self, label: &str, message: &str) {
        if self.verbose {
            self.println(&format!("{} {}", format!("[{}]", label).cyan(), message));
        }
    }

    /// Human-readable informational message, shown in every mode
    pub fn message(&self, message: &str) {
        self.println(message);
    }

    pub fn finish_progress(&self, message: &str) {
        if let Some(pb) = self.take_spinner() {
            pb.finish_with_message(format!("{} {}", "✓".green(), message));
        }
    }

    pub fn fail_progress(&self, message: &str) {
        if let Some(pb) = self.take_spinner() {
            pb.finish_with_message(format!("{} {}", "✗".red(), message));
        }
    }

    /// Forward a chunk of subprocess stdout, unstyled
    pub fn stream_stdout(&self, chunk: &[u8]) {
        let text = String::from_utf8_lossy(chunk);
        self.suspended(|| self.forward(&text));
    }

    /// Forward a chunk of subprocess stderr, highlighted
    pub fn stream_stderr(&self, chunk: &[u8]) {
        let text = String::from_utf8_lossy(chunk);
        self.suspended(|| self.forward(&text.yellow().to_string()));
    }

    fn forward(&self, text: &str) {
        if let Ok(mut sink) = self.sink.lock() {
            let _ = sink.write_all(text.as_bytes());
            let _ = sink.flush();
        }
    }

    fn println(&self, line: &str) {
        self.suspended(|| eprintln!("{}", line));
    }

    fn suspended<F: FnOnce()>(&self, f: F) {
        match self.active_spinner() {
            Some(pb) => pb.suspend(f),
            None => f(),
        }
    }

    fn active_spinner(&self) -> Option<ProgressBar> {
        self.spinner.lock().ok().and_then(|slot| slot.clone())
    }

    fn take_spinner(&self) -> Option<ProgressBar> {
        self.spinner.lock().ok().and_then(|mut slot| slot.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
        }
    }

    #[test]
    fn test_subprocess_output_goes_to_sink() {
        let captured = Captured::default();
        let console = Console::with_sink(true, Box::new(captured.clone()));

        console.stream_stdout(b"Build succeeded\n");
        console.stream_stderr(b"warning: deprecated\n");

        let text = captured.text();
        assert!(text.starts_with("Build succeeded\n"));
        assert!(text.contains("warning: deprecated"));
    }

    #[test]
    fn test_verbose_mode_never_starts_spinner() {
        let console = Console::new(true);
        console.start_progress("Measuring");
        assert!(console.active_spinner().is_none());
        console.step(1, 7, "Cleaning up");
    }

    #[test]
    fn test_spinner_lifecycle() {
        let console = Console::new(false);
        console.start_progress("Measuring");
        assert!(console.active_spinner().is_some());
        console.step(2, 7, "Cloning empty app");
        console.finish_progress("Done");
        assert!(console.active_spinner().is_none());
    }

    #[test]
    fn test_fail_without_spinner_is_noop() {
        let console = Console::new(false);
        console.fail_progress("nothing started");
    }
}
