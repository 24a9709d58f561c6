//! Three-sink logger injected into every archive operation
//!
//! Never a process-wide singleton: the CLI constructs one per invocation and
//! threads it through explicitly, the way stores and contexts are threaded
//! explicitly (spec section 9, "Shared mutable state: none").

use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;

type Sink = Arc<Mutex<dyn Write + Send>>;

fn sink_of(w: impl Write + Send + 'static) -> Sink {
    Arc::new(Mutex::new(w))
}

/// Primary output (machine-readable), warnings/fatal messages, and a
/// diagnostic stream disabled unless explicitly turned on.
#[derive(Clone)]
pub struct Logger {
    stdout: Sink,
    stderr: Sink,
    verbose: Sink,
    verbose_enabled: bool,
}

impl Logger {
    pub fn new(
        stdout: impl Write + Send + 'static,
        stderr: impl Write + Send + 'static,
        verbose: impl Write + Send + 'static,
        verbose_enabled: bool,
    ) -> Self {
        Self {
            stdout: sink_of(stdout),
            stderr: sink_of(stderr),
            verbose: sink_of(verbose),
            verbose_enabled,
        }
    }

    /// The usual CLI wiring: real stdout/stderr, verbose gated by a flag.
    pub fn stdio(verbose_enabled: bool) -> Self {
        Self::new(io::stdout(), io::stderr(), io::stderr(), verbose_enabled)
    }

    /// Every sink discarded — useful for library callers that don't want
    /// operation chatter.
    pub fn silent() -> Self {
        Self::new(io::sink(), io::sink(), io::sink(), false)
    }

    pub fn out(&self, line: impl AsRef<str>) {
        write_line(&self.stdout, line.as_ref());
    }

    pub fn err(&self, line: impl AsRef<str>) {
        write_line(&self.stderr, line.as_ref());
    }

    pub fn verbose(&self, line: impl AsRef<str>) {
        if self.verbose_enabled {
            write_line(&self.verbose, line.as_ref());
        }
    }
}

fn write_line(sink: &Sink, line: &str) {
    let mut guard = sink.lock();
    let _ = writeln!(guard, "{line}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_disabled_by_default_is_silent() {
        let buf: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
        struct Writer(Arc<Mutex<Vec<u8>>>);
        impl Write for Writer {
            fn write(&mut self, data: &[u8]) -> io::Result<usize> {
                self.0.lock().extend_from_slice(data);
                Ok(data.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let logger = Logger::new(io::sink(), io::sink(), Writer(buf.clone()), false);
        logger.verbose("should not appear");
        assert!(buf.lock().is_empty());
    }

    #[test]
    fn verbose_enabled_writes_through() {
        let buf: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
        struct Writer(Arc<Mutex<Vec<u8>>>);
        impl Write for Writer {
            fn write(&mut self, data: &[u8]) -> io::Result<usize> {
                self.0.lock().extend_from_slice(data);
                Ok(data.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let logger = Logger::new(io::sink(), io::sink(), Writer(buf.clone()), true);
        logger.verbose("synced a/b");
        assert_eq!(buf.lock().as_slice(), b"synced a/b\n");
    }
}
