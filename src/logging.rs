// =============================================================================
// tracing_subscriber wiring — stdout plus a plain-text engine log file
// =============================================================================
//
// Kept from the teacher's `tracing`+`tracing-subscriber` stack (DESIGN.md
// "Ambient stack"), extended with a second `MakeWriter` so the lines
// `LogAnalyzer` regex-scans (SPEC_FULL.md §4.7 "Log analysis") actually exist
// on disk under `trading_logs/`. No new dependency: `MakeWriterExt::and`
// ships in `tracing-subscriber` itself.
// =============================================================================

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Falls back to a discard sink if the log file can't be opened (e.g. a
/// read-only log directory), so logging setup itself never fails the process.
enum FileOrSink {
    File(File),
    Sink,
}

impl Write for FileOrSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::File(f) => f.write(buf),
            Self::Sink => Ok(buf.len()),
        }
    }
    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::File(f) => f.flush(),
            Self::Sink => Ok(()),
        }
    }
}

#[derive(Clone)]
struct AppendMakeWriter(PathBuf);

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for AppendMakeWriter {
    type Writer = FileOrSink;

    fn make_writer(&'a self) -> Self::Writer {
        if let Some(parent) = self.0.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match std::fs::OpenOptions::new().create(true).append(true).open(&self.0) {
            Ok(f) => FileOrSink::File(f),
            Err(_) => FileOrSink::Sink,
        }
    }
}

/// `component` names the log file: `trading_logs/engine-<component>.log`.
/// Called once at process start, before any other module logs anything.
pub fn init(log_dir: &Path, component: &str) {
    let path = log_dir.join(format!("engine-{component}.log"));
    let writer = io::stdout.and(AppendMakeWriter(path));
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}
