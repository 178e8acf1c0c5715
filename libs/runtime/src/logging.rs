use crate::config::{LoggingConfig, Section};
use parking_lot::Mutex;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::filter::{FilterFn, Targets};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};

const DEFAULT_MAX_SIZE_MB: u64 = 100;
const DEFAULT_MAX_BACKUPS: usize = 5;

// ----- Levels -----------------------------------------------------------------

fn parse_tracing_level(s: &str) -> Option<Level> {
    match s.to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        "off" | "none" => None,
        _ => Some(Level::INFO),
    }
}

/// True if `target` is `subsystem` or lives under `subsystem::`.
fn matches_subsystem(target: &str, subsystem: &str) -> bool {
    target
        .strip_prefix(subsystem)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

// ----- Rotating file writers --------------------------------------------------

#[derive(Clone)]
struct RotWriter(Arc<Mutex<FileRotate<AppendTimestamp>>>);

impl Write for RotWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().flush()
    }
}

/// Writer for one record; `None` drops it.
struct RoutedWriter(Option<RotWriter>);

impl Write for RoutedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.0 {
            Some(w) => w.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.0 {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

/// Routes file output by target: the first matching subsystem file wins,
/// everything else goes to the default file (if any).
#[derive(Clone, Default)]
struct FileRouter {
    default: Option<RotWriter>,
    by_subsystem: Vec<(String, RotWriter)>,
}

impl FileRouter {
    fn resolve_for(&self, target: &str) -> Option<RotWriter> {
        self.by_subsystem
            .iter()
            .find(|(name, _)| matches_subsystem(target, name))
            .map(|(_, w)| w.clone())
            .or_else(|| self.default.clone())
    }

    fn is_empty(&self) -> bool {
        self.default.is_none() && self.by_subsystem.is_empty()
    }
}

impl<'a> MakeWriter<'a> for FileRouter {
    type Writer = RoutedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        RoutedWriter(self.default.clone())
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        RoutedWriter(self.resolve_for(meta.target()))
    }
}

/// Relative log paths resolve against the application home directory.
fn resolve_log_path(file: &str, base_dir: &Path) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

fn create_rotating_writer(section: &Section, base_dir: &Path) -> std::io::Result<Option<RotWriter>> {
    if section.file.trim().is_empty() {
        return Ok(None);
    }
    let path = resolve_log_path(&section.file, base_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let max_bytes = section.max_size_mb.unwrap_or(DEFAULT_MAX_SIZE_MB) * 1024 * 1024;
    let rot = FileRotate::new(
        &path,
        AppendTimestamp::default(FileLimit::MaxFiles(
            section.max_backups.unwrap_or(DEFAULT_MAX_BACKUPS),
        )),
        ContentLimit::BytesSurpassed(max_bytes as usize),
        Compression::None,
        #[cfg(unix)]
        None,
    );
    Ok(Some(RotWriter(Arc::new(Mutex::new(rot)))))
}

// ----- Filters ----------------------------------------------------------------

struct Plan<'a> {
    default_section: Option<&'a Section>,
    subsystems: Vec<(&'a str, &'a Section)>,
}

impl<'a> Plan<'a> {
    fn new(cfg: &'a LoggingConfig) -> Self {
        let mut subsystems: Vec<_> = cfg
            .iter()
            .filter(|(k, _)| k.as_str() != "default")
            .map(|(k, v)| (k.as_str(), v))
            .collect();
        // Longest name first so nested subsystems win over their parents.
        subsystems.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(b.0)));
        Self {
            default_section: cfg.get("default"),
            subsystems,
        }
    }

    /// Per-subsystem levels; targets outside every subsystem fall back to the
    /// default section's level.
    fn targets(&self, level_of: impl Fn(&Section) -> &str) -> Targets {
        let default_level = self
            .default_section
            .and_then(|s| parse_tracing_level(level_of(s)))
            .map_or(LevelFilter::OFF, LevelFilter::from_level);
        let mut targets = Targets::new().with_default(default_level);
        for (name, section) in &self.subsystems {
            let level = parse_tracing_level(level_of(section))
                .map_or(LevelFilter::OFF, LevelFilter::from_level);
            targets = targets.with_target(*name, level);
        }
        targets
    }

    fn file_router(&self, base_dir: &Path) -> FileRouter {
        let open = |name: &str, section: &Section| match create_rotating_writer(section, base_dir) {
            Ok(w) => w,
            Err(e) => {
                eprintln!("Failed to open log file for '{name}' ({}): {e}", section.file);
                None
            }
        };

        let mut router = FileRouter {
            default: self.default_section.and_then(|s| open("default", s)),
            by_subsystem: Vec::new(),
        };
        for (name, section) in &self.subsystems {
            if let Some(w) = open(*name, *section) {
                router.by_subsystem.push((name.to_string(), w));
            }
        }
        router
    }
}

// ----- Init -------------------------------------------------------------------

/// Install the global subscriber described by `cfg`.
///
/// Console output is human readable with RFC 3339 timestamps; file output is
/// JSON, one file per configured subsystem plus the default file. `log`
/// records are bridged into `tracing`. Calling this twice is a no-op.
pub fn init_logging_from_config(cfg: &LoggingConfig, base_dir: &Path) {
    let _ = tracing_log::LogTracer::init();

    if cfg.is_empty() {
        init_default_logging();
        return;
    }

    let plan = Plan::new(cfg);
    let console_targets = plan.targets(|s| s.console_level.as_str());
    let router = plan.file_router(base_dir);

    let console_layer = fmt::layer()
        .with_ansi(std::io::stdout().is_terminal())
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(console_targets);

    let file_layer = (!router.is_empty()).then(|| {
        // Only records whose subsystem actually has a file reach the router.
        let with_file: Vec<String> = router.by_subsystem.iter().map(|(n, _)| n.clone()).collect();
        let has_default_file = router.default.is_some();
        let routable = FilterFn::new(move |meta: &tracing::Metadata<'_>| {
            has_default_file || with_file.iter().any(|n| matches_subsystem(meta.target(), n))
        });

        fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(true)
            .with_level(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(router)
            .with_filter(plan.targets(|s| s.file_level.as_str()))
            .with_filter(routable)
    });

    let _ = Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

fn init_default_logging() {
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .try_init();
}
