use once_cell::sync::OnceCell;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::EnvFilter;

static INIT: OnceCell<()> = OnceCell::new();

/// Debug builds log verbosely, release builds only warnings and errors.
#[cfg(debug_assertions)]
pub const DEFAULT_LEVEL: &str = "pairtalk_lib=debug,pairtalk=debug,webrtc=warn";

#[cfg(not(debug_assertions))]
pub const DEFAULT_LEVEL: &str = "warn";

/// Local wall-clock timestamps, millisecond precision.
struct LocalTime;

impl FormatTime for LocalTime {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
/// Safe to call more than once.
pub fn init() {
    INIT.get_or_init(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(LocalTime)
            .with_target(true)
            .try_init();
    });
}
