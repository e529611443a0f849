use std::sync::OnceLock;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt as _,
    util::SubscriberInitExt as _,
};

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "info,tower_http=info,wstrust_sts=info";

static INIT: OnceLock<()> = OnceLock::new();

/// Installs the global subscriber once. Later calls are no-ops, so tests may
/// call it freely.
pub fn init_tracing() {
    let _ = INIT.get_or_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        // Request spans are reported once, with their duration, when they close
        let fmt_layer = fmt::layer().with_span_events(FmtSpan::CLOSE);
        let _ = tracing_subscriber::registry()
            .with(fmt_layer)
            .with(env_filter)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
        assert!(INIT.get().is_some());
    }
}
