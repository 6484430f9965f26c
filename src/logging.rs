use std::sync::OnceLock;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

fn filter_for(enable_debug: bool) -> EnvFilter {
    if enable_debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    }
}

/// Initialize tracing and bridge `log` to `tracing`.
/// Calling this multiple times is safe (subsequent attempts are ignored).
pub fn init_tracing(enable_debug: bool) {
    // The image loader logs through `log`; route those records into tracing
    let _ = tracing_log::LogTracer::init();

    let (filter, handle) = reload::Layer::new(filter_for(enable_debug));

    // Band workers are named, so thread names make per-band debug lines readable
    let subscriber = Registry::default().with(filter).with(
        fmt::layer()
            .with_target(false)
            .with_thread_names(true)
            .with_writer(std::io::stderr),
    );

    if tracing::subscriber::set_global_default(subscriber).is_ok() {
        let _ = FILTER_HANDLE.set(handle);
    }
}

/// Switch the installed subscriber between debug and the default level.
/// Does nothing before [`init_tracing`].
pub fn set_debug(enable_debug: bool) {
    if let Some(handle) = FILTER_HANDLE.get() {
        if let Err(e) = handle.reload(filter_for(enable_debug)) {
            tracing::warn!(error = %e, "could not change log level");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent_and_debug_can_be_raised() {
        init_tracing(false);
        init_tracing(true);
        set_debug(true);

        assert!(FILTER_HANDLE.get().is_some());
        assert!(tracing::enabled!(tracing::Level::DEBUG));
    }
}
