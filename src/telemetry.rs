use std::sync::OnceLock;
use tracing_subscriber::{
    EnvFilter, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

static INIT: OnceLock<()> = OnceLock::new();

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise the level is `info`, or `debug` when
/// `debug` is set. Calling this more than once is a no-op.
pub fn init_tracing(debug: bool) {
    let _ = INIT.get_or_init(|| {
        let default_directive = if debug { "debug" } else { "info" };
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{default_directive},hyper=info,reqwest=info")));
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_target(false))
            .with(env_filter)
            .try_init();
    });
}
