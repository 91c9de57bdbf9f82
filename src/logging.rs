/// Install a global log subscriber.
///
/// Native builds get a `fmt` subscriber filtered by `RUST_LOG` (default
/// `info`). Returns `false` when a subscriber was already installed.
#[cfg(not(target_arch = "wasm32"))]
pub fn init() -> bool {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter))
        .try_init()
        .is_ok()
}

/// Panics are forwarded to the browser console; `tracing` output stays
/// disabled on wasm.
#[cfg(target_arch = "wasm32")]
pub fn init() -> bool {
    console_error_panic_hook::set_once();
    true
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    #[test]
    fn test_init_is_idempotent() {
        let _ = super::init();
        assert!(!super::init());
    }
}
