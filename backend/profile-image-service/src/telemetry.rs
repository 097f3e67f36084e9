use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Panics if one is already set.
pub fn init_tracing(json: bool) {
    if let Err(e) = try_init_tracing(json) {
        panic!("failed to install tracing subscriber: {}", e);
    }
}

/// Like [`init_tracing`], but reports an already-installed subscriber as an error
pub fn try_init_tracing(json: bool) -> Result<(), tracing_subscriber::util::TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter());

    if json {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_level(true))
            .try_init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error() {
        // Another test may have installed a subscriber first
        let _ = try_init_tracing(false);
        assert!(try_init_tracing(true).is_err());
    }
}
