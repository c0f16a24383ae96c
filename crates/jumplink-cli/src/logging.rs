//! Structured logging init, following the teacher's
//! `tracing_subscriber::fmt` + `EnvFilter` convention.

pub fn init(verbose: bool) {
    let default_filter = if verbose {
        "jumplink=debug,jumplink_tunnel=debug,jumplink_transfer=debug,jumplink_net=debug"
    } else {
        "jumplink=info,jumplink_tunnel=info,jumplink_transfer=info,jumplink_net=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}
