use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "gradebook=info";

/// A bare level applies to this crate only.
fn directive(level: Option<&str>) -> String {
    match level {
        Some(level) if level.contains('=') => level.to_string(),
        Some(level) => format!("gradebook={level}"),
        None => DEFAULT_DIRECTIVE.to_string(),
    }
}

/// Installs the global subscriber. `GRADEBOOK_LOG` overrides `level`; logs go
/// to stderr so JSON output on stdout stays machine-readable.
pub fn init_tracing(level: Option<&str>, log_json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("GRADEBOOK_LOG")
        .unwrap_or_else(|_| EnvFilter::new(directive(level)));

    let registry = tracing_subscriber::registry().with(filter);

    if log_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    }

    Ok(())
}
