use tracing::Subscriber;
use tracing_subscriber::{fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn env_filter(verbose: bool) -> EnvFilter {
    let default = if verbose {
        "astro_datasets=debug,info"
    } else {
        "astro_datasets=info"
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Human-readable logs on stderr; stdout is reserved for command output.
pub fn init_cli_logger(verbose: bool) {
    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}

/// One JSON object per event on stderr. Event fields sit at the top level
/// next to the enclosing `catalog` span, whose `dataset` field names the
/// catalog entry being loaded or saved.
pub fn init_json_logger(verbose: bool) {
    json_subscriber(env_filter(verbose), std::io::stderr).init();
}

fn json_subscriber<W>(filter: EnvFilter, writer: W) -> impl Subscriber + Send + Sync
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    tracing_subscriber::registry().with(filter).with(
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(bytes);
            Ok(bytes.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_json_events_are_flat_and_carry_the_dataset() {
        let buffer = Buffer::default();
        let writer = buffer.clone();
        let subscriber = json_subscriber(EnvFilter::new("info"), move || writer.clone());

        tracing::subscriber::with_default(subscriber, || {
            let _span = tracing::info_span!("catalog", dataset = "aia_171").entered();
            tracing::info!(bytes = 2880, "Saving solar map");
        });

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let line: serde_json::Value = serde_json::from_str(output.lines().next().unwrap()).unwrap();
        assert_eq!(line["message"], "Saving solar map");
        assert_eq!(line["bytes"], 2880);
        assert_eq!(line["span"]["dataset"], "aia_171");
        assert!(line.get("fields").is_none());
        assert!(line.get("spans").is_none());
    }
}
