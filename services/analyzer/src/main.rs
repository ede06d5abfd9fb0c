use anyhow::Context;
use aws_config::BehaviorVersion;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use tracing::{info, Subscriber};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use tweet_analyzer::aws::build_analyzer;
use tweet_analyzer::{function_handler, AnalyzerConfig};

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load configuration
    let config = AnalyzerConfig::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.log_level);

    info!(
        sentiment_stream = %config.sentiment_stream,
        entity_stream = %config.entity_stream,
        rekognition_stream = %config.rekognition_stream,
        bucket = %config.bucket,
        "Starting tweet analyzer"
    );

    let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let analyzer = build_analyzer(&aws_config, config);

    run(service_fn(|event: LambdaEvent<_>| {
        function_handler(event, &analyzer)
    }))
    .await
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer(std::io::stdout))
        .init();
}

/// JSON log lines with event fields at the top level and the current span
/// under `span`
fn json_layer<S, W>(make_writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .json()
        .flatten_event(true)
        .without_time()
        .with_writer(make_writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_log_lines_carry_current_span_fields() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::registry().with(json_layer(move || writer.clone()));

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("analyze_post", post_id = "42");
            let _entered = span.enter();
            info!(records = 1, "Post analyzed");
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let line: serde_json::Value = serde_json::from_str(output.trim()).unwrap();

        assert_eq!(line["message"], "Post analyzed");
        assert_eq!(line["records"], 1);
        assert_eq!(line["span"]["post_id"], "42");
        assert!(line.get("timestamp").is_none());
    }
}
