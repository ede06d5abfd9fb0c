use anyhow::Context;
use aws_config::BehaviorVersion;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use std::sync::Arc;
use tracing::{info, Subscriber};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use trigger_provisioner::{
    function_handler, AwsBucketWiring, HttpResponseSender, ProvisionerConfig, TriggerProvisioner,
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = ProvisionerConfig::load().context("Failed to load configuration")?;

    init_tracing(&config.log_level);

    info!(
        bucket = ?config.s3_bucket,
        prefix = %config.notification_prefix,
        report_failures = config.report_failures,
        "Starting trigger provisioner"
    );

    let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let provisioner = TriggerProvisioner::new(
        config,
        Arc::new(AwsBucketWiring::new(&aws_config)),
        Arc::new(HttpResponseSender::new()),
    );

    run(service_fn(|event: LambdaEvent<_>| {
        function_handler(event, &provisioner)
    }))
    .await
}

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
