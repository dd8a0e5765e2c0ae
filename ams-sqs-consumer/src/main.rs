use std::sync::Arc;

use ams_ingest_core::config::Settings;
use ams_ingest_core::handler::BatchHandler;
use aws_lambda_events::sqs::SqsEvent;
use lambda_runtime::{Error, LambdaEvent, run, service_fn};
use tracing::{error, info};

mod lambda;
mod setup_tracing;

#[tokio::main]
async fn main() -> Result<(), Error> {
    setup_tracing::register();

    // configuration problems are fatal before the first invocation is served
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    let handler = match BatchHandler::from_settings(&settings) {
        Ok(handler) => Arc::new(handler),
        Err(e) => {
            error!(error = %e, "Failed to build the ingestion client");
            return Err(e.into());
        }
    };
    info!(?settings, "Starting SQS consumer");

    let report_batch_item_failures = settings.report_batch_item_failures;
    run(service_fn(move |event: LambdaEvent<SqsEvent>| {
        let handler = Arc::clone(&handler);
        async move {
            lambda::handle(&handler, event.payload, report_batch_item_failures)
                .await
                .map_err(Error::from)
        }
    }))
    .await
}
