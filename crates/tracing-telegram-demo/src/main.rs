// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use tracing::{debug, error, info, info_span, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use tracing_telegram::config::Config;
use tracing_telegram::error::ConfigError;
use tracing_telegram::formatter::Attr;
use tracing_telegram::TelegramLayer;

fn build_layer() -> Result<(Config, TelegramLayer), ConfigError> {
    let config = Config::from_env()?;
    let layer = TelegramLayer::new(config.handler_options()?)?
        .with_attrs([Attr::new("service", env!("CARGO_PKG_NAME"))]);
    Ok((config, layer))
}

#[tokio::main]
pub async fn main() {
    let built = build_layer();
    let log_level = built
        .as_ref()
        .map(|(config, _)| config.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    let telegram = built.as_ref().ok().map(|(_, layer)| layer.clone());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::registry()
        .with(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_thread_names(false)
                .with_thread_ids(false)
                .with_line_number(false)
                .with_file(false)
                .with_target(true)
                .without_time(),
        )
        .with(telegram.clone());

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let Some(telegram) = telegram else {
        if let Err(e) = built {
            error!("Error creating Telegram layer: {e}");
        }
        return;
    };

    let span = info_span!("demo", run = 1);
    {
        let _guard = span.enter();
        debug!("Hello, World!");
        info!(key1 = "val1", "Hello, World!");
        warn!(err = "test error", "Hello, World!");
        error!(err = "test error", "Hello, World!");
    }

    if let Err(e) = telegram.close().await {
        error!("Error closing Telegram layer: {e}");
    }
}
