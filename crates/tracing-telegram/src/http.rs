// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client used for Bot API calls.
//!
//! The client carries the request timeout, a pooled connection with TCP
//! keep-alive, and an optional HTTPS proxy. An unparsable proxy does not stop
//! delivery: the client falls back to a direct connection and logs an error.

use core::time::Duration;
use std::error::Error;
use tracing::error;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub timeout: Option<Duration>,
    pub https_proxy: Option<String>,
}

pub fn get_client(options: &ClientOptions) -> Result<reqwest::Client, ConfigError> {
    match build_client(options, true) {
        Ok(client) => Ok(client),
        Err(e) => {
            error!(
                "Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            build_client(options, false).map_err(|inner| ConfigError::HttpClient(inner.to_string()))
        }
    }
}

fn build_client(
    options: &ClientOptions,
    allow_proxy: bool,
) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut client = reqwest::Client::builder()
        .use_rustls_tls()
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if let Some(timeout) = options.timeout {
        client = client.timeout(timeout);
    }

    if allow_proxy {
        if let Some(https_uri) = &options.https_proxy {
            let proxy = reqwest::Proxy::https(https_uri.clone())?;
            client = client.proxy(proxy);
        }
    }

    Ok(client.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_without_proxy() {
        let options = ClientOptions {
            timeout: Some(Duration::from_secs(1)),
            https_proxy: None,
        };
        assert!(get_client(&options).is_ok());
    }

    #[test]
    fn test_invalid_proxy_falls_back_to_direct_client() {
        let options = ClientOptions {
            timeout: None,
            https_proxy: Some("not a url at all".to_string()),
        };
        assert!(get_client(&options).is_ok());
    }
}
