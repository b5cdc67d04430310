//! Bounded-latency endpoint reachability checks.

use std::time::Duration;

use hyper::{client::HttpConnector, Body, Method, Request, Uri};
use hyper_openssl::HttpsConnector;
use tracing::{debug, trace};

use crate::CardEndpoint;

/// Per-endpoint probe budget.
pub(super) const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

type ProbeClient = hyper::Client<HttpsConnector<HttpConnector>>;

/// Probes endpoints in order and reports the first definitive answer:
/// `Some(true)` as soon as one endpoint answers in time with a status below
/// 500, `Some(false)` when every probed endpoint failed, `None` when no
/// endpoint was probeable at all.
pub(super) async fn check_endpoints(
    endpoints: &[CardEndpoint],
    timeout: Duration,
) -> Option<bool> {
    let client = match probe_client() {
        Ok(client) => client,
        Err(err) => {
            debug!("probe client unavailable: {}", err);
            return None;
        }
    };
    let mut probed = false;
    for endpoint in endpoints {
        let uri: Uri = match endpoint.url.parse() {
            Ok(uri) => uri,
            Err(err) => {
                trace!("skipping unparseable endpoint {}: {}", endpoint.url, err);
                continue;
            }
        };
        if !is_probeable(&uri) {
            trace!("skipping non-http endpoint {}", endpoint.url);
            continue;
        }
        probed = true;
        if probe_one(&client, uri, timeout).await {
            return Some(true);
        }
    }
    if probed {
        Some(false)
    } else {
        None
    }
}

fn probe_client() -> Result<ProbeClient, String> {
    let https = HttpsConnector::new().map_err(|err| err.to_string())?;
    Ok(hyper::Client::builder()
        // Connections must not outlive the pass that opened them.
        .pool_max_idle_per_host(0)
        .build::<_, Body>(https))
}

async fn probe_one(client: &ProbeClient, uri: Uri, timeout: Duration) -> bool {
    let url = uri.to_string();
    let request = match Request::builder()
        .method(Method::HEAD)
        .uri(uri)
        .body(Body::empty())
    {
        Ok(request) => request,
        Err(err) => {
            trace!("failed to build probe request for {}: {}", url, err);
            return false;
        }
    };
    match tokio::time::timeout(timeout, client.request(request)).await {
        Ok(Ok(response)) => {
            let code = response.status().as_u16();
            trace!("probe {} answered {}", url, code);
            (200..500).contains(&code)
        }
        Ok(Err(err)) => {
            debug!("probe {} failed: {}", url, err);
            false
        }
        Err(_) => {
            debug!("probe {} timed out after {:?}", url, timeout);
            false
        }
    }
}

fn is_probeable(uri: &Uri) -> bool {
    matches!(uri.scheme_str(), Some("http") | Some("https"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hyper::Uri;

    use super::{check_endpoints, is_probeable};
    use crate::CardEndpoint;

    fn endpoint(url: &str) -> CardEndpoint {
        CardEndpoint {
            url: url.to_owned(),
            protocol: "http".to_owned(),
            port: None,
        }
    }

    #[test]
    fn only_http_schemes_are_probeable() {
        assert!(is_probeable(&"http://a1.n:8080".parse::<Uri>().unwrap()));
        assert!(is_probeable(&"https://x.example:9000".parse::<Uri>().unwrap()));
        assert!(!is_probeable(&"grpc://a1.n:9090".parse::<Uri>().unwrap()));
    }

    #[tokio::test]
    async fn no_probeable_endpoint_means_unknown() {
        assert_eq!(check_endpoints(&[], Duration::from_millis(50)).await, None);
        assert_eq!(
            check_endpoints(
                &[endpoint("grpc://a1.n:9090"), endpoint("not a url")],
                Duration::from_millis(50),
            )
            .await,
            None
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unhealthy() {
        // Reserved TEST-NET-1 address; connection refused or timeout either way.
        let result = check_endpoints(
            &[endpoint("http://192.0.2.1:9/")],
            Duration::from_millis(250),
        )
        .await;
        assert_eq!(result, Some(false));
    }
}
