//! Simulated browser
//!
//! A deterministic stand-in for the browser under test. It reads the page
//! and target URLs that the orchestrator builds, decides the outcome with a
//! small model of private-network-access rules, and reports through the
//! signal channel the way the real test pages do. Used for dry runs of the
//! scenario specs and for exercising the harness without a browser.

use async_trait::async_trait;
use fenced_harness_common::params;
use fenced_harness_common::resolver::search_param;
use fenced_harness_common::{tokens_from_url, AddressSpace, ServerRegistry, Token};
use fenced_harness_relay::SignalChannel;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::embedder::FrameEmbedder;
use crate::error::E2eResult;
use crate::expectation::{FencedFrameTestResult, FetchTestResult};
use crate::orchestrator::{FETCHER_PAGE, FRAME_SOURCE_PAGE};

const TREAT_AS_PUBLIC: &str = "treat-as-public-address";
const SIMPLE_METHODS: [&str; 3] = ["GET", "HEAD", "POST"];

/// Browser model that answers through a [`SignalChannel`]
pub struct SimulatedBrowser {
    registry: ServerRegistry,
    channel: Arc<dyn SignalChannel>,
    latency: Duration,
    embedded: Mutex<Vec<Url>>,
}

impl SimulatedBrowser {
    pub fn new(registry: ServerRegistry, channel: Arc<dyn SignalChannel>) -> Self {
        Self {
            registry,
            channel,
            latency: Duration::ZERO,
            embedded: Mutex::new(Vec::new()),
        }
    }

    /// Delay every report by `latency`
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// URLs embedded so far, in order
    pub fn embedded(&self) -> Vec<Url> {
        self.embedded.lock().clone()
    }

    /// Signals the pages at `url` would report, in slot order
    pub fn reports_for(&self, url: &Url) -> Vec<(Token, String)> {
        if page_is(url, FETCHER_PAGE) {
            let observed = self.fetch_outcome(url);
            let values = [observed.error, observed.ok, observed.body, observed.response_type];
            tokens_from_url(url)
                .into_iter()
                .zip(values.into_iter().map(str::to_string))
                .collect()
        } else if page_is(url, FRAME_SOURCE_PAGE) {
            match self.child_frame_loads(url) {
                Some(token) => vec![(token, FencedFrameTestResult::LOADED.to_string())],
                None => Vec::new(),
            }
        } else {
            warn!("Simulated browser does not know page {}", url.path());
            Vec::new()
        }
    }

    fn address_space_of(&self, url: &Url) -> AddressSpace {
        url.port_or_known_default()
            .and_then(|port| self.registry.by_port(port))
            .map(|server| server.address_space)
            .unwrap_or(AddressSpace::Public)
    }

    fn document_space(&self, url: &Url) -> AddressSpace {
        let treat_as_public = search_param(url, params::PIPE)
            .map(|pipe| pipe.contains(TREAT_AS_PUBLIC))
            .unwrap_or(false);
        if treat_as_public {
            AddressSpace::Public
        } else {
            self.address_space_of(url)
        }
    }

    fn passes_preflight(target: &Url) -> bool {
        search_param(target, params::PREFLIGHT_HEADERS).as_deref() == Some(params::HEADERS_CORS_PNA)
    }

    fn fetch_outcome(&self, page: &Url) -> SimulatedFetch {
        let mode = search_param(page, params::MODE).unwrap_or_else(|| "cors".to_string());
        let method = search_param(page, params::METHOD).unwrap_or_else(|| "GET".to_string());
        let Some(target) = search_param(page, params::URL).and_then(|u| Url::parse(&u).ok()) else {
            return SimulatedFetch::from(FetchTestResult::FAILURE);
        };

        let source_space = self.document_space(page);
        let target_space = self.address_space_of(&target);
        let private_network_request = source_space.is_more_public_than(target_space);
        let non_simple = mode == "cors" && !SIMPLE_METHODS.contains(&method.as_str());

        debug!(
            "Simulated fetch {} {} ({} -> {}, mode {})",
            method, target, source_space, target_space, mode
        );

        if (private_network_request || non_simple) && !Self::passes_preflight(&target) {
            return SimulatedFetch::from(FetchTestResult::FAILURE);
        }

        if mode == "no-cors" {
            return SimulatedFetch::from(FetchTestResult::OPAQUE);
        }

        let same_origin = page.origin() == target.origin();
        let cors_headers =
            search_param(&target, params::FINAL_HEADERS).as_deref() == Some(params::HEADERS_CORS);
        if same_origin || cors_headers {
            SimulatedFetch {
                response_type: if same_origin { "basic" } else { "cors" },
                ..SimulatedFetch::from(FetchTestResult::SUCCESS)
            }
        } else {
            SimulatedFetch::from(FetchTestResult::FAILURE)
        }
    }

    /// Token the child frame reports under, if it loads
    fn child_frame_loads(&self, page: &Url) -> Option<Token> {
        let child = search_param(page, params::FENCED_FRAME_URL).and_then(|u| Url::parse(&u).ok())?;
        let token = tokens_from_url(&child).into_iter().next()?;

        let source_space = self.document_space(page);
        let target_space = self.address_space_of(&child);
        if source_space.is_more_public_than(target_space) && !Self::passes_preflight(&child) {
            debug!("Simulated frame {} blocked ({} -> {})", child, source_space, target_space);
            return None;
        }
        Some(token)
    }
}

fn page_is(url: &Url, page: &str) -> bool {
    url.path().ends_with(page)
}

struct SimulatedFetch {
    error: &'static str,
    ok: &'static str,
    body: &'static str,
    response_type: &'static str,
}

impl From<FetchTestResult> for SimulatedFetch {
    fn from(result: FetchTestResult) -> Self {
        Self {
            error: result.error,
            ok: result.ok.unwrap_or("false"),
            body: result.body,
            response_type: result.response_type.unwrap_or("error"),
        }
    }
}

#[async_trait]
impl FrameEmbedder for SimulatedBrowser {
    async fn embed_fenced_frame(&self, url: &Url) -> E2eResult<()> {
        self.embedded.lock().push(url.clone());
        let reports = self.reports_for(url);

        let channel = self.channel.clone();
        let latency = self.latency;
        tokio::spawn(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            for (token, value) in reports {
                if let Err(e) = channel.publish(&token, &value).await {
                    warn!("Simulated report for {} failed: {}", token, e);
                }
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fenced_harness_common::{embed_tokens_in_url, PortTable};
    use fenced_harness_relay::SignalStore;
    use test_case::test_case;

    fn browser() -> SimulatedBrowser {
        SimulatedBrowser::new(
            ServerRegistry::from_ports(&PortTable::default()),
            Arc::new(SignalStore::new()),
        )
    }

    fn fetcher(source_port: u16, target: &str, method: &str) -> Url {
        let mut url = Url::parse(&format!(
            "https://web-platform.test:{}/fenced-frame/{}",
            source_port, FETCHER_PAGE
        ))
        .unwrap();
        url.query_pairs_mut()
            .append_pair("mode", "cors")
            .append_pair("method", method)
            .append_pair("url", target);
        embed_tokens_in_url(&url, &[Token::mint(), Token::mint(), Token::mint(), Token::mint()])
    }

    fn values(reports: Vec<(Token, String)>) -> Vec<String> {
        reports.into_iter().map(|(_, v)| v).collect()
    }

    #[test]
    fn test_public_to_private_needs_pna() {
        let browser = browser();
        let blocked = fetcher(
            8446,
            "https://web-platform.test:8445/fenced-frame/resources/preflight.py?preflight-uuid=u&preflight-headers=cors&final-headers=cors",
            "GET",
        );
        assert_eq!(
            values(browser.reports_for(&blocked)),
            vec!["TypeError: Failed to fetch", "false", "", "error"]
        );

        let allowed = fetcher(
            8446,
            "https://web-platform.test:8445/fenced-frame/resources/preflight.py?preflight-uuid=u&preflight-headers=cors%2Bpna&final-headers=cors",
            "GET",
        );
        assert_eq!(
            values(browser.reports_for(&allowed)),
            vec!["", "true", "success", "cors"]
        );
    }

    #[test_case("", "TypeError: Failed to fetch" ; "no preflight headers")]
    #[test_case("&preflight-headers=cors", "TypeError: Failed to fetch" ; "cors without pna")]
    #[test_case("&preflight-headers=cors%2Bpna", "" ; "cors and pna")]
    fn test_treat_as_public_to_loopback(preflight: &str, error: &str) {
        let target = format!(
            "https://web-platform.test:8443/fenced-frame/resources/preflight.py?preflight-uuid=u{}",
            preflight
        );
        let mut page = fetcher(8443, &target, "GET");
        page.query_pairs_mut().append_pair(
            "pipe",
            "header(Content-Security-Policy,treat-as-public-address)",
        );
        assert_eq!(values(browser().reports_for(&page))[0], error);
    }

    #[test]
    fn test_cross_origin_without_cors_headers_fails() {
        let browser = browser();
        let page = fetcher(
            8443,
            "https://web-platform.test:8446/fenced-frame/resources/preflight.py",
            "GET",
        );
        assert_eq!(values(browser.reports_for(&page))[0], "TypeError: Failed to fetch");
    }

    #[test]
    fn test_non_simple_method_needs_preflight() {
        let browser = browser();
        let page = fetcher(
            8443,
            "https://web-platform.test:8446/fenced-frame/resources/preflight.py?final-headers=cors",
            "PUT",
        );
        assert_eq!(values(browser.reports_for(&page))[0], "TypeError: Failed to fetch");
    }

    #[test]
    fn test_unknown_page_reports_nothing() {
        let browser = browser();
        let url = Url::parse("https://web-platform.test:8443/other.html?keylist=a,b").unwrap();
        assert!(browser.reports_for(&url).is_empty());
    }
}
