//! Assembly of the middleware chain.
//!
//! The chain shape is a pure function of the configuration, derived once as
//! a plan and then applied innermost-to-outermost. Data flows outer → inner
//! through **Logging → UserAgent → Retry → MimeType → StatusCode →
//! SizeLimit → Raw**: the User-Agent sits outside retry so all attempts of
//! one call share an identity, and the validators sit inside retry so each
//! attempt's response is independently validated and a validation failure
//! can trigger another attempt.

use reqwest::Client;
use tower::util::BoxCloneService;
use tower::Layer;

use taskfetch_core::{FetchError, FetchRequest, FetchResponse};
use taskfetch_guard::{MimeValidatorLayer, SizeLimitLayer, StatusValidatorLayer};
use taskfetch_retry::RetryLayer;
use taskfetch_transport::{RawFetcher, DEFAULT_MAX_REDIRECTS};

use crate::config::FetcherConfig;
use crate::logging::LoggingLayer;
use crate::useragent::UserAgentLayer;

pub(crate) type FetchService = BoxCloneService<FetchRequest, FetchResponse, FetchError>;

/// One position in the middleware chain, outer → inner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChainLayer {
    Logging,
    UserAgent,
    Retry,
    MimeType,
    StatusCode,
    SizeLimit,
    Raw,
}

/// The ordered stack `config` resolves to, outermost first.
pub(crate) fn chain_plan(config: &FetcherConfig) -> Vec<ChainLayer> {
    let mut plan = Vec::new();
    if !config.disable_logging {
        plan.push(ChainLayer::Logging);
    }
    if config.enable_user_agent_randomization || !config.user_agents.is_empty() {
        plan.push(ChainLayer::UserAgent);
    }
    plan.push(ChainLayer::Retry);
    if !config.allowed_mime_types.is_empty() {
        plan.push(ChainLayer::MimeType);
    }
    if !config.disable_status_code_validation {
        plan.push(ChainLayer::StatusCode);
    }
    if config.resolved_max_bytes().is_some() {
        plan.push(ChainLayer::SizeLimit);
    }
    plan.push(ChainLayer::Raw);
    plan
}

/// Wraps a transport into the full middleware chain for `config`. Expects
/// a normalized configuration.
pub(crate) fn assemble(config: &FetcherConfig, client: Client) -> FetchService {
    let raw = RawFetcher::new(
        client,
        config.effective_timeout(),
        config.max_redirects.unwrap_or(DEFAULT_MAX_REDIRECTS),
    );
    let mut service = BoxCloneService::new(raw);

    // Innermost to outermost: reverse of the data-flow plan.
    for layer in chain_plan(config).iter().rev() {
        service = match layer {
            ChainLayer::Raw => service,
            ChainLayer::SizeLimit => {
                // The plan only contains this entry when a cap is resolved.
                let limit = config.resolved_max_bytes().unwrap_or_default();
                BoxCloneService::new(SizeLimitLayer::new(limit).layer(service))
            }
            ChainLayer::StatusCode => BoxCloneService::new(
                StatusValidatorLayer::new(config.allowed_status_codes.iter().copied())
                    .layer(service),
            ),
            ChainLayer::MimeType => BoxCloneService::new(
                MimeValidatorLayer::new(config.allowed_mime_types.iter())
                    .allow_missing_content_type(config.allow_missing_content_type)
                    .layer(service),
            ),
            ChainLayer::Retry => {
                BoxCloneService::new(RetryLayer::new(config.retry_policy()).layer(service))
            }
            ChainLayer::UserAgent => {
                BoxCloneService::new(UserAgentLayer::new(&config.user_agents).layer(service))
            }
            ChainLayer::Logging => BoxCloneService::new(LoggingLayer::new().layer(service)),
        };
    }
    service
}
