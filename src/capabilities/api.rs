//! The ScanBack backend boundary as a typed capability.
//!
//! The core never speaks HTTP itself: it asks the shell to run one of three
//! operations and receives a typed result. The shell owns transport,
//! authentication headers, and mapping the REST wrapper's `success: false`
//! responses into `ApiError::Status`.

use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ActivationReceipt, ActivationRequest, TagCode, TagRecord};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "data", rename_all = "snake_case")]
pub enum ApiOperation {
    /// `getPublicQRCode(code)` — the sole network read.
    FetchTag { code: TagCode },
    /// `trackScan(code)` — best-effort analytics ping.
    TrackScan { code: TagCode },
    /// `activateQRCode(code, payload)` — the one mutation this page owns.
    Activate {
        code: TagCode,
        request: Box<ActivationRequest>,
    },
}

impl Operation for ApiOperation {
    type Output = ApiResult;
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ApiError {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("Request timeout")]
    Timeout,

    #[error("HTTP {code}: {message}")]
    Status { code: u16, message: String },

    #[error("invalid response: {message}")]
    InvalidResponse { message: String },
}

impl ApiError {
    /// The server-provided (or synthesized) human-readable message. The
    /// backend has no structured error codes, so callers classify on this.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Network { message }
            | Self::Status { message, .. }
            | Self::InvalidResponse { message } => message.clone(),
            Self::Timeout => "Request timeout".to_string(),
        }
    }

    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Network { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ApiOutput {
    Tag(Box<TagRecord>),
    ScanTracked,
    Activated(Box<ActivationReceipt>),
}

pub type ApiResult = Result<ApiOutput, ApiError>;

pub struct TagApi<Ev> {
    context: CapabilityContext<ApiOperation, Ev>,
}

impl<Ev> Capability<Ev> for TagApi<Ev> {
    type Operation = ApiOperation;
    type MappedSelf<MappedEv> = TagApi<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        TagApi::new(self.context.map_event(f))
    }
}

impl<Ev> TagApi<Ev>
where
    Ev: 'static,
{
    #[must_use]
    pub fn new(context: CapabilityContext<ApiOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn fetch_tag<F>(&self, code: TagCode, make_event: F)
    where
        F: Fn(ApiResult) -> Ev + Send + Sync + 'static,
    {
        self.request(ApiOperation::FetchTag { code }, make_event);
    }

    pub fn track_scan<F>(&self, code: TagCode, make_event: F)
    where
        F: Fn(ApiResult) -> Ev + Send + Sync + 'static,
    {
        self.request(ApiOperation::TrackScan { code }, make_event);
    }

    pub fn activate<F>(&self, code: TagCode, request: ActivationRequest, make_event: F)
    where
        F: Fn(ApiResult) -> Ev + Send + Sync + 'static,
    {
        self.request(
            ApiOperation::Activate {
                code,
                request: Box::new(request),
            },
            make_event,
        );
    }

    fn request<F>(&self, operation: ApiOperation, make_event: F)
    where
        F: Fn(ApiResult) -> Ev + Send + Sync + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let result = context.request_from_shell(operation).await;
            context.update_app(make_event(result));
        });
    }
}
