//! Outbound HTTP for the runner: the remote action queue, the target
//! platform's graph API, and the rate limiter every platform call goes
//! through.

pub mod error;
pub mod platform;
pub mod queue;
pub mod rate_limit;
pub mod sync;

pub use error::ApiError;
pub use platform::{
    HttpPlatformClient, Method, PlatformApi, PlatformAuth, PlatformRequest, ThrottledPlatform,
};
pub use queue::{ActionReport, HttpQueueClient, NextAction, QueueClient, VerifyResponse};
pub use rate_limit::{RateLimiter, RateWindow};
pub use sync::{resolver_for, ConversationSync};
