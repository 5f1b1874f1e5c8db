pub mod clock;
pub mod log_redact;
pub mod logging;
pub mod provider_client;
pub mod result_cache;

pub use clock::{system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use provider_client::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, ProviderClient, ReqwestTransport,
    TransportError,
};
pub use result_cache::{CacheEntry, CacheWrite, ResultCache};
