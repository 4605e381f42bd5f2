/// Id of the synthetic greeting that opens every session. Never sent upstream.
pub const WELCOME_MESSAGE_ID: &str = "welcome";

/// Static transcript entry used for every failed send.
pub const APOLOGY_MESSAGE: &str = "I apologize, but I encountered an error. Please try again.";

/// Default endpoints and model
pub const DEFAULT_COUNSELLOR_ENDPOINT: &str = "http://127.0.0.1:8787/functions/v1/ai-counsellor";
pub const DEFAULT_AI_GATEWAY_URL: &str = "https://ai.gateway.lovable.dev/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "google/gemini-3-flash-preview";
pub const COUNSELLOR_ROUTE: &str = "/functions/v1/ai-counsellor";
pub const COUNSELLOR_ROUTE_SHORT: &str = "/v1/counsellor";

/// SSE framing
pub const SSE_DATA_PREFIX: &str = "data: ";
pub const SSE_DONE_MARKER: &str = "[DONE]";
pub const MAX_STREAM_LINES: usize = 100_000;
/// Continuation lines a carried-over payload may absorb before it is dropped.
pub const MAX_PENDING_LINES: usize = 8;
pub const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Gateway error bodies
pub const RATE_LIMITED_MESSAGE: &str = "Rate limits exceeded. Please try again in a moment.";
pub const CREDITS_EXHAUSTED_MESSAGE: &str = "AI credits exhausted. Please add credits to continue.";
pub const UPSTREAM_UNAVAILABLE_MESSAGE: &str = "AI service temporarily unavailable";

/// Header names accepted by the gateway's CORS policy
pub const CORS_ALLOWED_HEADERS: &[&str] = &[
    "authorization",
    "x-client-info",
    "apikey",
    "content-type",
    "x-supabase-client-platform",
    "x-supabase-client-platform-version",
    "x-supabase-client-runtime",
    "x-supabase-client-runtime-version",
];

pub const SESSION_EVENT_CAPACITY: usize = 256;

/// Tasks listed under "recent" on the profile overview.
pub const RECENT_TODOS_LIMIT: i64 = 5;
