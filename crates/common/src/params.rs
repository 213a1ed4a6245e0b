//! Query parameter names understood by the remote test pages and responders

pub const PREFLIGHT_UUID: &str = "preflight-uuid";
pub const PREFLIGHT_HEADERS: &str = "preflight-headers";
pub const IS_PREFLIGHT_OPTIONAL: &str = "is-preflight-optional";
pub const EXPECT_SINGLE_PREFLIGHT: &str = "expect-single-preflight";
pub const FINAL_HEADERS: &str = "final-headers";
pub const REDIRECT: &str = "redirect";
pub const FILE: &str = "file";
pub const PIPE: &str = "pipe";

pub const MODE: &str = "mode";
pub const METHOD: &str = "method";
pub const URL: &str = "url";
pub const KEYLIST: &str = "keylist";
pub const FENCED_FRAME_URL: &str = "fenced_frame_url";

/// `preflight-headers` values, in escalating order
pub const HEADERS_CORS: &str = "cors";
pub const HEADERS_CORS_PNA: &str = "cors+pna";
