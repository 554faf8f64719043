//! Allowed origins for AMP cross-origin requests.
//!
//! # Responsibilities
//! - Derive the whitelist from the publisher origin
//! - Exact-match membership checks on the `Origin` header
//!
//! # Design Decisions
//! - Computed once when the guard is built, never mutated
//! - The CDN subdomain is escaped, the Cloudflare subdomain is not.
//!   AMP caches key on these exact strings.

/// The Google AMP cache origin, always allowed.
pub const AMP_CACHE_ORIGIN: &str = "https://cdn.ampproject.org";

const CDN_SUFFIX: &str = ".cdn.ampproject.org";
const CLOUDFLARE_SUFFIX: &str = ".amp.cloudflare.com";

/// The fixed set of origins allowed to fetch on behalf of a publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidOriginSet {
    origins: [String; 4],
}

impl ValidOriginSet {
    /// Build the set for a publisher origin such as `https://example.com`.
    pub fn for_publisher(publisher_origin: &str) -> Self {
        Self {
            origins: [
                publisher_origin.to_string(),
                cdn_origin(publisher_origin),
                format!("{}{}", publisher_origin, CLOUDFLARE_SUFFIX),
                AMP_CACHE_ORIGIN.to_string(),
            ],
        }
    }

    /// Exact, case-sensitive membership.
    pub fn contains(&self, origin: &str) -> bool {
        self.origins.iter().any(|o| o == origin)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.origins.iter().map(String::as_str)
    }
}

/// `-` becomes `--` first, then `.` becomes `-`.
fn cdn_origin(publisher_origin: &str) -> String {
    let escaped = publisher_origin.replace('-', "--").replace('.', "-");
    format!("{}{}", escaped, CDN_SUFFIX)
}
