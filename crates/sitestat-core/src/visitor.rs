use sha2::{Digest, Sha256};

/// Compute a visitor ID from IP and User-Agent.
///
/// Formula: sha256(ip + user_agent)[0..8] encoded as 16 hex chars.
///
/// Only used when the client did not send its own identifier. The hash is
/// unsalted so the same client keeps one identity across days, which the
/// earliest-referrer attribution relies on.
pub fn compute_visitor_id(ip: &str, user_agent: &str) -> String {
    let input = format!("{}{}", ip, user_agent);
    let hash = Sha256::digest(input.as_bytes());
    hex::encode(&hash[..8])
}

/// Extract the lower-cased host of a referrer URL.
///
/// Returns `None` for empty input, for strings that are not absolute URLs,
/// and for URLs without a host.
pub fn referrer_host(referrer: &str) -> Option<String> {
    let referrer = referrer.trim();
    if referrer.is_empty() {
        return None;
    }
    let parsed = url::Url::parse(referrer).ok()?;
    let host = parsed.host_str()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_lowercase())
    }
}

/// `true` when `host` is the site itself, with or without a `www.` prefix.
pub fn is_self_referral(host: &str, domain: &str) -> bool {
    host == domain || host.strip_prefix("www.") == Some(domain)
}

/// Hosts excluded from referrer attribution for `domain`.
pub fn self_hosts(domain: &str) -> [String; 2] {
    [domain.to_string(), format!("www.{domain}")]
}
