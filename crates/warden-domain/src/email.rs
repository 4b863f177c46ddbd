//! Email-domain helpers used by the registration blacklist.

/// Canonical form of a blacklist domain: trimmed, no leading `@`, lower-case.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_start_matches('@').to_ascii_lowercase()
}

/// Domain part of an email address in canonical form.
///
/// Returns `None` when the address has no `@` or an empty domain part.
pub fn email_domain(email: &str) -> Option<String> {
    let (_, domain) = email.trim().rsplit_once('@')?;
    let domain = normalize_domain(domain);
    (!domain.is_empty()).then_some(domain)
}
