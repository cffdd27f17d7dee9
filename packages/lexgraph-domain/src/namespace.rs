use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceReject {
	Empty,
	InvalidIdentifier,
	NotAllowed,
}

fn identifier_pattern() -> Option<&'static Regex> {
	static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

	PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]{0,62}$").ok()).as_ref()
}

pub fn is_valid_identifier(namespace: &str) -> bool {
	identifier_pattern().map(|pattern| pattern.is_match(namespace)).unwrap_or(false)
}

/// Resolves a requested namespace against the allow-list, falling back to `default_namespace`.
pub fn resolve_namespace<'a>(
	requested: Option<&'a str>,
	default_namespace: &'a str,
	allowed: &[String],
) -> Result<&'a str, NamespaceReject> {
	let namespace = match requested.map(str::trim) {
		Some("") => return Err(NamespaceReject::Empty),
		Some(namespace) => namespace,
		None => default_namespace,
	};

	if !is_valid_identifier(namespace) {
		return Err(NamespaceReject::InvalidIdentifier);
	}
	if !allowed.iter().any(|entry| entry == namespace) {
		return Err(NamespaceReject::NotAllowed);
	}

	Ok(namespace)
}
