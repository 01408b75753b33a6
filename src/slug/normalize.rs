// self
use crate::_prelude::*;

const SEPARATOR: char = '-';

/// Canonical, URL-safe form of free text.
///
/// Trims, transliterates to ASCII, lowercases, and collapses every run of non-alphanumeric
/// characters into a single `-` with none at either end. The function is pure.
pub fn normalize_slug(raw: &str) -> Result<String> {
	let ascii = deunicode::deunicode(raw.trim());
	let mut slug = String::with_capacity(ascii.len());
	let mut separate = false;

	for ch in ascii.chars() {
		if ch.is_ascii_alphanumeric() {
			if separate && !slug.is_empty() {
				slug.push(SEPARATOR);
			}

			separate = false;
			slug.push(ch.to_ascii_lowercase());
		} else {
			separate = true;
		}
	}

	if slug.is_empty() {
		return Err(Error::EmptySlug { raw: raw.to_owned() });
	}

	Ok(slug)
}

/// Candidate number `attempt` (one based) derived from `base`.
pub fn candidate(base: &str, attempt: u32) -> String {
	if attempt <= 1 { base.to_owned() } else { format!("{base}{SEPARATOR}{attempt}") }
}
