use unicode_normalization::UnicodeNormalization;

/// Canonical form of a user query used for cache keys: NFKC, lowercase, control characters
/// dropped, and runs of whitespace collapsed to a single space.
pub fn normalize_query(raw: &str) -> String {
	let folded: String =
		raw.nfkc().filter(|ch| !ch.is_control() || ch.is_whitespace()).collect::<String>();
	let lowered = folded.to_lowercase();
	let mut out = String::with_capacity(lowered.len());

	for word in lowered.split_whitespace() {
		if !out.is_empty() {
			out.push(' ');
		}

		out.push_str(word);
	}

	out
}
