use html_escape::decode_html_entities;

/// Clean and normalize text by removing extra whitespace and decoding HTML entities
pub fn clean_text(text: &str) -> String {
    let decoded = decode_html_entities(text);
    decoded
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn bigrams(text: &str) -> Vec<(char, char)> {
    let chars: Vec<char> = text.chars().collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Dice coefficient over character bigrams of the normalized strings.
fn similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (normalize(a), normalize(b));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    if a.contains(&b) || b.contains(&a) {
        return 0.9;
    }
    let (ba, bb) = (bigrams(&a), bigrams(&b));
    if ba.is_empty() || bb.is_empty() {
        return 0.0;
    }
    let mut rest = bb.clone();
    let mut overlap = 0usize;
    for g in &ba {
        if let Some(pos) = rest.iter().position(|h| h == g) {
            rest.swap_remove(pos);
            overlap += 1;
        }
    }
    (2.0 * overlap as f64) / (ba.len() + bb.len()) as f64
}

/// Index of the candidate closest to `target`. Always returns the best match
/// when candidates exist; used to map a stored dump address back onto the
/// configured location it most resembles.
pub fn closest_match(target: &str, candidates: &[String]) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .map(|(idx, c)| (idx, similarity(target, c)))
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(idx, _)| idx)
}

/// Fuzzy column lookup over a header row. Unlike `closest_match`, a weak best
/// candidate is rejected so that a genuinely missing column yields `None`.
pub fn match_column(name: &str, columns: &[String]) -> Option<usize> {
    // exact headers win outright; symbol-only headers like "#" have no
    // normalized form to fuzzy-match on
    if let Some(idx) = columns
        .iter()
        .position(|c| c.trim().eq_ignore_ascii_case(name.trim()))
    {
        return Some(idx);
    }
    let (idx, score) = columns
        .iter()
        .enumerate()
        .map(|(idx, c)| (idx, similarity(name, c)))
        .max_by(|a, b| a.1.total_cmp(&b.1))?;
    if score >= 0.6 {
        Some(idx)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  Fortune  Chakki\n Atta &amp; Co "), "Fortune Chakki Atta & Co");
    }

    #[test]
    fn test_closest_match_prefers_overlap() {
        let candidates = vec![
            "Sarjapur Road, Bengaluru".to_string(),
            "Andheri West, Mumbai".to_string(),
            "Salt Lake, Kolkata".to_string(),
        ];
        assert_eq!(closest_match("Sarjapur Rd Bengaluru", &candidates), Some(0));
        assert_eq!(closest_match("Andheri W", &candidates), Some(1));
    }

    #[test]
    fn test_match_column_exact_and_fuzzy() {
        let columns = vec![
            "#".to_string(),
            "product name".to_string(),
            "weblink_blinkit".to_string(),
            "weblink_instamart".to_string(),
        ];
        assert_eq!(match_column("weblink_blinkit", &columns), Some(2));
        assert_eq!(match_column("Weblink_Instamart", &columns), Some(3));
        assert_eq!(match_column("nonexistent_column_xyz", &columns), None);
        assert_eq!(match_column("#", &columns), Some(0));
    }
}
