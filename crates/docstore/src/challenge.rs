//! `WWW-Authenticate` challenge parsing
//!
//! A single header value may carry several challenges separated by commas,
//! and each challenge's parameters are comma separated too:
//!
//! ```text
//! Bearer realm="", authorization_uri="https://login...", error="insufficient_claims", claims="eyJ..."
//! ```
//!
//! A segment of the form `<scheme> <name>=<value>` (or a bare scheme) starts
//! a new challenge; `name=value` segments extend the current one.

/// Split raw header values into individual challenge strings.
///
/// Blank values produce nothing, so an empty result means the response had
/// no extractable challenge.
pub fn parse_challenges<'a, I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut challenges = Vec::new();

    for value in values {
        let mut current: Option<String> = None;
        for segment in split_outside_quotes(value) {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            if starts_challenge(segment) {
                if let Some(done) = current.take() {
                    challenges.push(done);
                }
                current = Some(segment.to_string());
            } else {
                match current.as_mut() {
                    Some(c) => {
                        c.push_str(", ");
                        c.push_str(segment);
                    }
                    // parameters with no scheme in front; keep them as-is
                    None => current = Some(segment.to_string()),
                }
            }
        }
        if let Some(done) = current {
            challenges.push(done);
        }
    }

    challenges
}

/// Extract the `claims` parameter value from a challenge, unquoted.
pub fn claims_parameter(challenge: &str) -> Option<String> {
    let params = match challenge.split_once(' ') {
        Some((_scheme, rest)) if !rest.trim_start().starts_with('=') => rest,
        _ => challenge,
    };
    split_outside_quotes(params).into_iter().find_map(|segment| {
        let (name, value) = segment.trim().split_once('=')?;
        if name.trim().eq_ignore_ascii_case("claims") {
            let value = value.trim().trim_matches('"');
            (!value.is_empty()).then(|| value.to_string())
        } else {
            None
        }
    })
}

fn starts_challenge(segment: &str) -> bool {
    match segment.split_once(|c: char| c.is_ascii_whitespace()) {
        // "Bearer realm=x": scheme token followed by a parameter
        Some((scheme, rest)) => is_token(scheme) && !rest.trim_start().starts_with('='),
        // "Negotiate": a bare scheme without parameters
        None => !segment.contains('=') && is_token(segment),
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c))
}

fn split_outside_quotes(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);
    parts
}
