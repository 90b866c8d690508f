//! `Accept` header parsing.

/// Media types listed in `Accept` header values, best quality first.
///
/// Entries with equal quality keep their declared order.  Parameters other
/// than `q` are dropped; entries with `q=0` are excluded.
pub fn media_types<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut ranked: Vec<(f32, String)> = values
        .into_iter()
        .flat_map(|value| value.split(','))
        .filter_map(|entry| {
            let mut parts = entry.split(';').map(str::trim);
            let media = parts.next().filter(|m| !m.is_empty())?.to_ascii_lowercase();
            let quality = parts
                .filter_map(|p| p.strip_prefix("q="))
                .find_map(|q| q.parse::<f32>().ok())
                .unwrap_or(1.0);
            (quality > 0.0).then_some((quality, media))
        })
        .collect();
    ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    ranked.into_iter().map(|(_, media)| media).collect()
}
