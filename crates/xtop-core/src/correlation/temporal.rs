//! Temporal onset chain. The onset map itself lives in
//! [`crate::history::History`] so it shares the ring's lifetime; this module
//! only renders the map's contents.

/// Renders up to the first 5 `(id, first_seen)` entries — already sorted
/// ascending by first-seen — as `"id (T+Δs) → id (T+Δs) → ..."`.
pub fn render_temporal_chain(entries: &[(String, i64)], now: i64) -> String {
    entries
        .iter()
        .take(5)
        .map(|(id, first_seen)| format!("{id} (T+{}s)", now - first_seen))
        .collect::<Vec<_>>()
        .join(" \u{2192} ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_in_ascending_onset_order_with_deltas() {
        let entries = vec![("mem.swap.activity".to_string(), 100), ("io.psi".to_string(), 105)];
        let rendered = render_temporal_chain(&entries, 110);
        assert_eq!(rendered, "mem.swap.activity (T+10s) \u{2192} io.psi (T+5s)");
    }

    #[test]
    fn caps_at_five_entries() {
        let entries: Vec<(String, i64)> = (0..8).map(|i| (format!("id{i}"), i)).collect();
        let rendered = render_temporal_chain(&entries, 10);
        assert_eq!(rendered.matches('\u{2192}').count(), 4);
    }

    #[test]
    fn empty_entries_render_empty_string() {
        assert_eq!(render_temporal_chain(&[], 0), "");
    }
}
