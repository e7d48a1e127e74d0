//! Progress-beacon and checkmark-fallback parsing for C3/C6's stdout
//! protocol. Pure functions, no I/O, so they can be exercised directly
//! against synthetic lines in tests without spawning a child process.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Beacon {
    item_done: i64,
}

/// Extracts the first balanced `{...}` substring from `line` and returns it.
/// A line may embed a beacon within other text; braces are matched by depth,
/// not by regex, so nested objects and stray `}`/`{` in surrounding text
/// don't confuse the scan.
fn first_balanced_object(line: &str) -> Option<&str> {
    let start = line.find('{')?;
    let mut depth = 0i32;
    for (offset, ch) in line[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&line[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parses `line` for a `{"item_done": N}` beacon. Returns `Some(N)` only for
/// a well-formed non-negative integer; malformed JSON, a non-integer
/// `item_done`, or no balanced object at all silently yield `None` so the
/// caller falls back to checkmark counting.
pub fn parse_beacon(line: &str) -> Option<i64> {
    let candidate = first_balanced_object(line)?;
    let beacon: Beacon = serde_json::from_str(candidate).ok()?;
    if beacon.item_done < 0 {
        return None;
    }
    Some(beacon.item_done)
}

/// Counts `✔` occurrences in one line (the checkmark fallback is cumulative
/// across lines; callers add this to a running total).
pub fn count_checkmarks(line: &str) -> i64 {
    line.matches('✔').count() as i64
}

/// `progress_delta = floor(100 * delta_items / total_items)`, clamped so the
/// returned delta never pushes cumulative progress past 100.
pub fn progress_delta(prev_done: i64, new_done: i64, total_items: i64, current_progress: u8) -> u32 {
    if total_items <= 0 || new_done <= prev_done {
        return 0;
    }
    let delta_items = new_done - prev_done;
    let raw = (100 * delta_items) / total_items;
    let headroom = 100u32.saturating_sub(current_progress as u32);
    (raw.max(0) as u32).min(headroom)
}

/// One observation of a stdout line: the higher of the beacon-derived and
/// checkmark-derived `done` counts wins, sharing a single `prev` as the spec
/// requires. `checkmark_total` is the running cumulative checkmark count
/// maintained by the caller (it only ever grows).
pub struct LineObservation {
    pub done: i64,
    pub checkmark_total: i64,
}

pub fn observe_line(line: &str, prev_checkmark_total: i64) -> LineObservation {
    let checkmark_total = prev_checkmark_total + count_checkmarks(line);
    let beacon_done = parse_beacon(line);
    let done = match beacon_done {
        Some(b) => b.max(checkmark_total),
        None => checkmark_total,
    };
    LineObservation {
        done,
        checkmark_total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_beacon() {
        assert_eq!(parse_beacon(r#"{"item_done": 3}"#), Some(3));
    }

    #[test]
    fn parses_beacon_embedded_in_other_text() {
        assert_eq!(parse_beacon(r#"worker: {"item_done": 2} ok"#), Some(2));
    }

    #[test]
    fn ignores_unknown_keys() {
        assert_eq!(
            parse_beacon(r#"{"item_done": 5, "extra": {"nested": true}}"#),
            Some(5)
        );
    }

    #[test]
    fn rejects_malformed_json() {
        assert_eq!(parse_beacon("{not json"), None);
    }

    #[test]
    fn rejects_non_integer_item_done() {
        assert_eq!(parse_beacon(r#"{"item_done": "two"}"#), None);
    }

    #[test]
    fn counts_multiple_checkmarks_on_one_line() {
        assert_eq!(count_checkmarks("✔ ✔ ✔ done"), 3);
        assert_eq!(count_checkmarks("no marks here"), 0);
    }

    #[test]
    fn progress_delta_floors_and_clamps_to_headroom() {
        // 1/3 of 100 == 33 (floor), not 34.
        assert_eq!(progress_delta(0, 1, 3, 0), 33);
        // headroom clamp: already at 95, asking for a 50-point jump
        assert_eq!(progress_delta(0, 2, 2, 95), 5);
    }

    #[test]
    fn progress_delta_is_zero_when_done_does_not_advance() {
        assert_eq!(progress_delta(5, 5, 10, 50), 0);
        assert_eq!(progress_delta(5, 3, 10, 50), 0);
    }

    #[test]
    fn mixed_progress_takes_the_max_of_beacon_and_checkmark() {
        // beacon says 1 done, but two checkmarks already observed this batch
        let obs = observe_line(r#"{"item_done": 1} ✔ ✔"#, 0);
        assert_eq!(obs.checkmark_total, 2);
        assert_eq!(obs.done, 2);

        // a later line with a higher beacon value wins over checkmarks
        let obs2 = observe_line(r#"{"item_done": 5}"#, obs.checkmark_total);
        assert_eq!(obs2.done, 5);
    }
}
