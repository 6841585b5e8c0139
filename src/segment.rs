//! Heuristic page segmenter.
//!
//! Splits the raw extracted text of a PDF into per-page chunks. True page
//! boundaries are rarely recoverable from extracted text, so an ordered list
//! of strategies is tried and the first non-trivial result wins:
//!
//! 1. explicit page markers (form feeds, isolated page numbers, `Page N`,
//!    `N / M`, `- N -`),
//! 2. repeated header/footer lines,
//! 3. statistical paragraph-length balancing,
//! 4. equal-length character slices (always succeeds).
//!
//! [`adjust_to_page_count`] then forces the result to exactly the declared
//! page count by bisecting or merging. The whole pipeline is best-effort and
//! never fails; it only splits and merges, so the relative order of the
//! original text is preserved.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::config::SegmenterConfig;

/// Line-shaped page markers, tried in order after the form-feed check.
static LINE_MARKERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // isolated page number
        r"(?m)^[ \t]*\d{1,4}[ \t]*$",
        // "Page 3" / "Page 3 of 12"
        r"(?mi)^[ \t]*page[ \t]+\d+([ \t]+of[ \t]+\d+)?[ \t]*$",
        // "3 / 12"
        r"(?m)^[ \t]*\d+[ \t]*/[ \t]*\d+[ \t]*$",
        // "- 3 -"
        r"(?m)^[ \t]*-[ \t]*\d+[ \t]*-[ \t]*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static marker pattern"))
    .collect()
});

type Strategy = fn(&str, usize, &SegmenterConfig) -> Option<Vec<String>>;

/// Splits `full_text` into exactly `declared_pages` page strings.
///
/// Never fails for non-empty input; the equal-length fallback guarantees a
/// result and [`adjust_to_page_count`] guarantees the length.
pub fn segment(full_text: &str, declared_pages: usize, cfg: &SegmenterConfig) -> Vec<String> {
    let declared = declared_pages.max(1);

    let strategies: [Strategy; 4] = [
        split_on_markers,
        split_on_repeated_lines,
        split_statistically,
        split_equal_lengths,
    ];

    for strategy in strategies {
        if let Some(pages) = strategy(full_text, declared, cfg) {
            return adjust_to_page_count(pages, declared);
        }
    }

    // The equal-length fallback always returns Some; this is a safety net.
    adjust_to_page_count(vec![full_text.to_string()], declared)
}

/// Strategy 1: split on explicit page markers.
///
/// A marker pattern is accepted only when its match count is between 1 and
/// `marker_slack × declared`, a sanity bound against numbers that merely
/// occur in prose. The text before the first marker becomes page 1 if
/// non-empty; marker text itself is dropped.
fn split_on_markers(text: &str, declared: usize, cfg: &SegmenterConfig) -> Option<Vec<String>> {
    let max_matches = cfg.marker_slack.saturating_mul(declared);

    // Form feeds are the strongest signal and are checked first.
    let ff_count = text.matches('\u{0C}').count();
    if (1..=max_matches).contains(&ff_count) {
        let segments = collect_segments(text.split('\u{0C}'));
        if segments.len() >= 2 {
            return Some(segments);
        }
    }

    for re in LINE_MARKERS.iter() {
        let spans: Vec<(usize, usize)> = re.find_iter(text).map(|m| (m.start(), m.end())).collect();
        if !(1..=max_matches).contains(&spans.len()) {
            continue;
        }
        let segments = collect_segments(split_at_spans(text, &spans).into_iter());
        if segments.len() >= 2 {
            return Some(segments);
        }
    }

    None
}

/// Strategy 2: split on repeated header/footer lines.
///
/// Lines of a plausible header length that recur between 2 and `declared`
/// times are candidates; the longest few are tried as page separators.
fn split_on_repeated_lines(text: &str, declared: usize, cfg: &SegmenterConfig) -> Option<Vec<String>> {
    let mut freq: HashMap<&str, usize> = HashMap::new();
    for line in text.lines() {
        let trimmed = line.trim();
        let len = trimmed.chars().count();
        if len >= cfg.repeat_min_len && len <= cfg.repeat_max_len {
            *freq.entry(trimmed).or_default() += 1;
        }
    }

    let mut candidates: Vec<&str> = freq
        .iter()
        .filter(|(_, &count)| count >= 2 && count <= declared)
        .map(|(&line, _)| line)
        .collect();
    // Longest first; tie-break lexicographically for determinism.
    candidates.sort_by(|a, b| {
        b.chars()
            .count()
            .cmp(&a.chars().count())
            .then_with(|| a.cmp(b))
    });

    for candidate in candidates.into_iter().take(cfg.repeat_candidates) {
        let mut segments = Vec::new();
        let mut current = String::new();
        for line in text.lines() {
            if line.trim() == candidate {
                segments.push(std::mem::take(&mut current));
            } else {
                current.push_str(line);
                current.push('\n');
            }
        }
        segments.push(current);

        let segments = collect_segments(segments.iter().map(String::as_str));
        if segments.len() >= 2 {
            return Some(segments);
        }
    }

    None
}

/// Strategy 3: statistical paragraph balancing.
///
/// Greedily accumulates blank-line-delimited paragraphs into a page until it
/// reaches `length_target_ratio` of the average page length, capped at the
/// declared number of pages.
fn split_statistically(text: &str, declared: usize, cfg: &SegmenterConfig) -> Option<Vec<String>> {
    let paragraphs: Vec<&str> = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if paragraphs.len() < 2 {
        return None;
    }

    let target = (text.len() as f64 / declared as f64) * cfg.length_target_ratio;

    let mut pages: Vec<String> = Vec::new();
    let mut current = String::new();
    for para in paragraphs {
        if !current.is_empty() && current.len() as f64 >= target && pages.len() + 1 < declared {
            pages.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(para);
    }
    if !current.is_empty() {
        pages.push(current);
    }

    if pages.len() >= 2 {
        Some(pages)
    } else {
        None
    }
}

/// Strategy 4: equal-length character slices. Guaranteed to succeed; loses
/// semantic page boundaries.
fn split_equal_lengths(text: &str, declared: usize, _cfg: &SegmenterConfig) -> Option<Vec<String>> {
    let total_chars = text.chars().count();
    if total_chars == 0 {
        return Some(vec![String::new(); declared]);
    }

    let per_page = total_chars.div_ceil(declared);
    let mut offsets = vec![0usize];
    for (count, (byte, _)) in text.char_indices().enumerate() {
        if count != 0 && count % per_page == 0 {
            offsets.push(byte);
        }
    }
    offsets.push(text.len());

    Some(
        offsets
            .windows(2)
            .map(|w| text[w[0]..w[1]].to_string())
            .collect(),
    )
}

/// Forces `pages` to exactly `declared` entries: bisect the longest page at
/// its character midpoint while too few, merge the shortest page into a
/// neighbor while too many. Idempotent on input that is already the right
/// length.
pub fn adjust_to_page_count(mut pages: Vec<String>, declared: usize) -> Vec<String> {
    let declared = declared.max(1);
    if pages.is_empty() {
        pages.push(String::new());
    }

    while pages.len() < declared {
        let idx = index_of_longest(&pages);
        let page = pages.remove(idx);
        let mid = char_offset(&page, page.chars().count() / 2);
        let (head, tail) = page.split_at(mid);
        pages.insert(idx, tail.to_string());
        pages.insert(idx, head.to_string());
    }

    while pages.len() > declared {
        let idx = index_of_shortest(&pages);
        if idx + 1 < pages.len() {
            // Merge into the following neighbor.
            let next = pages.remove(idx + 1);
            let short = pages.remove(idx);
            pages.insert(idx, join_pages(&short, &next));
        } else {
            // Last index: fall back to the preceding neighbor.
            let short = pages.remove(idx);
            let prev = pages.remove(idx - 1);
            pages.insert(idx - 1, join_pages(&prev, &short));
        }
    }

    pages
}

fn collect_segments<'a>(parts: impl Iterator<Item = &'a str>) -> Vec<String> {
    parts
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Returns the text between (and around) the given non-overlapping spans,
/// dropping the spans themselves.
fn split_at_spans<'a>(text: &'a str, spans: &[(usize, usize)]) -> Vec<&'a str> {
    let mut out = Vec::with_capacity(spans.len() + 1);
    let mut prev_end = 0;
    for &(start, end) in spans {
        out.push(&text[prev_end..start]);
        prev_end = end;
    }
    out.push(&text[prev_end..]);
    out
}

fn index_of_longest(pages: &[String]) -> usize {
    pages
        .iter()
        .enumerate()
        .max_by_key(|(_, p)| p.chars().count())
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn index_of_shortest(pages: &[String]) -> usize {
    pages
        .iter()
        .enumerate()
        .min_by_key(|(_, p)| p.chars().count())
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn join_pages(a: &str, b: &str) -> String {
    if a.is_empty() {
        b.to_string()
    } else if b.is_empty() {
        a.to_string()
    } else {
        format!("{} {}", a, b)
    }
}

/// Byte offset of the `nth` character, or the end of the string.
fn char_offset(s: &str, nth: usize) -> usize {
    s.char_indices().nth(nth).map(|(b, _)| b).unwrap_or(s.len())
}
