//! Removes the recommendation section from the narrative shown to the user,
//! since the same content is already rendered as structured records.

use crate::extract::numbered::{is_heading, numbered_item};
use crate::page_type::PageType;

/// Headings the comprehensive-improvement prompt tells the model to put in
/// front of its selection section.
pub const SELECTION_MARKERS: [&str; 3] = [
    "推奨する改善施策",
    "改善施策の選定",
    "ナレッジベースから選定",
];

/// How far past a `1.` line a `2.` line may appear for it to count as a list.
const LIST_CONFIRM_WINDOW: usize = 10;

/// Return the narrative portion of `raw` for display.
pub fn strip(raw: &str, page_type: &PageType) -> String {
    let lines = line_spans(raw);
    let cut = if page_type.is_comprehensive_improvement() {
        find_marker_line(&lines)
    } else {
        find_list_section(&lines)
    };

    match cut {
        Some(line_no) => {
            let offset = lines[line_no].0;
            log::debug!("Dropping recommendation section from line {line_no} for {page_type}");
            raw[..offset].trim_end().to_string()
        }
        None => raw.to_string(),
    }
}

/// (byte offset, line text) for every line.
fn line_spans(raw: &str) -> Vec<(usize, &str)> {
    let mut offset = 0;
    raw.split_inclusive('\n')
        .map(|chunk| {
            let start = offset;
            offset += chunk.len();
            (start, chunk.trim_end_matches(['\n', '\r']))
        })
        .collect()
}

fn find_marker_line(lines: &[(usize, &str)]) -> Option<usize> {
    lines
        .iter()
        .position(|(_, line)| SELECTION_MARKERS.iter().any(|m| line.contains(m)))
}

fn find_list_section(lines: &[(usize, &str)]) -> Option<usize> {
    for (i, (_, line)) in lines.iter().enumerate() {
        if item_index(line) != Some(1) {
            continue;
        }
        let confirmed = lines
            .iter()
            .skip(i + 1)
            .take(LIST_CONFIRM_WINDOW)
            .any(|(_, next)| item_index(next) == Some(2));
        if !confirmed {
            continue;
        }
        let heading = lines[..i]
            .iter()
            .rposition(|(_, prev)| is_heading(prev));
        return Some(heading.unwrap_or(i));
    }
    None
}

fn item_index(line: &str) -> Option<u32> {
    numbered_item(line).map(|(index, _)| index)
}
