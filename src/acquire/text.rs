// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::listing::EpisodePage;

/// Paragraphs starting with one of these end the transcript
const TRANSCRIPT_END_MARKERS: [&str; 4] = ["SHOW NOTES", "SHOWNOTES", "Show Notes", "Want more"];

/// Replace typographic quotes with their ASCII counterparts
pub fn normalize_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            other => other,
        })
        .collect()
}

/// Whether a paragraph opens with an upper-case speaker label
///
/// Looks at the first four characters: at least one must be a letter and
/// none may be lower case ("AMY:", "PETER GWIN").
fn starts_with_speaker(text: &str) -> bool {
    let head: Vec<char> = text.chars().take(4).collect();
    head.iter().any(|c| c.is_alphabetic()) && !head.iter().any(|c| c.is_lowercase())
}

fn is_transcript_end(text: &str) -> bool {
    TRANSCRIPT_END_MARKERS
        .iter()
        .any(|marker| text.starts_with(marker))
}

/// Render the transcript file of an episode
pub fn render_transcript(url: &str, title: &str, credit: &str, page: &EpisodePage) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n\n{}\n\n{}\n\n", url, title, credit));

    out.push_str("[Description]\n");
    for item in &page.description {
        out.push_str(&normalize_quotes(item));
    }
    out.push_str("\n\n");

    out.push_str("[Preface]\n");
    for item in &page.preface {
        out.push_str(&normalize_quotes(item));
    }
    out.push_str("\n\n");

    out.push_str("[Transcript]");
    for paragraph in &page.paragraphs {
        let text = normalize_quotes(paragraph);
        if is_transcript_end(&text) {
            break;
        }
        out.push_str(if starts_with_speaker(&text) { "\n\n" } else { "\n" });
        out.push_str(&text.replace(": ", ":\n"));
    }
    out.push('\n');

    out
}
