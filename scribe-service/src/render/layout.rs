//! Page layout for the PDF rendering of extracted text.

use super::helvetica::string_width;

/// US Letter, in points
pub const PAGE_WIDTH: i64 = 612;
pub const PAGE_HEIGHT: i64 = 792;
pub const MARGIN: i64 = 50;
pub const FONT_SIZE: i64 = 12;
pub const LINE_HEIGHT: i64 = 15;

/// A line of text positioned on a page (PDF coordinates, origin bottom-left)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedLine {
    pub x: i64,
    pub y: i64,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLayout {
    pub lines: Vec<PlacedLine>,
}

/// Greedy word wrap of one paragraph.
///
/// Words are separated by any whitespace and re-joined with single spaces.
/// A word wider than `max_width` is never broken; it gets a line to itself.
pub fn simple_split(paragraph: &str, font_size: f32, max_width: f32) -> Vec<String> {
    let space = string_width(" ", font_size);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0.0_f32;

    for word in paragraph.split_whitespace() {
        let width = string_width(word, font_size);
        if current.is_empty() {
            current.push_str(word);
            current_width = width;
        } else if current_width + space + width <= max_width {
            current.push(' ');
            current.push_str(word);
            current_width += space + width;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
            current_width = width;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Split text into drawable lines: one wrapped block per `\n`-separated
/// paragraph, and a single empty line for each blank paragraph.
pub fn wrap_text(text: &str) -> Vec<String> {
    let max_width = (PAGE_WIDTH - 2 * MARGIN) as f32;
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        if paragraph.trim().is_empty() {
            lines.push(String::new());
        } else {
            lines.extend(simple_split(paragraph, FONT_SIZE as f32, max_width));
        }
    }
    lines
}

/// Place wrapped lines top to bottom, starting a new page once the cursor
/// drops below the bottom margin. Always yields at least one page.
pub fn paginate(text: &str) -> Vec<PageLayout> {
    let top = PAGE_HEIGHT - MARGIN;
    let mut pages = vec![PageLayout::default()];
    let mut y = top;

    for line in wrap_text(text) {
        if y < MARGIN {
            pages.push(PageLayout::default());
            y = top;
        }
        if let Some(page) = pages.last_mut() {
            page.lines.push(PlacedLine {
                x: MARGIN,
                y,
                text: line,
            });
        }
        y -= LINE_HEIGHT;
    }

    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_split_wraps_on_width() {
        // "word" is 26.004pt and a space 3.336pt at 12pt: 17 words fit in 512pt
        let paragraph = vec!["word"; 40].join(" ");
        let lines = simple_split(&paragraph, 12.0, 512.0);
        let counts: Vec<usize> = lines.iter().map(|l| l.split(' ').count()).collect();
        assert_eq!(counts, vec![17, 17, 6]);
    }

    #[test]
    fn test_simple_split_keeps_long_words_whole() {
        let long = "a".repeat(120);
        let lines = simple_split(&format!("short {long} tail"), 12.0, 512.0);
        assert_eq!(lines, vec!["short".to_string(), long, "tail".to_string()]);
    }

    #[test]
    fn test_simple_split_collapses_whitespace() {
        assert_eq!(simple_split("  a\t b  ", 12.0, 512.0), vec!["a b"]);
    }

    #[test]
    fn test_wrap_text_keeps_blank_paragraphs() {
        assert_eq!(wrap_text("Hello\n\n  \nWorld"), vec!["Hello", "", "", "World"]);
        assert_eq!(wrap_text(""), vec![""]);
    }

    #[test]
    fn test_paginate_positions() {
        let pages = paginate("Hello\nWorld");
        assert_eq!(pages.len(), 1);
        assert_eq!(
            pages[0].lines,
            vec![
                PlacedLine { x: 50, y: 742, text: "Hello".to_string() },
                PlacedLine { x: 50, y: 727, text: "World".to_string() },
            ]
        );
    }

    #[test]
    fn test_paginate_breaks_after_47_lines() {
        let text = (1..=48).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let pages = paginate(&text);

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].lines.len(), 47);
        assert_eq!(pages[0].lines.last().unwrap().y, 52);
        assert_eq!(pages[1].lines.len(), 1);
        assert_eq!(pages[1].lines[0].y, 742);
        assert_eq!(pages[1].lines[0].text, "line 48");
    }

    #[test]
    fn test_paginate_empty_text() {
        let pages = paginate("");
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].lines.len(), 1);
        assert_eq!(pages[0].lines[0].text, "");
    }
}
