//! Before/after comparison of a patched file

use similar::TextDiff;

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const BLUE: &str = "\x1b[34m";
const WHITE: &str = "\x1b[37m";
const RESET: &str = "\x1b[0m";

/// Unified diff of `before` against `after` with three lines of context.
///
/// Empty when the texts are equal.
pub fn unified(file_name: &str, before: &str, after: &str) -> String {
    let diff = TextDiff::from_lines(before, after);
    let mut unified = diff.unified_diff();
    unified
        .context_radius(3)
        .header(&format!("a/{}", file_name), &format!("b/{}", file_name));
    unified.to_string()
}

/// Color each line of a unified diff by its leading marker
pub fn colorize(diff: &str) -> String {
    diff.lines()
        .map(|line| {
            let color = match line.chars().next() {
                Some('+') => GREEN,
                Some('-') => RED,
                Some('@') => BLUE,
                _ => WHITE,
            };
            format!("{}{}{}", color, line, RESET)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Colored unified diff, ready for a terminal
#[allow(dead_code)]
pub fn render(file_name: &str, before: &str, after: &str) -> String {
    colorize(&unified(file_name, before, after))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unified_marks_changes() {
        let diff = unified("hello.py", "a\nb\nc\n", "a\nB\nc\n");

        assert!(diff.starts_with("--- a/hello.py\n+++ b/hello.py\n"));
        assert!(diff.contains("@@ -1,3 +1,3 @@"));
        assert!(diff.contains("\n-b\n"));
        assert!(diff.contains("\n+B\n"));
        assert!(diff.contains("\n a\n"));
    }

    #[test]
    fn test_unified_empty_when_unchanged() {
        assert!(unified("x.py", "same\n", "same\n").is_empty());
    }

    #[test]
    fn test_colorize_by_marker() {
        let colored = colorize("--- a/x\n+++ b/x\n@@ -1 +1 @@\n-old\n+new\n ctx");
        let lines: Vec<&str> = colored.lines().collect();

        assert_eq!(lines[0], "\x1b[31m--- a/x\x1b[0m");
        assert_eq!(lines[1], "\x1b[32m+++ b/x\x1b[0m");
        assert_eq!(lines[2], "\x1b[34m@@ -1 +1 @@\x1b[0m");
        assert_eq!(lines[3], "\x1b[31m-old\x1b[0m");
        assert_eq!(lines[4], "\x1b[32m+new\x1b[0m");
        assert_eq!(lines[5], "\x1b[37m ctx\x1b[0m");
    }

    #[test]
    fn test_render_colors_added_line() {
        let rendered = render("x.py", "print(1)\n", "print(1)\nprint(2)\n");
        assert!(rendered.contains("\x1b[32m+print(2)\x1b[0m"));
    }
}
