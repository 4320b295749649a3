/// Styled terminal rendering for assistant replies printed by `chat`.
use termimad::MadSkin;

/// Used when the terminal size can't be read.
const DEFAULT_WIDTH: usize = 80;
const MIN_WIDTH: usize = 20;

pub fn terminal_width() -> usize {
    crossterm::terminal::size()
        .map(|(w, _)| w as usize)
        .unwrap_or(DEFAULT_WIDTH)
}

/// Render markdown `text` as styled terminal lines wrapped at `width` columns.
pub fn render(text: &str, width: usize) -> String {
    let skin = MadSkin::default();
    skin.text(text, Some(width.max(MIN_WIDTH))).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markup_is_consumed() {
        let out = render("# Borrowing\n\nUse **references** and `&mut` here.\n", 60);
        assert!(out.contains("Borrowing"));
        assert!(out.contains("references"));
        assert!(out.contains("&mut"));
        assert!(!out.contains("**"));
        assert!(!out.contains('`'));
    }

    #[test]
    fn test_long_lines_wrap_to_width() {
        let out = render(&"word ".repeat(40), 30);
        assert!(out.lines().count() > 1);
    }

    #[test]
    fn test_tiny_width_is_clamped() {
        let out = render("a reply that is longer than five columns", 5);
        assert!(out.contains("reply"));
    }
}
