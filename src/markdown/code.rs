use once_cell::sync::Lazy;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, Theme, ThemeSet};
use syntect::parsing::SyntaxSet;

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

fn code_theme(name: &str) -> &'static Theme {
    THEME_SET
        .themes
        .get(name)
        .or_else(|| THEME_SET.themes.values().next())
        .expect("at least one syntect theme")
}

/// Highlights one fenced block, one output row per source line. Returns
/// `None` when the language token is unknown so the caller can fall back to
/// the plain code style.
pub fn highlight_fence(
    code: &str,
    language: &str,
    theme_name: &str,
    fallback: Style,
) -> Option<Vec<Line<'static>>> {
    if language.is_empty() {
        return None;
    }
    let syntax = SYNTAX_SET.find_syntax_by_token(language)?;
    let theme = code_theme(theme_name);
    let mut highlighter = HighlightLines::new(syntax, theme);

    let mut lines = Vec::new();
    for raw in code.lines() {
        match highlighter.highlight_line(raw, &SYNTAX_SET) {
            Ok(tokens) => {
                let spans: Vec<Span<'static>> = tokens
                    .into_iter()
                    .map(|(style, segment)| {
                        Span::styled(segment.to_string(), convert_style(style))
                    })
                    .collect();
                if spans.is_empty() {
                    lines.push(Line::from(Span::styled(raw.to_string(), fallback)));
                } else {
                    lines.push(Line::from(spans));
                }
            }
            Err(err) => {
                tracing::debug!(?err, "syntect failed mid-block, styling plain");
                lines.push(Line::from(Span::styled(raw.to_string(), fallback)));
            }
        }
    }
    Some(lines)
}

fn convert_style(style: syntect::highlighting::Style) -> Style {
    let mut rat_style = Style::default()
        .fg(Color::Rgb(
            style.foreground.r,
            style.foreground.g,
            style.foreground.b,
        ))
        .bg(Color::Rgb(
            style.background.r,
            style.background.g,
            style.background.b,
        ));

    if style.font_style.contains(FontStyle::BOLD) {
        rat_style = rat_style.add_modifier(Modifier::BOLD);
    }
    if style.font_style.contains(FontStyle::ITALIC) {
        rat_style = rat_style.add_modifier(Modifier::ITALIC);
    }
    if style.font_style.contains(FontStyle::UNDERLINE) {
        rat_style = rat_style.add_modifier(Modifier::UNDERLINED);
    }

    rat_style
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_text(line: &Line<'_>) -> String {
        line.spans.iter().map(|span| span.content.as_ref()).collect()
    }

    #[test]
    fn known_language_is_highlighted() {
        let lines = highlight_fence(
            "fn main() {}\n",
            "rust",
            "base16-ocean.dark",
            Style::default(),
        )
        .expect("rust is in the default syntax set");
        assert_eq!(lines.len(), 1);
        assert_eq!(line_text(&lines[0]), "fn main() {}");
        assert!(lines[0].spans.len() > 1, "expected styled token spans");
    }

    #[test]
    fn unknown_language_returns_none() {
        assert!(highlight_fence("code", "definitely-not-a-language", "base16-ocean.dark", Style::default()).is_none());
        assert!(highlight_fence("code", "", "base16-ocean.dark", Style::default()).is_none());
    }

    #[test]
    fn each_source_line_becomes_one_row() {
        let lines = highlight_fence(
            "let a = 1;\nlet b = 2;\n\nlet c = 3;\n",
            "rust",
            "base16-ocean.dark",
            Style::default(),
        )
        .expect("rust syntax");
        assert_eq!(lines.len(), 4);
        assert_eq!(line_text(&lines[3]), "let c = 3;");
    }

    #[test]
    fn missing_theme_name_falls_back_to_some_theme() {
        let lines = highlight_fence(
            "x = 1\n",
            "python",
            "no-such-theme",
            Style::default(),
        )
        .expect("python syntax");
        assert_eq!(lines.len(), 1);
    }
}
