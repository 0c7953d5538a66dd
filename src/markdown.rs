//! Converts note markdown into HTML for page output and into plain text for
//! the search payload. Fenced code blocks are highlighted with syntect into
//! class-annotated spans; [`stylesheet`] produces the matching CSS.

use once_cell::sync::Lazy;
use pulldown_cmark::{html, CodeBlockKind, CowStr, Event, Options, Parser, Tag};
use std::collections::HashMap;
use syntect::highlighting::ThemeSet;
use syntect::html::{css_for_theme_with_class_style, ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;
use tracing::debug;

use crate::page::sanitize_anchor;
use crate::value::escape;

static SYNTAXES: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);

const CLASS_STYLE: ClassStyle = ClassStyle::SpacedPrefixed { prefix: "hl-" };

/// The syntect theme [`stylesheet`] is generated from.
pub const HIGHLIGHT_THEME: &str = "InspiredGitHub";

fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

/// Renders markdown to HTML. Headings get `id` attributes so that
/// `[[Page#Some Heading]]` crosslinks land on them; ids are computed with
/// the same [`sanitize_anchor`] used for crosslink anchors and repeated ids
/// get a numeric suffix.
///
/// Single newlines become `<br />`, inline code gets `class="oneline"` and
/// fenced code blocks are highlighted (see [`highlight`]).
pub fn to_html(markdown: &str) -> String {
    let events: Vec<Event> = Parser::new_ext(markdown, options()).collect();
    let mut ids = heading_ids(&events).into_iter();
    let mut converted: Vec<Event> = Vec::with_capacity(events.len());
    // language and body of the fenced code block being read
    let mut code: Option<(String, String)> = None;

    for ev in events {
        match ev {
            Event::Start(Tag::Heading(level)) => converted.push(Event::Html(CowStr::from(
                format!(r#"<h{} id="{}">"#, level, ids.next().unwrap_or_default()),
            ))),
            Event::End(Tag::Heading(level)) => {
                converted.push(Event::Html(CowStr::from(format!("</h{}>\n", level))))
            }
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                let lang = info.split_whitespace().next().unwrap_or("").to_owned();
                code = Some((lang, String::new()));
            }
            Event::Text(text) if code.is_some() => {
                if let Some((_, body)) = code.as_mut() {
                    body.push_str(&text);
                }
            }
            Event::End(Tag::CodeBlock(kind)) => match code.take() {
                Some((lang, body)) => {
                    converted.push(Event::Html(CowStr::from(highlight(&body, &lang))))
                }
                None => converted.push(Event::End(Tag::CodeBlock(kind))),
            },
            Event::Code(text) => converted.push(Event::Html(CowStr::from(format!(
                r#"<code class="oneline">{}</code>"#,
                escape(&text)
            )))),
            Event::SoftBreak => converted.push(Event::HardBreak),
            ev => converted.push(ev),
        }
    }

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, converted.into_iter());
    out
}

/// Highlights a fenced code block. Blocks without a language, or with one
/// syntect doesn't know, are escaped but otherwise left alone.
pub fn highlight(code: &str, lang: &str) -> String {
    let syntax = match lang {
        "" => None,
        lang => SYNTAXES.find_syntax_by_token(lang),
    };
    let highlighted = syntax.and_then(|syntax| {
        let mut generator =
            ClassedHTMLGenerator::new_with_class_style(syntax, &SYNTAXES, CLASS_STYLE);
        for line in LinesWithEndings::from(code) {
            if let Err(e) = generator.parse_html_for_line_which_includes_newline(line) {
                debug!(lang, error = %e, "highlighting failed");
                return None;
            }
        }
        Some(generator.finalize())
    });

    match highlighted {
        Some(spans) => format!(
            r#"<div class="highlight"><pre><code class="language-{}">{}</code></pre></div>"#,
            escape(lang),
            spans
        ),
        None => {
            if !lang.is_empty() {
                debug!(lang, "no syntax for code block");
            }
            format!(
                r#"<div class="highlight"><pre><code>{}</code></pre></div>"#,
                escape(code)
            )
        }
    }
}

/// The CSS for highlighted code blocks, generated from [`HIGHLIGHT_THEME`].
pub fn stylesheet() -> Result<String, syntect::Error> {
    let themes = ThemeSet::load_defaults();
    match themes
        .themes
        .get(HIGHLIGHT_THEME)
        .or_else(|| themes.themes.values().next())
    {
        Some(theme) => css_for_theme_with_class_style(theme, CLASS_STYLE),
        None => Ok(String::new()),
    }
}

fn heading_ids(events: &[Event]) -> Vec<String> {
    let mut ids = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut current: Option<String> = None;
    for ev in events {
        match ev {
            Event::Start(Tag::Heading(_)) => current = Some(String::new()),
            Event::Text(text) | Event::Code(text) => {
                if let Some(buf) = current.as_mut() {
                    buf.push_str(text);
                }
            }
            Event::End(Tag::Heading(_)) => {
                if let Some(buf) = current.take() {
                    let id = sanitize_anchor(&buf);
                    let count = seen.entry(id.clone()).or_insert(0);
                    ids.push(match *count {
                        0 => id,
                        n => format!("{}-{}", id, n),
                    });
                    *count += 1;
                }
            }
            _ => {}
        }
    }
    ids
}

/// Extracts the readable text of a markdown document. Raw HTML (including
/// substituted crosslinks and embeds) is dropped but the text between tags
/// is kept, and block boundaries become newlines.
pub fn to_text(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    for ev in Parser::new_ext(markdown, options()) {
        match ev {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak => out.push(' '),
            Event::HardBreak => out.push('\n'),
            Event::End(Tag::Paragraph)
            | Event::End(Tag::Heading(_))
            | Event::End(Tag::Item)
            | Event::End(Tag::CodeBlock(_))
            | Event::End(Tag::TableRow)
            | Event::End(Tag::TableHead) => out.push('\n'),
            Event::End(Tag::TableCell) => out.push(' '),
            _ => {}
        }
    }
    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_heading_ids() {
        let html = to_html("# Day 2\n\ntext\n\n## Day 2\n");
        assert!(html.contains(r#"<h1 id="day-2">Day 2</h1>"#), "{}", html);
        assert!(html.contains(r#"<h2 id="day-2-1">Day 2</h2>"#), "{}", html);
        assert!(html.contains("<p>text</p>"), "{}", html);
    }

    #[test]
    fn test_line_breaks() {
        let html = to_html("line one\nline two\n");
        assert!(html.contains("line one<br />"), "{}", html);
        assert!(html.contains("line two"), "{}", html);
    }

    #[test]
    fn test_inline_code() {
        let html = to_html("run `a < b` now");
        assert!(
            html.contains(r#"<code class="oneline">a &lt; b</code>"#),
            "{}",
            html
        );
    }

    #[test]
    fn test_highlight_python() {
        let html = to_html("```python\ndef answer():\n    return 42\n```\n");
        assert!(
            html.contains(r#"<div class="highlight"><pre><code class="language-python">"#),
            "{}",
            html
        );
        assert!(html.contains(r#"<span class="hl-"#), "{}", html);
        assert!(html.contains("answer"), "{}", html);
        assert!(html.contains("42"), "{}", html);
    }

    #[test]
    fn test_highlight_fallback() {
        let html = to_html("```nosuchlanguage\n<b>bold</b>\n```\n");
        assert!(
            html.contains("<div class=\"highlight\"><pre><code>&lt;b&gt;bold&lt;/b&gt;\n</code></pre></div>"),
            "{}",
            html
        );
        let html = to_html("```\nplain\n```\n");
        assert!(
            html.contains("<div class=\"highlight\"><pre><code>plain\n</code></pre></div>"),
            "{}",
            html
        );
        // indented blocks aren't highlighted
        let html = to_html("    indented\n");
        assert!(html.contains("<pre><code>indented\n</code></pre>"), "{}", html);
    }

    #[test]
    fn test_stylesheet() -> Result<(), syntect::Error> {
        let css = stylesheet()?;
        assert!(css.contains(".hl-"), "{}", css);
        Ok(())
    }

    #[test]
    fn test_raw_html_passes_through() {
        let html = to_html(r#"see <a href="/x.html">x</a>"#);
        assert!(html.contains(r#"<a href="/x.html">x</a>"#), "{}", html);
    }

    #[test]
    fn test_to_text() {
        let text = to_text("# Graph Theory\n\ntrees and *graphs*\nwith `code`\n\n- one\n- two\n");
        assert_eq!(text, "Graph Theory\ntrees and graphs with code\none\ntwo");
    }

    #[test]
    fn test_to_text_drops_tags_keeps_link_text() {
        let text = to_text(r#"see <a href="/Data_Analytics/Duckdb.html">the db</a> now"#);
        assert_eq!(text, "see the db now");
    }
}
