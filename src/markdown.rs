//! Markdown rendering for assistant replies.
//!
//! Replies arrive as Markdown text. `render` sanitizes the raw text, parses
//! it with pulldown-cmark, and maps the event stream onto styled ratatui
//! lines. Plain text passes through unchanged.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

/// Strip terminal control sequences from untrusted text. The model's output
/// goes straight to the terminal, so ESC sequences and raw control bytes
/// must never survive. Newlines and tabs are kept.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\u{1b}' => match chars.peek() {
                // CSI: parameter and intermediate bytes, then one final byte
                Some('[') => {
                    chars.next();
                    while let Some(&next) = chars.peek() {
                        chars.next();
                        if ('\u{40}'..='\u{7e}').contains(&next) {
                            break;
                        }
                    }
                }
                // OSC: runs until BEL or ESC-backslash
                Some(']') => {
                    chars.next();
                    while let Some(&next) = chars.peek() {
                        chars.next();
                        if next == '\u{07}' {
                            break;
                        }
                        if next == '\u{1b}' {
                            if chars.peek() == Some(&'\\') {
                                chars.next();
                            }
                            break;
                        }
                    }
                }
                // Two-byte escape
                Some(_) => {
                    chars.next();
                }
                None => {}
            },
            '\n' | '\t' => out.push(c),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }

    out
}

/// Render Markdown into styled lines for the transcript. Handles headings,
/// emphasis, inline and fenced code, lists, blockquotes, links, and rules.
pub fn render(text: &str) -> Vec<Line<'static>> {
    let clean = sanitize(text);
    let parser = Parser::new_ext(&clean, Options::empty());

    let mut renderer = Renderer::default();
    for event in parser {
        renderer.handle(event);
    }
    renderer.finish()
}

#[derive(Default)]
struct Renderer {
    lines: Vec<Line<'static>>,
    spans: Vec<Span<'static>>,
    bold: u8,
    italic: u8,
    heading: Option<HeadingLevel>,
    code_block: bool,
    quote_depth: u8,
    // One entry per open list; Some holds the next ordered-item number.
    list_stack: Vec<Option<u64>>,
    // Destination of the open link, plus the span count when it opened so
    // autolinks (text == url) do not print the url twice.
    link: Option<(String, usize)>,
    pending_blank: bool,
}

impl Renderer {
    fn handle(&mut self, event: Event) {
        match event {
            Event::Start(tag) => self.start_tag(tag),
            Event::End(tag) => self.end_tag(tag),
            Event::Text(text) => self.text(&text),
            Event::Code(code) => {
                self.spans.push(Span::styled(code.into_string(), code_style()));
            }
            Event::SoftBreak => self.spans.push(Span::raw(" ")),
            Event::HardBreak => self.flush(),
            Event::Rule => {
                self.start_block();
                self.lines.push(Line::from(Span::styled(
                    "─".repeat(30),
                    Style::default().fg(Color::DarkGray),
                )));
                self.blank_before_next();
            }
            Event::Html(html) | Event::InlineHtml(html) => self.text(&html),
            _ => {}
        }
    }

    fn start_tag(&mut self, tag: Tag) {
        match tag {
            Tag::Paragraph => self.start_block(),
            Tag::Heading { level, .. } => {
                self.start_block();
                self.heading = Some(level);
                let marker = "#".repeat(heading_depth(level));
                self.spans.push(Span::styled(
                    format!("{marker} "),
                    Style::default().fg(Color::DarkGray),
                ));
            }
            Tag::BlockQuote(_) => {
                self.start_block();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(kind) => {
                self.start_block();
                self.code_block = true;
                if let CodeBlockKind::Fenced(lang) = kind {
                    if !lang.is_empty() {
                        self.lines.push(Line::from(Span::styled(
                            lang.into_string(),
                            Style::default().fg(Color::DarkGray),
                        )));
                    }
                }
            }
            Tag::List(start) => {
                self.flush();
                if self.list_stack.is_empty() {
                    self.start_block();
                }
                self.list_stack.push(start);
            }
            Tag::Item => {
                self.flush();
                let indent = "  ".repeat(self.list_stack.len().saturating_sub(1));
                let marker = match self.list_stack.last_mut() {
                    Some(Some(number)) => {
                        let marker = format!("{number}. ");
                        *number += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                self.spans.push(Span::raw(format!("{indent}{marker}")));
            }
            Tag::Link { dest_url, .. } | Tag::Image { dest_url, .. } => {
                self.link = Some((dest_url.into_string(), self.spans.len()));
            }
            // Raw HTML is kept as literal text, one block per paragraph.
            Tag::HtmlBlock => self.start_block(),
            Tag::Strong => self.bold += 1,
            Tag::Emphasis => self.italic += 1,
            _ => {}
        }
    }

    fn end_tag(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                self.flush();
                self.blank_before_next();
            }
            TagEnd::Heading(_) => {
                self.flush();
                self.heading = None;
                self.blank_before_next();
            }
            TagEnd::BlockQuote => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.blank_before_next();
            }
            TagEnd::CodeBlock => {
                self.flush();
                self.code_block = false;
                self.blank_before_next();
            }
            TagEnd::List(_) => {
                self.flush();
                self.list_stack.pop();
                if self.list_stack.is_empty() {
                    self.blank_before_next();
                }
            }
            TagEnd::Item => self.flush(),
            TagEnd::Link | TagEnd::Image => {
                if let Some((url, opened_at)) = self.link.take() {
                    let label: String = self.spans[opened_at..]
                        .iter()
                        .map(|span| span.content.as_ref())
                        .collect();
                    if label != url {
                        self.spans.push(Span::styled(
                            format!(" ({url})"),
                            Style::default().fg(Color::DarkGray),
                        ));
                    }
                }
            }
            TagEnd::HtmlBlock => {
                self.flush();
                self.blank_before_next();
            }
            TagEnd::Strong => self.bold = self.bold.saturating_sub(1),
            TagEnd::Emphasis => self.italic = self.italic.saturating_sub(1),
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        let style = if self.code_block {
            code_style()
        } else {
            self.inline_style()
        };

        // Spans must never hold a newline. Text events only contain them
        // inside code and HTML blocks, where blank lines are content.
        for (i, piece) in text.split('\n').enumerate() {
            if i > 0 {
                if self.code_block {
                    self.flush_code_line();
                } else {
                    self.flush();
                }
            }
            if !piece.is_empty() {
                self.spans.push(Span::styled(piece.to_string(), style));
            }
        }
    }

    fn inline_style(&self) -> Style {
        let mut style = Style::default();
        if self.heading.is_some() {
            style = style.fg(Color::Cyan).add_modifier(Modifier::BOLD);
        }
        if self.quote_depth > 0 {
            style = style.add_modifier(Modifier::ITALIC);
        }
        if self.bold > 0 {
            style = style.add_modifier(Modifier::BOLD);
        }
        if self.italic > 0 {
            style = style.add_modifier(Modifier::ITALIC);
        }
        if self.link.is_some() {
            style = style.fg(Color::Blue).add_modifier(Modifier::UNDERLINED);
        }
        style
    }

    /// Close the current line if it holds anything.
    fn flush(&mut self) {
        if self.spans.is_empty() {
            return;
        }
        let mut spans = std::mem::take(&mut self.spans);
        if self.quote_depth > 0 {
            let prefix = "│ ".repeat(self.quote_depth as usize);
            spans.insert(0, Span::styled(prefix, Style::default().fg(Color::DarkGray)));
        }
        self.lines.push(Line::from(spans));
    }

    /// Close the current line even when empty; blank lines inside a code
    /// block are content.
    fn flush_code_line(&mut self) {
        if self.spans.is_empty() {
            self.lines.push(Line::default());
            return;
        }
        self.flush();
    }

    fn start_block(&mut self) {
        self.flush();
        if self.pending_blank && !self.lines.is_empty() {
            self.lines.push(Line::default());
        }
        self.pending_blank = false;
    }

    fn blank_before_next(&mut self) {
        self.pending_blank = true;
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        self.flush();
        self.lines
    }
}

fn code_style() -> Style {
    Style::default().fg(Color::Green)
}

fn heading_depth(level: HeadingLevel) -> usize {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}
