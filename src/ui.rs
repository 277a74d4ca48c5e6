use ratatui::{
    Frame,
    layout::{Constraint, Layout, Margin, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};
use crate::app::{char_to_byte_index, App, ChatRole, InputMode};
use crate::markdown;

/// The input box grows with its content up to this many text rows.
pub const INPUT_MAX_ROWS: u16 = 5;

const WELCOME: &[&str] = &[
    "Welcome to the lab assistant.",
    "",
    "Ask about gene function, transcription-factor regulation, or what a",
    "knockout or overexpression result means. Replies render as Markdown.",
    "",
    "Type a message below and press Enter to send. Alt+Enter adds a line.",
];

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    // Body: transcript above an input box that grows with its content
    let [transcript_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(input_height(app, body_area.width)),
    ])
    .areas(body_area);

    render_transcript(app, frame, transcript_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let session = match &app.session_id {
        Some(token) => {
            let short: String = token.chars().take(8).collect();
            format!(" [session {}]", short)
        }
        None => " [no session]".to_string(),
    };

    let title = Line::from(vec![
        Span::styled(" labchat ", Style::default().fg(Color::Cyan).bold()),
        Span::raw(app.api.base_url().to_string()),
        Span::styled(session, Style::default().fg(Color::Gray)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Conversation ");
    let inner = block.inner(area);
    app.transcript_height = inner.height;

    if app.messages.is_empty() && !app.waiting {
        app.transcript_lines = 0;
        app.transcript_scroll = 0;
        let welcome: Vec<Line> = WELCOME
            .iter()
            .map(|text| Line::from(Span::styled(*text, Style::default().fg(Color::DarkGray))))
            .collect();
        let placeholder = Paragraph::new(Text::from(welcome)).block(block);
        frame.render_widget(placeholder, area);
        return;
    }

    let mut lines: Vec<Line> = Vec::new();
    for msg in &app.messages {
        match msg.role {
            ChatRole::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                for line in msg.content.lines() {
                    lines.push(Line::from(line.to_string()));
                }
                lines.push(Line::default());
            }
            ChatRole::Assistant => {
                lines.push(Line::from(Span::styled(
                    "Assistant:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                lines.extend(markdown::render(&msg.content));
                lines.push(Line::default());
            }
        }
    }

    if app.waiting {
        lines.push(Line::from(Span::styled(
            "Assistant:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    // Pre-wrap to the inner width so the measured line count, and with it
    // the bottom-pinning scroll, is exact.
    let width = inner.width as usize;
    let mut rows: Vec<Line> = Vec::new();
    for line in lines {
        rows.append(&mut wrap_line(line, width));
    }

    app.transcript_lines = rows.len().min(u16::MAX as usize) as u16;
    let max_scroll = app.transcript_lines.saturating_sub(app.transcript_height);
    if app.follow_transcript {
        app.transcript_scroll = max_scroll;
    } else {
        app.transcript_scroll = app.transcript_scroll.min(max_scroll);
    }

    let transcript = Paragraph::new(Text::from(rows))
        .block(block)
        .scroll((app.transcript_scroll, 0));

    frame.render_widget(transcript, area);

    if app.transcript_lines > app.transcript_height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("^"))
            .end_symbol(Some("v"));

        let mut scrollbar_state = ScrollbarState::new(app.transcript_lines as usize)
            .position(app.transcript_scroll as usize);

        frame.render_stateful_widget(
            scrollbar,
            area.inner(Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scrollbar_state,
        );
    }
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let input_border_color = if app.input_mode == InputMode::Editing && !app.waiting {
        Color::Yellow
    } else {
        Color::DarkGray
    };
    let title = if app.waiting {
        " Message (waiting for reply) "
    } else {
        " Message "
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(input_border_color))
        .title(title);
    let inner = input_block.inner(area);
    let inner_width = inner.width.max(1) as usize;

    let (rows, cursor_row, cursor_col) = layout_input(&app.input, app.input_cursor, inner_width);

    // Vertical scroll keeps the cursor row visible once the box hits its cap
    let visible_rows = inner.height.max(1);
    let scroll = cursor_row.saturating_sub(visible_rows - 1);

    let text_style = if app.waiting {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::Cyan)
    };

    let lines: Vec<Line> = rows.into_iter().map(Line::from).collect();
    let input = Paragraph::new(Text::from(lines))
        .style(text_style)
        .block(input_block)
        .scroll((scroll, 0));

    frame.render_widget(input, area);

    // Show cursor when editing
    if app.input_mode == InputMode::Editing {
        frame.set_cursor_position((inner.x + cursor_col, inner.y + cursor_row - scroll));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.input_mode {
        InputMode::Normal => " NORMAL ",
        InputMode::Editing => " INSERT ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut hints = match app.input_mode {
        InputMode::Editing => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" Alt+Enter ", key_style),
            Span::styled(" newline ", label_style),
            Span::styled(" Ctrl+N ", key_style),
            Span::styled(" new chat ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" browse ", label_style),
            Span::styled(" Ctrl+C ", key_style),
            Span::styled(" quit ", label_style),
        ],
        InputMode::Normal => vec![
            Span::styled(" i ", key_style),
            Span::styled(" write ", label_style),
            Span::styled(" j/k ", key_style),
            Span::styled(" scroll ", label_style),
            Span::styled(" g/G ", key_style),
            Span::styled(" top/bottom ", label_style),
            Span::styled(" n ", key_style),
            Span::styled(" new chat ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ],
    };

    let mut spans = vec![Span::styled(mode_text, mode_style)];
    spans.append(&mut hints);
    if app.waiting {
        spans.push(Span::styled(
            " waiting for reply... ",
            Style::default().fg(Color::DarkGray),
        ));
    }

    let footer = Paragraph::new(Line::from(spans));
    frame.render_widget(footer, area);
}

/// Height of the input box including borders, given the body width.
fn input_height(app: &App, width: u16) -> u16 {
    let inner_width = width.saturating_sub(2).max(1) as usize;
    let (rows, _, _) = layout_input(&app.input, app.input_cursor, inner_width);
    (rows.len() as u16).clamp(1, INPUT_MAX_ROWS) + 2
}

/// Hard-wrap the input buffer at `width` display cells and locate the
/// cursor inside the wrapped rows. The cursor is a char offset; the
/// returned column is in cells, so wide glyphs advance it by two.
fn layout_input(text: &str, cursor: usize, width: usize) -> (Vec<String>, u16, u16) {
    let width = width.max(1);
    let mut rows: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut col = 0usize;
    let mut cursor_row = 0u16;
    let mut cursor_col = 0u16;
    let total_chars = text.chars().count();

    for (i, c) in text.chars().enumerate() {
        if c == '\n' {
            if i == cursor {
                // Cursor on a newline behind a full row sits on the next row.
                if col >= width {
                    cursor_row = rows.len() as u16 + 1;
                    cursor_col = 0;
                } else {
                    cursor_row = rows.len() as u16;
                    cursor_col = col as u16;
                }
            }
            rows.push(std::mem::take(&mut current));
            col = 0;
            continue;
        }
        let cells = char_width(c);
        if col + cells > width && !current.is_empty() {
            rows.push(std::mem::take(&mut current));
            col = 0;
        }
        if i == cursor {
            cursor_row = rows.len() as u16;
            cursor_col = col as u16;
        }
        current.push(c);
        col += cells;
    }

    if cursor >= total_chars {
        // Cursor sits after the last char; wrap it to a fresh row when the
        // last row is already full.
        if col >= width {
            rows.push(std::mem::take(&mut current));
            col = 0;
        }
        cursor_row = rows.len() as u16;
        cursor_col = col as u16;
    }
    rows.push(current);

    (rows, cursor_row, cursor_col)
}

/// Split one styled line into rows of at most `width` display cells,
/// keeping each chunk's style. Cells are what the renderer draws by, so a
/// wide glyph counts two and never straddles a row boundary.
fn wrap_line(line: Line<'static>, width: usize) -> Vec<Line<'static>> {
    if width == 0 || line.width() <= width {
        return vec![line];
    }

    let mut rows: Vec<Line> = Vec::new();
    let mut current: Vec<Span> = Vec::new();
    let mut used = 0usize;

    for span in line.spans {
        let style = span.style;
        let mut text = span.content.into_owned();
        loop {
            let cells = text.width();
            if used + cells <= width {
                if !text.is_empty() {
                    used += cells;
                    current.push(Span::styled(text, style));
                }
                break;
            }
            let mut split_at = split_index_at_width(&text, width - used);
            if split_at == 0 && used == 0 && current.is_empty() {
                // A glyph wider than the whole viewport still takes a row.
                split_at = char_to_byte_index(&text, 1);
            }
            let rest = text.split_off(split_at);
            if !text.is_empty() {
                current.push(Span::styled(text, style));
            }
            rows.push(Line::from(std::mem::take(&mut current)));
            used = 0;
            text = rest;
        }
    }

    if !current.is_empty() || rows.is_empty() {
        rows.push(Line::from(current));
    }
    rows
}

fn char_width(c: char) -> usize {
    UnicodeWidthChar::width(c).unwrap_or(0)
}

/// Byte index where `text` stops fitting into `cells` display cells.
fn split_index_at_width(text: &str, cells: usize) -> usize {
    let mut used = 0;
    for (i, c) in text.char_indices() {
        let width = char_width(c);
        if used + width > cells {
            return i;
        }
        used += width;
    }
    text.len()
}
