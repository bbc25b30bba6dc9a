use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use aion_core::{ChatState, Mode, Role};
use crate::app::{App, InputMode, VisionField};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

fn ellipsis(frame: u8) -> String {
    ".".repeat(frame as usize + 1)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.mode {
        Mode::Aion => render_chat_screen(app, frame, body_area),
        Mode::Vision => render_vision_screen(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);

    if app.mode == Mode::Vision {
        if let Some(alert) = app.vision.alert() {
            render_alert(alert, frame, area);
        }
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let mut spans = vec![Span::styled(" AION ", Style::default().fg(Color::Cyan).bold())];

    // Mode toggle: the active view is highlighted
    for mode in Mode::all() {
        let style = if mode == app.mode {
            Style::default().bg(Color::Cyan).fg(Color::Black).bold()
        } else {
            Style::default().fg(Color::Gray)
        };
        spans.push(Span::raw(" "));
        spans.push(Span::styled(format!(" {} ", mode.display_name()), style));
    }

    let model = match app.mode {
        Mode::Aion => &app.chat_model,
        Mode::Vision => &app.image_model,
    };
    spans.push(Span::raw("  "));
    spans.push(Span::styled(model.clone(), Style::default().fg(Color::Gray)));
    spans.push(Span::raw(" "));
    spans.push(Span::styled(
        format!("v{}", env!("CARGO_PKG_VERSION")),
        Style::default().fg(Color::Gray),
    ));

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };
    let mode_text = format!(" {} ", app.mode.display_name());

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut hints = match (app.mode, app.input_mode) {
        (Mode::Vision, _) if app.vision.alert().is_some() => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" dismiss ", label_style),
        ],
        (Mode::Aion, InputMode::Normal) => {
            let mut hints = vec![
                Span::styled(" j/k ", key_style),
                Span::styled(" sessions ", label_style),
                Span::styled(" Enter ", key_style),
                Span::styled(" open ", label_style),
                Span::styled(" n ", key_style),
                Span::styled(" new ", label_style),
                Span::styled(" d ", key_style),
                Span::styled(" delete ", label_style),
                Span::styled(" i ", key_style),
                Span::styled(" type ", label_style),
            ];
            if app.chat.messages().is_empty() {
                hints.extend(vec![
                    Span::styled(" 1-4 ", key_style),
                    Span::styled(" suggestion ", label_style),
                ]);
            }
            hints
        }
        (Mode::Aion, InputMode::Editing) => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" stop typing ", label_style),
        ],
        (Mode::Vision, InputMode::Normal) => {
            let mut hints = vec![
                Span::styled(" p ", key_style),
                Span::styled(" prompt ", label_style),
                Span::styled(" r ", key_style),
                Span::styled(" reference ", label_style),
                Span::styled(" g ", key_style),
                Span::styled(" generate ", label_style),
            ];
            if app.vision.canvas().generated_image.is_some() {
                hints.extend(vec![
                    Span::styled(" s ", key_style),
                    Span::styled(" save ", label_style),
                ]);
            }
            hints.extend(vec![
                Span::styled(" c ", key_style),
                Span::styled(" clear ", label_style),
            ]);
            hints
        }
        (Mode::Vision, InputMode::Editing) => {
            let action = match app.vision_field {
                VisionField::Prompt => " generate ",
                VisionField::ReferencePath => " load ",
            };
            vec![
                Span::styled(" Enter ", key_style),
                Span::styled(action, label_style),
                Span::styled(" Esc ", key_style),
                Span::styled(" stop typing ", label_style),
            ]
        }
    };

    hints.extend(vec![
        Span::styled(" ^T ", key_style),
        Span::styled(" switch ", label_style),
        Span::styled(" ^C ", key_style),
        Span::styled(" quit ", label_style),
    ]);

    if let Some(status) = &app.status_message {
        hints.push(Span::styled(
            format!("  {}", status),
            Style::default().bg(Color::Black).fg(Color::Yellow),
        ));
    }

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

/// Single-line input box that scrolls horizontally to keep the cursor visible
fn render_input(
    frame: &mut Frame,
    area: Rect,
    title: &str,
    text: &str,
    cursor: usize,
    focused: bool,
) {
    let border_color = if focused { Color::Yellow } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" {} ", title));

    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor = cursor.min(text.chars().count());
    let scroll_offset = if inner_width > 0 && cursor >= inner_width {
        cursor - inner_width + 1
    } else {
        0
    };

    let visible_text: String = text.chars().skip(scroll_offset).take(inner_width).collect();
    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);
    frame.render_widget(input, area);

    if focused {
        let cursor_x = (cursor - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [sidebar_area, chat_area] = Layout::horizontal([
        Constraint::Length(32),
        Constraint::Min(0),
    ])
    .areas(area);

    render_session_list(app, frame, sidebar_area);

    let [transcript_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(chat_area);

    // Store transcript dimensions for scroll calculations (inner size minus borders)
    app.transcript_height = transcript_area.height.saturating_sub(2);
    app.transcript_width = transcript_area.width.saturating_sub(2);

    render_transcript(app, frame, transcript_area);

    let editing = app.input_mode == InputMode::Editing;
    let title = match app.chat.state() {
        ChatState::Streaming => "Message (AION is answering)",
        ChatState::Idle => "Message",
    };
    render_input(frame, input_area, title, app.chat.input(), app.chat_cursor, editing);
}

fn render_session_list(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" Sessions ({}) ", app.chat.sessions().len()));

    if app.chat.sessions().is_empty() {
        let placeholder = Paragraph::new("No conversations yet.\nPress 'n' to start one.")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(placeholder, area);
        return;
    }

    let active_id = app.chat.active_id().map(str::to_string);
    let streaming_id = app.chat.streaming_session_id().map(str::to_string);

    let items: Vec<ListItem> = app
        .chat
        .sessions()
        .iter()
        .map(|session| {
            let is_active = active_id.as_deref() == Some(session.id.as_str());
            let marker = if streaming_id.as_deref() == Some(session.id.as_str()) {
                "~ "
            } else if is_active {
                "* "
            } else {
                "  "
            };
            let style = if is_active {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(vec![
                Line::from(Span::styled(format!("{}{}", marker, session.title), style)),
                Line::from(Span::styled(
                    format!(
                        "  {} · {} messages",
                        session.updated_at.format("%Y-%m-%d %H:%M"),
                        session.messages.len()
                    ),
                    Style::default().fg(Color::DarkGray),
                )),
            ])
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.session_state);
}

fn render_transcript(app: &App, frame: &mut Frame, area: Rect) {
    let title = app
        .chat
        .active_session()
        .map(|s| s.title.clone())
        .unwrap_or_else(|| "AION".to_string());
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(format!(" {} ", title));

    let messages = app.chat.messages();

    if messages.is_empty() {
        let mut lines = vec![
            Line::from(Span::styled(
                "How can I help you today?",
                Style::default().fg(Color::Cyan).bold(),
            )),
            Line::default(),
        ];
        for (i, suggestion) in app.chat.suggestions().iter().enumerate() {
            lines.push(Line::from(vec![
                Span::styled(format!(" {} ", i + 1), Style::default().bg(Color::DarkGray).fg(Color::White)),
                Span::raw(" "),
                Span::raw(*suggestion),
            ]));
        }
        let welcome = Paragraph::new(Text::from(lines))
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(welcome, area);
        return;
    }

    let streaming_here =
        app.chat.is_streaming() && app.chat.streaming_session_id() == app.chat.active_id();
    let last = messages.len() - 1;

    let mut lines: Vec<Line> = Vec::new();
    for (i, msg) in messages.iter().enumerate() {
        match msg.role {
            Role::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                for line in msg.content.lines() {
                    lines.push(Line::from(line.to_string()));
                }
            }
            Role::Model => {
                lines.push(Line::from(Span::styled(
                    "AION:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                if msg.content.is_empty() {
                    let text = if streaming_here && i == last {
                        format!("Thinking{}", ellipsis(app.animation_frame))
                    } else {
                        "(no response)".to_string()
                    };
                    lines.push(Line::from(Span::styled(
                        text,
                        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                    )));
                } else {
                    for line in msg.content.lines() {
                        lines.push(parse_markdown_line(line));
                    }
                }
            }
        }
        lines.push(Line::default());
    }

    let transcript = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.transcript_scroll, 0));

    frame.render_widget(transcript, area);
}

fn render_vision_screen(app: &App, frame: &mut Frame, area: Rect) {
    let [canvas_area, prompt_area, path_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(3),
    ])
    .areas(area);

    let [reference_area, result_area] = Layout::horizontal([
        Constraint::Percentage(50),
        Constraint::Percentage(50),
    ])
    .areas(canvas_area);

    render_reference_panel(app, frame, reference_area);
    render_result_panel(app, frame, result_area);

    let editing = app.input_mode == InputMode::Editing && app.vision.alert().is_none();
    render_input(
        frame,
        prompt_area,
        "Prompt",
        app.vision.prompt(),
        app.prompt_cursor,
        editing && app.vision_field == VisionField::Prompt,
    );
    render_input(
        frame,
        path_area,
        "Reference image path",
        &app.reference_path,
        app.reference_cursor,
        editing && app.vision_field == VisionField::ReferencePath,
    );
}

fn render_reference_panel(app: &App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Reference ");

    let text = match &app.vision.canvas().reference_image {
        Some(image) => Text::from(vec![
            Line::from(Span::styled("Reference loaded", Style::default().fg(Color::Green).bold())),
            Line::from(image.to_string()),
            Line::default(),
            Line::from(Span::styled(
                "The prompt describes how to edit it.",
                Style::default().fg(Color::DarkGray),
            )),
        ]),
        None => Text::from(vec![
            Line::from(Span::styled("No reference image", Style::default().fg(Color::DarkGray))),
            Line::default(),
            Line::from(Span::styled(
                "Press 'r' and enter a path to edit an existing image,\nor just describe a new one.",
                Style::default().fg(Color::DarkGray),
            )),
        ]),
    };

    let panel = Paragraph::new(text).block(block).wrap(Wrap { trim: true });
    frame.render_widget(panel, area);
}

fn render_result_panel(app: &App, frame: &mut Frame, area: Rect) {
    let generating = app.vision.is_generating();
    let border_color = if generating { Color::Yellow } else { Color::Cyan };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Result ");

    let canvas = app.vision.canvas();
    let mut lines: Vec<Line> = Vec::new();

    if generating {
        lines.push(Line::from(Span::styled(
            format!("Generating{}", ellipsis(app.animation_frame)),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC),
        )));
        lines.push(Line::default());
    }

    match &canvas.generated_image {
        Some(image) => {
            lines.push(Line::from(Span::styled("Image ready", Style::default().fg(Color::Green).bold())));
            lines.push(Line::from(image.to_string()));
            if let Some(caption) = &canvas.status_caption {
                lines.push(Line::default());
                for line in caption.lines() {
                    lines.push(parse_markdown_line(line));
                }
            }
            lines.push(Line::default());
            lines.push(Line::from(Span::styled(
                format!("Press 's' to save into {}", app.download_dir.display()),
                Style::default().fg(Color::DarkGray),
            )));
        }
        None if !generating => {
            lines.push(Line::from(Span::styled(
                "Describe an image and press 'g' to generate it.",
                Style::default().fg(Color::DarkGray),
            )));
        }
        None => {}
    }

    let panel = Paragraph::new(Text::from(lines)).block(block).wrap(Wrap { trim: true });
    frame.render_widget(panel, area);
}

fn render_alert(message: &str, frame: &mut Frame, area: Rect) {
    // Calculate popup size and position (centered)
    let popup_width = 50.min(area.width.saturating_sub(4));
    let popup_height = 5.min(area.height.saturating_sub(2));

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(" Error (Enter to dismiss) ");

    let alert = Paragraph::new(message.to_string())
        .style(Style::default().fg(Color::White))
        .wrap(Wrap { trim: true })
        .block(block);

    frame.render_widget(alert, popup_area);
}
