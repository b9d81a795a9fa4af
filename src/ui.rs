use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use roleplay_core::input::{InputController, TextInput};
use roleplay_core::models::{Feedback, Scenario};
use roleplay_core::session::SessionState;
use roleplay_core::state::Speaker;
use crate::app::{App, AuthAction, InputMode, LoginField, Screen, SimulationView, ADMIN_FIELDS};

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

    match app.screen {
        Screen::Login => render_login_screen(app, frame, body_area),
        Screen::Dashboard => render_dashboard_screen(app, frame, body_area),
        Screen::Simulation => render_simulation_screen(app, frame, body_area),
        Screen::Admin => render_admin_screen(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);

    if let Some(notice) = &app.notice {
        render_notice(notice, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let user = match (&app.config.username, app.api.is_authenticated()) {
        (Some(name), true) => format!(" [{}]", name),
        _ => String::new(),
    };

    let title = Line::from(vec![
        Span::styled(" Roleplay Trainer ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(user, Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
        Span::styled(
            format!("voice: {}", app.config.voice_mode.as_str()),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.screen {
        Screen::Login => " LOGIN ",
        Screen::Dashboard => " SCENARIOS ",
        Screen::Simulation => " TRAINING ",
        Screen::Admin => " ADMIN ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);
    let hint = |key: &'static str, label: &'static str| {
        [
            Span::styled(format!(" {} ", key), key_style),
            Span::styled(format!(" {} ", label), label_style),
        ]
    };

    let mut hints: Vec<Span> = Vec::new();
    if app.notice.is_some() {
        hints.extend(hint("Enter", "dismiss"));
    } else {
        match (app.screen, app.input_mode) {
            (Screen::Login, _) => {
                hints.extend(hint("Tab", "field"));
                hints.extend(hint("Enter", "submit"));
                hints.extend(hint(
                    "^R",
                    match app.auth_action {
                        AuthAction::Login => "register instead",
                        AuthAction::Register => "log in instead",
                    },
                ));
                hints.extend(hint("Esc", "quit"));
            }
            (Screen::Dashboard, _) => {
                hints.extend(hint("j/k", "nav"));
                hints.extend(hint("Enter", "start"));
                hints.extend(hint("r", "refresh"));
                hints.extend(hint("a", "admin"));
                hints.extend(hint("v", "voice"));
                hints.extend(hint("L", "logout"));
                hints.extend(hint("q", "quit"));
            }
            (Screen::Simulation, InputMode::Normal) => {
                let (concluded, speech, recording) = app
                    .simulation
                    .as_ref()
                    .map(|v| (v.is_concluded(), v.input.is_speech(), v.input.is_recording()))
                    .unwrap_or((false, false, false));
                hints.extend(hint("j/k", "scroll"));
                if recording {
                    hints.extend(hint("Space", "stop"));
                } else if !concluded {
                    if speech {
                        hints.extend(hint("Space", "record"));
                        hints.extend(hint("t", "type"));
                    } else {
                        hints.extend(hint("i", "type"));
                        hints.extend(hint("t", "speak"));
                    }
                    hints.extend(hint("e", "end & analyze"));
                    hints.extend(hint("v", "voice"));
                }
                hints.extend(hint("Esc", "scenarios"));
            }
            (Screen::Simulation, InputMode::Editing) => {
                hints.extend(hint("Enter", "send"));
                hints.extend(hint("^E", "end & analyze"));
                hints.extend(hint("Esc", "stop typing"));
            }
            (Screen::Admin, InputMode::Normal) => {
                hints.extend(hint("i", "edit form"));
                hints.extend(hint("j/k", "nav"));
                hints.extend(hint("Esc", "scenarios"));
                hints.extend(hint("q", "quit"));
            }
            (Screen::Admin, InputMode::Editing) => {
                hints.extend(hint("Tab", "next field"));
                hints.extend(hint("^S", "create"));
                hints.extend(hint("Esc", "stop editing"));
            }
        }
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

/// Centered rectangle of at most `width` x `height` inside `area`.
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(2));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

fn ellipsis(app: &App) -> String {
    // Animated ellipsis: cycles through ".", "..", "..."
    ".".repeat((app.animation_frame as usize) + 1)
}

/// Single-line input box with horizontal scrolling. Returns the cursor position.
fn render_text_input(
    frame: &mut Frame,
    area: Rect,
    input: &TextInput,
    block: Block,
    masked: bool,
) -> (u16, u16) {
    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = input.cursor();

    // Calculate scroll offset to keep cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = if masked {
        "*".repeat(input.value().chars().count().saturating_sub(scroll_offset).min(inner_width))
    } else {
        input.value().chars().skip(scroll_offset).take(inner_width).collect()
    };

    let paragraph = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);
    frame.render_widget(paragraph, area);

    let cursor_x = (cursor_pos - scroll_offset) as u16;
    (area.x + cursor_x + 1, area.y + 1)
}

fn render_login_screen(app: &App, frame: &mut Frame, area: Rect) {
    let popup = centered(area, 50, 12);

    let title = match app.auth_action {
        AuthAction::Login => " Log in ",
        AuthAction::Register => " Create account ",
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(title);
    let inner = block.inner(popup);
    frame.render_widget(block, popup);

    let [user_area, pass_area, status_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Min(0),
    ])
    .areas(inner);

    let field_block = |label: &'static str, focused: bool| {
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(if focused { Color::Yellow } else { Color::DarkGray }))
            .title(label)
    };

    let user_cursor = render_text_input(
        frame,
        user_area,
        &app.username_input,
        field_block(" Username ", app.login_focus == LoginField::Username),
        false,
    );
    let pass_cursor = render_text_input(
        frame,
        pass_area,
        &app.password_input,
        field_block(" Password ", app.login_focus == LoginField::Password),
        true,
    );

    let status = if app.auth_pending {
        Span::styled(
            format!("Contacting {}{}", app.api.base_url(), ellipsis(app)),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )
    } else {
        Span::styled(
            format!("Server: {}", app.api.base_url()),
            Style::default().fg(Color::DarkGray),
        )
    };
    frame.render_widget(Paragraph::new(Line::from(status)), status_area);

    if app.notice.is_none() && !app.auth_pending {
        frame.set_cursor_position(match app.login_focus {
            LoginField::Username => user_cursor,
            LoginField::Password => pass_cursor,
        });
    }
}

fn scenario_details(scenario: &Scenario) -> Text<'_> {
    let label = |s: &'static str| {
        Line::from(Span::styled(s, Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)))
    };

    let mut lines = vec![
        Line::from(Span::styled(
            scenario.title.as_str(),
            Style::default().fg(Color::Cyan).bold(),
        )),
        Line::default(),
        label("Goal"),
        Line::from(scenario.goal.as_str()),
        Line::default(),
    ];
    if !scenario.customer_persona.is_empty() {
        lines.push(label("Customer"));
        lines.push(Line::from(scenario.customer_persona.as_str()));
        lines.push(Line::default());
    }
    if !scenario.required_keywords.is_empty() {
        lines.push(label("Keywords to use"));
        lines.push(Line::from(scenario.required_keywords.join(", ")));
    }
    Text::from(lines)
}

fn render_dashboard_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [list_area, detail_area] = Layout::horizontal([
        Constraint::Percentage(40),
        Constraint::Percentage(60),
    ])
    .areas(area);
    app.list_area = Some(list_area);

    let title = if app.scenarios_loading {
        format!(" Scenarios (loading{}) ", ellipsis(app))
    } else {
        format!(" Scenarios ({}) ", app.scenarios.len())
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(title);

    if app.scenarios.is_empty() {
        let message = if app.scenarios_loading {
            ""
        } else {
            "No scenarios yet.\nPress 'a' to create one."
        };
        let placeholder = Paragraph::new(message)
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(placeholder, list_area);
    } else {
        let items: Vec<ListItem> = app
            .scenarios
            .iter()
            .map(|s| ListItem::new(format!(" {} ", s.title)))
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

        frame.render_stateful_widget(list, list_area, &mut app.scenario_state);
    }

    let detail_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Brief ");
    let detail = match app.selected_scenario() {
        Some(scenario) => Paragraph::new(scenario_details(scenario)),
        None => Paragraph::new("Select a scenario to see its brief")
            .style(Style::default().fg(Color::DarkGray)),
    };
    frame.render_widget(detail.block(detail_block).wrap(Wrap { trim: true }), detail_area);
}

fn render_simulation_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let animation = ellipsis(app);
    let editing = app.input_mode == InputMode::Editing;
    let notice_open = app.notice.is_some();
    let Some(view) = app.simulation.as_mut() else {
        return;
    };

    if view.is_concluded() {
        app.chat_area = Some(area);
        render_feedback(view, frame, area);
        return;
    }

    // Split layout: conversation on the left, scenario brief on the right
    let [chat_column, brief_area] = Layout::horizontal([
        Constraint::Percentage(65),
        Constraint::Percentage(35),
    ])
    .areas(area);
    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(chat_column);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    view.chat_height = chat_area.height.saturating_sub(2);
    view.chat_width = chat_area.width.saturating_sub(2);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(format!(" {} ", view.scenario.title));

    let mut lines: Vec<Line> = Vec::new();
    for turn in view.session.transcript().iter() {
        let (label, color) = match turn.speaker {
            Speaker::User => ("You:", Color::Cyan),
            Speaker::Ai => ("AI:", Color::Yellow),
        };
        lines.push(Line::from(Span::styled(
            label,
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )));
        for line in turn.text.lines() {
            lines.push(Line::from(line.to_string()));
        }
        lines.push(Line::default());
    }

    match view.session.state() {
        SessionState::AwaitingResponse => {
            lines.push(Line::from(Span::styled(
                "AI:",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            lines.push(Line::from(Span::styled(
                format!("AI is thinking{}", animation),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }
        SessionState::Analyzing => {
            lines.push(Line::from(Span::styled(
                format!("Analyzing your performance{}", animation),
                Style::default().fg(Color::Magenta).add_modifier(Modifier::ITALIC),
            )));
        }
        SessionState::Active | SessionState::Concluded => {}
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: true })
        .scroll((view.scroll, 0));
    frame.render_widget(chat, chat_area);

    match &view.input {
        InputController::Text(input) => {
            let border_color = if editing { Color::Yellow } else { Color::DarkGray };
            let block = Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border_color))
                .title(" Say something (i to type) ");
            let cursor = render_text_input(frame, input_area, input, block, false);

            // Show cursor when editing
            if editing && !notice_open {
                frame.set_cursor_position(cursor);
            }
        }
        InputController::Speech(speech) => {
            let block = Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Magenta))
                .title(" Voice input ");
            let status = if speech.is_recording() {
                Span::styled(
                    format!("● Recording{}", animation),
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                )
            } else {
                Span::styled(
                    "Press Space to start speaking",
                    Style::default().fg(Color::DarkGray),
                )
            };
            frame.render_widget(Paragraph::new(Line::from(status)).block(block), input_area);
        }
    }

    let brief_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Brief ");
    let brief = Paragraph::new(scenario_details(&view.scenario))
        .block(brief_block)
        .wrap(Wrap { trim: true });
    frame.render_widget(brief, brief_area);

    app.chat_area = Some(chat_area);
}

fn feedback_text(feedback: &Feedback) -> Text<'_> {
    let heading = |s: &'static str| {
        Line::from(Span::styled(s, Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)))
    };

    let (verdict, color) = if feedback.goal_achieved {
        ("✓ Goal achieved", Color::Green)
    } else {
        ("✗ Goal not achieved", Color::Red)
    };

    let mut lines = vec![
        Line::from(Span::styled(verdict, Style::default().fg(color).bold())),
        Line::default(),
    ];

    let scores = feedback.score_lines();
    if !scores.is_empty() {
        lines.push(heading("Scores"));
        for (name, value) in scores {
            lines.push(Line::from(vec![
                Span::styled(format!("  {}: ", name), Style::default().fg(Color::Cyan)),
                Span::raw(value),
            ]));
        }
        lines.push(Line::default());
    }

    if !feedback.keywords_usage.is_empty() {
        lines.push(heading("Keywords used"));
        for keyword in &feedback.keywords_usage {
            lines.push(Line::from(format!("  • {}", keyword)));
        }
        lines.push(Line::default());
    }

    if let Some(goal_feedback) = &feedback.feedback_on_goal {
        lines.push(heading("On the goal"));
        lines.push(Line::from(goal_feedback.as_str()));
        lines.push(Line::default());
    }

    lines.push(heading("Overall assessment"));
    lines.push(Line::from(feedback.overall_assessment.as_str()));
    Text::from(lines)
}

fn render_feedback(view: &SimulationView, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green))
        .title(format!(" Feedback: {} ", view.scenario.title));

    let text = match view.session.feedback() {
        Some(feedback) => feedback_text(feedback),
        None => Text::from("No feedback available"),
    };

    let paragraph = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((view.scroll, 0));
    frame.render_widget(paragraph, area);
}

fn render_admin_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [form_area, list_area] = Layout::horizontal([
        Constraint::Percentage(55),
        Constraint::Percentage(45),
    ])
    .areas(area);
    app.list_area = Some(list_area);

    let editing = app.input_mode == InputMode::Editing;
    let title = if app.admin_pending {
        format!(" New scenario (saving{}) ", ellipsis(app))
    } else {
        " New scenario ".to_string()
    };
    let form_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if editing { Color::Yellow } else { Color::Cyan }))
        .title(title);
    let inner = form_block.inner(form_area);
    frame.render_widget(form_block, form_area);

    let field_areas = Layout::vertical([Constraint::Length(3); ADMIN_FIELDS.len()]).split(inner);
    let mut cursor = None;
    for (i, (label, input)) in ADMIN_FIELDS.iter().zip(app.admin_inputs.iter()).enumerate() {
        let focused = editing && i == app.admin_focus;
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(if focused { Color::Yellow } else { Color::DarkGray }))
            .title(format!(" {} ", label));
        let position = render_text_input(frame, field_areas[i], input, block, false);
        if focused {
            cursor = Some(position);
        }
    }
    if let (Some(position), None) = (cursor, &app.notice) {
        frame.set_cursor_position(position);
    }

    let list_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" Existing scenarios ({}) ", app.admin_scenarios.len()));

    let items: Vec<ListItem> = app
        .admin_scenarios
        .iter()
        .map(|s| {
            ListItem::new(vec![
                Line::from(Span::styled(
                    format!("#{} {}", s.id, s.title),
                    Style::default().fg(Color::Yellow).bold(),
                )),
                Line::from(Span::styled(
                    s.goal.chars().take(60).collect::<String>(),
                    Style::default().fg(Color::DarkGray),
                )),
            ])
        })
        .collect();

    let list = List::new(items)
        .block(list_block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, list_area, &mut app.admin_state);
}

fn render_notice(notice: &str, frame: &mut Frame, area: Rect) {
    let width = 60u16;
    // Rough wrap estimate plus borders and the hint line
    let text_lines = (notice.chars().count() as u16 / width.saturating_sub(4).max(1)) + 1;
    let popup_area = centered(area, width, text_lines + 4);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Notice ");

    let text = Text::from(vec![
        Line::from(notice.to_string()),
        Line::default(),
        Line::from(Span::styled(
            "Press Enter to continue",
            Style::default().fg(Color::DarkGray),
        )),
    ]);

    let paragraph = Paragraph::new(text).block(block).wrap(Wrap { trim: true });
    frame.render_widget(paragraph, popup_area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{backend::TestBackend, Terminal};
    use roleplay_core::{ApiClient, Config};
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn buffer_text(terminal: &Terminal<TestBackend>) -> String {
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[tokio::test]
    async fn test_login_screen_renders_server() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let api = ApiClient::new("http://127.0.0.1:1", None, Duration::from_secs(1)).unwrap();
        let mut app = App::new(Config::new(), dir.path().join("config.json"), api, tx, None);

        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();

        let text = buffer_text(&terminal);
        assert!(text.contains("Log in"));
        assert!(text.contains("http://127.0.0.1:1"));
    }

    #[test]
    fn test_feedback_text_lists_scores_and_keywords() {
        let mut scores = BTreeMap::new();
        scores.insert("clarity_score".to_string(), serde_json::json!(7));
        let feedback = Feedback {
            goal_achieved: true,
            keywords_usage: vec!["budget".into()],
            feedback_on_goal: None,
            overall_assessment: "Great work!".into(),
            scores,
        };

        let rendered: Vec<String> = feedback_text(&feedback)
            .lines
            .iter()
            .map(|line| line.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect();

        assert_eq!(rendered[0], "✓ Goal achieved");
        assert!(rendered.iter().any(|l| l == "  Clarity Score: 7/10"));
        assert!(rendered.iter().any(|l| l == "  • budget"));
        assert!(rendered.iter().any(|l| l == "Great work!"));
    }
}
