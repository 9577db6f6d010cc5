use super::loading;
use crate::{
    app::{AppState, EditField},
    wizard::Step,
};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame,
};

const PROGRESS_LABELS: [&str; 4] = ["Upload", "Edit", "Pick", "Done"];

pub fn render(frame: &mut Frame, app: &AppState) {
    let error_height = if app.wizard.error().is_some() { 3 } else { 0 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(error_height),
            Constraint::Min(8),
            Constraint::Length(10),
            Constraint::Length(1),
        ])
        .split(frame.size());

    render_header(frame, chunks[0], app);
    if let Some(error) = app.wizard.error() {
        render_error(frame, chunks[1], error);
    }
    match app.step() {
        Step::Upload => render_upload(frame, chunks[2], app),
        Step::Edit => render_edit(frame, chunks[2], app),
        Step::Pick => render_pick(frame, chunks[2], app),
        Step::Done => render_done(frame, chunks[2], app),
        busy => render_loading(frame, chunks[2], app, busy),
    }
    render_status(frame, chunks[3], app);
    render_footer(frame, chunks[4], app.step());
}

fn render_header(frame: &mut Frame, area: Rect, app: &AppState) {
    let position = app.step().position();
    let mut spans = Vec::new();
    for (index, label) in PROGRESS_LABELS.iter().enumerate() {
        if index > 0 {
            spans.push(Span::styled(" > ", Style::default().fg(Color::DarkGray)));
        }
        let style = if index == position {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else if index < position {
            Style::default().fg(Color::Green)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(format!("{}. {label}", index + 1), style));
    }

    let credits = match app.credits {
        Some(0) => Span::styled("  No credits remaining", Style::default().fg(Color::Red)),
        Some(credits) => Span::styled(
            format!("  Credits: {credits}"),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        None => Span::styled("  Credits: ...", Style::default().fg(Color::DarkGray)),
    };
    spans.push(credits);

    let block = Block::default().borders(Borders::ALL).title("VibeSync");
    frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn render_error(frame: &mut Frame, area: Rect, error: &str) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(Span::styled("Error (Ctrl+D to dismiss)", Style::default().fg(Color::Red)));
    let paragraph = Paragraph::new(error)
        .style(Style::default().fg(Color::Red))
        .wrap(Wrap { trim: true })
        .block(block);
    frame.render_widget(paragraph, area);
}

fn render_upload(frame: &mut Frame, area: Rect, app: &AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(3)])
        .split(area);

    let title = if app.wizard.is_validating() { "Video path (checking...)" } else { "Video path" };
    let input = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));
    frame.render_widget(Paragraph::new(app.upload_input.as_str()).block(input), chunks[0]);

    let mut lines = vec![
        Line::from("Drop in a short clip and VibeSync scores it."),
        Line::from(Span::styled(
            "MP4, MOV, WebM or AVI, up to 50MB and 30 seconds.",
            Style::default().fg(Color::Gray),
        )),
    ];
    if let Some(video) = app.wizard.video() {
        lines.push(Line::from(""));
        lines.push(Line::from(format!(
            "Last upload: {} ({:.1}MB, {:.1}s)",
            video.file_name,
            video.size_bytes as f64 / (1024.0 * 1024.0),
            video.duration_seconds
        )));
        lines.push(Line::from(Span::styled(
            video.preview_url.to_string(),
            Style::default().fg(Color::DarkGray),
        )));
    }
    let hint = Block::default().borders(Borders::ALL).title("Upload");
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }).block(hint), chunks[1]);
}

fn field_block(title: &'static str, focused: bool) -> Block<'static> {
    let color = if focused { Color::Yellow } else { Color::DarkGray };
    Block::default().borders(Borders::ALL).title(title).border_style(Style::default().fg(color))
}

fn render_edit(frame: &mut Frame, area: Rect, app: &AppState) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);
    let fields = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(4), Constraint::Length(3), Constraint::Length(3)])
        .split(columns[0]);

    let composition = app.wizard.composition();
    let focus = app.edit_field;
    frame.render_widget(
        Paragraph::new(composition.prompt.as_str())
            .wrap(Wrap { trim: false })
            .block(field_block(EditField::Prompt.label(), focus == EditField::Prompt)),
        fields[0],
    );
    frame.render_widget(
        Paragraph::new(composition.negative_prompt.as_str()).block(field_block(
            EditField::NegativePrompt.label(),
            focus == EditField::NegativePrompt,
        )),
        fields[1],
    );
    frame.render_widget(
        Paragraph::new(format!("{} BPM", composition.bpm))
            .block(field_block(EditField::Bpm.label(), focus == EditField::Bpm)),
        fields[2],
    );

    let mut lines = Vec::new();
    if let Some(analysis) = app.wizard.analysis() {
        lines.push(Line::from(vec![
            Span::styled("Mood ", Style::default().fg(Color::Gray)),
            Span::raw(analysis.overall_mood.clone()),
            Span::styled("  Key ", Style::default().fg(Color::Gray)),
            Span::raw(analysis.key.clone()),
        ]));
        lines.push(Line::from(vec![
            Span::styled("Arc ", Style::default().fg(Color::Gray)),
            Span::raw(analysis.energy_arc.clone()),
        ]));
        let mix = match analysis.audio_profile.recommended_mix_mode() {
            Some(mode) => format!("{} ({})", mode.as_str(), mode.description()),
            None => analysis.audio_profile.recommended_mix.clone(),
        };
        lines.push(Line::from(vec![
            Span::styled("Mix ", Style::default().fg(Color::Gray)),
            Span::raw(mix),
        ]));
        lines.push(Line::from(""));
        for segment in &analysis.segments {
            lines.push(Line::from(format!(
                "{:>4.1}-{:<4.1}s ({:.1}s) {} / {}",
                segment.start_seconds,
                segment.end_seconds,
                segment.duration_seconds(),
                segment.energy,
                segment.mood
            )));
            lines.push(Line::from(Span::styled(
                format!("  {}", segment.musical_suggestion),
                Style::default().fg(Color::DarkGray),
            )));
        }
    }
    let block = Block::default().borders(Borders::ALL).title("Analysis");
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }).block(block), columns[1]);
}

fn render_pick(frame: &mut Frame, area: Rect, app: &AppState) {
    let items: Vec<ListItem> = app
        .wizard
        .variations()
        .iter()
        .enumerate()
        .map(|(index, variation)| {
            let highlighted = index == app.highlighted;
            let marker = if app.playing.as_deref() == Some(variation.file_id.as_str()) {
                "> playing"
            } else {
                ""
            };
            let style = if highlighted {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            let cursor = if highlighted { "> " } else { "  " };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{cursor}{}. {}", index + 1, variation.style_label), style),
                Span::styled(
                    format!("  {:.0}s", variation.duration_seconds),
                    Style::default().fg(Color::Gray),
                ),
                Span::styled(format!("  {marker}"), Style::default().fg(Color::Green)),
            ]))
        })
        .collect();

    let block = Block::default().borders(Borders::ALL).title("Choose a variation");
    frame.render_widget(List::new(items).block(block), area);
}

fn render_done(frame: &mut Frame, area: Rect, app: &AppState) {
    let mut lines = vec![Line::from(Span::styled(
        "Your video is scored.",
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
    ))];
    if let Some(selected) = app.wizard.selected() {
        lines.push(Line::from(format!("Track: {}", selected.style_label)));
    }
    if let Some(export) = app.wizard.export() {
        lines.push(Line::from(format!("Length: {:.1}s", export.duration_seconds)));
        lines.push(Line::from(Span::styled(
            export.video_url.clone(),
            Style::default().fg(Color::Cyan),
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        format!("Downloads go to {}", app.download_dir.display()),
        Style::default().fg(Color::Gray),
    )));

    let block = Block::default().borders(Borders::ALL).title("Done");
    frame.render_widget(
        Paragraph::new(lines).alignment(Alignment::Center).wrap(Wrap { trim: true }).block(block),
        area,
    );
}

fn render_loading(frame: &mut Frame, area: Rect, app: &AppState, step: Step) {
    let elapsed = app.step_elapsed();
    let current = loading::stage_index(step, elapsed);
    let mut lines = vec![Line::from("")];
    for (index, stage) in loading::stages(step).iter().enumerate() {
        let line = if index < current {
            Span::styled(format!("  done  {stage}"), Style::default().fg(Color::Green))
        } else if index == current {
            Span::styled(
                format!("  {}     {stage}...", loading::spinner_frame(elapsed)),
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )
        } else {
            Span::styled(format!("        {stage}"), Style::default().fg(Color::DarkGray))
        };
        lines.push(Line::from(line));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        format!("{}s elapsed", elapsed.as_secs()),
        Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
    )));

    let block = Block::default().borders(Borders::ALL).title(step.label());
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_status(frame: &mut Frame, area: Rect, app: &AppState) {
    let lines: Vec<Line> = if app.status_lines.is_empty() {
        vec![Line::from(Span::styled("Nothing yet.", Style::default().fg(Color::DarkGray)))]
    } else {
        app.status_lines
            .iter()
            .map(|line| {
                let color = if line.is_error { Color::Red } else { Color::White };
                Line::from(vec![
                    Span::styled(
                        line.timestamp.format("%H:%M:%S ").to_string(),
                        Style::default().fg(Color::DarkGray),
                    ),
                    Span::styled(line.message.clone(), Style::default().fg(color)),
                ])
            })
            .collect()
    };
    let block = Block::default().borders(Borders::ALL).title("Status");
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }).block(block), area);
}

fn render_footer(frame: &mut Frame, area: Rect, step: Step) {
    let footer = Paragraph::new(key_hints(step))
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::DIM));
    frame.render_widget(footer, area);
}

pub fn key_hints(step: Step) -> &'static str {
    match step {
        Step::Upload => "Enter upload | Tab forward | Ctrl+R start over | Ctrl+C quit",
        Step::Edit => concat!(
            "Enter generate | Tab next field | Left/Right BPM | PgUp/PgDn BPM x10",
            " | Shift+Tab forward | Esc back"
        ),
        Step::Pick => concat!(
            "Up/Down choose | Space preview | Enter merge | m/w save MP3/WAV",
            " | Tab forward | Esc back"
        ),
        Step::Done => "d save video | m/w save MP3/WAV | r start over | Esc back | Ctrl+C quit",
        _ => "Esc cancel | Ctrl+C quit",
    }
}
