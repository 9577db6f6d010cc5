mod loading;
mod views;

use crate::{
    app::{AppCommand, AppEvent, AppState},
    types::AudioFormat,
    wizard::{Step, WizardEvent},
};
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{backend::Backend, Terminal};
use std::time::Duration;
use tokio::sync::mpsc::{error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::warn;

const TICK: Duration = Duration::from_millis(100);

enum KeyOutcome {
    Continue(Vec<AppCommand>),
    Quit,
}

pub fn run<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut AppState,
    event_rx: &mut UnboundedReceiver<AppEvent>,
    command_tx: UnboundedSender<AppCommand>,
) -> Result<()> {
    loop {
        loop {
            match event_rx.try_recv() {
                Ok(event) => {
                    let commands = app.handle_event(event);
                    send_all(&command_tx, commands);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!("controller channel closed");
                    return Ok(());
                }
            }
        }

        terminal.draw(|frame| views::render(frame, app))?;

        if event::poll(TICK)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match handle_key(app, key) {
                    KeyOutcome::Continue(commands) => send_all(&command_tx, commands),
                    KeyOutcome::Quit => break,
                }
            }
        }
    }
    Ok(())
}

fn send_all(command_tx: &UnboundedSender<AppCommand>, commands: Vec<AppCommand>) {
    for command in commands {
        if command_tx.send(command).is_err() {
            warn!("controller stopped accepting commands");
        }
    }
}

fn handle_key(app: &mut AppState, key: KeyEvent) -> KeyOutcome {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') => KeyOutcome::Quit,
            KeyCode::Char('r') => KeyOutcome::Continue(app.dispatch(WizardEvent::Reset)),
            KeyCode::Char('d') => KeyOutcome::Continue(app.dispatch(WizardEvent::DismissError)),
            _ => KeyOutcome::Continue(Vec::new()),
        };
    }

    let commands = match key.code {
        KeyCode::Esc => app.dispatch(WizardEvent::Back),
        _ => match app.step() {
            Step::Upload => upload_key(app, key.code),
            Step::Edit => edit_key(app, key.code),
            Step::Pick => pick_key(app, key.code),
            Step::Done => done_key(app, key.code),
            _ => Vec::new(),
        },
    };
    KeyOutcome::Continue(commands)
}

fn upload_key(app: &mut AppState, code: KeyCode) -> Vec<AppCommand> {
    match code {
        KeyCode::Enter => app.submit(),
        KeyCode::Tab => app.dispatch(WizardEvent::Forward),
        KeyCode::Backspace => app.backspace(),
        KeyCode::Char(ch) => app.type_char(ch),
        _ => Vec::new(),
    }
}

fn edit_key(app: &mut AppState, code: KeyCode) -> Vec<AppCommand> {
    match code {
        KeyCode::Enter => app.submit(),
        KeyCode::Tab => {
            app.cycle_field();
            Vec::new()
        }
        KeyCode::BackTab => app.dispatch(WizardEvent::Forward),
        KeyCode::Left => app.adjust_bpm(-1),
        KeyCode::Right => app.adjust_bpm(1),
        KeyCode::PageUp => app.adjust_bpm_coarse(true),
        KeyCode::PageDown => app.adjust_bpm_coarse(false),
        KeyCode::Backspace => app.backspace(),
        KeyCode::Char(ch) => app.type_char(ch),
        _ => Vec::new(),
    }
}

fn pick_key(app: &mut AppState, code: KeyCode) -> Vec<AppCommand> {
    match code {
        KeyCode::Up | KeyCode::Char('k') => {
            app.move_highlight(-1);
            Vec::new()
        }
        KeyCode::Down | KeyCode::Char('j') => {
            app.move_highlight(1);
            Vec::new()
        }
        KeyCode::Enter => app.submit(),
        KeyCode::Char(' ') | KeyCode::Char('p') => app.toggle_preview(),
        KeyCode::Char('m') => app.download_track(AudioFormat::Mp3),
        KeyCode::Char('w') => app.download_track(AudioFormat::Wav),
        KeyCode::Tab => app.dispatch(WizardEvent::Forward),
        _ => Vec::new(),
    }
}

fn done_key(app: &mut AppState, code: KeyCode) -> Vec<AppCommand> {
    match code {
        KeyCode::Char('d') => app.download_export(),
        KeyCode::Char('m') => app.download_track(AudioFormat::Mp3),
        KeyCode::Char('w') => app.download_track(AudioFormat::Wav),
        KeyCode::Char('r') => app.dispatch(WizardEvent::Reset),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, wizard::tests::wizard_at_pick};

    fn press(app: &mut AppState, code: KeyCode) -> Vec<AppCommand> {
        match handle_key(app, KeyEvent::new(code, KeyModifiers::NONE)) {
            KeyOutcome::Continue(commands) => commands,
            KeyOutcome::Quit => panic!("unexpected quit"),
        }
    }

    fn app_at_pick() -> AppState {
        let mut app = AppState::new(&AppConfig::with_download_dir("/tmp/vibesync".into()));
        app.wizard = wizard_at_pick();
        app
    }

    #[test]
    fn ctrl_c_quits() {
        let mut app = app_at_pick();
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert!(matches!(handle_key(&mut app, key), KeyOutcome::Quit));
    }

    #[test]
    fn pick_keys_move_and_download() {
        let mut app = app_at_pick();
        press(&mut app, KeyCode::Down);
        assert_eq!(app.highlighted, 1);
        press(&mut app, KeyCode::Up);
        press(&mut app, KeyCode::Up);
        assert_eq!(app.highlighted, app.wizard.variations().len() - 1);

        let commands = press(&mut app, KeyCode::Char('w'));
        let expected = app.highlighted_variation().unwrap().file_id.clone();
        assert_eq!(
            commands,
            vec![AppCommand::DownloadTrack { file_id: expected, format: AudioFormat::Wav }]
        );
    }

    #[test]
    fn escape_steps_back_to_edit() {
        let mut app = app_at_pick();
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.step(), Step::Edit);
    }

    #[test]
    fn ctrl_r_starts_over() {
        let mut app = app_at_pick();
        let key = KeyEvent::new(KeyCode::Char('r'), KeyModifiers::CONTROL);
        assert!(matches!(handle_key(&mut app, key), KeyOutcome::Continue(_)));
        assert_eq!(app.step(), Step::Upload);
        assert!(app.wizard.variations().is_empty());
    }

    #[test]
    fn every_step_has_key_hints() {
        for step in [Step::Upload, Step::Edit, Step::Pick, Step::Done, Step::Merging] {
            let hints = views::key_hints(step);
            assert!(hints.contains("Ctrl+C") || hints.contains("Esc"));
        }
    }
}
