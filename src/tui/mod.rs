//! # TUI Adapter
//!
//! The ratatui-specific layer: owns the outer loop, translates keyboard
//! events against the current mode, and repaints when anything changed.
//!
//! One iteration of the outer loop:
//!
//! ```text
//! poll transport (≤10ms) ──apply──▶ store writes
//! poll input     (≤10ms) ──handle─▶ store writes / mode switches
//! drain dispatch queue   ──react──▶ more store writes, socket sends
//! anything changed?      ──────────▶ full repaint
//! ```
//!
//! The drain always runs to completion before the repaint, so a frame never
//! observes state mid-reaction. Terminal resize skips the store entirely and
//! just forces the repaint.

pub mod event;
pub mod ui;
pub mod wrap;

use std::iter;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use log::info;

use crate::core::config::Config;
use crate::core::dispatch::Dispatcher;
use crate::net::{NetEvent, NetHandle};
use crate::store::{keys, Mode, Store, StoreError};
use crate::AppError;
use event::TuiEvent;

const TRANSPORT_POLL: Duration = Duration::from_millis(10);
const INPUT_POLL: Duration = Duration::from_millis(10);

enum Flow {
    Continue,
    Redraw,
    Quit,
}

pub fn run(config: Config) -> Result<(), AppError> {
    let store = Store::open(&config.db_path)?;
    let mut dispatcher = Dispatcher::standard(store.queue());

    let (net_tx, net_rx) = mpsc::channel();
    let mut net = NetHandle::new(&config, net_tx);
    net.start();

    let mut terminal = ratatui::init();
    let result = event_loop(&mut terminal, &store, &mut dispatcher, &mut net, &net_rx);
    ratatui::restore();
    result
}

fn event_loop(
    terminal: &mut ratatui::DefaultTerminal,
    store: &Store,
    dispatcher: &mut Dispatcher,
    net: &mut NetHandle,
    net_rx: &mpsc::Receiver<NetEvent>,
) -> Result<(), AppError> {
    let mut needs_redraw = true; // force first frame
    loop {
        if needs_redraw {
            let size = terminal.size()?;
            let data = ui::build_frame(store, size.height)?;
            terminal.draw(|f| ui::draw(f, &data))?;
            needs_redraw = false;
        }

        // Transport poll: network callbacks all land here, on this thread.
        match net_rx.recv_timeout(TRANSPORT_POLL) {
            Ok(net_event) => {
                net.apply_event(store, net_event)?;
                while let Ok(net_event) = net_rx.try_recv() {
                    net.apply_event(store, net_event)?;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            // NetHandle keeps a sender, so this arm is unreachable in
            // practice.
            Err(RecvTimeoutError::Disconnected) => {}
        }

        // Input poll: drain all pending events before the next draw.
        let mut quit = false;
        let first = event::poll_event(INPUT_POLL);
        for tui_event in first.into_iter().chain(iter::from_fn(event::poll_event_immediate)) {
            match handle_event(store, tui_event)? {
                Flow::Continue => {}
                Flow::Redraw => needs_redraw = true,
                Flow::Quit => quit = true,
            }
        }

        if dispatcher.drain(store, net)? {
            needs_redraw = true;
        }

        if quit {
            info!("quit requested");
            return Ok(());
        }
    }
}

/// Interpret one input event against the current mode.
fn handle_event(store: &Store, event: TuiEvent) -> Result<Flow, StoreError> {
    match event {
        TuiEvent::Resize => return Ok(Flow::Redraw),
        TuiEvent::ForceQuit => return Ok(Flow::Quit),
        // Escape returns to normal from anywhere.
        TuiEvent::Escape => {
            store.set_mode(Mode::Normal)?;
            return Ok(Flow::Continue);
        }
        _ => {}
    }

    match store.mode()? {
        Mode::Normal => handle_normal(store, event),
        Mode::Insert => {
            if event == TuiEvent::Enter {
                compose_message(store)?;
            } else {
                edit_buffer(store, keys::INPUT_BUFFER, keys::INPUT_CURSOR, &event)?;
            }
            Ok(Flow::Continue)
        }
        Mode::Search => {
            // Enter filters only: the live search text already narrows the
            // conversation list, so there is nothing to submit.
            if event != TuiEvent::Enter {
                edit_buffer(store, keys::SEARCH_BUFFER, keys::SEARCH_CURSOR, &event)?;
            }
            Ok(Flow::Continue)
        }
    }
}

fn handle_normal(store: &Store, event: TuiEvent) -> Result<Flow, StoreError> {
    match event {
        TuiEvent::Char('i') => store.set_mode(Mode::Insert)?,
        TuiEvent::Char('/') => store.set_mode(Mode::Search)?,
        TuiEvent::Char('w') => select_step(store, false)?,
        TuiEvent::Char('s') => select_step(store, true)?,
        TuiEvent::Char('q') => return Ok(Flow::Quit),
        _ => {}
    }
    Ok(Flow::Continue)
}

/// Move the selection along the list's precomputed neighbour links.
///
/// At the ends the selection stays put. A dangling or absent selection
/// restarts at rank 0.
fn select_step(store: &Store, forward: bool) -> Result<(), StoreError> {
    let target = match store.selected_conversation()? {
        Some(id) => match store.list_entry(&id)? {
            Some(entry) => {
                if forward {
                    entry.next_id
                } else {
                    entry.prev_id
                }
            }
            None => store.first_list_entry()?.map(|e| e.id),
        },
        None => store.first_list_entry()?.map(|e| e.id),
    };
    if let Some(id) = target {
        store.set_selected_conversation(&id)?;
    }
    Ok(())
}

/// Shared editor routine for the insert and search buffers.
///
/// Operates on growable codepoint sequences; the cursor is a codepoint
/// index, clamped into the buffer on every use.
fn edit_buffer(
    store: &Store,
    buffer_key: &str,
    cursor_key: &str,
    event: &TuiEvent,
) -> Result<(), StoreError> {
    let mut buffer: Vec<char> = store.kv_or(buffer_key, "")?.chars().collect();
    let mut cursor = (store.kv_int(cursor_key, 0)?.max(0) as usize).min(buffer.len());
    let start_cursor = cursor;
    let mut buffer_changed = false;

    match event {
        TuiEvent::Left => cursor = cursor.saturating_sub(1),
        TuiEvent::Right => cursor = (cursor + 1).min(buffer.len()),
        TuiEvent::Home => cursor = 0,
        TuiEvent::End => cursor = buffer.len(),
        TuiEvent::Backspace => {
            if cursor > 0 {
                buffer.remove(cursor - 1);
                cursor -= 1;
                buffer_changed = true;
            }
        }
        TuiEvent::Delete => {
            if cursor < buffer.len() {
                buffer.remove(cursor);
                buffer_changed = true;
            }
        }
        TuiEvent::Char(c) => {
            buffer.insert(cursor, *c);
            cursor += 1;
            buffer_changed = true;
        }
        _ => return Ok(()),
    }

    if buffer_changed {
        let text: String = buffer.iter().collect();
        store.set_kv(buffer_key, &text)?;
    }
    if cursor != start_cursor {
        store.set_kv_int(cursor_key, cursor as i64)?;
    }
    Ok(())
}

/// Compose the insert buffer into a pending message, then clear the buffer.
///
/// The message is stored pending/unacknowledged even when no socket is
/// active; the pending transmitter picks it up once one is.
fn compose_message(store: &Store) -> Result<(), StoreError> {
    let Some(conversation) = store.selected_conversation()? else {
        return Ok(());
    };
    let body = store.kv_or(keys::INPUT_BUFFER, "")?;
    if body.is_empty() {
        return Ok(());
    }
    let author = store.current_user()?.unwrap_or_default();
    let ts = chrono::Utc::now().timestamp().to_string();
    store.insert_local_message(&conversation, &author, &body, &ts)?;
    store.set_kv(keys::INPUT_BUFFER, "")?;
    store.set_kv_int(keys::INPUT_CURSOR, 0)?;
    Ok(())
}
