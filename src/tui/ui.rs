//! The renderer: store contents in, grid cells out.
//!
//! Rendering is a full repaint with no diffing: [`build_frame`] snapshots
//! everything the frame needs from the store (and nudges the band window so
//! the selection stays visible), and [`draw`] paints it. Splitting the two
//! keeps store errors out of the draw closure and makes frames testable.
//!
//! Screen layout, bottom up: the active mode's input buffer on the last row,
//! a one-row mode indicator above it, and the remaining rows shared between
//! the conversation band (left) and the message pane (right) with a small
//! author gutter between them.

use ratatui::layout::Position;
use ratatui::style::{Color, Style};
use ratatui::Frame;
use unicode_width::UnicodeWidthChar;

use crate::store::{keys, ListEntry, Mode, Store, StoreError, StoredMessage};
use crate::tui::wrap::wrap;

/// Columns reserved for the conversation band.
const BAND_WIDTH: u16 = 20;
/// Columns reserved for the author gutter (1 padding + 9 name).
const AUTHOR_WIDTH: u16 = 10;

const STATUS_STYLE: Style = Style::new().fg(Color::Indexed(232)).bg(Color::Indexed(255));
const INPUT_STYLE: Style = Style::new().fg(Color::Indexed(232)).bg(Color::Indexed(255));
const BAND_STYLE: Style = Style::new().fg(Color::Indexed(254)).bg(Color::Indexed(53));
const BAND_SELECTED_STYLE: Style = Style::new().fg(Color::Indexed(254)).bg(Color::Indexed(54));
const AUTHOR_STYLE: Style = Style::new().fg(Color::Indexed(232)).bg(Color::Indexed(255));
const MESSAGE_FG: Color = Color::Indexed(232);
const MESSAGE_FG_UNACKED: Color = Color::Indexed(245);
const MESSAGE_BG: Color = Color::Indexed(255);
const MESSAGE_BG_ALT: Color = Color::Indexed(254);

/// Everything one frame needs, snapshotted from the store.
pub struct FrameData {
    pub mode: Mode,
    /// The active mode's text buffer and cursor index (codepoints).
    pub buffer: Vec<char>,
    pub cursor: usize,
    /// The visible window of the conversation list, in rank order.
    pub entries: Vec<ListEntry>,
    pub selected: Option<String>,
    /// Messages of the selected conversation, reverse-chronological.
    pub messages: Vec<StoredMessage>,
}

/// Snapshot the store for one frame of the given terminal size.
///
/// Adjusts the band window in place when the selection has moved outside the
/// visible band; that write is captured like any other and settles on the
/// next drain.
pub fn build_frame(store: &Store, height: u16) -> Result<FrameData, StoreError> {
    let band_height = i64::from(height.saturating_sub(2));

    let mode = store.mode()?;
    let (buffer_key, cursor_key) = match mode {
        Mode::Search => (keys::SEARCH_BUFFER, keys::SEARCH_CURSOR),
        _ => (keys::INPUT_BUFFER, keys::INPUT_CURSOR),
    };
    let buffer: Vec<char> = store.kv_or(buffer_key, "")?.chars().collect();
    let cursor = store.kv_int(cursor_key, 0)?.clamp(0, buffer.len() as i64) as usize;

    let selected = store.selected_conversation()?;

    // Keep the selected entry inside the visible band. A dangling selection
    // has no rank and leaves the window alone.
    if band_height > 0
        && let Some(id) = &selected
        && let Some(entry) = store.list_entry(id)?
    {
        let window_start = store.kv_int(keys::WINDOW_START, 0)?;
        if entry.rank - window_start >= band_height {
            store.set_kv_int(keys::WINDOW_START, entry.rank - (band_height - 1))?;
        } else if entry.rank < window_start {
            store.set_kv_int(keys::WINDOW_START, entry.rank)?;
        }
    }
    let window_start = store.kv_int(keys::WINDOW_START, 0)?;

    let entries = if band_height > 0 {
        store.list_entries(window_start, band_height)?
    } else {
        Vec::new()
    };
    // A dangling selection renders as an empty pane.
    let messages = match &selected {
        Some(id) if store.conversation_exists(id)? => store.messages_for(id)?,
        _ => Vec::new(),
    };

    Ok(FrameData { mode, buffer, cursor, entries, selected, messages })
}

/// Truncate to at most `cells` display columns and pad with spaces to
/// exactly that many.
fn pad_to(text: &str, cells: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > cells {
            break;
        }
        out.push(ch);
        used += w;
    }
    for _ in used..cells {
        out.push(' ');
    }
    out
}

/// Paint one frame from the snapshot.
pub fn draw(frame: &mut Frame, data: &FrameData) {
    let area = frame.area();
    if area.height < 2 || area.width == 0 {
        return;
    }
    let width = area.width;
    let height = area.height;
    let band_height = height - 2;

    let buf = frame.buffer_mut();

    // Conversation band, top down.
    for j in 0..band_height {
        let entry = data.entries.get(j as usize);
        let selected = matches!(
            (entry, &data.selected),
            (Some(entry), Some(selected)) if entry.id == *selected
        );
        let style = if selected { BAND_SELECTED_STYLE } else { BAND_STYLE };
        let name = entry.map(|e| e.display_name.as_str()).unwrap_or("");
        buf.set_string(0, j, pad_to(name, BAND_WIDTH as usize), style);
    }

    // Message pane, bottom up in reverse-chronological order.
    if width > BAND_WIDTH + AUTHOR_WIDTH {
        let author_x = BAND_WIDTH;
        let text_x = BAND_WIDTH + AUTHOR_WIDTH;
        let text_width = (width - text_x) as usize;

        let mut next_bottom = i32::from(band_height) - 1;
        let mut alternate = false;
        for message in &data.messages {
            if next_bottom < 0 {
                break;
            }
            let codepoints: Vec<char> = message.body.chars().collect();
            let lines = wrap(&codepoints, text_width);
            let line_count = lines.len() as i32;
            let fg = if message.acknowledged { MESSAGE_FG } else { MESSAGE_FG_UNACKED };
            let bg = if alternate { MESSAGE_BG_ALT } else { MESSAGE_BG };
            let author = message
                .author_name
                .as_deref()
                .or(message.author.as_deref())
                .unwrap_or("");

            for (k, line) in lines.iter().enumerate() {
                let y = next_bottom - line_count + 1 + k as i32;
                if y < 0 || y >= i32::from(band_height) {
                    continue;
                }
                let y = y as u16;
                // Author name only on the message's first row, offset one
                // column for readability.
                let gutter = if k == 0 { author } else { "" };
                buf.set_string(author_x, y, " ", AUTHOR_STYLE);
                buf.set_string(
                    author_x + 1,
                    y,
                    pad_to(gutter, AUTHOR_WIDTH as usize - 1),
                    AUTHOR_STYLE,
                );
                let text: String = line.iter().collect();
                buf.set_string(
                    text_x,
                    y,
                    pad_to(&text, text_width),
                    Style::new().fg(fg).bg(bg),
                );
            }
            next_bottom -= line_count;
            // background alternates per logical message, not per line
            alternate = !alternate;
        }
    }

    // Mode indicator.
    buf.set_string(0, height - 2, pad_to(data.mode.as_str(), width as usize), STATUS_STYLE);

    // Input row with the cursor at the buffer's cursor index.
    let input: String = data.buffer.iter().collect();
    buf.set_string(0, height - 1, pad_to(&input, width as usize), INPUT_STYLE);
    let cursor_x = (data.cursor as u16).min(width - 1);
    frame.set_cursor_position(Position::new(cursor_x, height - 1));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ConversationRow, Store};
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    fn row_text(terminal: &Terminal<TestBackend>, y: u16) -> String {
        let buffer = terminal.backend().buffer();
        (0..buffer.area.width)
            .map(|x| buffer[(x, y)].symbol().to_string())
            .collect()
    }

    fn seeded_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .replace_conversations(&[
                ConversationRow {
                    id: "C1".into(),
                    name: "apple".into(),
                    is_member: true,
                    is_dm: false,
                    peer: None,
                },
                ConversationRow {
                    id: "C2".into(),
                    name: "zebra".into(),
                    is_member: true,
                    is_dm: false,
                    peer: None,
                },
            ])
            .unwrap();
        store.rebuild_conversation_list("").unwrap();
        store
    }

    #[test]
    fn draws_band_status_and_input_rows() {
        let store = seeded_store();
        store.set_selected_conversation("C1").unwrap();
        store.set_kv(keys::INPUT_BUFFER, "typing here").unwrap();
        store.set_kv_int(keys::INPUT_CURSOR, 6).unwrap();

        let backend = TestBackend::new(60, 10);
        let mut terminal = Terminal::new(backend).unwrap();
        let data = build_frame(&store, 10).unwrap();
        terminal.draw(|f| draw(f, &data)).unwrap();

        assert!(row_text(&terminal, 0).starts_with("apple"));
        assert!(row_text(&terminal, 1).starts_with("zebra"));
        assert!(row_text(&terminal, 8).starts_with("normal"));
        assert!(row_text(&terminal, 9).starts_with("typing here"));
    }

    #[test]
    fn messages_fill_bottom_up_with_author_on_first_row() {
        let store = seeded_store();
        store.set_selected_conversation("C1").unwrap();
        // 30 columns of text width on an 80-wide terminal; this body wraps
        // onto two rows.
        let long_body = "a ".repeat(30);
        store
            .insert_remote_message("message", "C1", Some("U1"), long_body.trim_end(), "2")
            .unwrap();
        store
            .insert_remote_message("message", "C1", Some("U1"), "newest", "3")
            .unwrap();

        let backend = TestBackend::new(80, 10);
        let mut terminal = Terminal::new(backend).unwrap();
        let data = build_frame(&store, 10).unwrap();
        terminal.draw(|f| draw(f, &data)).unwrap();

        // Newest message sits on the bottom pane row (y = 7), author at x 31.
        let bottom = row_text(&terminal, 7);
        assert!(bottom[30..].trim_start().starts_with("U1"));
        assert!(bottom.contains("newest"));

        // The older, wrapped message occupies the two rows above; the author
        // appears only on its first row.
        assert!(row_text(&terminal, 5)[30..].trim_start().starts_with("U1"));
        assert_eq!(row_text(&terminal, 6)[30..40].trim(), "");
    }

    #[test]
    fn selection_below_the_band_scrolls_the_window() {
        let store = Store::open_in_memory().unwrap();
        let rows: Vec<ConversationRow> = (0..10)
            .map(|i| ConversationRow {
                id: format!("C{i}"),
                name: format!("chan-{i:02}"),
                is_member: true,
                is_dm: false,
                peer: None,
            })
            .collect();
        store.replace_conversations(&rows).unwrap();
        store.rebuild_conversation_list("").unwrap();

        // Band of 3 rows (height 5); selecting rank 6 must move the window
        // so the selection becomes the last visible row.
        store.set_selected_conversation("C6").unwrap();
        let data = build_frame(&store, 5).unwrap();
        assert_eq!(store.kv_int(keys::WINDOW_START, 0).unwrap(), 4);
        assert_eq!(data.entries.first().unwrap().display_name, "chan-04");
        assert_eq!(data.entries.last().unwrap().display_name, "chan-06");

        // Selecting above the window snaps the window to the selection.
        store.set_selected_conversation("C1").unwrap();
        build_frame(&store, 5).unwrap();
        assert_eq!(store.kv_int(keys::WINDOW_START, 0).unwrap(), 1);
    }

    #[test]
    fn dangling_selection_renders_without_entries_or_window_motion() {
        let store = seeded_store();
        store.set_selected_conversation("GONE").unwrap();

        let backend = TestBackend::new(40, 6);
        let mut terminal = Terminal::new(backend).unwrap();
        let data = build_frame(&store, 6).unwrap();
        terminal.draw(|f| draw(f, &data)).unwrap();

        assert_eq!(store.kv_int(keys::WINDOW_START, 0).unwrap(), 0);
        assert!(data.messages.is_empty());
    }

    #[test]
    fn search_mode_draws_the_search_buffer() {
        let store = seeded_store();
        store.set_mode(Mode::Search).unwrap();
        store.set_kv(keys::SEARCH_BUFFER, "zeb").unwrap();
        store.set_kv_int(keys::SEARCH_CURSOR, 3).unwrap();

        let backend = TestBackend::new(40, 6);
        let mut terminal = Terminal::new(backend).unwrap();
        let data = build_frame(&store, 6).unwrap();
        terminal.draw(|f| draw(f, &data)).unwrap();

        assert!(row_text(&terminal, 4).starts_with("search"));
        assert!(row_text(&terminal, 5).starts_with("zeb"));
    }

    #[test]
    fn pad_to_truncates_and_pads_by_display_width() {
        assert_eq!(pad_to("abc", 5), "abc  ");
        assert_eq!(pad_to("abcdef", 4), "abcd");
        assert_eq!(pad_to("", 3), "   ");
    }
}
