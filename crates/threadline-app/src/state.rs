//! Observable application state types.
//!
//! These structures are the view model of the application: the session
//! state, the composer line and the message viewport. They hold only what
//! rendering needs.

use threadline_core::{ScrollAnchor, UserId};

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not started, or torn down.
    Offline,
    /// Started for the viewer.
    Online {
        /// Viewer user id.
        viewer: UserId,
    },
}

/// Single-line message composer.
///
/// The cursor counts characters, not bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Composer {
    buffer: String,
    cursor: usize,
}

impl Composer {
    /// Current text.
    pub fn text(&self) -> &str {
        &self.buffer
    }

    /// Cursor position in characters.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Whether nothing has been typed.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Insert a character at the cursor.
    pub fn insert(&mut self, c: char) {
        let at = self.byte_index(self.cursor);
        self.buffer.insert(at, c);
        self.cursor += 1;
    }

    /// Delete the character before the cursor.
    pub fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        let at = self.byte_index(self.cursor);
        self.buffer.remove(at);
    }

    /// Delete the character at the cursor.
    pub fn delete(&mut self) {
        if self.cursor < self.len() {
            let at = self.byte_index(self.cursor);
            self.buffer.remove(at);
        }
    }

    /// Move the cursor one character left.
    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    /// Move the cursor one character right.
    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.len());
    }

    /// Move the cursor to the start.
    pub fn home(&mut self) {
        self.cursor = 0;
    }

    /// Move the cursor to the end.
    pub fn end(&mut self) {
        self.cursor = self.len();
    }

    /// Take the text and reset.
    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.buffer)
    }

    fn len(&self) -> usize {
        self.buffer.chars().count()
    }

    fn byte_index(&self, chars: usize) -> usize {
        self.buffer.char_indices().nth(chars).map_or(self.buffer.len(), |(index, _)| index)
    }
}

/// Message viewport, one row per message.
///
/// `offset` is the number of rows between the top of the content and the top
/// of the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    offset: usize,
    rows: usize,
    content_height: usize,
}

impl Viewport {
    /// Empty viewport showing `rows` rows.
    pub fn new(rows: usize) -> Self {
        Self { offset: 0, rows: rows.max(1), content_height: 0 }
    }

    /// Rows between the top of the content and the viewport.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Visible rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Content height in rows.
    pub fn content_height(&self) -> usize {
        self.content_height
    }

    /// Largest offset that still fills the viewport.
    pub fn max_offset(&self) -> usize {
        self.content_height.saturating_sub(self.rows)
    }

    /// Whether the newest row is visible.
    pub fn at_bottom(&self) -> bool {
        self.offset >= self.max_offset()
    }

    /// Scroll towards older rows. Returns whether the offset changed.
    pub fn scroll_up(&mut self, rows: usize) -> bool {
        let before = self.offset;
        self.offset = self.offset.saturating_sub(rows);
        before != self.offset
    }

    /// Scroll towards newer rows. Returns whether the offset changed.
    pub fn scroll_down(&mut self, rows: usize) -> bool {
        let before = self.offset;
        self.offset = (self.offset + rows).min(self.max_offset());
        before != self.offset
    }

    /// Jump to the newest row.
    pub fn to_bottom(&mut self) {
        self.offset = self.max_offset();
    }

    /// Change the number of visible rows.
    pub fn resize(&mut self, rows: usize) {
        let was_bottom = self.at_bottom();
        self.rows = rows.max(1);
        if was_bottom {
            self.to_bottom();
        } else {
            self.offset = self.offset.min(self.max_offset());
        }
    }

    /// Apply a new content height.
    ///
    /// With `keep_anchor` the rows in view stay in view after content was
    /// prepended. Otherwise a viewport at the bottom follows new rows.
    pub fn set_content(&mut self, height: usize, keep_anchor: bool) {
        if keep_anchor {
            let anchor = ScrollAnchor::capture(self.content_height, self.offset);
            self.content_height = height;
            self.offset = anchor.restore(height).min(self.max_offset());
            return;
        }

        let was_bottom = self.at_bottom();
        self.content_height = height;
        if was_bottom {
            self.to_bottom();
        } else {
            self.offset = self.offset.min(self.max_offset());
        }
    }

    /// Reset for a newly opened conversation.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.content_height = 0;
    }
}
