//! Terminal-agnostic keyboard input.

/// Keyboard input abstraction.
///
/// Decouples application logic from terminal libraries, enabling
/// deterministic simulation testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    /// Printable character.
    Char(char),
    /// Enter/Return key (send, run command or open the selection).
    Enter,
    /// Backspace key (delete character before cursor).
    Backspace,
    /// Delete key (delete character at cursor).
    Delete,
    /// Tab key (switch between all and favorites).
    Tab,
    /// Escape key (close conversation, clear search, quit).
    Esc,
    /// Left arrow key.
    Left,
    /// Right arrow key.
    Right,
    /// Up arrow key (previous conversation).
    Up,
    /// Down arrow key (next conversation).
    Down,
    /// Page up (scroll messages towards older).
    PageUp,
    /// Page down (scroll messages towards newer).
    PageDown,
    /// Home key (cursor to start).
    Home,
    /// End key (cursor to end).
    End,
}
