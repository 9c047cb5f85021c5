//! Line input.
//!
//! The terminal runs in cooked mode, so input arrives a line at a time. A
//! line is typed into the composer and submitted; a few `:` words stand in
//! for the navigation keys a raw terminal would deliver.

use threadline_app::KeyInput;

/// Keys produced by one input line.
///
/// An empty line is a bare Enter, which opens the selected conversation.
pub fn keys_for_line(line: &str) -> Vec<KeyInput> {
    let line = line.trim_end_matches(['\r', '\n']);

    let navigation = match line.trim() {
        ":up" | ":k" => Some(KeyInput::Up),
        ":down" | ":j" => Some(KeyInput::Down),
        ":pgup" | ":older" => Some(KeyInput::PageUp),
        ":pgdn" => Some(KeyInput::PageDown),
        ":tab" => Some(KeyInput::Tab),
        ":esc" | ":back" => Some(KeyInput::Esc),
        _ => None,
    };
    if let Some(key) = navigation {
        return vec![key];
    }

    line.chars().map(KeyInput::Char).chain(std::iter::once(KeyInput::Enter)).collect()
}
