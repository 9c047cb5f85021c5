//! Slash commands typed into the composer.

use threadline_core::{ServerId, Tab, UserId};

/// Parsed slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/open <user>`
    Open(UserId),
    /// `/close`
    Close,
    /// `/pin [user]`, defaulting to the open or selected conversation.
    Pin(Option<UserId>),
    /// `/fav [user]`, defaulting to the open or selected conversation.
    Favorite(Option<UserId>),
    /// `/search [text]`; no text clears the search.
    Search(String),
    /// `/tab all|fav`
    Tab(Tab),
    /// `/edit <message> <text>`
    Edit(ServerId, String),
    /// `/delete <message>`
    Delete(ServerId),
    /// `/older`
    Older,
    /// `/refresh`
    Refresh,
    /// `/help`
    Help,
    /// `/quit` or `/q`
    Quit,
}

/// One-line summary of the commands.
pub(crate) const HELP: &str = "/open <id> /close /pin [id] /fav [id] /search [text] /tab all|fav \
                               /edit <msg> <text> /delete <msg> /older /refresh /quit";

impl Command {
    /// Parse the text after the leading `/`.
    ///
    /// Returns a usage string when the command is unknown or malformed.
    pub fn parse(input: &str) -> Result<Self, &'static str> {
        let input = input.trim();
        let (name, rest) = input.split_once(char::is_whitespace).unwrap_or((input, ""));
        let rest = rest.trim();

        match name {
            "open" => rest.parse().map(Self::Open).map_err(|_| "Usage: /open <user_id>"),
            "close" => Ok(Self::Close),
            "pin" => optional_user(rest).map(Self::Pin).ok_or("Usage: /pin [user_id]"),
            "fav" | "favorite" => {
                optional_user(rest).map(Self::Favorite).ok_or("Usage: /fav [user_id]")
            },
            "search" => Ok(Self::Search(rest.to_owned())),
            "tab" => match rest {
                "all" => Ok(Self::Tab(Tab::All)),
                "fav" | "favorites" => Ok(Self::Tab(Tab::Favorites)),
                _ => Err("Usage: /tab all|fav"),
            },
            "edit" => {
                let (id, body) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                match id.parse() {
                    Ok(id) if !body.trim().is_empty() => Ok(Self::Edit(id, body.trim().to_owned())),
                    _ => Err("Usage: /edit <message_id> <text>"),
                }
            },
            "delete" | "del" => {
                rest.parse().map(Self::Delete).map_err(|_| "Usage: /delete <message_id>")
            },
            "older" => Ok(Self::Older),
            "refresh" => Ok(Self::Refresh),
            "help" => Ok(Self::Help),
            "quit" | "q" => Ok(Self::Quit),
            _ => Err(HELP),
        }
    }
}

/// `None` when `rest` is present but not a user id.
fn optional_user(rest: &str) -> Option<Option<UserId>> {
    if rest.is_empty() { Some(None) } else { rest.parse().ok().map(Some) }
}
