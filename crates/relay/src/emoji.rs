//! Rewrites custom emoji references the bot cannot render.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::outbound::EmojiDirectory;

#[allow(clippy::expect_used)]
static CUSTOM_EMOJI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<a?:(\w{2,32}):\d{17,20}>").expect("custom emoji pattern is valid")
});

/// Swap every `<a?:name:id>` for an emoji of the same name the bot knows, or
/// `:name:` when there is none.
pub fn fix_emojis(content: &str, directory: &dyn EmojiDirectory) -> String {
    CUSTOM_EMOJI
        .replace_all(content, |caps: &Captures<'_>| {
            let name = &caps[1];
            directory
                .find_by_name(name)
                .map_or_else(|| format!(":{name}:"), |emoji| emoji.reference())
        })
        .into_owned()
}
