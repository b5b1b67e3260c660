//! Reply texts sent by the bot.

use super::profile::Profile;

pub const WELCOME: &str =
    "Welcome to ReceiptBot! Let's set up your brand. What is your Brand Name?";

pub const BRAND_NAME_REPROMPT: &str =
    "I didn't catch that. Please reply with your Brand Name to continue.";

pub const CATEGORY_REPROMPT: &str =
    "Please reply with your business category (for example: Bakery, Retail, Consulting).";

pub const PONG: &str = "pong";

pub const HOW_CAN_I_HELP: &str =
    "You're all set up! How can I help? Send \"help\" to see what I can do.";

/// Generic apology sent when a message could not be processed.
pub const GENERIC_FAILURE: &str = "Sorry, an error occurred. Please try again later.";

pub fn ask_category(brand_name: &str) -> String {
    format!("Great, {brand_name}! What category best describes your business?")
}

pub fn setup_complete(profile: &Profile) -> String {
    let brand = profile.brand_name().unwrap_or("your brand");
    let category = profile.category().unwrap_or("your category");
    format!("All done! {brand} is set up under {category}. Send \"help\" any time to see what I can do.")
}

pub fn help() -> String {
    [
        "Here's what I can do:",
        "- ping: check that I'm online",
        "- profile: show your brand details",
        "- help: show this message",
    ]
    .join("\n")
}

pub fn profile_summary(profile: &Profile) -> String {
    format!(
        "Brand: {}\nCategory: {}",
        profile.brand_name().unwrap_or("(not set)"),
        profile.category().unwrap_or("(not set)"),
    )
}
