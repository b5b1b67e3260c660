//! Conversation engine — the onboarding state machine.
//!
//! `transition` is pure: no I/O, no clock, no randomness. The flow is
//! described by [`RULES`], a table of (state × input class) → (next state,
//! effect, reply). Adding a state or a step means adding rows, not branches.

use super::commands;
use super::profile::{Profile, profile_keys};
use super::prompts;
use super::state::ConversationState;

/// Coarse classification of user input used by the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputClass {
    /// Empty or whitespace-only.
    Blank,
    /// Anything else.
    Text,
}

impl InputClass {
    pub fn of(trimmed: &str) -> Self {
        if trimmed.is_empty() {
            Self::Blank
        } else {
            Self::Text
        }
    }
}

/// Result of one state-machine step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next_state: ConversationState,
    pub profile: Profile,
    pub reply: String,
    /// Whether `next_state` is terminal.
    pub terminal: bool,
}

#[derive(Debug, Clone, Copy)]
enum Effect {
    None,
    /// Store the trimmed input under this profile key.
    Store(&'static str),
}

#[derive(Debug, Clone, Copy)]
enum ReplyKind {
    Welcome,
    AskCategory,
    BrandNameReprompt,
    CategoryReprompt,
    SetupComplete,
    Command,
}

struct Rule {
    state: ConversationState,
    /// `None` matches any input class.
    input: Option<InputClass>,
    next: ConversationState,
    effect: Effect,
    reply: ReplyKind,
}

const RULES: &[Rule] = &[
    Rule {
        state: ConversationState::New,
        input: None,
        next: ConversationState::AwaitingBrandName,
        effect: Effect::None,
        reply: ReplyKind::Welcome,
    },
    Rule {
        state: ConversationState::AwaitingBrandName,
        input: Some(InputClass::Text),
        next: ConversationState::AwaitingCategory,
        effect: Effect::Store(profile_keys::BRAND_NAME),
        reply: ReplyKind::AskCategory,
    },
    Rule {
        state: ConversationState::AwaitingBrandName,
        input: Some(InputClass::Blank),
        next: ConversationState::AwaitingBrandName,
        effect: Effect::None,
        reply: ReplyKind::BrandNameReprompt,
    },
    Rule {
        state: ConversationState::AwaitingCategory,
        input: Some(InputClass::Text),
        next: ConversationState::Completed,
        effect: Effect::Store(profile_keys::CATEGORY),
        reply: ReplyKind::SetupComplete,
    },
    Rule {
        state: ConversationState::AwaitingCategory,
        input: Some(InputClass::Blank),
        next: ConversationState::AwaitingCategory,
        effect: Effect::None,
        reply: ReplyKind::CategoryReprompt,
    },
    Rule {
        state: ConversationState::Completed,
        input: None,
        next: ConversationState::Completed,
        effect: Effect::None,
        reply: ReplyKind::Command,
    },
];

fn find_rule(state: ConversationState, class: InputClass) -> Option<&'static Rule> {
    RULES
        .iter()
        .find(|rule| rule.state == state && rule.input.is_none_or(|c| c == class))
}

/// Compute the next state, profile and reply for one inbound message.
///
/// Total over its inputs: unmatched input leaves the state unchanged and
/// produces a re-prompt or generic reply.
pub fn transition(state: ConversationState, profile: &Profile, input: &str) -> Transition {
    let input = input.trim();
    let class = InputClass::of(input);

    let Some(rule) = find_rule(state, class) else {
        return Transition {
            next_state: state,
            profile: profile.clone(),
            reply: prompts::HOW_CAN_I_HELP.to_string(),
            terminal: state.is_terminal(),
        };
    };

    let mut profile = profile.clone();
    if let Effect::Store(key) = rule.effect {
        profile.set(key, input);
    }

    let reply = match rule.reply {
        ReplyKind::Welcome => prompts::WELCOME.to_string(),
        ReplyKind::AskCategory => prompts::ask_category(input),
        ReplyKind::BrandNameReprompt => prompts::BRAND_NAME_REPROMPT.to_string(),
        ReplyKind::CategoryReprompt => prompts::CATEGORY_REPROMPT.to_string(),
        ReplyKind::SetupComplete => prompts::setup_complete(&profile),
        ReplyKind::Command => commands::dispatch(input, &profile),
    };

    Transition {
        next_state: rule.next,
        terminal: rule.next.is_terminal(),
        profile,
        reply,
    }
}
