use super::{FormattedMessage, join_system};
use crate::types::{ConversationMessage, Role};

/// Where a structured backend expects the system prompt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SystemPlacement {
    /// First entry of the message list
    #[default]
    Leading,
    /// Dedicated field beside the message list
    TopLevel,
}

/// Shape of a structured-message backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageStyle {
    pub system: SystemPlacement,
    /// Backend accepts a `tool` role
    pub tool_role: bool,
}

impl Default for MessageStyle {
    fn default() -> Self {
        Self {
            system: SystemPlacement::Leading,
            tool_role: true,
        }
    }
}

impl MessageStyle {
    pub const fn top_level() -> Self {
        Self {
            system: SystemPlacement::TopLevel,
            tool_role: false,
        }
    }
}

pub(super) fn render(
    style: MessageStyle,
    system: Option<String>,
    turns: &[ConversationMessage],
) -> (Option<String>, Vec<FormattedMessage>) {
    let mut messages = Vec::with_capacity(turns.len() + 1);

    match style.system {
        SystemPlacement::Leading => {
            if let Some(system) = system {
                messages.push(FormattedMessage {
                    role: Role::System,
                    content: system,
                    tool_call_id: None,
                });
            }
            messages.extend(turns.iter().map(|turn| entry(style, turn)));
            (None, messages)
        }
        SystemPlacement::TopLevel => {
            let mut system_parts = vec![system];
            for turn in turns {
                if turn.role == Role::System {
                    system_parts.push(Some(turn.content.clone()));
                } else {
                    messages.push(entry(style, turn));
                }
            }
            let system = join_system(system_parts.iter().map(Option::as_deref));
            (system, messages)
        }
    }
}

fn entry(style: MessageStyle, turn: &ConversationMessage) -> FormattedMessage {
    if turn.role == Role::Tool && !style.tool_role {
        return FormattedMessage {
            role: Role::Assistant,
            content: turn.content.clone(),
            tool_call_id: None,
        };
    }

    FormattedMessage {
        role: turn.role,
        content: turn.content.clone(),
        tool_call_id: turn.tool_call_id.clone(),
    }
}
