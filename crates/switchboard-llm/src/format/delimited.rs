use std::borrow::Cow;

use switchboard_config::CustomTemplate;

use crate::types::{ConversationMessage, Role};

/// Literal text around one turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnDelimiters {
    pub prefix: Cow<'static, str>,
    pub suffix: Cow<'static, str>,
}

impl TurnDelimiters {
    pub const fn new(prefix: &'static str, suffix: &'static str) -> Self {
        Self {
            prefix: Cow::Borrowed(prefix),
            suffix: Cow::Borrowed(suffix),
        }
    }

    fn owned(prefix: &str, suffix: &str) -> Self {
        Self {
            prefix: Cow::Owned(prefix.to_owned()),
            suffix: Cow::Owned(suffix.to_owned()),
        }
    }

    fn wrap(&self, out: &mut String, content: &str) {
        out.push_str(&self.prefix);
        out.push_str(content);
        out.push_str(&self.suffix);
    }
}

/// How a family renders system text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemSlot {
    /// Separate system turn
    Turn(TurnDelimiters),
    /// Wrapped and prepended to the next user turn
    FoldIntoUser(TurnDelimiters),
}

/// Delimiter table for one raw-text template family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimiterSet {
    pub name: Cow<'static, str>,
    /// Emitted once before the first turn
    pub preamble: Cow<'static, str>,
    pub system: SystemSlot,
    pub user: TurnDelimiters,
    pub assistant: TurnDelimiters,
    /// Tool turns render as assistant turns when absent
    pub tool: Option<TurnDelimiters>,
    /// Open assistant marker closing every prompt
    pub generation_prompt: Cow<'static, str>,
    pub stop: Vec<Cow<'static, str>>,
}

impl DelimiterSet {
    pub fn from_custom(custom: &CustomTemplate) -> Self {
        let system = TurnDelimiters::owned(&custom.system_prefix, &custom.system_suffix);
        let tool = custom.tool_prefix.as_deref().map(|prefix| {
            TurnDelimiters::owned(prefix, custom.tool_suffix.as_deref().unwrap_or_default())
        });

        Self {
            name: Cow::Borrowed("custom"),
            preamble: Cow::Owned(custom.preamble.clone()),
            system: if custom.fold_system {
                SystemSlot::FoldIntoUser(system)
            } else {
                SystemSlot::Turn(system)
            },
            user: TurnDelimiters::owned(&custom.user_prefix, &custom.user_suffix),
            assistant: TurnDelimiters::owned(&custom.assistant_prefix, &custom.assistant_suffix),
            tool,
            generation_prompt: Cow::Owned(
                custom
                    .generation_prompt
                    .clone()
                    .unwrap_or_else(|| custom.assistant_prefix.clone()),
            ),
            stop: custom.stop.iter().cloned().map(Cow::Owned).collect(),
        }
    }

    pub fn default_stop(&self) -> Vec<String> {
        self.stop.iter().map(|s| s.to_string()).collect()
    }

    /// Concatenate turns and finish with the generation prompt
    pub(super) fn render(&self, system: Option<String>, turns: &[ConversationMessage]) -> String {
        let mut out = String::from(self.preamble.as_ref());
        let mut pending_system = None;

        match (&self.system, system) {
            (SystemSlot::Turn(delimiters), Some(system)) => delimiters.wrap(&mut out, &system),
            (SystemSlot::FoldIntoUser(_), Some(system)) => pending_system = Some(system),
            (_, None) => {}
        }

        for turn in turns {
            match turn.role {
                Role::System => match self.system {
                    SystemSlot::Turn(ref delimiters) => delimiters.wrap(&mut out, &turn.content),
                    SystemSlot::FoldIntoUser(_) => {
                        pending_system = Some(match pending_system.take() {
                            Some(existing) => format!("{existing}\n\n{}", turn.content),
                            None => turn.content.clone(),
                        });
                    }
                },
                Role::User => {
                    let content = self.fold(pending_system.take(), &turn.content);
                    self.user.wrap(&mut out, &content);
                }
                Role::Assistant => self.assistant.wrap(&mut out, &turn.content),
                Role::Tool => self
                    .tool
                    .as_ref()
                    .unwrap_or(&self.assistant)
                    .wrap(&mut out, &turn.content),
            }
        }

        // system text with no user turn after it still reaches the model
        if let Some(system) = pending_system {
            let content = self.fold(Some(system), "");
            self.user.wrap(&mut out, &content);
        }

        out.push_str(&self.generation_prompt);
        out
    }

    fn fold<'a>(&self, system: Option<String>, content: &'a str) -> Cow<'a, str> {
        match (system, &self.system) {
            (Some(system), SystemSlot::FoldIntoUser(delimiters)) => {
                let mut folded = String::new();
                delimiters.wrap(&mut folded, &system);
                folded.push_str(content);
                Cow::Owned(folded)
            }
            _ => Cow::Borrowed(content),
        }
    }
}
