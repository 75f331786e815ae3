//! Built-in delimiter tables

use std::borrow::Cow;

use switchboard_config::TemplateName;

use super::delimited::{DelimiterSet, SystemSlot, TurnDelimiters};

const fn turn(prefix: &'static str, suffix: &'static str) -> TurnDelimiters {
    TurnDelimiters::new(prefix, suffix)
}

fn stops(stop: &[&'static str]) -> Vec<Cow<'static, str>> {
    stop.iter().copied().map(Cow::Borrowed).collect()
}

impl DelimiterSet {
    /// Table for a named template; `None` for `messages` and `custom`
    pub fn builtin(template: TemplateName) -> Option<Self> {
        let set = match template {
            TemplateName::Llama2 => Self {
                name: Cow::Borrowed("llama2"),
                preamble: Cow::Borrowed(""),
                system: SystemSlot::FoldIntoUser(turn("<<SYS>>\n", "\n<</SYS>>\n\n")),
                user: turn("<s>[INST] ", " "),
                assistant: turn("[/INST] ", "</s>"),
                tool: None,
                generation_prompt: Cow::Borrowed("[/INST]"),
                stop: stops(&["</s>", "[INST]"]),
            },
            TemplateName::Mistral => Self {
                name: Cow::Borrowed("mistral"),
                preamble: Cow::Borrowed("<s>"),
                system: SystemSlot::FoldIntoUser(turn("", "\n\n")),
                user: turn("[INST] ", " "),
                assistant: turn("[/INST] ", "</s>"),
                tool: None,
                generation_prompt: Cow::Borrowed("[/INST]"),
                stop: stops(&["</s>", "[INST]"]),
            },
            TemplateName::Chatml => Self {
                name: Cow::Borrowed("chatml"),
                preamble: Cow::Borrowed(""),
                system: SystemSlot::Turn(turn("<|im_start|>system\n", "<|im_end|>\n")),
                user: turn("<|im_start|>user\n", "<|im_end|>\n"),
                assistant: turn("<|im_start|>assistant\n", "<|im_end|>\n"),
                tool: Some(turn("<|im_start|>tool\n", "<|im_end|>\n")),
                generation_prompt: Cow::Borrowed("<|im_start|>assistant\n"),
                stop: stops(&["<|im_end|>", "<|im_start|>"]),
            },
            TemplateName::Llama3 => Self {
                name: Cow::Borrowed("llama3"),
                preamble: Cow::Borrowed("<|begin_of_text|>"),
                system: SystemSlot::Turn(turn("<|start_header_id|>system<|end_header_id|>\n\n", "<|eot_id|>")),
                user: turn("<|start_header_id|>user<|end_header_id|>\n\n", "<|eot_id|>"),
                assistant: turn("<|start_header_id|>assistant<|end_header_id|>\n\n", "<|eot_id|>"),
                tool: Some(turn("<|start_header_id|>ipython<|end_header_id|>\n\n", "<|eot_id|>")),
                generation_prompt: Cow::Borrowed("<|start_header_id|>assistant<|end_header_id|>\n\n"),
                stop: stops(&["<|eot_id|>", "<|end_of_text|>"]),
            },
            TemplateName::Gemma => Self {
                name: Cow::Borrowed("gemma"),
                preamble: Cow::Borrowed("<bos>"),
                system: SystemSlot::FoldIntoUser(turn("", "\n\n")),
                user: turn("<start_of_turn>user\n", "<end_of_turn>\n"),
                assistant: turn("<start_of_turn>model\n", "<end_of_turn>\n"),
                tool: None,
                generation_prompt: Cow::Borrowed("<start_of_turn>model\n"),
                stop: stops(&["<end_of_turn>"]),
            },
            TemplateName::RoleTags => Self {
                name: Cow::Borrowed("role_tags"),
                preamble: Cow::Borrowed(""),
                system: SystemSlot::Turn(turn("<|system|>\n", "\n")),
                user: turn("<|user|>\n", "\n"),
                assistant: turn("<|assistant|>\n", "\n"),
                tool: None,
                generation_prompt: Cow::Borrowed("<|assistant|>\n"),
                stop: stops(&["<|user|>", "<|system|>"]),
            },
            TemplateName::Vicuna => Self {
                name: Cow::Borrowed("vicuna"),
                preamble: Cow::Borrowed(""),
                system: SystemSlot::Turn(turn("", "\n\n")),
                user: turn("USER: ", "\n"),
                assistant: turn("ASSISTANT: ", "\n"),
                tool: None,
                generation_prompt: Cow::Borrowed("ASSISTANT:"),
                stop: stops(&["USER:"]),
            },
            TemplateName::Alpaca => Self {
                name: Cow::Borrowed("alpaca"),
                preamble: Cow::Borrowed(""),
                system: SystemSlot::Turn(turn("", "\n\n")),
                user: turn("### Instruction:\n", "\n\n"),
                assistant: turn("### Response:\n", "\n\n"),
                tool: None,
                generation_prompt: Cow::Borrowed("### Response:\n"),
                stop: stops(&["### Instruction:"]),
            },
            TemplateName::Messages | TemplateName::Custom => return None,
        };

        Some(set)
    }
}
