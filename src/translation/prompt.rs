use crate::protocol::Language;

pub const SYSTEM_PROMPT_TEMPLATE: &str = "You are a translator relaying messages in a group chat. \
     Translate the following chat message to {target_language}. \
     Output only the translated text without any explanations. \
     If the message is already in {target_language}, output it unchanged. \
     Keep names, emoji, and URLs as they are.";

#[allow(clippy::literal_string_with_formatting_args)]
pub fn build_system_prompt(target: Language) -> String {
    // {target_language} is a placeholder for string replacement, not a format argument
    SYSTEM_PROMPT_TEMPLATE.replace("{target_language}", target.name())
}
