/*!
 * Prompt templates for chat-completion backends.
 */

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::ProviderError;

/// `{"index", "text"}` element exchanged with the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedText {
    pub index: usize,
    pub text: String,
}

fn indexed(texts: &[String]) -> Vec<IndexedText> {
    texts
        .iter()
        .enumerate()
        .map(|(index, text)| IndexedText {
            index,
            text: text.clone(),
        })
        .collect()
}

/// Prompt for a plain batch
pub fn batch_prompt(texts: &[String], target_language: &str) -> String {
    let input = json!({ "texts": indexed(texts) });

    format!(
        "You are a professional movie subtitle translator.\n\
         Translate each subtitle text in the \"texts\" array of the following JSON object into the specified language \"{lang}\".\n\n\
         The output must be a JSON object with the same structure as the input. The \"texts\" array should contain the translated texts corresponding to their original indices.\n\n\
         **Strict Requirements:**\n\
         - Strictly preserve line breaks and original formatting for each subtitle.\n\
         - Do not combine or split texts during translation.\n\
         - The number of elements in the output array must exactly match the input array.\n\
         - Ensure the final JSON is valid and retains the complete structure.\n\n\
         Input:\n{input}\n",
        lang = target_language,
        input = input,
    )
}

/// Prompt asking the model to reconcile a misaligned answer to exactly N entries
pub fn recovery_prompt(texts: &[String], partial: &[String], target_language: &str) -> String {
    let expected = texts.len();

    format!(
        "You are a professional movie subtitle translator.\n\n\
         I asked you to translate {n} subtitle texts to \"{lang}\", but you returned {m} translations.\n\n\
         Please return a COMPLETE array with exactly {n} translations:\n\
         - Keep the translations that are correct from the partial results\n\
         - Complete the missing translations\n\
         - Fix any incorrect translations\n\n\
         **Strict Requirements:**\n\
         - Output must be a JSON object with a \"texts\" array\n\
         - The \"texts\" array must contain EXACTLY {n} elements\n\
         - Each element must have \"index\" (0 to {last}) and \"text\" (translated)\n\
         - Preserve line breaks and formatting\n\
         - Do not combine or split texts\n\n\
         Original texts:\n{original}\n\n\
         Partial translations received:\n{partial}\n",
        n = expected,
        m = partial.len(),
        lang = target_language,
        last = expected.saturating_sub(1),
        original = json!(indexed(texts)),
        partial = json!(indexed(partial)),
    )
}

#[derive(Deserialize)]
struct TextsEnvelope {
    texts: Vec<IndexedText>,
}

/// Parse the model's JSON answer into texts ordered by their index
pub fn parse_texts_response(content: &str) -> Result<Vec<String>, ProviderError> {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let mut envelope: TextsEnvelope = serde_json::from_str(trimmed)
        .map_err(|e| ProviderError::ParseError(format!("Invalid texts JSON: {}", e)))?;

    envelope.texts.sort_by_key(|item| item.index);
    Ok(envelope.texts.into_iter().map(|item| item.text).collect())
}
