use crate::models::RetrievedChunk;

pub const REFUSAL_PHRASE: &str = "I cannot find the answer in the provided document.";

pub const PROMPT_TEMPLATE: &str = r#"
You are a helpful assistant for finance professionals. Your task is to answer questions based ONLY on the provided context from an invoice.
If the answer is not found in the context, you must explicitly say "I cannot find the answer in the provided document." Do not make up information.

CONTEXT:
{context}

QUESTION: {question}

ANSWER:
"#;

/// Fills the template with the retrieved chunks, separated by blank lines.
///
/// With nothing retrieved the context section is left empty and the
/// instruction above steers the model to the refusal phrase.
pub fn render_prompt(chunks: &[RetrievedChunk], question: &str) -> String {
    let context = chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    fill(PROMPT_TEMPLATE, &[("{context}", context.as_str()), ("{question}", question)])
}

// Single pass, so placeholder-like text inside chunks or the question is kept verbatim.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        rendered.push_str(&rest[..start]);
        let tail = &rest[start..];
        match values.iter().find(|(key, _)| tail.starts_with(key)) {
            Some((key, value)) => {
                rendered.push_str(value);
                rest = &tail[key.len()..];
            }
            None => {
                rendered.push('{');
                rest = &tail[1..];
            }
        }
    }
    rendered.push_str(rest);
    rendered
}
