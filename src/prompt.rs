//! Prompt assembly for the completion API.

use crate::models::RetrievedPassage;

const SEPARATOR: &str = "\n---\n";

/// Concatenate passages into a context block of at most `max_chars`
/// characters.
///
/// Each passage is rendered as a `title (owner/repo)` header followed by its
/// text. Passages are added in order until the next one would exceed the
/// bound. If even the first passage does not fit, it is cut at the bound.
pub fn build_context(passages: &[RetrievedPassage], max_chars: usize) -> String {
    let mut out = String::new();
    let mut used = 0usize;

    for passage in passages {
        let block = format!(
            "{} ({}/{})\n{}\n",
            passage.title,
            passage.owner,
            passage.repo,
            passage.text.trim()
        );
        let sep = if out.is_empty() { "" } else { SEPARATOR };
        let cost = sep.chars().count() + block.chars().count();

        if used + cost > max_chars {
            if out.is_empty() {
                out = block.chars().take(max_chars).collect();
            }
            break;
        }

        out.push_str(sep);
        out.push_str(&block);
        used += cost;
    }

    out
}

/// Single-turn prompt: instructions, retrieved context, then the question.
pub fn qa_prompt(context: &str, question: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "Answer the question at the end using only the documentation excerpts below. \
         If the excerpts do not contain the answer, say that you don't know instead of \
         guessing.\n\n",
    );
    prompt.push_str("Documentation:\n");
    prompt.push_str(context);
    prompt.push_str("\n\nQuestion: ");
    prompt.push_str(question.trim());
    prompt.push_str("\nAnswer:");
    prompt
}

/// Ask the model to turn a follow-up into a question that stands alone
/// without the conversation.
pub fn condense_prompt(history: &[(String, String)], question: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "Given the conversation below and a follow-up question, rewrite the follow-up \
         as a standalone question in its original language. Reply with the question only.\n\n",
    );
    prompt.push_str("Conversation:\n");
    for (q, a) in history {
        prompt.push_str(&format!("Human: {}\nAssistant: {}\n", q.trim(), a.trim()));
    }
    prompt.push_str("\nFollow-up question: ");
    prompt.push_str(question.trim());
    prompt.push_str("\nStandalone question:");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(title: &str, text: &str) -> RetrievedPassage {
        RetrievedPassage {
            chunk_id: title.to_string(),
            title: title.to_string(),
            owner: "octo".to_string(),
            repo: "docs".to_string(),
            text: text.to_string(),
            score: 1.0,
        }
    }

    #[test]
    fn context_includes_headers_in_order() {
        let ctx = build_context(
            &[passage("a.md", "alpha"), passage("b.md", "beta")],
            1000,
        );
        assert!(ctx.starts_with("a.md (octo/docs)\nalpha\n"));
        let a = ctx.find("alpha").unwrap();
        let b = ctx.find("beta").unwrap();
        assert!(a < b);
    }

    #[test]
    fn context_stops_before_bound() {
        let passages = vec![
            passage("a.md", &"x".repeat(50)),
            passage("b.md", &"y".repeat(50)),
        ];
        let ctx = build_context(&passages, 80);
        assert!(ctx.chars().count() <= 80);
        assert!(ctx.contains('x'));
        assert!(!ctx.contains('y'));
    }

    #[test]
    fn oversized_first_passage_is_cut_on_char_boundary() {
        let passages = vec![passage("a.md", &"é".repeat(500))];
        let ctx = build_context(&passages, 100);
        assert_eq!(ctx.chars().count(), 100);
        assert!(ctx.starts_with("a.md"));
    }

    #[test]
    fn empty_passages_give_empty_context() {
        assert_eq!(build_context(&[], 100), "");
    }

    #[test]
    fn qa_prompt_orders_context_before_question() {
        let prompt = qa_prompt("CONTEXT", "  How do I install?  ");
        let c = prompt.find("CONTEXT").unwrap();
        let q = prompt.find("Question: How do I install?").unwrap();
        assert!(c < q);
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn condense_prompt_lists_history() {
        let history = vec![(
            "What is docchat?".to_string(),
            "A documentation assistant.".to_string(),
        )];
        let prompt = condense_prompt(&history, "How do I run it?");
        assert!(prompt.contains("Human: What is docchat?"));
        assert!(prompt.contains("Assistant: A documentation assistant."));
        assert!(prompt.contains("Follow-up question: How do I run it?"));
    }
}
