//! Conversational question answering over the indexed documentation.
//!
//! A [`Conversation`] performs one turn per [`Conversation::ask`]:
//!
//! 1. (memory mode, after the first turn) condense the follow-up question
//!    into a standalone question with one completion call
//! 2. embed the question and retrieve the top-k passages
//! 3. build a bounded context block and a question prompt
//! 4. send the prompt (plus prior turns in memory mode) to the model
//!
//! [`run_chat`] drives the interactive loop over any reader/writer pair so
//! the loop itself is testable without a terminal.

use anyhow::{bail, Result};
use std::io::{BufRead, Write};
use std::path::PathBuf;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::index::prepare_index;
use crate::llm::{create_completer, ChatMessage, Completer};
use crate::progress::ProgressReporter;
use crate::prompt::{build_context, condense_prompt, qa_prompt};
use crate::retrieve::retrieve;
use crate::store::VectorStore;

const SYSTEM_PROMPT: &str =
    "You are a helpful assistant that answers questions about software documentation.";

/// How much of the conversation a turn can see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    /// Every question is answered on its own.
    Qa,
    /// Prior turns shape retrieval and are sent to the model.
    Memory,
}

impl ChatMode {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "qa" => Ok(Self::Qa),
            "memory" => Ok(Self::Memory),
            other => bail!("Unknown chat mode: '{}'. Must be qa or memory.", other),
        }
    }

    pub fn banner(&self) -> &'static str {
        match self {
            Self::Qa => {
                "You are in question-answer mode: each answer is based only on the \
                 current question, without the conversation history."
            }
            Self::Memory => {
                "You are in memory mode: answers take the conversation so far into \
                 account as well as the current question."
            }
        }
    }
}

pub struct Conversation<'a> {
    store: &'a VectorStore,
    embedder: &'a dyn Embedder,
    completer: &'a dyn Completer,
    mode: ChatMode,
    top_k: usize,
    max_context_chars: usize,
    history: Vec<(String, String)>,
}

impl<'a> Conversation<'a> {
    pub fn new(
        config: &Config,
        store: &'a VectorStore,
        embedder: &'a dyn Embedder,
        completer: &'a dyn Completer,
        mode: ChatMode,
    ) -> Self {
        Self {
            store,
            embedder,
            completer,
            mode,
            top_k: config.retrieval.top_k,
            max_context_chars: config.retrieval.max_context_chars,
            history: Vec::new(),
        }
    }

    pub fn mode(&self) -> ChatMode {
        self.mode
    }

    /// Completed `(question, answer)` turns. Always empty in qa mode.
    pub fn history(&self) -> &[(String, String)] {
        &self.history
    }

    /// Answer one question. History only grows when the turn succeeds.
    pub async fn ask(&mut self, question: &str) -> Result<String> {
        let standalone = match self.mode {
            ChatMode::Memory if !self.history.is_empty() => {
                let rewritten = self
                    .completer
                    .complete(&[ChatMessage::user(condense_prompt(&self.history, question))])
                    .await?;
                if rewritten.trim().is_empty() {
                    question.to_string()
                } else {
                    rewritten
                }
            }
            _ => question.to_string(),
        };
        tracing::debug!(question = %standalone, "retrieving");

        let passages = retrieve(self.store, self.embedder, &standalone, self.top_k).await?;
        let context = build_context(&passages, self.max_context_chars);

        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
        if self.mode == ChatMode::Memory {
            for (q, a) in &self.history {
                messages.push(ChatMessage::user(q.clone()));
                messages.push(ChatMessage::assistant(a.clone()));
            }
        }
        messages.push(ChatMessage::user(qa_prompt(&context, &standalone)));

        let answer = self.completer.complete(&messages).await?;
        if self.mode == ChatMode::Memory {
            self.history.push((question.to_string(), answer.clone()));
        }
        Ok(answer)
    }
}

/// Interactive loop: read questions from `input`, write answers to `output`.
///
/// Ends on `chat.exit_command` (case-insensitive) or end of input. A failed
/// turn is reported as `error: ...` and the loop carries on.
pub async fn run_chat<R: BufRead, W: Write>(
    config: &Config,
    conversation: &mut Conversation<'_>,
    mut input: R,
    mut output: W,
) -> Result<()> {
    let exit_command = config.chat.exit_command.trim().to_lowercase();

    writeln!(
        output,
        "AI: Hi! What would you like to know about the documentation? (type '{}' to quit)",
        config.chat.exit_command
    )?;
    writeln!(output, "{}", conversation.mode().banner())?;

    let mut line = String::new();
    loop {
        write!(output, "\nYou: ")?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.to_lowercase() == exit_command {
            break;
        }

        writeln!(output, "AI is thinking...")?;
        match conversation.ask(question).await {
            Ok(answer) => writeln!(output, "AI: {}", answer)?,
            Err(e) => {
                tracing::warn!(error = %e, "chat turn failed");
                writeln!(output, "error: {:#}", e)?;
            }
        }
    }

    writeln!(output, "Bye!")?;
    Ok(())
}

fn resolve_mode(config: &Config, mode: Option<String>) -> Result<ChatMode> {
    ChatMode::parse(mode.as_deref().unwrap_or(&config.chat.mode))
}

/// CLI entry point for `docchat chat`.
pub async fn run_chat_cmd(
    config: &Config,
    input: Option<PathBuf>,
    mode: Option<String>,
    reindex: bool,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let mode = resolve_mode(config, mode)?;
    let completer = create_completer(&config.llm)?;
    let (store, embedder) = prepare_index(config, input.as_deref(), reindex, progress).await?;
    eprintln!("{} documents loaded.", store.document_count().await?);

    let mut conversation = Conversation::new(
        config,
        &store,
        embedder.as_ref(),
        completer.as_ref(),
        mode,
    );
    let stdin = std::io::stdin();
    run_chat(config, &mut conversation, stdin.lock(), std::io::stdout()).await?;

    store.close().await;
    Ok(())
}

/// CLI entry point for `docchat ask`.
pub async fn run_ask_cmd(
    config: &Config,
    question: &str,
    input: Option<PathBuf>,
    mode: Option<String>,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    if question.trim().is_empty() {
        bail!("Question must not be empty");
    }
    let mode = resolve_mode(config, mode)?;
    let completer = create_completer(&config.llm)?;
    let (store, embedder) = prepare_index(config, input.as_deref(), false, progress).await?;

    let mut conversation = Conversation::new(
        config,
        &store,
        embedder.as_ref(),
        completer.as_ref(),
        mode,
    );
    let answer = conversation.ask(question).await?;
    println!("{}", answer);

    store.close().await;
    Ok(())
}
