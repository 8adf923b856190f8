use anyhow::{Context, Result, anyhow};
use std::io::{self, BufRead, Write};
use tracing::{info, warn};

use crate::model::{GenerateBackend, Generation, ModelClient, ModelError};
use crate::normalize::{Normalization, normalize};

const CONCISE_PREFIX: &str = "Answer the following question concisely: ";
const NO_ANSWER: &str = "No response generated. Please try again.";
const QUIT_WORDS: [&str; 3] = ["quit", "exit", "q"];
const NOT_INITIALIZED: &str = "Gemini client not initialized (check GEMINI_API_KEY)";

fn banner(ch: char) -> String {
    ch.to_string().repeat(60)
}

pub fn concise_prompt(question: &str) -> String {
    format!("{CONCISE_PREFIX}{question}")
}

pub fn render_answer(result: Generation) -> String {
    match result {
        Ok(Some(text)) => text,
        Ok(None) => NO_ANSWER.to_string(),
        Err(ModelError::Provider(message)) => format!("API Error: {message}"),
        Err(ModelError::Unexpected(message)) => format!("Error: {message}"),
        Err(err @ ModelError::NotReady) => err.to_string(),
    }
}

fn write_setup_instructions(out: &mut impl Write) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "ERROR: {NOT_INITIALIZED}")?;
    writeln!(out, "Make sure GEMINI_API_KEY is set, for example in a .env file:")?;
    writeln!(out, "GEMINI_API_KEY=your_api_key_here")?;
    writeln!(out)?;
    writeln!(out, "Get your key from: https://aistudio.google.com/app/apikey")
}

fn write_normalization(out: &mut impl Write, normalized: &Normalization) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "--- Preprocessing Steps ---")?;
    writeln!(out, "Original: {}", normalized.original)?;
    writeln!(out, "Lowercased: {}", normalized.lowercased)?;
    writeln!(out, "Punctuation Removed: {}", normalized.punctuation_removed)?;
    writeln!(out, "Tokens: {:?}", normalized.tokens)?;
    writeln!(out, "Processed: {}", normalized.processed)?;
    writeln!(out, "---------------------------")?;
    writeln!(out)
}

fn write_answer(out: &mut impl Write, answer: &str) -> io::Result<()> {
    let rule = banner('=');
    writeln!(out)?;
    writeln!(out, "{rule}")?;
    writeln!(out, "ANSWER:")?;
    writeln!(out, "{rule}")?;
    writeln!(out, "{}", answer.trim())?;
    writeln!(out, "{rule}")?;
    writeln!(out)
}

pub async fn run_repl<B>(client: &ModelClient<B>) -> Result<()>
where
    B: GenerateBackend,
{
    let stdin = io::stdin();
    run_repl_with(client, stdin.lock(), io::stdout()).await
}

pub async fn run_repl_with<B, R, W>(
    client: &ModelClient<B>,
    mut input: R,
    mut out: W,
) -> Result<()>
where
    B: GenerateBackend,
    R: BufRead,
    W: Write,
{
    writeln!(out, "{}", banner('='))?;
    writeln!(out, "LLM Question and Answering CLI")?;
    writeln!(out, "{}", banner('='))?;

    if !client.is_ready() {
        write_setup_instructions(&mut out).context("Failed to write setup instructions")?;
        return Ok(());
    }

    writeln!(out)?;
    writeln!(out, "model: {}", client.model())?;
    writeln!(out, "Type 'quit' or 'exit' to close the application.")?;
    writeln!(out)?;

    loop {
        writeln!(out, "{}", banner('-'))?;
        write!(out, "Enter your question: ")?;
        out.flush().context("Failed to flush stdout")?;

        let mut line = String::new();
        let read = input
            .read_line(&mut line)
            .context("Failed to read stdin")?;
        if read == 0 {
            writeln!(out)?;
            break;
        }

        let question = line.trim();
        if QUIT_WORDS
            .iter()
            .any(|word| question.eq_ignore_ascii_case(word))
        {
            break;
        }
        if question.is_empty() {
            writeln!(out, "Please enter a valid question.")?;
            writeln!(out)?;
            continue;
        }

        write_normalization(&mut out, &normalize(question))?;
        writeln!(out, "Sending to LLM API (Model: {})...", client.model())?;
        out.flush().context("Failed to flush stdout")?;

        let result = client.generate(&concise_prompt(question)).await;
        if let Err(err) = &result {
            warn!(kind = ?err.kind(), error = %err, "question could not be answered");
        }
        write_answer(&mut out, &render_answer(result))?;
    }

    writeln!(out, "Thank you for using the LLM Q&A CLI. Goodbye!")?;
    info!("interactive session ended");
    Ok(())
}

/// Non-interactive mode: answer a single question from the command line.
pub async fn ask_once<B>(client: &ModelClient<B>, question: &str) -> Result<()>
where
    B: GenerateBackend,
{
    if !client.is_ready() {
        write_setup_instructions(&mut io::stderr())?;
        return Err(anyhow!(NOT_INITIALIZED));
    }

    let question = question.trim();
    if question.is_empty() {
        return Err(anyhow!("Question cannot be empty"));
    }

    match client.generate(&concise_prompt(question)).await {
        Ok(answer) => {
            println!("{}", answer.as_deref().unwrap_or(NO_ANSWER).trim());
            Ok(())
        }
        Err(err) => Err(anyhow!(render_answer(Err(err)))),
    }
}
